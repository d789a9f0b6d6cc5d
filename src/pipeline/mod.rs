// Answer pipeline
// Basic and hybrid retrieve-then-generate flows plus the user-facing fallback boundary


use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::Config;
use crate::generation::{AnswerGenerator, GenerationParams};
use crate::rerank::{RerankOutcome, Reranker};
use crate::retrieval::{RetrievalResult, Retriever};
use crate::websearch::{WebSearchBackend, WebSnippet, context_from_snippets, web_search_from_config};
use crate::{FaqError, Result};

pub const EMPTY_INDEX_MESSAGE: &str =
    "No knowledge base is loaded yet, so I can't look that up. Please try again once the FAQ has been indexed.";
pub const GENERATION_FAILED_MESSAGE: &str =
    "I'm sorry, I couldn't put an answer together just now. Please try again in a moment.";
pub const SEARCH_UNAVAILABLE_MESSAGE: &str =
    "Search is temporarily unavailable. Please try again shortly.";
pub const GENERIC_FAILURE_MESSAGE: &str =
    "Something went wrong while answering your question. Please try again.";

/// Steps of one query, logged as each is entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    EmbedQuery,
    RetrieveTopK,
    WebSearch,
    GenerateCandidateAnswer,
    Rerank,
    ReturnBest,
}

impl fmt::Display for Stage {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::EmbedQuery => "embed_query",
            Self::RetrieveTopK => "retrieve_top_k",
            Self::WebSearch => "web_search",
            Self::GenerateCandidateAnswer => "generate_candidate_answer",
            Self::Rerank => "rerank",
            Self::ReturnBest => "return_best",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    Basic,
    Hybrid,
}

/// Where the final text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    /// Model rewrite of the context record's answer
    Generated,
    /// Stored answer of the candidate the re-ranker put first
    RerankedRecord,
    /// Model answer grounded on web snippets because no FAQ entry was close enough
    WebSearch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub source: AnswerSource,
    /// Record used as generation context
    pub context: RetrievalResult,
    /// Retrieved candidates, in final order
    pub candidates: Vec<RetrievalResult>,
    pub reranked: bool,
    pub model_used: String,
    /// Snippets used as context when `source` is `WebSearch`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub web_results: Vec<WebSnippet>,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Raw basic match next to the hybrid answer for the same query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub basic_match: RetrievalResult,
    pub hybrid: Answer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    EmptyIndex,
    GenerationUnavailable,
    SearchUnavailable,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Answered(Answer),
    Fallback {
        reason: FallbackReason,
        message: String,
    },
}

impl Response {
    #[inline]
    pub fn text(&self) -> &str {
        match self {
            Self::Answered(answer) => &answer.text,
            Self::Fallback { message, .. } => message,
        }
    }

    #[inline]
    pub fn answer(&self) -> Option<&Answer> {
        match self {
            Self::Answered(answer) => Some(answer),
            Self::Fallback { .. } => None,
        }
    }

    fn from_error(error: &FaqError) -> Self {
        let (reason, message) = match error {
            FaqError::EmptyIndex => (FallbackReason::EmptyIndex, EMPTY_INDEX_MESSAGE),
            FaqError::GenerationBackend(_) | FaqError::InvalidParameters(_) => {
                (FallbackReason::GenerationUnavailable, GENERATION_FAILED_MESSAGE)
            }
            FaqError::EmbeddingUnavailable(_) | FaqError::DimensionMismatch { .. } => {
                (FallbackReason::SearchUnavailable, SEARCH_UNAVAILABLE_MESSAGE)
            }
            _ => (FallbackReason::Failed, GENERIC_FAILURE_MESSAGE),
        };
        Self::Fallback {
            reason,
            message: message.to_string(),
        }
    }
}

/// Web search consulted when the best match is farther than `max_distance`
#[derive(Clone)]
struct WebFallback {
    backend: Arc<dyn WebSearchBackend>,
    max_distance: f32,
    max_results: usize,
}

pub struct FaqAssistant {
    retriever: Arc<Retriever>,
    generator: AnswerGenerator,
    reranker: Option<Reranker>,
    web_search: Option<WebFallback>,
    params: GenerationParams,
    top_k: usize,
}

impl FaqAssistant {
    #[inline]
    pub fn new(
        retriever: Arc<Retriever>,
        generator: AnswerGenerator,
        reranker: Option<Reranker>,
        params: GenerationParams,
        top_k: usize,
    ) -> Self {
        Self {
            retriever,
            generator,
            reranker,
            web_search: None,
            params,
            top_k: top_k.max(1),
        }
    }

    /// Ground the answer on web results whenever the best match is farther than `max_distance`
    #[inline]
    #[must_use]
    pub fn with_web_search(
        mut self,
        backend: Arc<dyn WebSearchBackend>,
        max_distance: f32,
        max_results: usize,
    ) -> Self {
        self.web_search = Some(WebFallback {
            backend,
            max_distance,
            max_results: max_results.max(1),
        });
        self
    }

    /// Generator and re-ranker share the configured chat backend
    #[inline]
    pub fn from_config(config: &Config, retriever: Arc<Retriever>) -> Result<Self> {
        let generator = AnswerGenerator::from_config(config)?;
        let reranker = Reranker::new(
            Arc::clone(generator.backend()),
            GenerationParams::rerank(&config.generation),
        );
        let assistant = Self::new(
            retriever,
            generator,
            Some(reranker),
            GenerationParams::answer(&config.generation),
            config.retrieval.top_k,
        );

        let web_search = web_search_from_config(&config.web_search)?;
        Ok(match (web_search, config.retrieval.max_distance) {
            (Some(backend), Some(max_distance)) => assistant.with_web_search(
                backend,
                max_distance,
                config.web_search.max_results,
            ),
            (Some(_), None) => {
                warn!("Web search is enabled without [retrieval].max_distance; ignoring it");
                assistant
            }
            (None, _) => assistant,
        })
    }

    #[inline]
    pub fn retriever(&self) -> &Arc<Retriever> {
        &self.retriever
    }

    #[inline]
    pub fn model_id(&self) -> &str {
        self.generator.model_id()
    }

    /// Basic flow: best single match rewritten by the model
    #[inline]
    pub async fn answer(&self, query: &str) -> Result<Answer> {
        let started = Instant::now();
        let candidates = self.retrieve(query, 1).await?;
        let context = candidates.first().cloned().ok_or(FaqError::EmptyIndex)?;
        let web_results = self.search_web(query, &context).await;
        let text = self.generate(query, &context, &web_results).await?;
        let source = if web_results.is_empty() {
            AnswerSource::Generated
        } else {
            AnswerSource::WebSearch
        };

        info!(stage = %Stage::ReturnBest, ?source, "Answer ready");
        Ok(Answer {
            text,
            source,
            context,
            candidates,
            reranked: false,
            model_used: self.generator.model_id().to_string(),
            web_results,
            elapsed: started.elapsed(),
        })
    }

    /// Hybrid flow: top-k retrieval, generation from the best match, then re-ranking
    #[inline]
    pub async fn hybrid_answer(&self, query: &str) -> Result<Answer> {
        let started = Instant::now();
        let candidates = self.retrieve(query, self.top_k).await?;
        let context = candidates.first().cloned().ok_or(FaqError::EmptyIndex)?;
        let web_results = self.search_web(query, &context).await;
        let generated = self.generate(query, &context, &web_results).await?;

        if !web_results.is_empty() {
            info!(stage = %Stage::ReturnBest, source = ?AnswerSource::WebSearch, "Answer ready");
            return Ok(Answer {
                text: generated,
                source: AnswerSource::WebSearch,
                context,
                candidates,
                reranked: false,
                model_used: self.generator.model_id().to_string(),
                web_results,
                elapsed: started.elapsed(),
            });
        }

        let outcome = match &self.reranker {
            Some(reranker) => {
                info!(stage = %Stage::Rerank, candidates = candidates.len(), "Re-ranking candidates");
                let reranker = reranker.clone();
                let owned_query = query.to_string();
                let fallback = candidates.clone();
                match tokio::task::spawn_blocking(move || {
                    reranker.rerank_outcome(&owned_query, candidates)
                })
                .await
                {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!("Re-ranking task failed: {}", e);
                        RerankOutcome::Fallback(fallback)
                    }
                }
            }
            None => RerankOutcome::Fallback(candidates),
        };

        let reranked = outcome.is_reranked();
        let candidates = outcome.into_results();
        let promoted = candidates
            .first()
            .filter(|best| reranked && best.record_id != context.record_id);

        let (text, source) = match promoted {
            Some(best) => (best.matched_answer.clone(), AnswerSource::RerankedRecord),
            None => (generated, AnswerSource::Generated),
        };

        info!(stage = %Stage::ReturnBest, ?source, reranked, "Answer ready");
        Ok(Answer {
            text,
            source,
            context,
            candidates,
            reranked,
            model_used: self.generator.model_id().to_string(),
            web_results,
            elapsed: started.elapsed(),
        })
    }

    #[inline]
    pub async fn compare(&self, query: &str) -> Result<Comparison> {
        let basic_match = self.retriever.search(query).await?;
        let hybrid = self.hybrid_answer(query).await?;
        Ok(Comparison {
            basic_match,
            hybrid,
        })
    }

    /// Never fails: per-query errors become a fallback message
    #[inline]
    pub async fn respond(&self, query: &str, mode: AnswerMode) -> Response {
        let result = match mode {
            AnswerMode::Basic => self.answer(query).await,
            AnswerMode::Hybrid => self.hybrid_answer(query).await,
        };

        match result {
            Ok(answer) => Response::Answered(answer),
            Err(e) => {
                warn!("Answering {:?} failed: {}", query, e);
                Response::from_error(&e)
            }
        }
    }

    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        if self.retriever.is_empty().await {
            return Err(FaqError::EmptyIndex);
        }

        info!(stage = %Stage::EmbedQuery, "Embedding query");
        let vector = self.retriever.embed_query(query).await?;

        info!(stage = %Stage::RetrieveTopK, k, "Retrieving candidates");
        self.retriever.search_vector(&vector, k).await
    }

    /// Empty unless web search is configured and `best` is not within its threshold.
    /// Search failures are logged and the FAQ context is kept.
    async fn search_web(&self, query: &str, best: &RetrievalResult) -> Vec<WebSnippet> {
        let Some(fallback) = &self.web_search else {
            return Vec::new();
        };
        if best.within(Some(fallback.max_distance)) {
            return Vec::new();
        }

        info!(
            stage = %Stage::WebSearch,
            distance = best.distance,
            max_distance = fallback.max_distance,
            backend = fallback.backend.name(),
            "No close FAQ match, searching the web"
        );
        let backend = Arc::clone(&fallback.backend);
        let owned_query = query.to_string();
        let max_results = fallback.max_results;

        match tokio::task::spawn_blocking(move || backend.search(&owned_query, max_results)).await {
            Ok(Ok(snippets)) => {
                if snippets.is_empty() {
                    warn!("Web search returned nothing, answering from the closest FAQ entry");
                }
                snippets
            }
            Ok(Err(e)) => {
                warn!("Web search failed, answering from the closest FAQ entry: {}", e);
                Vec::new()
            }
            Err(e) => {
                warn!("Web search task failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn generate(
        &self,
        query: &str,
        context: &RetrievalResult,
        web_results: &[WebSnippet],
    ) -> Result<String> {
        let context_answer = if web_results.is_empty() {
            info!(
                stage = %Stage::GenerateCandidateAnswer,
                record = %context.record_id,
                distance = context.distance,
                "Generating answer"
            );
            context.matched_answer.clone()
        } else {
            info!(
                stage = %Stage::GenerateCandidateAnswer,
                snippets = web_results.len(),
                "Generating answer from web results"
            );
            context_from_snippets(web_results)
        };
        let generator = self.generator.clone();
        let query = query.to_string();
        let params = self.params;

        tokio::task::spawn_blocking(move || generator.generate(&query, &context_answer, &params))
            .await
            .map_err(|e| FaqError::GenerationBackend(format!("generation task failed: {}", e)))?
    }
}
