// Re-ranking module
// Asks a chat model to order retrieved candidates; never fails the caller


use fancy_regex::Regex;
use itertools::Itertools;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

use crate::generation::{ChatBackend, ChatMessage, GenerationParams};
use crate::retrieval::RetrievalResult;

static ORDERING_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\[\s*\d+(?:\s*,\s*\d+)*\s*\]").ok());

const RERANK_SYSTEM_PROMPT: &str = "You rank candidate FAQ entries by how well they answer a customer question. \
Reply with a JSON array of candidate numbers ordered from most to least relevant, for example [2, 1, 3]. \
Do not include any other text.";

/// How the returned order was produced
#[derive(Debug, Clone, PartialEq)]
pub enum RerankOutcome {
    /// The model returned a usable ordering
    Reranked(Vec<RetrievalResult>),
    /// Input order, kept because re-ranking was skipped or failed
    Fallback(Vec<RetrievalResult>),
}

impl RerankOutcome {
    #[inline]
    pub fn is_reranked(&self) -> bool {
        matches!(self, Self::Reranked(_))
    }

    #[inline]
    pub fn results(&self) -> &[RetrievalResult] {
        match self {
            Self::Reranked(results) | Self::Fallback(results) => results,
        }
    }

    #[inline]
    pub fn into_results(self) -> Vec<RetrievalResult> {
        match self {
            Self::Reranked(results) | Self::Fallback(results) => results,
        }
    }
}

#[derive(Clone)]
pub struct Reranker {
    backend: Arc<dyn ChatBackend>,
    params: GenerationParams,
}

impl Reranker {
    #[inline]
    pub fn new(backend: Arc<dyn ChatBackend>, params: GenerationParams) -> Self {
        Self { backend, params }
    }

    /// Candidates in the model's order, or unchanged on any failure
    #[inline]
    pub fn rerank(&self, query: &str, candidates: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
        self.rerank_outcome(query, candidates).into_results()
    }

    #[inline]
    pub fn rerank_outcome(&self, query: &str, candidates: Vec<RetrievalResult>) -> RerankOutcome {
        if candidates.len() < 2 {
            return RerankOutcome::Fallback(candidates);
        }

        if let Err(e) = self.params.validate() {
            warn!("Re-ranking skipped: {}", e);
            return RerankOutcome::Fallback(candidates);
        }

        let messages = vec![
            ChatMessage::system(RERANK_SYSTEM_PROMPT),
            ChatMessage::user(build_prompt(query, &candidates)),
        ];

        let reply = match self.backend.complete(&messages, &self.params) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Re-ranking failed, keeping retrieval order: {}", e);
                return RerankOutcome::Fallback(candidates);
            }
        };

        match parse_ordering(&reply, candidates.len()) {
            Some(order) => {
                debug!("Re-ranked order: {:?}", order);
                let mut slots: Vec<Option<RetrievalResult>> =
                    candidates.into_iter().map(Some).collect();
                RerankOutcome::Reranked(
                    order
                        .into_iter()
                        .filter_map(|index| slots.get_mut(index).and_then(Option::take))
                        .collect(),
                )
            }
            None => {
                warn!(
                    "Unusable re-rank reply, keeping retrieval order: {:?}",
                    reply
                );
                RerankOutcome::Fallback(candidates)
            }
        }
    }
}

/// Numbered candidate list, 1-based
#[inline]
pub fn build_prompt(query: &str, candidates: &[RetrievalResult]) -> String {
    let listing = candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| {
            format!(
                "{}. Question: {}\n   Answer: {}",
                index + 1,
                candidate.matched_question,
                candidate.matched_answer
            )
        })
        .join("\n");

    format!(
        "Customer question: {}\n\nCandidates:\n{}\n\nReturn the JSON array of candidate numbers now.",
        query, listing
    )
}

/// Parse the first JSON array of integers in `reply` into a full 0-based
/// permutation of `count` items. Numbers must be unique and within `1..=count`;
/// unmentioned candidates keep their relative order at the end.
#[inline]
pub fn parse_ordering(reply: &str, count: usize) -> Option<Vec<usize>> {
    let pattern = ORDERING_PATTERN.as_ref()?;
    let found = pattern.find(reply).ok().flatten()?;
    let numbers: Vec<usize> = serde_json::from_str(found.as_str()).ok()?;

    if numbers.is_empty() {
        return None;
    }

    let mut seen = HashSet::with_capacity(numbers.len());
    let mut order = Vec::with_capacity(count);
    for number in numbers {
        if number == 0 || number > count || !seen.insert(number) {
            return None;
        }
        order.push(number - 1);
    }

    order.extend((0..count).filter(|index| !seen.contains(&(index + 1))));
    Some(order)
}
