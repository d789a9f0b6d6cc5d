use anyhow::{Context, Result};
use console::style;
use dialoguer::{Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::{Config, EmbeddingProvider};
use crate::embeddings::{OllamaClient, embedder_from_config};
use crate::feedback::{FeedbackStore, NewFeedback, Vote};
use crate::index::factory_from_config;
use crate::knowledge::KnowledgeBase;
use crate::knowledge::ingest::ingest_file;
use crate::pipeline::{AnswerMode, AnswerSource, FaqAssistant, Response};
use crate::retrieval::{RetrievalResult, Retriever};

/// Load the knowledge base and build a fresh index from it
#[inline]
pub async fn build_retriever(config: &Config) -> Result<Arc<Retriever>> {
    if config.embedding.provider == EmbeddingProvider::Ollama {
        OllamaClient::new(&config.embedding)?
            .health_check()
            .context("Embedding server is not ready")?;
    }

    let embedder = Arc::from(embedder_from_config(&config.embedding)?);
    let factory = Arc::from(factory_from_config(config));
    let retriever = Arc::new(Retriever::new(embedder, factory));

    let knowledge_path = config.knowledge_path();
    let knowledge = KnowledgeBase::load(&knowledge_path)
        .with_context(|| format!("Failed to load {}", knowledge_path.display()))?;

    let bar = if console::user_attended_stderr() {
        ProgressBar::new(knowledge.len() as u64).with_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding questions {wide_bar}")
                .context("Invalid progress template")?,
        )
    } else {
        ProgressBar::hidden()
    };

    let started = Instant::now();
    retriever
        .rebuild_with_progress(knowledge.records(), &bar)
        .await
        .context("Failed to build the vector index")?;
    bar.finish_and_clear();

    info!(
        "Indexed {} records from {} in {:?}",
        retriever.len().await,
        knowledge_path.display(),
        started.elapsed()
    );
    Ok(retriever)
}

#[inline]
pub async fn build_assistant(config: &Config) -> Result<FaqAssistant> {
    let retriever = build_retriever(config).await?;
    FaqAssistant::from_config(config, retriever).context("Failed to set up answer generation")
}

/// Build the index and report what was indexed
#[inline]
pub async fn index_knowledge() -> Result<()> {
    let config = Config::load()?;
    let retriever = build_retriever(&config).await?;

    println!(
        "{} Indexed {} questions from {}",
        style("✓").green(),
        retriever.len().await,
        config.knowledge_path().display()
    );
    println!("  Embedding model: {}", style(retriever.model_id()).cyan());
    println!(
        "  Backend: {:?} ({})",
        config.retrieval.backend, config.retrieval.metric
    );
    Ok(())
}

/// Answer one question and print the result
#[inline]
pub async fn ask(question: &str, mode: AnswerMode) -> Result<()> {
    let config = Config::load()?;
    let assistant = build_assistant(&config).await?;

    let response = assistant.respond(question, mode).await;
    print_response(&response, config.retrieval.max_distance);
    Ok(())
}

/// Show the raw nearest answer next to the hybrid answer
#[inline]
pub async fn compare(question: &str) -> Result<()> {
    let config = Config::load()?;
    let assistant = build_assistant(&config).await?;

    let comparison = assistant
        .compare(question)
        .await
        .context("Failed to compare search strategies")?;

    println!("{}", style("Basic search result:").bold().yellow());
    print_match(&comparison.basic_match, config.retrieval.max_distance);
    println!("{}", comparison.basic_match.matched_answer);
    println!();
    println!("{}", style("Hybrid search result:").bold().yellow());
    println!("{}", comparison.hybrid.text);
    println!(
        "  {}",
        style(format!(
            "source: {:?}, re-ranked: {}",
            comparison.hybrid.source, comparison.hybrid.reranked
        ))
        .dim()
    );
    Ok(())
}

/// Interactive session; every answer can be rated and the rating is stored
#[inline]
pub async fn chat(mode: AnswerMode) -> Result<()> {
    let config = Config::load()?;
    let assistant = build_assistant(&config).await?;
    let feedback = FeedbackStore::open(config.feedback_database_path())
        .await
        .context("Failed to open feedback database")?;

    eprintln!(
        "{}",
        style(format!("💬 {} FAQ assistant", config.prompt.company))
            .bold()
            .cyan()
    );
    eprintln!("Ask a question, or type 'exit' to quit.");

    loop {
        let question: String = Input::new()
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()?;
        let question = question.trim();

        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }

        let response = assistant.respond(question, mode).await;
        print_response(&response, config.retrieval.max_distance);

        let Response::Answered(answer) = &response else {
            continue;
        };

        let choices = &["👍 Helpful", "👎 Not helpful", "Skip"];
        let choice = Select::new()
            .with_prompt("Was this answer helpful?")
            .default(2)
            .items(choices)
            .interact()?;
        let vote = match choice {
            0 => Vote::Up,
            1 => Vote::Down,
            _ => continue,
        };

        let entry = NewFeedback::vote(question, &answer.text, &answer.model_used, vote)
            .with_response_time(answer.elapsed);
        match feedback.record(&entry).await {
            Ok(_) => eprintln!("{}", style("Thanks for your feedback!").green()),
            Err(e) => warn!("Failed to store feedback: {}", e),
        }
    }

    Ok(())
}

/// Merge new entries into the knowledge document, then re-index
#[inline]
pub async fn ingest(new_entries: &Path, reindex: bool) -> Result<()> {
    let config = Config::load()?;
    let knowledge_path = config.knowledge_path();

    let (knowledge, report) = ingest_file(&knowledge_path, new_entries).with_context(|| {
        format!(
            "Failed to merge {} into {}",
            new_entries.display(),
            knowledge_path.display()
        )
    })?;

    println!(
        "{} Added {} questions to {} ({} total)",
        style("✓").green(),
        report.appended,
        knowledge_path.display(),
        knowledge.len()
    );
    for category in &report.categories_created {
        println!("  New category: {}", style(category).cyan());
    }

    if reindex {
        let retriever = build_retriever(&config).await?;
        println!(
            "{} Re-indexed {} questions",
            style("✓").green(),
            retriever.len().await
        );
    }
    Ok(())
}

/// Print the feedback summary and the most recent entries
#[inline]
pub async fn show_feedback(limit: u32) -> Result<()> {
    let config = Config::load()?;
    let store = FeedbackStore::open(config.feedback_database_path())
        .await
        .context("Failed to open feedback database")?;

    let summary = store.summary().await?;
    if summary.total == 0 {
        println!("No feedback has been recorded yet.");
        println!("Use 'faq-rag chat' to rate answers.");
        return Ok(());
    }

    println!(
        "Feedback ({} total): {} 👍  {} 👎",
        summary.total, summary.thumbs_up, summary.thumbs_down
    );
    println!();

    for record in store.recent(limit).await? {
        let vote = if record.thumbs_up > 0 {
            Vote::Up
        } else {
            Vote::Down
        };
        println!(
            "{} #{} [{}] {}",
            vote,
            record.id,
            record.created_at.format("%Y-%m-%d %H:%M"),
            record.user_query
        );
        println!("   Model: {}", record.model_used);
        if let Some(ms) = record.response_time_ms {
            println!("   Response time: {} ms", ms);
        }
    }
    Ok(())
}

fn print_response(response: &Response, max_distance: Option<f32>) {
    match response {
        Response::Answered(answer) => {
            println!("{}", answer.text);
            println!();
            print_match(&answer.context, max_distance);
            match answer.source {
                AnswerSource::RerankedRecord => {
                    if let Some(best) = answer.candidates.first() {
                        println!(
                            "  {}",
                            style(format!("re-ranked best: {}", best.matched_question)).dim()
                        );
                    }
                }
                AnswerSource::WebSearch => {
                    for snippet in answer.web_results.iter().filter(|s| !s.url.is_empty()) {
                        println!("  {}", style(format!("web: {}", snippet.url)).dim());
                    }
                }
                AnswerSource::Generated => {}
            }
        }
        Response::Fallback { message, reason } => {
            println!("{}", style(message).yellow());
            info!("Fallback response: {:?}", reason);
        }
    }
}

fn print_match(result: &RetrievalResult, max_distance: Option<f32>) {
    let note = if result.within(max_distance) {
        String::new()
    } else {
        " (beyond configured max_distance)".to_string()
    };
    println!(
        "  {}",
        style(format!(
            "matched [{}] \"{}\" at distance {:.4}{}",
            result.category, result.matched_question, result.distance, note
        ))
        .dim()
    );
}
