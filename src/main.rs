use clap::{Parser, Subcommand};
use faq_rag::Result;
use faq_rag::commands::{ask, chat, compare, index_knowledge, ingest, show_feedback};
use faq_rag::config::{run_interactive_config, show_config};
use faq_rag::pipeline::AnswerMode;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "faq-rag")]
#[command(about = "Answer customer questions from a curated FAQ knowledge base")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the knowledge base, embedding and generation backends
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Embed the knowledge base and report what was indexed
    Index,
    /// Answer a single question
    Ask {
        /// The customer question
        query: String,
        /// Re-rank the top candidates with the chat model before answering
        #[arg(long)]
        hybrid: bool,
    },
    /// Show the raw nearest answer next to the hybrid answer
    Compare {
        /// The customer question
        query: String,
    },
    /// Start an interactive session that records answer feedback
    Chat {
        /// Re-rank the top candidates with the chat model before answering
        #[arg(long)]
        hybrid: bool,
    },
    /// Merge new question/answer entries into the knowledge base
    Ingest {
        /// JSON file with {"faq_data": [{category, question, answer}]}
        file: PathBuf,
        /// Only update the knowledge file, skip re-indexing
        #[arg(long)]
        skip_index: bool,
    },
    /// Show recorded answer feedback
    Feedback {
        /// Number of recent entries to show
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

const fn answer_mode(hybrid: bool) -> AnswerMode {
    if hybrid {
        AnswerMode::Hybrid
    } else {
        AnswerMode::Basic
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Index => {
            index_knowledge().await?;
        }
        Commands::Ask { query, hybrid } => {
            ask(&query, answer_mode(hybrid)).await?;
        }
        Commands::Compare { query } => {
            compare(&query).await?;
        }
        Commands::Chat { hybrid } => {
            chat(answer_mode(hybrid)).await?;
        }
        Commands::Ingest { file, skip_index } => {
            ingest(&file, !skip_index).await?;
        }
        Commands::Feedback { limit } => {
            show_feedback(limit).await?;
        }
    }

    Ok(())
}
