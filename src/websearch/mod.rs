
pub mod duckduckgo;

use serde::Serialize;
use std::sync::Arc;

use crate::config::WebSearchConfig;
use crate::{FaqError, Result};

pub use duckduckgo::DuckDuckGoSearch;

/// One search hit handed to the generator as context
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebSnippet {
    pub title: String,
    pub text: String,
    pub url: String,
}

/// A web search service consulted when the FAQ has no close match.
/// Transport and decoding failures are reported as `WebSearch`.
pub trait WebSearchBackend: Send + Sync {
    fn name(&self) -> &str;

    fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebSnippet>>;
}

/// Build the configured search backend, or `None` when `[web_search]` is disabled
#[inline]
pub fn web_search_from_config(
    config: &WebSearchConfig,
) -> Result<Option<Arc<dyn WebSearchBackend>>> {
    if !config.enabled {
        return Ok(None);
    }
    let backend = DuckDuckGoSearch::new(config).map_err(|e| FaqError::Config(format!("{:#}", e)))?;
    Ok(Some(Arc::new(backend)))
}

/// Render snippets as a single context block for the generator
#[inline]
pub fn context_from_snippets(snippets: &[WebSnippet]) -> String {
    snippets
        .iter()
        .map(|snippet| {
            if snippet.url.is_empty() {
                snippet.text.clone()
            } else {
                format!("{} (source: {})", snippet.text, snippet.url)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
