
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::FaqError;
use crate::config::WebSearchConfig;
use crate::websearch::{WebSearchBackend, WebSnippet};

/// DuckDuckGo Instant Answer API client. Returns the abstract first, then
/// related topics, flattening topic groups.
#[derive(Debug, Clone)]
pub struct DuckDuckGoSearch {
    endpoint: Url,
    agent: ureq::Agent,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InstantAnswer {
    #[serde(rename = "Heading")]
    heading: String,
    #[serde(rename = "AbstractText")]
    abstract_text: String,
    #[serde(rename = "AbstractURL")]
    abstract_url: String,
    #[serde(rename = "RelatedTopics")]
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RelatedTopic {
    #[serde(rename = "Text")]
    text: String,
    #[serde(rename = "FirstURL")]
    first_url: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Topics")]
    topics: Vec<RelatedTopic>,
}

impl DuckDuckGoSearch {
    #[inline]
    pub fn new(config: &WebSearchConfig) -> Result<Self> {
        let endpoint = config
            .endpoint_url()
            .context("Failed to parse web search endpoint")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build()
            .into();

        Ok(Self { endpoint, agent })
    }

    fn request_url(&self, query: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair("q", query)
            .append_pair("format", "json")
            .append_pair("no_html", "1")
            .append_pair("skip_disambig", "1");
        url
    }
}

fn collect_topics(topics: Vec<RelatedTopic>, group: &str, out: &mut Vec<WebSnippet>) {
    for topic in topics {
        if !topic.topics.is_empty() {
            let name = topic.name;
            collect_topics(topic.topics, &name, out);
            continue;
        }
        if topic.text.trim().is_empty() {
            continue;
        }
        out.push(WebSnippet {
            title: group.to_string(),
            text: topic.text,
            url: topic.first_url,
        });
    }
}

fn snippets_from(answer: InstantAnswer, max_results: usize) -> Vec<WebSnippet> {
    let mut snippets = Vec::new();
    if !answer.abstract_text.trim().is_empty() {
        snippets.push(WebSnippet {
            title: answer.heading.clone(),
            text: answer.abstract_text,
            url: answer.abstract_url,
        });
    }
    collect_topics(answer.related_topics, &answer.heading, &mut snippets);
    snippets.truncate(max_results);
    snippets
}

impl WebSearchBackend for DuckDuckGoSearch {
    #[inline]
    fn name(&self) -> &str {
        "duckduckgo"
    }

    #[inline]
    fn search(&self, query: &str, max_results: usize) -> crate::Result<Vec<WebSnippet>> {
        let url = self.request_url(query);
        debug!("Searching the web via {}", self.endpoint);

        let body = self
            .agent
            .get(url.as_str())
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| match e {
                ureq::Error::StatusCode(status) => {
                    FaqError::WebSearch(format!("search endpoint returned HTTP {}", status))
                }
                other => FaqError::WebSearch(format!("search request failed: {}", other)),
            })?;

        let answer: InstantAnswer = serde_json::from_str(&body)
            .map_err(|e| FaqError::WebSearch(format!("Malformed search response: {}", e)))?;

        Ok(snippets_from(answer, max_results))
    }
}
