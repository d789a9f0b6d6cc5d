
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One stored reaction to an answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct FeedbackRecord {
    pub id: i64,
    pub user_query: String,
    pub response: String,
    pub model_used: String,
    pub relevance: Option<bool>,
    pub thumbs_up: i64,
    pub thumbs_down: i64,
    pub response_time_ms: Option<i64>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Up,
    Down,
}

impl std::fmt::Display for Vote {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Vote::Up => write!(f, "👍"),
            Vote::Down => write!(f, "👎"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFeedback {
    pub user_query: String,
    pub response: String,
    pub model_used: String,
    pub relevance: Option<bool>,
    pub thumbs_up: i64,
    pub thumbs_down: i64,
    pub response_time_ms: Option<i64>,
}

impl NewFeedback {
    /// A single thumbs vote; an up vote also marks the answer relevant
    #[inline]
    pub fn vote(
        user_query: impl Into<String>,
        response: impl Into<String>,
        model_used: impl Into<String>,
        vote: Vote,
    ) -> Self {
        let (thumbs_up, thumbs_down) = match vote {
            Vote::Up => (1, 0),
            Vote::Down => (0, 1),
        };
        Self {
            user_query: user_query.into(),
            response: response.into(),
            model_used: model_used.into(),
            relevance: Some(vote == Vote::Up),
            thumbs_up,
            thumbs_down,
            response_time_ms: None,
        }
    }

    #[inline]
    pub fn with_response_time(mut self, elapsed: std::time::Duration) -> Self {
        self.response_time_ms = i64::try_from(elapsed.as_millis()).ok();
        self
    }
}

/// Aggregate counts over the whole table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, FromRow)]
pub struct FeedbackSummary {
    pub total: i64,
    pub thumbs_up: i64,
    pub thumbs_down: i64,
}
