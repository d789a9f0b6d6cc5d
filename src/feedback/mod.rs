// Feedback sink
// Append-only SQLite table of reactions to answers; the answer path never reads it


pub mod models;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::{FaqError, Result};

pub use models::{FeedbackRecord, FeedbackSummary, NewFeedback, Vote};

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone)]
pub struct FeedbackStore {
    pool: DbPool,
}

impl FeedbackStore {
    /// Open (creating if missing) the database file and apply migrations
    #[inline]
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| FaqError::Database(format!("Failed to open feedback database: {}", e)))?;

        let store = Self { pool };
        store.run_migrations().await?;
        debug!("Feedback store ready at {}", path.display());
        Ok(store)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running feedback database migrations");

        sqlx::migrate!("src/feedback/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| FaqError::Database(format!("Failed to run feedback migration: {}", e)))?;

        Ok(())
    }

    #[inline]
    pub async fn record(&self, feedback: &NewFeedback) -> Result<FeedbackRecord> {
        let now = Utc::now().naive_utc();
        let record = sqlx::query_as::<_, FeedbackRecord>(
            r#"
            INSERT INTO feedback
                (user_query, response, model_used, relevance, thumbs_up, thumbs_down, response_time_ms, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, user_query, response, model_used, relevance, thumbs_up, thumbs_down, response_time_ms, created_at
            "#,
        )
        .bind(&feedback.user_query)
        .bind(&feedback.response)
        .bind(&feedback.model_used)
        .bind(feedback.relevance)
        .bind(feedback.thumbs_up)
        .bind(feedback.thumbs_down)
        .bind(feedback.response_time_ms)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| FaqError::Database(format!("Failed to record feedback: {}", e)))?;

        debug!("Recorded feedback {} for {:?}", record.id, record.user_query);
        Ok(record)
    }

    /// Most recent first
    #[inline]
    pub async fn recent(&self, limit: u32) -> Result<Vec<FeedbackRecord>> {
        sqlx::query_as::<_, FeedbackRecord>(
            r#"
            SELECT id, user_query, response, model_used, relevance, thumbs_up, thumbs_down, response_time_ms, created_at
            FROM feedback
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| FaqError::Database(format!("Failed to list feedback: {}", e)))
    }

    #[inline]
    pub async fn summary(&self) -> Result<FeedbackSummary> {
        sqlx::query_as::<_, FeedbackSummary>(
            r#"
            SELECT COUNT(*) AS total,
                   COALESCE(SUM(thumbs_up), 0) AS thumbs_up,
                   COALESCE(SUM(thumbs_down), 0) AS thumbs_down
            FROM feedback
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| FaqError::Database(format!("Failed to summarise feedback: {}", e)))
    }
}
