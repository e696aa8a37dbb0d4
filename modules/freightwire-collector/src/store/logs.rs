use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use freightwire_common::error::Result;
use freightwire_common::{FetchLog, FetchStatus, WebhookDeliveryLog};

use super::Store;

impl Store {
    /// Open a fetch-log row when the tick starts; counters land on
    /// completion. Append-only by contract.
    pub async fn insert_fetch_started(
        &self,
        source_id: &str,
        started_at: DateTime<Utc>,
    ) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO fetch_logs (source_id, started_at) VALUES ($1, $2) RETURNING id",
        )
        .bind(source_id)
        .bind(started_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn complete_fetch_log(
        &self,
        id: i64,
        status: FetchStatus,
        articles_found: i32,
        articles_new: i32,
        articles_dedup: i32,
        error_message: Option<&str>,
        duration_ms: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE fetch_logs SET
                completed_at = now(),
                status = $2,
                articles_found = $3,
                articles_new = $4,
                articles_dedup = $5,
                error_message = $6,
                duration_ms = $7
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(articles_found)
        .bind(articles_new)
        .bind(articles_dedup)
        .bind(error_message)
        .bind(duration_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Completed fetch logs for a source since a cutoff (health window).
    pub async fn fetch_logs_since(
        &self,
        source_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<FetchLog>> {
        let logs = sqlx::query_as::<_, FetchLog>(
            r#"
            SELECT * FROM fetch_logs
            WHERE source_id = $1 AND started_at >= $2 AND completed_at IS NOT NULL
            ORDER BY started_at DESC
            "#,
        )
        .bind(source_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(logs)
    }

    pub async fn list_fetch_logs(
        &self,
        source_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<FetchLog>> {
        let logs = sqlx::query_as::<_, FetchLog>(
            r#"
            SELECT * FROM fetch_logs
            WHERE ($1::text IS NULL OR source_id = $1)
            ORDER BY started_at DESC
            LIMIT $2
            "#,
        )
        .bind(source_id)
        .bind(limit.clamp(1, 500))
        .fetch_all(&self.pool)
        .await?;
        Ok(logs)
    }

    /// Record a webhook delivery attempt. Logs a warning on failure rather
    /// than propagating; a lost log row shouldn't fail the delivery loop.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_webhook_log(
        &self,
        subscription_id: Uuid,
        article_id: Uuid,
        url: &str,
        status_code: Option<i32>,
        success: bool,
        attempt: i32,
        latency_ms: Option<i32>,
        error_message: Option<&str>,
    ) {
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_delivery_logs
                (subscription_id, article_id, url, status_code, success,
                 attempt, latency_ms, error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(subscription_id)
        .bind(article_id)
        .bind(url)
        .bind(status_code)
        .bind(success)
        .bind(attempt)
        .bind(latency_ms)
        .bind(error_message)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(%subscription_id, %article_id, error = %e, "Failed to record webhook delivery");
        }
    }

    pub async fn list_webhook_logs(
        &self,
        subscription_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<WebhookDeliveryLog>> {
        let logs = sqlx::query_as::<_, WebhookDeliveryLog>(
            r#"
            SELECT * FROM webhook_delivery_logs
            WHERE ($1::uuid IS NULL OR subscription_id = $1)
            ORDER BY delivered_at DESC
            LIMIT $2
            "#,
        )
        .bind(subscription_id)
        .bind(limit.clamp(1, 500))
        .fetch_all(&self.pool)
        .await?;
        Ok(logs)
    }
}
