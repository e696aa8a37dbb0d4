//! Aggregate reads over the article corpus: trending topics, sentiment
//! trend, top entities, and a streaming scan for exports.

use chrono::{DateTime, NaiveDate, Utc};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::Serialize;

use freightwire_common::error::Result;
use freightwire_common::Article;

use super::Store;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TopicCount {
    pub topic: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SentimentDay {
    pub day: NaiveDate,
    pub sentiment: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EntityCount {
    pub entity: String,
    pub count: i64,
}

impl Store {
    pub async fn trending_topics(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TopicCount>> {
        let rows = sqlx::query_as::<_, TopicCount>(
            r#"
            SELECT primary_topic AS topic, count(*) AS count
            FROM articles
            WHERE primary_topic IS NOT NULL AND fetched_at >= $1
            GROUP BY primary_topic
            ORDER BY count DESC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit.clamp(1, 50))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn sentiment_trend(&self, since: DateTime<Utc>) -> Result<Vec<SentimentDay>> {
        let rows = sqlx::query_as::<_, SentimentDay>(
            r#"
            SELECT date(fetched_at) AS day, sentiment::text AS sentiment, count(*) AS count
            FROM articles
            WHERE sentiment IS NOT NULL AND fetched_at >= $1
            GROUP BY day, sentiment
            ORDER BY day, sentiment
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Top entities of one category ("companies", "ports", "people",
    /// "organizations") by mention count.
    pub async fn top_entities(
        &self,
        category: &str,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<EntityCount>> {
        let rows = sqlx::query_as::<_, EntityCount>(
            r#"
            SELECT value AS entity, count(*) AS count
            FROM articles,
                 jsonb_array_elements_text(entities -> $1) AS value
            WHERE fetched_at >= $2
            GROUP BY value
            ORDER BY count DESC
            LIMIT $3
            "#,
        )
        .bind(category)
        .bind(since)
        .bind(limit.clamp(1, 100))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Lazy scan over completed articles, newest first. Finite, not
    /// restartable; the caller drives it to completion.
    pub fn stream_completed_articles(&self) -> BoxStream<'_, Result<Article>> {
        sqlx::query_as::<_, Article>(
            r#"
            SELECT * FROM articles
            WHERE processing_status = 'completed'
            ORDER BY published_at DESC NULLS LAST
            "#,
        )
        .fetch(&self.pool)
        .map(|row| row.map_err(Into::into))
        .boxed()
    }
}
