use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::types::Json;
use uuid::Uuid;

use freightwire_common::error::Result;
use freightwire_common::{
    Article, ContentType, Entities, KeyMetric, MarketImpact, ProcessingStatus, Sentiment, Urgency,
};

use super::Store;

/// Parameters for inserting a freshly ingested article.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub source_id: String,
    pub source_name: Option<String>,
    pub url: String,
    pub title: String,
    pub body_text: Option<String>,
    pub body_markdown: Option<String>,
    pub language: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub title_simhash: Option<i64>,
    pub content_minhash: Option<Vec<i64>>,
}

/// Enrichment fields written in a single update once the LLM pass completes.
#[derive(Debug, Clone)]
pub struct EnrichmentUpdate {
    pub summary_en: String,
    pub summary_zh: String,
    pub transport_modes: Vec<String>,
    pub primary_topic: Option<String>,
    pub secondary_topics: Vec<String>,
    pub content_type: Option<ContentType>,
    pub regions: Vec<String>,
    pub entities: Entities,
    pub sentiment: Sentiment,
    pub market_impact: Option<MarketImpact>,
    pub urgency: Urgency,
    pub key_metrics: Vec<KeyMetric>,
    pub embedding: Vec<f32>,
}

/// List-endpoint filters; all optional, AND-ed.
#[derive(Debug, Clone, Default)]
pub struct ArticleQuery {
    pub source_id: Option<String>,
    pub transport_mode: Option<String>,
    pub topic: Option<String>,
    pub language: Option<String>,
    pub sentiment: Option<Sentiment>,
    pub urgency: Option<Urgency>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Clone)]
pub struct ScoredArticle {
    pub article: Article,
    pub similarity: f64,
}

impl Store {
    /// Insert-if-absent keyed on the canonical URL. Returns the new article
    /// id, or None when the URL already exists (the dedup serialization
    /// point for concurrent fetches).
    pub async fn insert_article(&self, a: &NewArticle) -> Result<Option<Uuid>> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO articles
                (source_id, source_name, url, title, body_text, body_markdown,
                 language, published_at, title_simhash, content_minhash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (url) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&a.source_id)
        .bind(&a.source_name)
        .bind(&a.url)
        .bind(&a.title)
        .bind(&a.body_text)
        .bind(&a.body_markdown)
        .bind(&a.language)
        .bind(a.published_at)
        .bind(a.title_simhash)
        .bind(&a.content_minhash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn url_exists(&self, url: &str) -> Result<Option<Uuid>> {
        let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM articles WHERE url = $1 LIMIT 1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    /// All persisted title SimHashes. Linear scan by the caller is fine into
    /// the low millions.
    pub async fn title_simhashes(&self) -> Result<Vec<(Uuid, i64)>> {
        let rows = sqlx::query_as::<_, (Uuid, i64)>(
            "SELECT id, title_simhash FROM articles WHERE title_simhash IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Batch fingerprint read for LSH warmup on startup.
    pub async fn content_minhashes(&self) -> Result<Vec<(Uuid, Vec<i64>)>> {
        let rows = sqlx::query_as::<_, (Uuid, Vec<i64>)>(
            "SELECT id, content_minhash FROM articles WHERE content_minhash IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_article(&self, id: Uuid) -> Result<Option<Article>> {
        let article = sqlx::query_as::<_, Article>("SELECT * FROM articles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(article)
    }

    pub async fn list_articles(&self, q: &ArticleQuery) -> Result<Vec<Article>> {
        let page_size = q.page_size.clamp(1, 100);
        let offset = (q.page.max(1) - 1) * page_size;

        let articles = sqlx::query_as::<_, Article>(
            r#"
            SELECT * FROM articles
            WHERE ($1::text IS NULL OR source_id = $1)
              AND ($2::text IS NULL OR transport_modes @> ARRAY[$2])
              AND ($3::text IS NULL OR primary_topic = $3)
              AND ($4::text IS NULL OR language = $4)
              AND ($5::sentiment IS NULL OR sentiment = $5)
              AND ($6::urgency IS NULL OR urgency = $6)
              AND ($7::timestamptz IS NULL OR published_at >= $7)
              AND ($8::timestamptz IS NULL OR published_at <= $8)
              AND ($9::text IS NULL OR
                   to_tsvector('simple', title || ' ' || coalesce(body_text, ''))
                       @@ plainto_tsquery('simple', $9))
            ORDER BY published_at DESC NULLS LAST, fetched_at DESC
            LIMIT $10 OFFSET $11
            "#,
        )
        .bind(&q.source_id)
        .bind(&q.transport_mode)
        .bind(&q.topic)
        .bind(&q.language)
        .bind(q.sentiment)
        .bind(q.urgency)
        .bind(q.from_date)
        .bind(q.to_date)
        .bind(&q.search)
        .bind(page_size)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(articles)
    }

    /// Ids with `processing_status = 'pending'` and a body, newest first.
    /// Used by the manual trigger and the scheduler backstop.
    pub async fn pending_article_ids(&self, limit: i64) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM articles
            WHERE processing_status = 'pending' AND body_text IS NOT NULL
            ORDER BY fetched_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Compare-and-set `pending → processing`. Returns false when another
    /// worker already claimed the article (or it is done).
    pub async fn claim_for_processing(&self, id: Uuid) -> Result<bool> {
        let claimed = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE articles
            SET processing_status = 'processing', updated_at = now()
            WHERE id = $1 AND processing_status = 'pending'
            RETURNING id
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(claimed.is_some())
    }

    /// Reset a processing/failed article back to pending (manual retry path).
    pub async fn reset_to_pending(&self, id: Uuid) -> Result<bool> {
        let reset = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE articles
            SET processing_status = 'pending', updated_at = now()
            WHERE id = $1 AND processing_status IN ('failed', 'processing')
            RETURNING id
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(reset.is_some())
    }

    pub async fn mark_enrichment_failed(&self, id: Uuid, _error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE articles
            SET processing_status = 'failed', llm_processed = FALSE, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn complete_enrichment(&self, id: Uuid, u: &EnrichmentUpdate) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE articles SET
                summary_en = $2,
                summary_zh = $3,
                transport_modes = $4,
                primary_topic = $5,
                secondary_topics = $6,
                content_type = $7,
                regions = $8,
                entities = $9,
                sentiment = $10,
                market_impact = $11,
                urgency = $12,
                key_metrics = $13,
                embedding = $14,
                processing_status = 'completed',
                llm_processed = TRUE,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&u.summary_en)
        .bind(&u.summary_zh)
        .bind(&u.transport_modes)
        .bind(&u.primary_topic)
        .bind(&u.secondary_topics)
        .bind(u.content_type)
        .bind(&u.regions)
        .bind(Json(&u.entities))
        .bind(u.sentiment)
        .bind(u.market_impact)
        .bind(u.urgency)
        .bind(Json(&u.key_metrics))
        .bind(Vector::from(u.embedding.clone()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Vector similarity search over completed articles, descending cosine
    /// similarity (pgvector `<=>` is cosine distance; similarity = 1 - d).
    pub async fn semantic_search(
        &self,
        embedding: Vec<f32>,
        transport_mode: Option<&str>,
        topic: Option<&str>,
        language: Option<&str>,
        limit: i64,
    ) -> Result<Vec<ScoredArticle>> {
        let rows = sqlx::query_as::<_, ScoredRow>(
            r#"
            SELECT *, (embedding <=> $1) AS distance
            FROM articles
            WHERE embedding IS NOT NULL
              AND ($2::text IS NULL OR transport_modes @> ARRAY[$2])
              AND ($3::text IS NULL OR primary_topic = $3)
              AND ($4::text IS NULL OR language = $4)
            ORDER BY embedding <=> $1
            LIMIT $5
            "#,
        )
        .bind(Vector::from(embedding))
        .bind(transport_mode)
        .bind(topic)
        .bind(language)
        .bind(limit.clamp(1, 50))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ScoredRow::into_scored).collect())
    }

    /// Nearest neighbours of an existing article's embedding.
    pub async fn related_articles(
        &self,
        id: Uuid,
        limit: i64,
        exclude_same_source: bool,
    ) -> Result<Vec<ScoredArticle>> {
        let rows = sqlx::query_as::<_, ScoredRow>(
            r#"
            SELECT a.*, (a.embedding <=> t.embedding) AS distance
            FROM articles a, articles t
            WHERE t.id = $1
              AND a.id <> t.id
              AND a.embedding IS NOT NULL
              AND (NOT $3 OR a.source_id <> t.source_id)
            ORDER BY a.embedding <=> t.embedding
            LIMIT $2
            "#,
        )
        .bind(id)
        .bind(limit.clamp(1, 20))
        .bind(exclude_same_source)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ScoredRow::into_scored).collect())
    }

    /// Title and body for the enrichment prompt.
    pub async fn article_content(&self, id: Uuid) -> Result<Option<(String, Option<String>)>> {
        let row = sqlx::query_as::<_, (String, Option<String>)>(
            "SELECT title, body_text FROM articles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn count_by_status(&self, status: ProcessingStatus) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT count(*) FROM articles WHERE processing_status = $1",
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

#[derive(sqlx::FromRow)]
struct ScoredRow {
    #[sqlx(flatten)]
    article: Article,
    distance: f64,
}

impl ScoredRow {
    fn into_scored(self) -> ScoredArticle {
        ScoredArticle {
            article: self.article,
            similarity: 1.0 - self.distance,
        }
    }
}
