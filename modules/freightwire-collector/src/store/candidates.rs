use chrono::Utc;
use sqlx::types::Json;
use uuid::Uuid;

use freightwire_common::error::Result;
use freightwire_common::{CandidateStatus, SampleArticle, SourceCandidate, SourceKind};

use super::Store;

#[derive(Debug, Clone)]
pub struct NewCandidate {
    pub url: String,
    pub name: Option<String>,
    pub language: Option<String>,
    pub discovered_via: String,
    pub discovery_query: Option<String>,
}

/// Validator output persisted onto a candidate row.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub status: CandidateStatus,
    pub name: Option<String>,
    pub feed_url: Option<String>,
    pub kind: Option<SourceKind>,
    pub quality_score: i32,
    pub relevance_score: i32,
    pub combined_score: i32,
    pub sample_articles: Vec<SampleArticle>,
    pub validation_details: serde_json::Value,
    pub error_message: Option<String>,
    pub auto_approved: bool,
}

impl Store {
    /// Persist a discovered candidate. Returns false when the URL is already
    /// known.
    pub async fn insert_candidate(&self, c: &NewCandidate) -> Result<bool> {
        let inserted = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO source_candidates (url, name, language, discovered_via, discovery_query)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (url) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&c.url)
        .bind(&c.name)
        .bind(&c.language)
        .bind(&c.discovered_via)
        .bind(&c.discovery_query)
        .fetch_optional(&self.pool)
        .await?;
        Ok(inserted.is_some())
    }

    pub async fn get_candidate(&self, id: Uuid) -> Result<Option<SourceCandidate>> {
        let candidate =
            sqlx::query_as::<_, SourceCandidate>("SELECT * FROM source_candidates WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(candidate)
    }

    pub async fn list_candidates(
        &self,
        status: Option<CandidateStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SourceCandidate>> {
        let candidates = sqlx::query_as::<_, SourceCandidate>(
            r#"
            SELECT * FROM source_candidates
            WHERE ($1::candidate_status IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status)
        .bind(limit.clamp(1, 200))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(candidates)
    }

    /// Oldest candidates in `discovered` state, atomically moved to
    /// `validating` so concurrent validate runs never double-claim.
    pub async fn claim_candidates_for_validation(
        &self,
        limit: i64,
    ) -> Result<Vec<SourceCandidate>> {
        let candidates = sqlx::query_as::<_, SourceCandidate>(
            r#"
            UPDATE source_candidates SET status = 'validating'
            WHERE id IN (
                SELECT id FROM source_candidates
                WHERE status = 'discovered'
                ORDER BY created_at
                LIMIT $1
            )
            RETURNING *
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(candidates)
    }

    pub async fn save_validation(&self, id: Uuid, r: &ValidationResult) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE source_candidates SET
                status = $2,
                name = coalesce($3, name),
                feed_url = $4,
                kind = $5,
                quality_score = $6,
                relevance_score = $7,
                combined_score = $8,
                sample_articles = $9,
                validation_details = $10,
                error_message = $11,
                auto_approved = $12,
                validated_at = $13
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(r.status)
        .bind(&r.name)
        .bind(&r.feed_url)
        .bind(r.kind)
        .bind(r.quality_score)
        .bind(r.relevance_score)
        .bind(r.combined_score)
        .bind(Json(&r.sample_articles))
        .bind(&r.validation_details)
        .bind(&r.error_message)
        .bind(r.auto_approved)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_candidate_status(&self, id: Uuid, status: CandidateStatus) -> Result<()> {
        sqlx::query("UPDATE source_candidates SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Registrable domains of everything already tracked (sources and
    /// candidates), so discovery skips what it has seen.
    pub async fn known_source_urls(&self) -> Result<Vec<String>> {
        let urls = sqlx::query_scalar::<_, String>(
            "SELECT url FROM sources UNION SELECT url FROM source_candidates",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(urls)
    }
}
