use chrono::{DateTime, Utc};
use sqlx::types::Json;

use freightwire_common::error::Result;
use freightwire_common::{HealthStatus, ParserConfig, Source, SourceKind};

use super::Store;

/// Parameters for creating or seeding a source.
#[derive(Debug, Clone)]
pub struct NewSource {
    pub source_id: String,
    pub name: String,
    pub kind: SourceKind,
    pub url: String,
    pub language: Option<String>,
    pub fetch_interval_minutes: i32,
    pub priority: i32,
    pub enabled: bool,
    pub parser_config: ParserConfig,
    pub notes: Option<String>,
}

impl Store {
    /// Insert a source, or update its configuration when the id exists.
    /// Seeding is idempotent; operational state (health, last fetch) is
    /// left untouched on update.
    pub async fn upsert_source(&self, s: &NewSource) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sources
                (source_id, name, kind, url, language, fetch_interval_minutes,
                 priority, enabled, parser_config, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (source_id) DO UPDATE SET
                name = EXCLUDED.name,
                kind = EXCLUDED.kind,
                url = EXCLUDED.url,
                language = EXCLUDED.language,
                fetch_interval_minutes = EXCLUDED.fetch_interval_minutes,
                priority = EXCLUDED.priority,
                enabled = EXCLUDED.enabled,
                parser_config = EXCLUDED.parser_config,
                notes = EXCLUDED.notes
            "#,
        )
        .bind(&s.source_id)
        .bind(&s.name)
        .bind(s.kind)
        .bind(&s.url)
        .bind(&s.language)
        .bind(s.fetch_interval_minutes)
        .bind(s.priority)
        .bind(s.enabled)
        .bind(Json(&s.parser_config))
        .bind(&s.notes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert only; returns false when the source_id already exists.
    /// Used by discovery promotion so an operator's edits are never clobbered.
    pub async fn insert_source_if_absent(&self, s: &NewSource) -> Result<bool> {
        let inserted = sqlx::query_scalar::<_, String>(
            r#"
            INSERT INTO sources
                (source_id, name, kind, url, language, fetch_interval_minutes,
                 priority, enabled, parser_config, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (source_id) DO NOTHING
            RETURNING source_id
            "#,
        )
        .bind(&s.source_id)
        .bind(&s.name)
        .bind(s.kind)
        .bind(&s.url)
        .bind(&s.language)
        .bind(s.fetch_interval_minutes)
        .bind(s.priority)
        .bind(s.enabled)
        .bind(Json(&s.parser_config))
        .bind(&s.notes)
        .fetch_optional(&self.pool)
        .await?;
        Ok(inserted.is_some())
    }

    pub async fn list_sources(&self) -> Result<Vec<Source>> {
        let sources = sqlx::query_as::<_, Source>("SELECT * FROM sources ORDER BY source_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(sources)
    }

    pub async fn list_enabled_sources(&self) -> Result<Vec<Source>> {
        let sources = sqlx::query_as::<_, Source>(
            "SELECT * FROM sources WHERE enabled ORDER BY priority DESC, source_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(sources)
    }

    pub async fn get_source(&self, source_id: &str) -> Result<Option<Source>> {
        let source = sqlx::query_as::<_, Source>("SELECT * FROM sources WHERE source_id = $1")
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(source)
    }

    pub async fn update_source_after_fetch(
        &self,
        source_id: &str,
        fetched_at: DateTime<Utc>,
        health: HealthStatus,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE sources SET last_fetched_at = $2, health_status = $3 WHERE source_id = $1",
        )
        .bind(source_id)
        .bind(fetched_at)
        .bind(health)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
