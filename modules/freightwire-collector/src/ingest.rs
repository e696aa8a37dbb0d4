//! Per-article ingest step: normalize, fingerprint, dedup, insert.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use freightwire_common::error::Result;
use freightwire_common::fingerprint::{canonicalize_url, minhash128, simhash64};
use freightwire_common::lang::detect_language;
use freightwire_common::text::{clean_text, clean_title};
use freightwire_common::{RawArticle, Source};

use crate::dedup::{DedupOutcome, Deduplicator};
use crate::store::{NewArticle, Store};

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Article persisted; the id flows on to enrichment.
    Inserted(Uuid),
    /// Dedup hit (or the URL unique constraint fired under a race).
    Duplicate(String),
    /// Not persistable (missing title after normalization).
    Skipped(String),
}

pub struct Ingestor {
    store: Store,
    dedup: Arc<Deduplicator>,
}

impl Ingestor {
    pub fn new(store: Store, dedup: Arc<Deduplicator>) -> Self {
        Self { store, dedup }
    }

    pub fn deduplicator(&self) -> &Arc<Deduplicator> {
        &self.dedup
    }

    /// Run one raw article through normalize → fingerprint → dedup → insert.
    pub async fn ingest(&self, source: &Source, raw: RawArticle) -> Result<IngestOutcome> {
        let canonical_url = canonicalize_url(&raw.url);

        let title = match clean_title(&raw.title, Some(&source.name)) {
            Some(t) => t,
            None => return Ok(IngestOutcome::Skipped(format!("empty title: {canonical_url}"))),
        };

        let body_text = raw.body_text.as_deref().and_then(clean_text);

        let title_simhash = simhash64(&title);
        let content_minhash = body_text.as_deref().and_then(minhash128);

        let outcome = self
            .dedup
            .check(
                &canonical_url,
                title_simhash,
                content_minhash.as_ref().map(|s| s.as_slice()),
            )
            .await?;

        if let DedupOutcome::Duplicate { existing_id, reason } = outcome {
            debug!(url = %canonical_url, existing = %existing_id, %reason, "duplicate article dropped");
            return Ok(IngestOutcome::Duplicate(reason.to_string()));
        }

        let language = body_text
            .as_deref()
            .map(|b| detect_language(b).to_string())
            .or_else(|| source.language.clone());

        let record = NewArticle {
            source_id: source.source_id.clone(),
            source_name: Some(source.name.clone()),
            url: canonical_url.clone(),
            title,
            body_text,
            body_markdown: raw.body_markdown,
            language,
            published_at: raw.published_at,
            title_simhash: title_simhash.map(|h| h as i64),
            content_minhash: content_minhash
                .as_ref()
                .map(|s| s.iter().map(|&v| v as i64).collect()),
        };

        match self.store.insert_article(&record).await? {
            Some(id) => {
                if let Some(signature) = &content_minhash {
                    self.dedup.index_signature(id, signature.as_slice());
                }
                Ok(IngestOutcome::Inserted(id))
            }
            // Lost the race on the URL unique index: another fetch inserted
            // the same canonical URL between dedup and insert.
            None => Ok(IngestOutcome::Duplicate("url_exact".to_string())),
        }
    }
}
