//! Postgres persistence. One `Store` handle over a connection pool, with the
//! query surface split by aggregate.

mod articles;
mod candidates;
mod keys;
mod logs;
mod sources;
mod subscriptions;

pub mod analytics;

pub use articles::{ArticleQuery, EnrichmentUpdate, NewArticle, ScoredArticle};
pub use candidates::{NewCandidate, ValidationResult};
pub use sources::NewSource;
pub use subscriptions::NewSubscription;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use freightwire_common::error::Result;
use freightwire_common::FreightwireError;

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, pool_size: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| FreightwireError::Database(e.to_string()))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
