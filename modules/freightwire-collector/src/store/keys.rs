use uuid::Uuid;

use freightwire_common::error::Result;
use freightwire_common::{ApiKey, ApiRole};

use super::Store;

impl Store {
    /// Open-access check: the API runs unauthenticated until the first key
    /// exists.
    pub async fn any_api_keys(&self) -> Result<bool> {
        let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM api_keys LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(id.is_some())
    }

    pub async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>> {
        let key = sqlx::query_as::<_, ApiKey>(
            "SELECT * FROM api_keys WHERE key_hash = $1 AND enabled",
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(key)
    }

    pub async fn touch_api_key(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn create_api_key(
        &self,
        name: &str,
        key_hash: &str,
        role: ApiRole,
    ) -> Result<ApiKey> {
        let key = sqlx::query_as::<_, ApiKey>(
            r#"
            INSERT INTO api_keys (name, key_hash, role)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(key_hash)
        .bind(role)
        .fetch_one(&self.pool)
        .await?;
        Ok(key)
    }

    pub async fn list_api_keys(&self) -> Result<Vec<ApiKey>> {
        let keys = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(keys)
    }

    pub async fn delete_api_key(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
