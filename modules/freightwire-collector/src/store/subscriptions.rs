use uuid::Uuid;

use freightwire_common::error::Result;
use freightwire_common::{Channel, Frequency, Subscription, Urgency};

use super::Store;

#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub name: String,
    pub source_ids: Vec<String>,
    pub transport_modes: Vec<String>,
    pub topics: Vec<String>,
    pub regions: Vec<String>,
    pub languages: Vec<String>,
    pub urgency_min: Option<Urgency>,
    pub channel: Channel,
    pub channel_config: serde_json::Value,
    pub frequency: Frequency,
    pub enabled: bool,
}

impl Store {
    pub async fn create_subscription(&self, s: &NewSubscription) -> Result<Subscription> {
        let sub = sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions
                (name, source_ids, transport_modes, topics, regions, languages,
                 urgency_min, channel, channel_config, frequency, enabled)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(&s.name)
        .bind(&s.source_ids)
        .bind(&s.transport_modes)
        .bind(&s.topics)
        .bind(&s.regions)
        .bind(&s.languages)
        .bind(s.urgency_min)
        .bind(s.channel)
        .bind(&s.channel_config)
        .bind(s.frequency)
        .bind(s.enabled)
        .fetch_one(&self.pool)
        .await?;
        Ok(sub)
    }

    pub async fn update_subscription(
        &self,
        id: Uuid,
        s: &NewSubscription,
    ) -> Result<Option<Subscription>> {
        let sub = sqlx::query_as::<_, Subscription>(
            r#"
            UPDATE subscriptions SET
                name = $2,
                source_ids = $3,
                transport_modes = $4,
                topics = $5,
                regions = $6,
                languages = $7,
                urgency_min = $8,
                channel = $9,
                channel_config = $10,
                frequency = $11,
                enabled = $12,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&s.name)
        .bind(&s.source_ids)
        .bind(&s.transport_modes)
        .bind(&s.topics)
        .bind(&s.regions)
        .bind(&s.languages)
        .bind(s.urgency_min)
        .bind(s.channel)
        .bind(&s.channel_config)
        .bind(s.frequency)
        .bind(s.enabled)
        .fetch_optional(&self.pool)
        .await?;
        Ok(sub)
    }

    pub async fn get_subscription(&self, id: Uuid) -> Result<Option<Subscription>> {
        let sub = sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(sub)
    }

    pub async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let subs =
            sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions ORDER BY created_at")
                .fetch_all(&self.pool)
                .await?;
        Ok(subs)
    }

    pub async fn delete_subscription(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Enabled realtime webhook subscriptions, the dispatcher's fan-out set.
    pub async fn realtime_webhook_subscriptions(&self) -> Result<Vec<Subscription>> {
        let subs = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT * FROM subscriptions
            WHERE enabled AND channel = 'webhook' AND frequency = 'realtime'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(subs)
    }
}
