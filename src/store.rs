use async_trait::async_trait;
use chrono::{DateTime, Utc, Weekday};
use sqlx::{postgres::PgRow, PgPool, Row};
use std::collections::HashSet;
use uuid::Uuid;

use crate::domain::delivery_days::{weekday_abbreviation, DeliveryDays};
use crate::domain::subscriber::{DeliveryTarget, Subscriber};
use crate::domain::subscriber_email::SubscriberEmail;
use crate::domain::subscriber_status::SubscriberStatus;
use crate::domain::time_key::TimeKey;
use crate::domain::unsubscribe_token::UnsubscribeToken;
use crate::error_chain_fmt;

#[derive(thiserror::Error)]
pub enum StoreError {
    #[error("Failed to query subscribers.")]
    Query(#[from] sqlx::Error),
    #[error("Stored subscriber is not valid: {0}")]
    InvalidRow(String),
}

impl std::fmt::Debug for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Everything the scheduler needs from subscriber storage.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Distinct preferred times among verified, still subscribed users.
    async fn distinct_active_times(&self) -> Result<HashSet<TimeKey>, StoreError>;

    /// Up to `limit` eligible subscribers for `time_key` who accept deliveries on `weekday`,
    /// ordered by id and starting right after the `after` id.
    async fn eligible_batch(
        &self,
        time_key: &TimeKey,
        weekday: Weekday,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<DeliveryTarget>, StoreError>;

    /// Replaces the unsubscribe token of every listed subscriber in a single write.
    async fn assign_unsubscribe_tokens(
        &self,
        tokens: &[(Uuid, UnsubscribeToken)],
    ) -> Result<(), StoreError>;
}

pub struct PgSubscriberStore {
    db_pool: PgPool,
}

impl PgSubscriberStore {
    pub fn new(db_pool: PgPool) -> PgSubscriberStore {
        PgSubscriberStore { db_pool }
    }
}

#[async_trait]
impl SubscriberStore for PgSubscriberStore {
    #[tracing::instrument(name = "Fetch distinct active delivery times", skip(self))]
    async fn distinct_active_times(&self) -> Result<HashSet<TimeKey>, StoreError> {
        let times = sqlx::query(
            r#"
            SELECT DISTINCT preferred_time
            FROM subscribers
            WHERE is_verified = TRUE AND unsubscribed = FALSE
            "#,
        )
        .map(|row: PgRow| TimeKey::from_stored(row.get("preferred_time")))
        .fetch_all(&self.db_pool)
        .await?;

        Ok(times.into_iter().collect())
    }

    #[tracing::instrument(name = "Fetch a batch of subscribers to deliver to", skip(self))]
    async fn eligible_batch(
        &self,
        time_key: &TimeKey,
        weekday: Weekday,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<DeliveryTarget>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, email
            FROM subscribers
            WHERE is_verified = TRUE
              AND unsubscribed = FALSE
              AND preferred_time = $1
              AND $2 = ANY(preferred_days)
              AND ($3::uuid IS NULL OR id > $3)
            ORDER BY id
            LIMIT $4
            "#,
        )
        .bind(time_key.as_ref())
        .bind(weekday_abbreviation(weekday))
        .bind(after)
        .bind(limit as i64)
        .fetch_all(&self.db_pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(DeliveryTarget {
                    id: row.get("id"),
                    email: SubscriberEmail::parse(row.get("email"))
                        .map_err(StoreError::InvalidRow)?,
                })
            })
            .collect()
    }

    #[tracing::instrument(
        name = "Store unsubscribe tokens",
        skip(self, tokens),
        fields(tokens = tokens.len())
    )]
    async fn assign_unsubscribe_tokens(
        &self,
        tokens: &[(Uuid, UnsubscribeToken)],
    ) -> Result<(), StoreError> {
        if tokens.is_empty() {
            return Ok(());
        }

        let ids: Vec<Uuid> = tokens.iter().map(|(id, _)| *id).collect();
        let values: Vec<String> = tokens
            .iter()
            .map(|(_, token)| token.as_ref().to_string())
            .collect();
        let expirations: Vec<DateTime<Utc>> =
            tokens.iter().map(|(_, token)| token.expires_at()).collect();

        sqlx::query(
            r#"
            UPDATE subscribers AS s
            SET unsubscribe_token = t.token,
                unsubscribe_token_expires_at = t.expires_at,
                updated_at = now()
            FROM UNNEST($1::uuid[], $2::text[], $3::timestamptz[]) AS t(id, token, expires_at)
            WHERE s.id = t.id
            "#,
        )
        .bind(ids)
        .bind(values)
        .bind(expirations)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }
}

/// Loads one subscriber by address, for the request handlers.
#[tracing::instrument(name = "Fetch a subscriber by email", skip(db_pool))]
pub async fn fetch_subscriber_by_email(
    db_pool: &PgPool,
    email: &SubscriberEmail,
) -> Result<Option<Subscriber>, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT id, email, is_verified, unsubscribed, preferred_time, preferred_days
        FROM subscribers
        WHERE email = $1
        "#,
    )
    .bind(email.as_ref())
    .fetch_optional(db_pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    Ok(Some(Subscriber {
        id: row.get("id"),
        email: SubscriberEmail::parse(row.get("email")).map_err(StoreError::InvalidRow)?,
        status: SubscriberStatus::from_flags(row.get("is_verified"), row.get("unsubscribed")),
        preferred_time: TimeKey::from_stored(row.get("preferred_time")),
        preferred_days: DeliveryDays::parse(row.get("preferred_days"))
            .map_err(StoreError::InvalidRow)?,
    }))
}
