use chrono::{Datelike, Local, Utc, Weekday};
use futures::future::join_all;
use std::sync::Arc;
use std::time;
use uuid::Uuid;

use crate::comic_client::{ComicClient, DEFAULT_MAX_ATTEMPTS};
use crate::domain::time_key::TimeKey;
use crate::domain::unsubscribe_token::UnsubscribeToken;
use crate::email_client::ComicMailer;
use crate::error_chain_fmt;
use crate::store::{StoreError, SubscriberStore};

const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_BATCH_PAUSE: time::Duration = time::Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct DeliverySettings {
    pub batch_size: usize,
    pub batch_pause: time::Duration,
    pub max_comic_attempts: u32,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        DeliverySettings {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_pause: DEFAULT_BATCH_PAUSE,
            max_comic_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub batches: usize,
    pub processed: usize,
    pub delivered: usize,
    pub failed: usize,
}

#[derive(thiserror::Error)]
pub enum DeliveryError {
    #[error("Failed to load the next batch of subscribers.")]
    LoadSubscribers(#[source] StoreError),
    #[error("Failed to store unsubscribe tokens.")]
    StoreTokens(#[source] StoreError),
}

impl std::fmt::Debug for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Delivers today's comic to everyone subscribed to one time-of-day slot.
pub struct DeliveryRunner {
    store: Arc<dyn SubscriberStore>,
    comic_client: Arc<ComicClient>,
    mailer: Arc<dyn ComicMailer>,
    settings: DeliverySettings,
}

impl DeliveryRunner {
    pub fn new(
        store: Arc<dyn SubscriberStore>,
        comic_client: Arc<ComicClient>,
        mailer: Arc<dyn ComicMailer>,
        settings: DeliverySettings,
    ) -> DeliveryRunner {
        DeliveryRunner {
            store,
            comic_client,
            mailer,
            settings,
        }
    }

    /// Runs the delivery for subscribers who accept comics on today's local weekday.
    pub async fn run_for_time(&self, time_key: &TimeKey) -> Result<DeliveryReport, DeliveryError> {
        self.run(time_key, Local::now().weekday()).await
    }

    /// Walks the eligible subscribers batch by batch. Every batch shares one comic, gets fresh
    /// unsubscribe tokens persisted before anything is sent, and is sent concurrently. A failed
    /// send only counts as failed; a storage error ends the run.
    #[tracing::instrument(name = "Deliver comics for a time slot", skip(self))]
    pub async fn run(
        &self,
        time_key: &TimeKey,
        weekday: Weekday,
    ) -> Result<DeliveryReport, DeliveryError> {
        let batch_size = self.settings.batch_size.max(1);
        let mut report = DeliveryReport::default();
        let mut last_id: Option<Uuid> = None;

        loop {
            let batch = self
                .store
                .eligible_batch(time_key, weekday, last_id, batch_size)
                .await
                .map_err(DeliveryError::LoadSubscribers)?;

            if batch.is_empty() {
                break;
            }

            let comic = self
                .comic_client
                .fetch_random_comic(self.settings.max_comic_attempts)
                .await;

            let issued_at = Utc::now();
            let tokens: Vec<(Uuid, UnsubscribeToken)> = batch
                .iter()
                .map(|target| (target.id, UnsubscribeToken::generate(issued_at)))
                .collect();

            self.store
                .assign_unsubscribe_tokens(&tokens)
                .await
                .map_err(DeliveryError::StoreTokens)?;

            let results = join_all(batch.iter().zip(tokens.iter()).map(
                |(target, (_, token))| self.mailer.send_comic_email(&target.email, &comic, token),
            ))
            .await;

            let delivered = results.iter().filter(|sent| **sent).count();
            let failed = results.len() - delivered;

            tracing::info!(
                batch = report.batches + 1,
                comic_num = comic.num,
                "Processed batch of {}: {} successful, {} failed",
                batch.len(),
                delivered,
                failed
            );

            report.batches += 1;
            report.processed += batch.len();
            report.delivered += delivered;
            report.failed += failed;
            last_id = batch.last().map(|target| target.id);

            tokio::time::sleep(self.settings.batch_pause).await;
        }

        tracing::info!(
            "Total subscribers processed for time {}: {}",
            time_key,
            report.processed
        );

        Ok(report)
    }
}
