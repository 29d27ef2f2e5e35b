use rand::Rng;
use reqwest::Client;
use std::time;

use crate::domain::comic::Comic;

const REQUEST_TIMEOUT: time::Duration = time::Duration::from_secs(5);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Client for the comic catalog. Every request asks for a random comic number in
/// `1..=max_comic_id`, so an unknown number simply counts as a failed attempt.
pub struct ComicClient {
    http_client: Client,
    base_url: String,
    max_comic_id: u32,
}

impl ComicClient {
    pub fn new(
        base_url: String,
        max_comic_id: u32,
        timeout: Option<time::Duration>,
    ) -> Result<ComicClient, reqwest::Error> {
        let http_client = Client::builder()
            .timeout(timeout.unwrap_or(REQUEST_TIMEOUT))
            .build()?;

        Ok(ComicClient {
            http_client,
            base_url,
            max_comic_id: max_comic_id.max(1),
        })
    }

    /// Never fails: after `max_attempts` failed fetches the placeholder comic is returned so a
    /// delivery run can go on.
    #[tracing::instrument(name = "Fetch a random comic", skip(self))]
    pub async fn fetch_random_comic(&self, max_attempts: u32) -> Comic {
        for attempt in 1..=max_attempts {
            let comic_id = rand::thread_rng().gen_range(1..=self.max_comic_id);

            match self.fetch_comic(comic_id).await {
                Ok(comic) => return comic,
                Err(err) => {
                    tracing::error!(
                        attempt,
                        comic_id,
                        "Failed to fetch comic: {:?}",
                        err
                    );
                }
            }
        }

        tracing::warn!(
            "Failed to fetch a comic after {} attempts, using the placeholder",
            max_attempts
        );

        Comic::placeholder()
    }

    async fn fetch_comic(&self, comic_id: u32) -> Result<Comic, reqwest::Error> {
        let url = format!("{}/{}/info.0.json", self.base_url, comic_id);
        let comic = self
            .http_client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<Comic>()
            .await?;

        Ok(comic)
    }
}
