use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use std::sync::Arc;
use std::time;

use crate::domain::comic::Comic;
use crate::domain::subscriber_email::SubscriberEmail;
use crate::domain::unsubscribe_token::UnsubscribeToken;
use crate::error_chain_fmt;
use crate::smtp_client::SmtpError;

const REQUEST_TIMEOUT: time::Duration = time::Duration::from_secs(10);

/// Second way out for an email once the API request failed.
#[async_trait]
pub trait FallbackTransport: Send + Sync {
    async fn send(
        &self,
        recipient: &SubscriberEmail,
        subject: &str,
        html_content: &str,
    ) -> Result<(), SmtpError>;
}

#[derive(thiserror::Error)]
pub enum SendEmailError {
    #[error("Email API request failed.")]
    Api(#[source] reqwest::Error),
    #[error("Email API request failed and the SMTP fallback failed too.")]
    Fallback(#[source] SmtpError),
}

impl std::fmt::Debug for SendEmailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Client for a Brevo-style transactional email API, with an optional fallback transport
/// tried when the API request fails.
pub struct EmailClient {
    http_client: Client,
    base_url: String,
    sender: SubscriberEmail,
    sender_name: String,
    api_key: Secret<String>,
    fallback: Option<Arc<dyn FallbackTransport>>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailBody {
    sender: BrevoContact,
    to: Vec<BrevoContact>,
    subject: String,
    html_content: String,
}

#[derive(serde::Serialize)]
struct BrevoContact {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl EmailClient {
    pub fn new(
        base_url: String,
        sender: SubscriberEmail,
        sender_name: String,
        api_key: Secret<String>,
        timeout: Option<time::Duration>,
    ) -> Result<EmailClient, reqwest::Error> {
        let http_client = Client::builder()
            .timeout(timeout.unwrap_or(REQUEST_TIMEOUT))
            .build()?;

        Ok(EmailClient {
            http_client,
            base_url,
            sender,
            sender_name,
            api_key,
            fallback: None,
        })
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackTransport>) -> EmailClient {
        self.fallback = Some(fallback);
        self
    }

    pub async fn send_email(
        &self,
        recipient: &SubscriberEmail,
        subject: &str,
        html_content: &str,
    ) -> Result<(), SendEmailError> {
        let api_error = match self.send_with_api(recipient, subject, html_content).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        let Some(fallback) = &self.fallback else {
            return Err(SendEmailError::Api(api_error));
        };

        tracing::warn!("Email API failed, falling back to SMTP: {:?}", api_error);

        fallback
            .send(recipient, subject, html_content)
            .await
            .map_err(SendEmailError::Fallback)
    }

    async fn send_with_api(
        &self,
        recipient: &SubscriberEmail,
        subject: &str,
        html_content: &str,
    ) -> Result<(), reqwest::Error> {
        let url = format!("{}/smtp/email", self.base_url);
        let body = SendEmailBody {
            sender: BrevoContact {
                email: String::from(self.sender.as_ref()),
                name: Some(self.sender_name.clone()),
            },
            to: vec![BrevoContact {
                email: String::from(recipient.as_ref()),
                name: None,
            }],
            subject: String::from(subject),
            html_content: String::from(html_content),
        };

        self.http_client
            .post(&url)
            .header("api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?
            .error_for_status()?; // return an error when server response status code is 4xx or 5xx

        Ok(())
    }
}

/// Outbound side of a delivery run. Implementations report failure as `false` and keep their
/// own errors to themselves.
#[async_trait]
pub trait ComicMailer: Send + Sync {
    async fn send_comic_email(
        &self,
        recipient: &SubscriberEmail,
        comic: &Comic,
        unsubscribe_token: &UnsubscribeToken,
    ) -> bool;
}

/// Sends comic emails through the [`EmailClient`], with an unsubscribe link pointing back to
/// this application.
pub struct ComicEmailSender {
    email_client: Arc<EmailClient>,
    app_base_url: String,
}

impl ComicEmailSender {
    pub fn new(email_client: Arc<EmailClient>, app_base_url: String) -> ComicEmailSender {
        ComicEmailSender {
            email_client,
            app_base_url,
        }
    }
}

#[async_trait]
impl ComicMailer for ComicEmailSender {
    #[tracing::instrument(
        name = "Send a comic email",
        skip(self, comic, unsubscribe_token),
        fields(comic_num = comic.num)
    )]
    async fn send_comic_email(
        &self,
        recipient: &SubscriberEmail,
        comic: &Comic,
        unsubscribe_token: &UnsubscribeToken,
    ) -> bool {
        let unsubscribe_link = format!(
            "{}/api/users/unsubscribe-token/{}",
            self.app_base_url,
            unsubscribe_token.as_ref()
        );
        let html_body = comic_email_html(comic, &unsubscribe_link);

        match self
            .email_client
            .send_email(recipient, "Your XKCD Comic", &html_body)
            .await
        {
            Ok(()) => true,
            Err(err) => {
                tracing::error!("Failed to send comic email to {}: {:?}", recipient, err);
                false
            }
        }
    }
}

fn comic_email_html(comic: &Comic, unsubscribe_link: &str) -> String {
    format!(
        r#"
            <div>
                <h2>XKCD Comic</h2>
                <h3>{}</h3>
                <img src="{}" alt="XKCD Comic" style="max-width: 100%; height: auto;">
                <p>{}</p>
                <p><a href="{}" id="unsubscribe-button">Unsubscribe</a></p>
            </div>
        "#,
        escape_html(&comic.title),
        escape_html(&comic.img),
        escape_html(&comic.alt),
        unsubscribe_link
    )
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());

    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }

    escaped
}
