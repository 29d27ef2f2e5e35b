use actix_web::{http::StatusCode, web, HttpResponse, ResponseError};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    domain::{subscriber_email::SubscriberEmail, verification_code::VerificationCode},
    email_client::{EmailClient, SendEmailError},
    error_chain_fmt,
    routes::Message,
    scheduler::Scheduler,
    store::{fetch_subscriber_by_email, StoreError},
};

#[derive(Deserialize)]
pub struct UnsubscribeRequestBody {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ConfirmUnsubscribeBody {
    pub email: String,
    pub code: String,
}

#[derive(thiserror::Error)]
pub enum UnsubscribeError {
    #[error("{0}")]
    Validation(String),
    #[error("Email not found in subscription list")]
    UnknownEmail,
    #[error("Invalid verification code")]
    InvalidCode,
    #[error("Error sending unsubscribe verification email")]
    SendEmail(#[source] SendEmailError),
    #[error("Failed to load the subscriber.")]
    Store(#[from] StoreError),
    #[error("Failed to update the subscriber.")]
    Database(#[from] sqlx::Error),
}

impl std::fmt::Debug for UnsubscribeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for UnsubscribeError {
    fn status_code(&self) -> StatusCode {
        match self {
            UnsubscribeError::Validation(_)
            | UnsubscribeError::UnknownEmail
            | UnsubscribeError::InvalidCode => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let msg = match self {
            UnsubscribeError::Store(_) | UnsubscribeError::Database(_) => {
                String::from("Server error")
            }
            _ => self.to_string(),
        };

        HttpResponse::build(self.status_code()).json(Message::new(msg))
    }
}

/// Errors of the one-click link. Answered with an HTML page since it is opened from an email.
#[derive(thiserror::Error)]
pub enum TokenUnsubscribeError {
    #[error("Invalid or expired unsubscribe link.")]
    InvalidToken,
    #[error("Failed to consume the unsubscribe token.")]
    Database(#[from] sqlx::Error),
}

impl std::fmt::Debug for TokenUnsubscribeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for TokenUnsubscribeError {
    fn status_code(&self) -> StatusCode {
        match self {
            TokenUnsubscribeError::InvalidToken => StatusCode::BAD_REQUEST,
            TokenUnsubscribeError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let page = match self {
            TokenUnsubscribeError::InvalidToken => html_page(
                "Unsubscribe Request",
                "Invalid or expired unsubscribe link. Please try again.",
            ),
            TokenUnsubscribeError::Database(_) => html_page(
                "Server Error",
                "Something went wrong. Please try again later.",
            ),
        };

        HttpResponse::build(self.status_code())
            .content_type("text/html; charset=utf-8")
            .body(page)
    }
}

#[tracing::instrument(
    name = "Request an unsubscribe code handler",
    skip(body, db_pool, email_client),
    fields(subscriber_email = %body.email)
)]
pub async fn handle_unsubscribe_request(
    body: web::Json<UnsubscribeRequestBody>,
    db_pool: web::Data<PgPool>,
    email_client: web::Data<EmailClient>,
) -> Result<HttpResponse, UnsubscribeError> {
    let email = SubscriberEmail::parse(body.email.clone()).map_err(UnsubscribeError::Validation)?;
    let subscriber = fetch_subscriber_by_email(&db_pool, &email)
        .await?
        .ok_or(UnsubscribeError::UnknownEmail)?;
    let verification_code = VerificationCode::generate();

    sqlx::query(
        r#"
        UPDATE subscribers
        SET verification_code = $2, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(subscriber.id)
    .bind(verification_code.as_ref())
    .execute(db_pool.get_ref())
    .await?;

    let html_body = format!(
        "<p>To confirm un-subscription, use this code: <strong>{}</strong></p>",
        verification_code.as_ref()
    );
    email_client
        .send_email(&email, "Confirm Un-subscription", &html_body)
        .await
        .map_err(UnsubscribeError::SendEmail)?;

    Ok(HttpResponse::Ok().json(Message::new(
        "Unsubscribe verification code sent to your email",
    )))
}

#[tracing::instrument(
    name = "Confirm an unsubscription with a code handler",
    skip(body, db_pool, scheduler),
    fields(subscriber_email = %body.email)
)]
pub async fn handle_confirm_unsubscribe(
    body: web::Json<ConfirmUnsubscribeBody>,
    db_pool: web::Data<PgPool>,
    scheduler: web::Data<Scheduler>,
) -> Result<HttpResponse, UnsubscribeError> {
    let email = SubscriberEmail::parse(body.email.clone()).map_err(UnsubscribeError::Validation)?;
    let code = VerificationCode::parse(body.code.clone()).map_err(UnsubscribeError::Validation)?;

    let unsubscribed: Option<Uuid> = sqlx::query_scalar(
        r#"
        UPDATE subscribers
        SET unsubscribed = TRUE,
            unsubscribed_at = now(),
            verification_code = NULL,
            unsubscribe_token = NULL,
            unsubscribe_token_expires_at = NULL,
            updated_at = now()
        WHERE email = $1 AND verification_code = $2
        RETURNING id
        "#,
    )
    .bind(email.as_ref())
    .bind(code.as_ref())
    .fetch_optional(db_pool.get_ref())
    .await?;

    if unsubscribed.is_none() {
        return Err(UnsubscribeError::InvalidCode);
    }

    scheduler.notify_preferences_may_have_changed().await;

    Ok(HttpResponse::Ok().json(Message::new("Successfully unsubscribed")))
}

/// One-click unsubscribe from the link in a comic email. The token is cleared in the same
/// statement that checks it, so a link works exactly once.
#[tracing::instrument(name = "Unsubscribe with a token handler", skip(token, db_pool, scheduler))]
pub async fn handle_token_unsubscribe(
    token: web::Path<String>,
    db_pool: web::Data<PgPool>,
    scheduler: web::Data<Scheduler>,
) -> Result<HttpResponse, TokenUnsubscribeError> {
    let unsubscribed: Option<Uuid> = sqlx::query_scalar(
        r#"
        UPDATE subscribers
        SET unsubscribed = TRUE,
            unsubscribed_at = now(),
            unsubscribe_token = NULL,
            unsubscribe_token_expires_at = NULL,
            updated_at = now()
        WHERE unsubscribe_token = $1 AND unsubscribe_token_expires_at > now()
        RETURNING id
        "#,
    )
    .bind(token.as_str())
    .fetch_optional(db_pool.get_ref())
    .await?;

    if unsubscribed.is_none() {
        return Err(TokenUnsubscribeError::InvalidToken);
    }

    scheduler.notify_preferences_may_have_changed().await;

    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(html_page(
            "Unsubscribed Successfully",
            "You have been successfully unsubscribed from XKCD comic emails.",
        )))
}

fn html_page(heading: &str, message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{heading} - XKCD Subscription</title>
</head>
<body>
    <div class="container">
        <h1>{heading}</h1>
        <p>{message}</p>
        <a href="/" class="back-link">Back to Home</a>
    </div>
</body>
</html>"#
    )
}
