use actix_web::{http::StatusCode, web, HttpResponse, ResponseError};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    domain::{
        new_subscriber::{NewSubscriber, NewSubscriberBody},
        subscriber_email::SubscriberEmail,
        verification_code::VerificationCode,
    },
    email_client::{EmailClient, SendEmailError},
    error_chain_fmt,
    routes::Message,
    scheduler::Scheduler,
    store::{fetch_subscriber_by_email, StoreError},
};

#[derive(Deserialize)]
pub struct VerifyBody {
    pub email: String,
    pub code: String,
}

#[derive(thiserror::Error)]
pub enum RegisterError {
    #[error("{0}")]
    Validation(String),
    #[error("User already registered")]
    AlreadyRegistered,
    #[error("Invalid verification code")]
    InvalidCode,
    #[error("Error sending verification email")]
    SendEmail(#[source] SendEmailError),
    #[error("Failed to load the subscriber.")]
    Store(#[from] StoreError),
    #[error("Failed to save the subscriber.")]
    Database(#[from] sqlx::Error),
}

impl std::fmt::Debug for RegisterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for RegisterError {
    fn status_code(&self) -> StatusCode {
        match self {
            RegisterError::Validation(_)
            | RegisterError::AlreadyRegistered
            | RegisterError::InvalidCode => StatusCode::BAD_REQUEST,
            RegisterError::SendEmail(_) | RegisterError::Store(_) | RegisterError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let msg = match self {
            RegisterError::Store(_) | RegisterError::Database(_) => String::from("Server error"),
            _ => self.to_string(),
        };

        HttpResponse::build(self.status_code()).json(Message::new(msg))
    }
}

#[tracing::instrument(
    name = "Register a new subscriber handler",
    skip(body, db_pool, email_client, scheduler),
    fields(subscriber_email = %body.email)
)]
pub async fn handle_register(
    body: web::Json<NewSubscriberBody>,
    db_pool: web::Data<PgPool>,
    email_client: web::Data<EmailClient>,
    scheduler: web::Data<Scheduler>,
) -> Result<HttpResponse, RegisterError> {
    let new_subscriber: NewSubscriber = body.try_into().map_err(RegisterError::Validation)?;
    let verification_code = VerificationCode::generate();

    match fetch_subscriber_by_email(&db_pool, &new_subscriber.email).await? {
        // Unsubscribed users can come back, but they have to verify their address again.
        Some(subscriber) if subscriber.status.is_unsubscribed() => {
            reset_registration(&db_pool, &subscriber.id, &verification_code).await?
        }
        Some(_) => return Err(RegisterError::AlreadyRegistered),
        None => insert_subscriber(&db_pool, &new_subscriber, &verification_code).await?,
    }

    send_verification_email(&email_client, &new_subscriber.email, &verification_code)
        .await
        .map_err(RegisterError::SendEmail)?;

    scheduler.notify_preferences_may_have_changed().await;

    Ok(HttpResponse::Ok().json(Message::new("Verification code sent to your email")))
}

#[tracing::instrument(
    name = "Verify a subscriber email handler",
    skip(body, db_pool, scheduler),
    fields(subscriber_email = %body.email)
)]
pub async fn handle_verify(
    body: web::Json<VerifyBody>,
    db_pool: web::Data<PgPool>,
    scheduler: web::Data<Scheduler>,
) -> Result<HttpResponse, RegisterError> {
    let email = SubscriberEmail::parse(body.email.clone()).map_err(RegisterError::Validation)?;
    let code = VerificationCode::parse(body.code.clone()).map_err(RegisterError::Validation)?;

    let verified: Option<Uuid> = sqlx::query_scalar(
        r#"
        UPDATE subscribers
        SET is_verified = TRUE,
            verified_at = now(),
            verification_code = NULL,
            updated_at = now()
        WHERE email = $1 AND verification_code = $2
        RETURNING id
        "#,
    )
    .bind(email.as_ref())
    .bind(code.as_ref())
    .fetch_optional(db_pool.get_ref())
    .await?;

    if verified.is_none() {
        return Err(RegisterError::InvalidCode);
    }

    // A newly verified subscriber may bring a delivery time nobody else uses yet.
    scheduler.notify_preferences_may_have_changed().await;

    Ok(HttpResponse::Ok().json(Message::new("Email verified successfully")))
}

#[tracing::instrument(
    name = "Insert a new subscriber into the database",
    skip(new_subscriber, db_pool, verification_code)
)]
async fn insert_subscriber(
    db_pool: &PgPool,
    new_subscriber: &NewSubscriber,
    verification_code: &VerificationCode,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO subscribers (id, email, verification_code)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(new_subscriber.email.as_ref())
    .bind(verification_code.as_ref())
    .execute(db_pool)
    .await
    .map_err(|err| {
        tracing::error!("Failed to execute query: {:?}", err);
        err
    })?;

    Ok(())
}

/// Links from emails of the previous subscription stop working.
#[tracing::instrument(
    name = "Reset the registration of an unsubscribed user",
    skip(db_pool, verification_code)
)]
async fn reset_registration(
    db_pool: &PgPool,
    subscriber_id: &Uuid,
    verification_code: &VerificationCode,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE subscribers
        SET verification_code = $2,
            unsubscribed = FALSE,
            unsubscribed_at = NULL,
            is_verified = FALSE,
            unsubscribe_token = NULL,
            unsubscribe_token_expires_at = NULL,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(subscriber_id)
    .bind(verification_code.as_ref())
    .execute(db_pool)
    .await?;

    Ok(())
}

#[tracing::instrument(
    name = "Send a verification code to a new subscriber",
    skip(email_client, verification_code)
)]
async fn send_verification_email(
    email_client: &EmailClient,
    email: &SubscriberEmail,
    verification_code: &VerificationCode,
) -> Result<(), SendEmailError> {
    let html_body = format!(
        "<p>Your verification code is: <strong>{}</strong></p>",
        verification_code.as_ref()
    );

    email_client
        .send_email(email, "Your Verification Code", &html_body)
        .await
}
