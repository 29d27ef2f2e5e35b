use actix_web::{http::StatusCode, web, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::{
    domain::{
        delivery_days::DeliveryDays, subscriber_email::SubscriberEmail, time_key::TimeKey,
    },
    error_chain_fmt,
    routes::Message,
    scheduler::Scheduler,
    store::{fetch_subscriber_by_email, StoreError},
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePreferencesBody {
    pub email: String,
    pub preferred_time: Option<String>,
    pub preferred_days: Option<Vec<String>>,
}

#[derive(Deserialize)]
pub struct PreferencesQuery {
    pub email: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesResponse {
    pub email: String,
    pub preferred_time: String,
    pub preferred_days: Vec<String>,
}

#[derive(thiserror::Error)]
pub enum PreferencesError {
    #[error("{0}")]
    Validation(String),
    #[error("User not found")]
    UnknownUser,
    #[error("Failed to load the subscriber.")]
    Store(#[from] StoreError),
    #[error("Failed to update the preferences.")]
    Database(#[from] sqlx::Error),
}

impl std::fmt::Debug for PreferencesError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for PreferencesError {
    fn status_code(&self) -> StatusCode {
        match self {
            PreferencesError::Validation(_) => StatusCode::BAD_REQUEST,
            PreferencesError::UnknownUser => StatusCode::NOT_FOUND,
            PreferencesError::Store(_) | PreferencesError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let msg = match self {
            PreferencesError::Store(_) | PreferencesError::Database(_) => {
                String::from("Server error")
            }
            _ => self.to_string(),
        };

        HttpResponse::build(self.status_code()).json(Message::new(msg))
    }
}

#[tracing::instrument(
    name = "Update subscriber preferences handler",
    skip(body, db_pool, scheduler),
    fields(subscriber_email = %body.email)
)]
pub async fn handle_update_preferences(
    body: web::Json<UpdatePreferencesBody>,
    db_pool: web::Data<PgPool>,
    scheduler: web::Data<Scheduler>,
) -> Result<HttpResponse, PreferencesError> {
    let body = body.into_inner();
    let email = SubscriberEmail::parse(body.email).map_err(PreferencesError::Validation)?;
    // Unknown users are reported before any preference value is looked at.
    let subscriber = fetch_subscriber_by_email(&db_pool, &email)
        .await?
        .ok_or(PreferencesError::UnknownUser)?;
    let preferred_time = body
        .preferred_time
        .map(TimeKey::parse)
        .transpose()
        .map_err(PreferencesError::Validation)?;
    let preferred_days = body
        .preferred_days
        .map(DeliveryDays::parse)
        .transpose()
        .map_err(PreferencesError::Validation)?;

    sqlx::query(
        r#"
        UPDATE subscribers
        SET preferred_time = COALESCE($2, preferred_time),
            preferred_days = COALESCE($3, preferred_days),
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(subscriber.id)
    .bind(preferred_time.as_ref().map(|time| time.as_ref().to_string()))
    .bind(preferred_days.map(DeliveryDays::into_inner))
    .execute(db_pool.get_ref())
    .await?;

    // Days are checked at fire time, only a new time of day can change the set of timers.
    let time_changed = preferred_time.map_or(false, |time| time != subscriber.preferred_time);
    if time_changed {
        scheduler.notify_preferences_may_have_changed().await;
    }

    Ok(HttpResponse::Ok().json(Message::new("Preferences updated successfully")))
}

#[tracing::instrument(
    name = "Get subscriber preferences handler",
    skip(query, db_pool),
    fields(subscriber_email = %query.email)
)]
pub async fn handle_get_preferences(
    query: web::Query<PreferencesQuery>,
    db_pool: web::Data<PgPool>,
) -> Result<HttpResponse, PreferencesError> {
    let email =
        SubscriberEmail::parse(query.email.clone()).map_err(PreferencesError::Validation)?;
    let subscriber = fetch_subscriber_by_email(&db_pool, &email)
        .await?
        .ok_or(PreferencesError::UnknownUser)?;

    Ok(HttpResponse::Ok().json(PreferencesResponse {
        email: subscriber.email.to_string(),
        preferred_time: subscriber.preferred_time.to_string(),
        preferred_days: subscriber.preferred_days.into_inner(),
    }))
}
