use chrono::{Duration, Utc};
use comic_newsletter::domain::unsubscribe_token::UnsubscribeToken;
use comic_newsletter::routes::Message;
use comic_newsletter::store::{PgSubscriberStore, SubscriberStore};
use uuid::Uuid;

use crate::helpers::TestApp;

async fn subscriber_id(test_app: &TestApp, email: &str) -> Uuid {
    sqlx::query_scalar("SELECT id FROM subscribers WHERE email = $1")
        .bind(email)
        .fetch_one(&test_app.db_pool)
        .await
        .expect("Failed to fetch the subscriber id.")
}

async fn is_unsubscribed(test_app: &TestApp, email: &str) -> bool {
    sqlx::query_scalar("SELECT unsubscribed FROM subscribers WHERE email = $1")
        .bind(email)
        .fetch_one(&test_app.db_pool)
        .await
        .expect("Failed to fetch the subscriber status.")
}

async fn issue_token(test_app: &TestApp, email: &str, issued_at: chrono::DateTime<Utc>) -> String {
    let id = subscriber_id(test_app, email).await;
    let token = UnsubscribeToken::generate(issued_at);
    let store = PgSubscriberStore::new(test_app.db_pool.clone());

    store
        .assign_unsubscribe_tokens(&[(id, token.clone())])
        .await
        .expect("Failed to store the unsubscribe token.");

    token.as_ref().to_string()
}

#[tokio::test]
async fn unsubscribe_request_for_unknown_email_returns_400() {
    let test_app = TestApp::spawn_app().await;

    let response = test_app.post_unsubscribe_request("nobody@test.com").await;

    assert_eq!(400, response.status().as_u16());
    let message: Message = response.json().await.unwrap();
    assert_eq!(message.msg, "Email not found in subscription list");
}

#[tokio::test]
async fn unsubscribe_with_the_emailed_code_removes_the_timer() {
    let test_app = TestApp::spawn_app().await;
    test_app.mock_email_api().await;
    test_app.create_verified_subscriber("frank@test.com").await;
    assert_eq!(test_app.scheduler.active_time_keys().await.len(), 1);

    let response = test_app.post_unsubscribe_request("frank@test.com").await;
    assert_eq!(200, response.status().as_u16());

    let code = test_app
        .stored_verification_code("frank@test.com")
        .await
        .unwrap();
    let received_requests = test_app.email_server.received_requests().await.unwrap();
    let body: serde_json::Value =
        serde_json::from_slice(&received_requests.last().unwrap().body).unwrap();
    assert_eq!(body["subject"], "Confirm Un-subscription");
    assert!(body["htmlContent"].as_str().unwrap().contains(&code));

    let response = test_app.post_unsubscribe("frank@test.com", &code).await;

    assert_eq!(200, response.status().as_u16());
    assert!(is_unsubscribed(&test_app, "frank@test.com").await);
    assert!(test_app.scheduler.active_time_keys().await.is_empty());
}

#[tokio::test]
async fn unsubscribe_with_a_wrong_code_returns_400() {
    let test_app = TestApp::spawn_app().await;
    test_app.mock_email_api().await;
    test_app.create_verified_subscriber("frank@test.com").await;
    test_app.post_unsubscribe_request("frank@test.com").await;
    let code = test_app
        .stored_verification_code("frank@test.com")
        .await
        .unwrap();
    let wrong_code = if code == "111111" { "222222" } else { "111111" };

    let response = test_app.post_unsubscribe("frank@test.com", wrong_code).await;

    assert_eq!(400, response.status().as_u16());
    assert!(!is_unsubscribed(&test_app, "frank@test.com").await);
    assert_eq!(test_app.scheduler.active_time_keys().await.len(), 1);
}

#[tokio::test]
async fn unsubscribe_token_works_once() {
    let test_app = TestApp::spawn_app().await;
    test_app.mock_email_api().await;
    test_app.create_verified_subscriber("frank@test.com").await;
    let token = issue_token(&test_app, "frank@test.com", Utc::now()).await;

    let response = test_app.get_unsubscribe_token(&token).await;

    assert_eq!(200, response.status().as_u16());
    assert!(response
        .text()
        .await
        .unwrap()
        .contains("successfully unsubscribed"));
    assert!(is_unsubscribed(&test_app, "frank@test.com").await);
    assert!(test_app.scheduler.active_time_keys().await.is_empty());

    let reused = test_app.get_unsubscribe_token(&token).await;

    assert_eq!(400, reused.status().as_u16());
    assert!(reused
        .text()
        .await
        .unwrap()
        .contains("Invalid or expired unsubscribe link"));
}

#[tokio::test]
async fn expired_unsubscribe_token_is_rejected() {
    let test_app = TestApp::spawn_app().await;
    test_app.mock_email_api().await;
    test_app.create_verified_subscriber("frank@test.com").await;
    let token = issue_token(&test_app, "frank@test.com", Utc::now() - Duration::days(8)).await;

    let response = test_app.get_unsubscribe_token(&token).await;

    assert_eq!(400, response.status().as_u16());
    assert!(!is_unsubscribed(&test_app, "frank@test.com").await);
}

#[tokio::test]
async fn unknown_unsubscribe_token_is_rejected() {
    let test_app = TestApp::spawn_app().await;

    let response = test_app.get_unsubscribe_token("not-a-real-token").await;

    assert_eq!(400, response.status().as_u16());
}

#[tokio::test]
async fn links_from_a_previous_subscription_stop_working_after_registering_again() {
    let test_app = TestApp::spawn_app().await;
    test_app.mock_email_api().await;
    test_app.create_verified_subscriber("frank@test.com").await;
    let old_token = issue_token(&test_app, "frank@test.com", Utc::now()).await;

    test_app.post_unsubscribe_request("frank@test.com").await;
    let code = test_app
        .stored_verification_code("frank@test.com")
        .await
        .unwrap();
    test_app.post_unsubscribe("frank@test.com", &code).await;
    test_app.create_verified_subscriber("frank@test.com").await;

    let response = test_app.get_unsubscribe_token(&old_token).await;

    assert_eq!(400, response.status().as_u16());
    assert!(!is_unsubscribed(&test_app, "frank@test.com").await);
    assert_eq!(test_app.scheduler.active_time_keys().await.len(), 1);
}

#[tokio::test]
async fn unsubscribing_with_a_code_clears_the_unsubscribe_token() {
    let test_app = TestApp::spawn_app().await;
    test_app.mock_email_api().await;
    test_app.create_verified_subscriber("frank@test.com").await;
    issue_token(&test_app, "frank@test.com", Utc::now()).await;

    test_app.post_unsubscribe_request("frank@test.com").await;
    let code = test_app
        .stored_verification_code("frank@test.com")
        .await
        .unwrap();
    test_app.post_unsubscribe("frank@test.com", &code).await;

    let token: Option<String> =
        sqlx::query_scalar("SELECT unsubscribe_token FROM subscribers WHERE email = $1")
            .bind("frank@test.com")
            .fetch_one(&test_app.db_pool)
            .await
            .unwrap();
    assert_eq!(token, None);
}
