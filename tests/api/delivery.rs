use chrono::Weekday;
use comic_newsletter::comic_client::ComicClient;
use comic_newsletter::domain::comic::Comic;
use comic_newsletter::domain::time_key::TimeKey;
use comic_newsletter::email_client::{ComicEmailSender, EmailClient};
use comic_newsletter::scheduler::delivery::DeliveryRunner;
use comic_newsletter::store::PgSubscriberStore;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, ResponseTemplate};

use crate::helpers::TestApp;

fn comic_body() -> serde_json::Value {
    json!({
        "num": 353,
        "title": "Python",
        "img": "https://imgs.xkcd.com/comics/python.png",
        "alt": "I wrote 20 short programs in Python yesterday.",
        "year": "2007",
        "month": "12",
        "day": "5"
    })
}

async fn mock_comic_catalog(test_app: &TestApp) {
    Mock::given(path_regex(r"^/\d+/info\.0\.json$"))
        .and(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(comic_body()))
        .mount(&test_app.comic_server)
        .await;
}

/// A runner wired to the test database and mock servers, with links pointing at the test app.
fn delivery_runner(test_app: &TestApp) -> DeliveryRunner {
    let config = &test_app.config;
    let email_client = EmailClient::new(
        test_app.email_server.uri(),
        config.get_email_client_sender().unwrap(),
        config.email_client.sender_name.clone(),
        config.email_client.api_key.clone(),
        None,
    )
    .unwrap();
    let comic_client = ComicClient::new(
        test_app.comic_server.uri(),
        config.comic_source.max_comic_id,
        None,
    )
    .unwrap();

    DeliveryRunner::new(
        Arc::new(PgSubscriberStore::new(test_app.db_pool.clone())),
        Arc::new(comic_client),
        Arc::new(ComicEmailSender::new(
            Arc::new(email_client),
            test_app.address.clone(),
        )),
        config.get_delivery_settings(),
    )
}

fn comic_emails(requests: &[wiremock::Request]) -> Vec<serde_json::Value> {
    requests
        .iter()
        .map(|request| serde_json::from_slice::<serde_json::Value>(&request.body).unwrap())
        .filter(|body| body["subject"] == "Your XKCD Comic")
        .collect()
}

#[tokio::test]
async fn delivery_run_sends_the_comic_only_to_eligible_subscribers() {
    let test_app = TestApp::spawn_app().await;
    test_app.mock_email_api().await;
    mock_comic_catalog(&test_app).await;

    test_app.create_verified_subscriber("a@test.com").await;
    test_app.create_verified_subscriber("b@test.com").await;
    test_app.create_verified_subscriber("weekend@test.com").await;
    test_app.post_register("pending@test.com").await;
    test_app
        .put_preferences(json!({ "email": "b@test.com", "preferredTime": "14:30" }))
        .await;
    test_app
        .put_preferences(json!({ "email": "weekend@test.com", "preferredDays": ["sat", "sun"] }))
        .await;

    let report = delivery_runner(&test_app)
        .run(&TimeKey::from_stored("09:00".to_string()), Weekday::Mon)
        .await
        .unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.delivered, 1);

    let requests = test_app.email_server.received_requests().await.unwrap();
    let emails = comic_emails(&requests);
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0]["to"][0]["email"], "a@test.com");
    assert!(emails[0]["htmlContent"].as_str().unwrap().contains("Python"));
}

#[tokio::test]
async fn unsubscribe_link_from_a_comic_email_works_once() {
    let test_app = TestApp::spawn_app().await;
    test_app.mock_email_api().await;
    mock_comic_catalog(&test_app).await;
    test_app.create_verified_subscriber("frank@test.com").await;

    delivery_runner(&test_app)
        .run(&TimeKey::from_stored("09:00".to_string()), Weekday::Wed)
        .await
        .unwrap();

    let requests = test_app.email_server.received_requests().await.unwrap();
    let comic_request = requests.last().unwrap();
    let unsubscribe_link = test_app
        .links_in_email(comic_request)
        .into_iter()
        .find(|link| link.contains("/api/users/unsubscribe-token/"))
        .expect("The comic email has no unsubscribe link.");

    assert!(unsubscribe_link.starts_with(&test_app.address));

    let response = test_app.get_url(&unsubscribe_link).await;
    assert_eq!(200, response.status().as_u16());
    assert!(test_app.scheduler.active_time_keys().await.is_empty());

    let reused = test_app.get_url(&unsubscribe_link).await;
    assert_eq!(400, reused.status().as_u16());
}

#[tokio::test]
async fn every_delivery_rotates_the_unsubscribe_token() {
    let test_app = TestApp::spawn_app().await;
    test_app.mock_email_api().await;
    mock_comic_catalog(&test_app).await;
    test_app.create_verified_subscriber("frank@test.com").await;
    let runner = delivery_runner(&test_app);
    let time_key = TimeKey::from_stored("09:00".to_string());

    runner.run(&time_key, Weekday::Mon).await.unwrap();
    let first_link = test_app
        .links_in_email(test_app.email_server.received_requests().await.unwrap().last().unwrap())
        .into_iter()
        .find(|link| link.contains("unsubscribe-token"))
        .unwrap();

    runner.run(&time_key, Weekday::Tue).await.unwrap();

    let response = test_app.get_url(&first_link).await;
    assert_eq!(400, response.status().as_u16());
}

#[tokio::test]
async fn random_comic_endpoint_returns_a_comic() {
    let test_app = TestApp::spawn_app().await;
    mock_comic_catalog(&test_app).await;

    let response = test_app
        .get_url(&format!("{}/api/xkcd/random", test_app.address))
        .await;

    assert_eq!(200, response.status().as_u16());
    let comic: Comic = response.json().await.unwrap();
    assert_eq!(comic.num, 353);
    assert_eq!(comic.title, "Python");
}

#[tokio::test]
async fn random_comic_endpoint_falls_back_to_the_placeholder() {
    let test_app = TestApp::spawn_app().await;

    Mock::given(path_regex(r"^/\d+/info\.0\.json$"))
        .respond_with(ResponseTemplate::new(404))
        .expect(10)
        .mount(&test_app.comic_server)
        .await;

    let response = test_app
        .get_url(&format!("{}/api/xkcd/random", test_app.address))
        .await;

    assert_eq!(200, response.status().as_u16());
    let comic: Comic = response.json().await.unwrap();
    assert!(comic.is_placeholder());
}
