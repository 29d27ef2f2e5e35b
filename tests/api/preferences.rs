use comic_newsletter::domain::time_key::TimeKey;
use comic_newsletter::routes::Message;
use serde_json::json;

use crate::helpers::TestApp;

fn key(value: &str) -> TimeKey {
    TimeKey::from_stored(value.to_string())
}

#[tokio::test]
async fn get_preferences_returns_the_defaults_of_a_new_subscriber() {
    let test_app = TestApp::spawn_app().await;
    test_app.mock_email_api().await;
    test_app.post_register("frank@test.com").await;

    let response = test_app.get_preferences("frank@test.com").await;

    assert_eq!(200, response.status().as_u16());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["email"], "frank@test.com");
    assert_eq!(body["preferredTime"], "09:00");
    assert_eq!(
        body["preferredDays"],
        json!(["mon", "tue", "wed", "thu", "fri", "sat", "sun"])
    );
}

#[tokio::test]
async fn preferences_of_an_unknown_user_return_404() {
    let test_app = TestApp::spawn_app().await;

    let get_response = test_app.get_preferences("nobody@test.com").await;
    let put_response = test_app
        .put_preferences(json!({ "email": "nobody@test.com", "preferredTime": "10:00" }))
        .await;

    assert_eq!(404, get_response.status().as_u16());
    assert_eq!(404, put_response.status().as_u16());
    let message: Message = put_response.json().await.unwrap();
    assert_eq!(message.msg, "User not found");
}

#[tokio::test]
async fn unknown_user_is_reported_before_invalid_preferences() {
    let test_app = TestApp::spawn_app().await;

    let response = test_app
        .put_preferences(json!({
            "email": "nobody@test.com",
            "preferredTime": "99:99",
            "preferredDays": ["someday"]
        }))
        .await;

    assert_eq!(404, response.status().as_u16());
}

#[tokio::test]
async fn update_preferences_returns_400_for_invalid_values() {
    let test_app = TestApp::spawn_app().await;
    test_app.mock_email_api().await;
    test_app.create_verified_subscriber("frank@test.com").await;

    let test_cases = vec![
        (
            json!({ "email": "frank@test.com", "preferredTime": "9:00" }),
            "single digit hour",
        ),
        (
            json!({ "email": "frank@test.com", "preferredTime": "12:60" }),
            "minute out of range",
        ),
        (
            json!({ "email": "frank@test.com", "preferredDays": ["mon", "someday"] }),
            "unknown day",
        ),
    ];

    for (invalid_body, error_message) in test_cases {
        let response = test_app.put_preferences(invalid_body).await;

        assert_eq!(
            400,
            response.status().as_u16(),
            "The API did not fail with 400 status when payload was {}",
            error_message
        );
    }

    let body: serde_json::Value = test_app
        .get_preferences("frank@test.com")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["preferredTime"], "09:00");
}

#[tokio::test]
async fn changing_the_preferred_time_moves_the_timer() {
    let test_app = TestApp::spawn_app().await;
    test_app.mock_email_api().await;
    test_app.create_verified_subscriber("frank@test.com").await;
    let generation = test_app.scheduler.generation().await;

    let response = test_app
        .put_preferences(json!({ "email": "frank@test.com", "preferredTime": "14:30" }))
        .await;

    assert_eq!(200, response.status().as_u16());
    let keys = test_app.scheduler.active_time_keys().await;
    assert_eq!(keys.len(), 1);
    assert!(keys.contains(&key("14:30")));
    assert_eq!(test_app.scheduler.generation().await, generation + 1);
}

#[tokio::test]
async fn changing_only_the_days_keeps_the_timers() {
    let test_app = TestApp::spawn_app().await;
    test_app.mock_email_api().await;
    test_app.create_verified_subscriber("frank@test.com").await;
    let generation = test_app.scheduler.generation().await;

    let response = test_app
        .put_preferences(json!({ "email": "frank@test.com", "preferredDays": ["sat", "mon"] }))
        .await;

    assert_eq!(200, response.status().as_u16());
    assert_eq!(test_app.scheduler.generation().await, generation);

    let body: serde_json::Value = test_app
        .get_preferences("frank@test.com")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["preferredTime"], "09:00");
    assert_eq!(body["preferredDays"], json!(["mon", "sat"]));
}

#[tokio::test]
async fn subscribers_sharing_a_time_share_one_timer() {
    let test_app = TestApp::spawn_app().await;
    test_app.mock_email_api().await;
    test_app.create_verified_subscriber("a@test.com").await;
    test_app.create_verified_subscriber("b@test.com").await;
    test_app
        .put_preferences(json!({ "email": "b@test.com", "preferredTime": "14:30" }))
        .await;

    let keys = test_app.scheduler.active_time_keys().await;
    assert_eq!(keys.len(), 2);

    test_app
        .put_preferences(json!({ "email": "b@test.com", "preferredTime": "09:00" }))
        .await;

    let keys = test_app.scheduler.active_time_keys().await;
    assert_eq!(keys.len(), 1);
    assert!(keys.contains(&key("09:00")));
}
