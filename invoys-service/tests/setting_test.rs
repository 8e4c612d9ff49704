//! Settings procedures: `setting.get`, `setting.update`.

mod common;

use axum::http::{Method, StatusCode};
use common::{TestApp, OTHER_USER, TEST_USER};
use serde_json::json;

#[tokio::test]
async fn get_before_first_save_is_not_found() {
    let app = TestApp::new();

    let (status, _) = app.get("/api/settings").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_creates_then_replaces() {
    let app = TestApp::new();

    let (status, created) = app
        .call(
            Method::PUT,
            "/api/settings",
            Some(TEST_USER),
            Some(json!({ "businessName": "Invoys Ltd", "email": "owner@invoys.test" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["currency"], "USD");
    assert_eq!(created["sendReminders"], true);

    let (status, updated) = app
        .call(
            Method::PUT,
            "/api/settings",
            Some(TEST_USER),
            Some(json!({
                "businessName": "Invoys GmbH",
                "email": "owner@invoys.test",
                "currency": "eur",
                "sendReminders": false
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["currency"], "EUR");

    let (_, fetched) = app.get("/api/settings").await;
    assert_eq!(fetched["businessName"], "Invoys GmbH");
    assert_eq!(fetched["sendReminders"], false);

    let (status, _) = app
        .call(Method::GET, "/api/settings", Some(OTHER_USER), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_currency_is_rejected() {
    let app = TestApp::new();

    let (status, _) = app
        .call(
            Method::PUT,
            "/api/settings",
            Some(TEST_USER),
            Some(json!({
                "businessName": "Invoys Ltd",
                "email": "owner@invoys.test",
                "currency": "DOLLARS"
            })),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
