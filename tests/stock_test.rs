mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::TestApp;
use sea_orm::EntityTrait;
use serde_json::json;

#[tokio::test]
async fn current_stock_endpoint_auto_initialises_to_zero() {
    let app = TestApp::new().await;

    let response = app.get("/api/store/current-stock/").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = TestApp::body_json(response).await;
    assert_eq!(body["current_stock"], json!(0));
}

#[tokio::test]
async fn due_future_stock_is_promoted_and_subscribers_notified() {
    let app = TestApp::new().await;

    let customer = app.insert_customer("sub@b.c", true).await;
    let batch = app
        .insert_future_stock(5, Utc::now() - Duration::days(1), false)
        .await;
    app.insert_subscription(customer.id, batch.id, true, false)
        .await;

    let emails_before = app.mailer.count();
    let report = app
        .state
        .services
        .stock
        .promote_future_stocks()
        .await
        .unwrap();
    assert_eq!(report.promoted, 1);
    assert_eq!(report.notified, 1);

    assert_eq!(app.current_stock().await, 5);

    let batch = nyx_api::entities::future_stock::Entity::find_by_id(batch.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert!(batch.added);

    let sent = app.mailer.sent();
    let new_emails = &sent[emails_before..];
    assert_eq!(new_emails.len(), 1);
    assert_eq!(new_emails[0].to_email, "sub@b.c");
    assert_eq!(new_emails[0].subject, "New sets available now!");
    assert!(new_emails[0].cta_link.contains("#buy-form"));

    let subscription = nyx_api::entities::stock_subscription::Entity::find()
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert!(subscription.notified);
}

#[tokio::test]
async fn promotion_is_one_shot_per_batch_and_subscriber() {
    let app = TestApp::new().await;

    let customer = app.insert_customer("sub@b.c", true).await;
    let batch = app
        .insert_future_stock(5, Utc::now() - Duration::days(1), false)
        .await;
    app.insert_subscription(customer.id, batch.id, true, false)
        .await;

    app.state
        .services
        .stock
        .promote_future_stocks()
        .await
        .unwrap();
    let emails_after_first = app.mailer.count();

    // Second run: batch already added, nothing moves
    let report = app
        .state
        .services
        .stock
        .promote_future_stocks()
        .await
        .unwrap();
    assert_eq!(report.promoted, 0);
    assert_eq!(app.current_stock().await, 5);
    assert_eq!(app.mailer.count(), emails_after_first);
}

#[tokio::test]
async fn future_batches_are_not_promoted_early() {
    let app = TestApp::new().await;

    app.insert_future_stock(5, Utc::now() + Duration::days(2), false)
        .await;

    let report = app
        .state
        .services
        .stock
        .promote_future_stocks()
        .await
        .unwrap();
    assert_eq!(report.promoted, 0);
    assert_eq!(app.current_stock().await, 0);
}

#[tokio::test]
async fn decrement_clamps_at_zero() {
    let app = TestApp::new().await;
    assert_eq!(app.current_stock().await, 0);

    let remaining = app
        .state
        .services
        .stock
        .decrement_on(&*app.state.db, "a1b2c3d4e5f6")
        .await
        .unwrap();
    assert_eq!(remaining, 0);
    assert_eq!(app.current_stock().await, 0);

    app.set_stock(2).await;
    let remaining = app
        .state
        .services
        .stock
        .decrement_on(&*app.state.db, "a1b2c3d4e5f6")
        .await
        .unwrap();
    assert_eq!(remaining, 1);
}

#[tokio::test]
async fn subscribe_add_creates_customer_and_subscription() {
    let app = TestApp::new().await;
    app.insert_future_stock(5, Utc::now() + Duration::days(2), false)
        .await;

    let response = app
        .post_json(
            "/api/store/future-stock-subscription/",
            json!({"email": "new@b.c", "type": "add"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = TestApp::body_json(response).await;
    assert_eq!(body["status"], "success");

    // The customer was provisioned and subscribed
    let customer = app
        .state
        .services
        .customers
        .find_by_email("new@b.c")
        .await
        .unwrap()
        .expect("customer created by subscribe");
    let view = app
        .state
        .services
        .stock
        .next_future_stock(Some("new@b.c"))
        .await
        .unwrap();
    assert!(view.already_subscribed);

    // Subscribing again converges on the single row
    let response = app
        .post_json(
            "/api/store/future-stock-subscription/",
            json!({"email": "new@b.c", "type": "add"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let subscriptions = nyx_api::entities::stock_subscription::Entity::find()
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(subscriptions.len(), 1);
    assert_eq!(subscriptions[0].customer_id, customer.id);
}

#[tokio::test]
async fn subscribe_remove_deactivates_and_errors_without_subscription() {
    let app = TestApp::new().await;
    app.insert_future_stock(5, Utc::now() + Duration::days(2), false)
        .await;

    // Nothing to remove yet
    let response = app
        .post_json(
            "/api/store/future-stock-subscription/",
            json!({"email": "ghost@b.c", "type": "remove"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Add then remove, and the reactivation path on re-add
    app.post_json(
        "/api/store/future-stock-subscription/",
        json!({"email": "sub@b.c", "type": "add"}),
    )
    .await;
    let response = app
        .post_json(
            "/api/store/future-stock-subscription/",
            json!({"email": "sub@b.c", "type": "remove"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let view = app
        .state
        .services
        .stock
        .next_future_stock(Some("sub@b.c"))
        .await
        .unwrap();
    assert!(!view.already_subscribed);

    app.post_json(
        "/api/store/future-stock-subscription/",
        json!({"email": "sub@b.c", "type": "add"}),
    )
    .await;
    let subscriptions = nyx_api::entities::stock_subscription::Entity::find()
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(subscriptions.len(), 1);
    assert!(subscriptions[0].active);
}

#[tokio::test]
async fn invalid_subscription_type_is_a_validation_error() {
    let app = TestApp::new().await;

    let response = app
        .post_json(
            "/api/store/future-stock-subscription/",
            json!({"email": "a@b.c", "type": "toggle"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn countdown_includes_the_ten_minute_grace() {
    let app = TestApp::new().await;

    // No batches scheduled: zero
    let response = app.get("/api/store/next-future-stock/").await;
    let body = TestApp::body_json(response).await;
    assert_eq!(body["next_future_stock"], json!(0));
    assert_eq!(body["already_subscribed"], json!(false));

    app.insert_future_stock(5, Utc::now() + Duration::hours(1), false)
        .await;

    let response = app.get("/api/store/next-future-stock/").await;
    let body = TestApp::body_json(response).await;
    let seconds = body["next_future_stock"].as_i64().unwrap();
    // ~1 hour plus the 10-minute grace
    assert!((4150..=4210).contains(&seconds), "got {}", seconds);
}

#[tokio::test]
async fn countdown_reports_subscription_state_for_the_email() {
    let app = TestApp::new().await;
    let batch = app
        .insert_future_stock(5, Utc::now() + Duration::hours(1), false)
        .await;
    let customer = app.insert_customer("sub@b.c", true).await;
    app.insert_subscription(customer.id, batch.id, true, false)
        .await;

    let response = app.get("/api/store/next-future-stock/sub@b.c").await;
    let body = TestApp::body_json(response).await;
    assert_eq!(body["already_subscribed"], json!(true));

    let response = app.get("/api/store/next-future-stock/other@b.c").await;
    let body = TestApp::body_json(response).await;
    assert_eq!(body["already_subscribed"], json!(false));
}
