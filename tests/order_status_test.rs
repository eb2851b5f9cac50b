mod common;

use axum::http::StatusCode;
use common::TestApp;
use nyx_api::services::orders::OrderStatus;

async fn paid_order(app: &TestApp, email: &str) -> String {
    let order_id = app.create_order(email).await;
    let response = app
        .get(&format!("/api/store/sale-done/{}/?use_testing=true", order_id))
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    order_id
}

#[tokio::test]
async fn fulfillment_transitions_notify_the_customer_once_each() {
    let app = TestApp::new().await;
    app.set_stock(100).await;
    let order_id = paid_order(&app, "a@b.c").await;
    let emails_before = app.mailer.count();

    app.state
        .services
        .orders
        .update_status(&order_id, OrderStatus::Manufacturing)
        .await
        .unwrap();
    app.state
        .services
        .orders
        .update_status(&order_id, OrderStatus::Shipped)
        .await
        .unwrap();
    app.state
        .services
        .orders
        .update_status(&order_id, OrderStatus::Delivered)
        .await
        .unwrap();

    let sent = app.mailer.sent();
    let new_emails = &sent[emails_before..];
    assert_eq!(new_emails.len(), 3);
    assert!(new_emails[0].subject.contains("Manufacturing"));
    assert!(new_emails[1].subject.contains("Shipped"));
    assert!(new_emails[2].subject.contains("Delivered"));
    for email in new_emails {
        assert_eq!(email.to_email, "a@b.c");
    }

    let order = app
        .state
        .services
        .orders
        .get_order(&order_id)
        .await
        .unwrap();
    assert_eq!(order.status, "Delivered");
}

#[tokio::test]
async fn illegal_transitions_are_rejected() {
    let app = TestApp::new().await;
    app.set_stock(100).await;

    // Pending order cannot jump to Manufacturing
    let order_id = app.create_order("a@b.c").await;
    let result = app
        .state
        .services
        .orders
        .update_status(&order_id, OrderStatus::Manufacturing)
        .await;
    assert!(result.is_err());

    // Delivered is terminal
    let order_id = paid_order(&app, "b@b.c").await;
    app.state
        .services
        .orders
        .update_status(&order_id, OrderStatus::Shipped)
        .await
        .unwrap();
    app.state
        .services
        .orders
        .update_status(&order_id, OrderStatus::Delivered)
        .await
        .unwrap();
    let result = app
        .state
        .services
        .orders
        .update_status(&order_id, OrderStatus::Shipped)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn tracking_number_forces_shipped_and_notifies_on_change() {
    let app = TestApp::new().await;
    app.set_stock(100).await;
    let order_id = paid_order(&app, "a@b.c").await;
    let emails_before = app.mailer.count();

    // Paid + tracking number => forced to Shipped, one email
    let order = app
        .state
        .services
        .orders
        .set_tracking_number(&order_id, "TRACK-1")
        .await
        .unwrap();
    assert_eq!(order.status, "Shipped");
    assert_eq!(order.tracking_number.as_deref(), Some("TRACK-1"));
    assert_eq!(app.mailer.count(), emails_before + 1);

    // Same tracking number again: no email
    app.state
        .services
        .orders
        .set_tracking_number(&order_id, "TRACK-1")
        .await
        .unwrap();
    assert_eq!(app.mailer.count(), emails_before + 1);

    // A distinct tracking number notifies again
    app.state
        .services
        .orders
        .set_tracking_number(&order_id, "TRACK-2")
        .await
        .unwrap();
    assert_eq!(app.mailer.count(), emails_before + 2);

    let sent = app.mailer.sent();
    let last = sent.last().unwrap();
    assert!(last
        .key_items
        .iter()
        .any(|(k, v)| k == "Tracking number" && v == "TRACK-2"));
}

#[tokio::test]
async fn payment_link_endpoint_redirects_to_a_fresh_session() {
    let app = TestApp::new().await;
    app.set_stock(100).await;
    let order_id = app.create_order("a@b.c").await;

    let response = app
        .get(&format!("/api/store/payment-link/{}/", order_id))
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(TestApp::location(&response).contains("paypal.com"));

    // Unknown orders bounce to the error landing
    let response = app.get("/api/store/payment-link/000000000000/").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(TestApp::location(&response).contains("sale-status=error"));

    // Paid orders no longer re-mint
    app.get(&format!("/api/store/sale-done/{}/?use_testing=true", order_id))
        .await;
    let response = app
        .get(&format!("/api/store/payment-link/{}/", order_id))
        .await;
    assert!(TestApp::location(&response).contains("sale-status=error"));
}
