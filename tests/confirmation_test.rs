mod common;

use axum::http::StatusCode;
use common::TestApp;
use rust_decimal_macros::dec;

#[tokio::test]
async fn happy_path_confirmation_pays_the_order() {
    let app = TestApp::new().await;
    app.set_stock(100).await;

    let order_id = app.create_order("a@b.c").await;
    let emails_before = app.mailer.count();

    let response = app
        .get(&format!("/api/store/sale-done/{}/?use_testing=true", order_id))
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = TestApp::location(&response);
    assert!(location.contains("sale-status=success"));
    assert!(location.contains(&format!("sale-id={}", order_id)));

    let order = app
        .state
        .services
        .orders
        .get_order(&order_id)
        .await
        .unwrap();
    assert_eq!(order.status, "Paid");

    // Stock decremented once
    assert_eq!(app.current_stock().await, 99);

    // Invoice minted and attached
    let invoice = order.invoice_file.expect("invoice attached");
    assert_eq!(invoice, "invoices/00001.pdf");

    // Customer confirmation + admin new-sale emails
    let sent = app.mailer.sent();
    let new_emails = &sent[emails_before..];
    assert_eq!(new_emails.len(), 2);
    assert_eq!(new_emails[0].to_email, "a@b.c");
    assert!(new_emails[0].subject.contains("confirmed"));
    assert_eq!(new_emails[1].to_email, app.state.config.admin_email);
}

#[tokio::test]
async fn repeated_confirmation_is_idempotent() {
    let app = TestApp::new().await;
    app.set_stock(100).await;

    let order_id = app.create_order("a@b.c").await;

    let first = app
        .get(&format!("/api/store/sale-done/{}/?use_testing=true", order_id))
        .await;
    assert_eq!(first.status(), StatusCode::FOUND);

    let emails_after_first = app.mailer.count();
    let stock_after_first = app.current_stock().await;
    let invoice_after_first = app
        .state
        .services
        .orders
        .get_order(&order_id)
        .await
        .unwrap()
        .invoice_file;

    // Second callback: success redirect, no new side effects
    let second = app
        .get(&format!("/api/store/sale-done/{}/?use_testing=true", order_id))
        .await;
    assert_eq!(second.status(), StatusCode::FOUND);
    assert!(TestApp::location(&second).contains("sale-status=success"));

    assert_eq!(app.current_stock().await, stock_after_first);
    assert_eq!(app.mailer.count(), emails_after_first);
    let order = app
        .state
        .services
        .orders
        .get_order(&order_id)
        .await
        .unwrap();
    assert_eq!(order.invoice_file, invoice_after_first);
    assert_eq!(order.status, "Paid");
}

#[tokio::test]
async fn unknown_order_redirects_to_the_error_landing() {
    let app = TestApp::new().await;

    let response = app.get("/api/store/sale-done/000000000000/").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(TestApp::location(&response).contains("sale-status=error"));
}

#[tokio::test]
async fn unpaid_callback_flags_payment_error_once() {
    let app = TestApp::new().await;
    app.set_stock(100).await;

    let order_id = app.create_order("a@b.c").await;
    let emails_before = app.mailer.count();

    // Without the testing flag the testing provider reports unpaid
    let response = app
        .get(&format!("/api/store/sale-done/{}/", order_id))
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(TestApp::location(&response).contains("sale-status=error"));

    let order = app
        .state
        .services
        .orders
        .get_order(&order_id)
        .await
        .unwrap();
    assert_eq!(order.status, "Payment Error");
    assert_eq!(app.current_stock().await, 100);

    // One payment-error email to the customer
    let sent = app.mailer.sent();
    let new_emails = &sent[emails_before..];
    assert_eq!(new_emails.len(), 1);
    assert_eq!(new_emails[0].to_email, "a@b.c");

    // A second unpaid callback suppresses the duplicate email
    let emails_before_second = app.mailer.count();
    let response = app
        .get(&format!("/api/store/sale-done/{}/", order_id))
        .await;
    assert!(TestApp::location(&response).contains("sale-status=error"));
    assert_eq!(app.mailer.count(), emails_before_second);
}

#[tokio::test]
async fn payment_error_orders_can_still_be_paid() {
    let app = TestApp::new().await;
    app.set_stock(100).await;

    let order_id = app.create_order("a@b.c").await;

    // Flag the error first
    app.get(&format!("/api/store/sale-done/{}/", order_id)).await;
    // Then the customer retries and pays
    let response = app
        .get(&format!("/api/store/sale-done/{}/?use_testing=true", order_id))
        .await;
    assert!(TestApp::location(&response).contains("sale-status=success"));

    let order = app
        .state
        .services
        .orders
        .get_order(&order_id)
        .await
        .unwrap();
    assert_eq!(order.status, "Paid");
    assert_eq!(app.current_stock().await, 99);
}

#[tokio::test]
async fn invoice_numbers_increase_across_orders() {
    let app = TestApp::new().await;
    app.set_stock(100).await;

    let first = app.create_order("first@b.c").await;
    app.get(&format!("/api/store/sale-done/{}/?use_testing=true", first))
        .await;

    let second = app.create_order("second@b.c").await;
    app.get(&format!("/api/store/sale-done/{}/?use_testing=true", second))
        .await;

    let first_invoice = app
        .state
        .services
        .orders
        .get_order(&first)
        .await
        .unwrap()
        .invoice_file
        .unwrap();
    let second_invoice = app
        .state
        .services
        .orders
        .get_order(&second)
        .await
        .unwrap()
        .invoice_file
        .unwrap();

    assert_eq!(first_invoice, "invoices/00001.pdf");
    assert_eq!(second_invoice, "invoices/00002.pdf");
}

#[tokio::test]
async fn affiliate_is_credited_exactly_once_per_paid_order() {
    let app = TestApp::new().await;
    app.set_stock(100).await;

    // Affiliate with a provisioned percentage promo code
    let owner = app.insert_customer("aff@b.c", true).await;
    let affiliate = app.insert_affiliate(owner.id, dec!(0)).await;
    app.state
        .services
        .affiliates
        .provision_promo_code(affiliate.id)
        .await
        .unwrap();

    // Order using the affiliate's code: 334 * 0.9 = 300.60
    let mut request = TestApp::sale_request("buyer@b.c");
    request["promo"] = serde_json::json!({"code": "aff@b.c"});
    let response = app.post_json("/api/store/sale/", request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let buyer = app
        .state
        .services
        .customers
        .find_by_email("buyer@b.c")
        .await
        .unwrap()
        .unwrap();
    let order = app
        .state
        .services
        .orders
        .pending_orders_for(buyer.id)
        .await
        .unwrap()
        .pop()
        .unwrap();
    assert_eq!(order.total, dec!(300.60));

    // Confirm twice; commission lands once: 300.60 * 0.10 = 30.06
    app.get(&format!("/api/store/sale-done/{}/?use_testing=true", order.id))
        .await;
    app.get(&format!("/api/store/sale-done/{}/?use_testing=true", order.id))
        .await;

    let credited = app
        .state
        .services
        .affiliates
        .get(affiliate.id)
        .await
        .unwrap();
    assert_eq!(credited.balance, dec!(30.06));

    // The paid order shows up in the commission view
    let commissions = app
        .state
        .services
        .affiliates
        .commissions(affiliate.id)
        .await
        .unwrap();
    assert_eq!(commissions.len(), 1);
    assert_eq!(commissions[0].id, order.id);
}

#[tokio::test]
async fn orders_without_affiliate_promo_credit_nobody() {
    let app = TestApp::new().await;
    app.set_stock(100).await;

    let owner = app.insert_customer("aff@b.c", true).await;
    let affiliate = app.insert_affiliate(owner.id, dec!(5)).await;

    let order_id = app.create_order("buyer@b.c").await;
    app.get(&format!("/api/store/sale-done/{}/?use_testing=true", order_id))
        .await;

    let untouched = app
        .state
        .services
        .affiliates
        .get(affiliate.id)
        .await
        .unwrap();
    assert_eq!(untouched.balance, dec!(5));
}
