mod common;

use common::TestApp;
use nyx_api::services::affiliates::PaymentStatus;
use rust_decimal_macros::dec;

#[tokio::test]
async fn completed_payment_debits_the_balance_immediately() {
    let app = TestApp::new().await;
    let owner = app.insert_customer("aff@b.c", true).await;
    let affiliate = app.insert_affiliate(owner.id, dec!(100)).await;

    app.state
        .services
        .affiliates
        .create_payment(affiliate.id, dec!(40), PaymentStatus::Completed)
        .await
        .unwrap();

    let updated = app
        .state
        .services
        .affiliates
        .get(affiliate.id)
        .await
        .unwrap();
    assert_eq!(updated.balance, dec!(60));
}

#[tokio::test]
async fn pending_payment_leaves_the_balance_until_completed() {
    let app = TestApp::new().await;
    let owner = app.insert_customer("aff@b.c", true).await;
    let affiliate = app.insert_affiliate(owner.id, dec!(100)).await;

    let payment = app
        .state
        .services
        .affiliates
        .create_payment(affiliate.id, dec!(40), PaymentStatus::Pending)
        .await
        .unwrap();

    let untouched = app
        .state
        .services
        .affiliates
        .get(affiliate.id)
        .await
        .unwrap();
    assert_eq!(untouched.balance, dec!(100));

    // PENDING -> COMPLETED applies the debit
    app.state
        .services
        .affiliates
        .set_payment_status(payment.id, PaymentStatus::Completed)
        .await
        .unwrap();
    let debited = app
        .state
        .services
        .affiliates
        .get(affiliate.id)
        .await
        .unwrap();
    assert_eq!(debited.balance, dec!(60));
}

#[tokio::test]
async fn repeating_a_status_never_double_applies() {
    let app = TestApp::new().await;
    let owner = app.insert_customer("aff@b.c", true).await;
    let affiliate = app.insert_affiliate(owner.id, dec!(100)).await;

    let payment = app
        .state
        .services
        .affiliates
        .create_payment(affiliate.id, dec!(40), PaymentStatus::Completed)
        .await
        .unwrap();

    // Setting COMPLETED again is a no-op
    app.state
        .services
        .affiliates
        .set_payment_status(payment.id, PaymentStatus::Completed)
        .await
        .unwrap();
    let balance = app
        .state
        .services
        .affiliates
        .get(affiliate.id)
        .await
        .unwrap()
        .balance;
    assert_eq!(balance, dec!(60));

    // COMPLETED -> PENDING restores, a repeat stays put
    app.state
        .services
        .affiliates
        .set_payment_status(payment.id, PaymentStatus::Pending)
        .await
        .unwrap();
    app.state
        .services
        .affiliates
        .set_payment_status(payment.id, PaymentStatus::Pending)
        .await
        .unwrap();
    let balance = app
        .state
        .services
        .affiliates
        .get(affiliate.id)
        .await
        .unwrap()
        .balance;
    assert_eq!(balance, dec!(100));
}

#[tokio::test]
async fn payment_amounts_must_be_positive() {
    let app = TestApp::new().await;
    let owner = app.insert_customer("aff@b.c", true).await;
    let affiliate = app.insert_affiliate(owner.id, dec!(100)).await;

    let result = app
        .state
        .services
        .affiliates
        .create_payment(affiliate.id, dec!(0), PaymentStatus::Pending)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn balance_notification_job_targets_active_positive_affiliates() {
    let app = TestApp::new().await;

    let active_owner = app.insert_customer("rich@b.c", true).await;
    let rich = app.insert_affiliate(active_owner.id, dec!(55.50)).await;

    let broke_owner = app.insert_customer("broke@b.c", true).await;
    app.insert_affiliate(broke_owner.id, dec!(0)).await;

    let inactive_owner = app.insert_customer("gone@b.c", false).await;
    app.insert_affiliate(inactive_owner.id, dec!(99)).await;

    let notified = app
        .state
        .services
        .affiliates
        .notify_positive_balances()
        .await
        .unwrap();
    assert_eq!(notified, 1);

    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    let email = &sent[0];
    assert_eq!(email.to_email, app.state.config.admin_email);
    assert!(email.subject.contains("rich@b.c"));
    // Deep link seeds a COMPLETED payment for the full balance
    assert!(email.cta_link.contains("amount=55.50"));
    assert!(email.cta_link.contains(&format!("affiliate={}", rich.id)));
    assert!(email.cta_link.contains("status=COMPLETED"));
}

#[tokio::test]
async fn provisioned_promo_codes_reuse_existing_rows() {
    let app = TestApp::new().await;
    let owner = app.insert_customer("aff@b.c", true).await;
    let affiliate = app.insert_affiliate(owner.id, dec!(0)).await;

    let first = app
        .state
        .services
        .affiliates
        .provision_promo_code(affiliate.id)
        .await
        .unwrap();
    assert_eq!(first.code, "aff@b.c");
    assert_eq!(first.discount, dec!(10));

    // Provisioning again refreshes the same code instead of duplicating
    let second = app
        .state
        .services
        .affiliates
        .provision_promo_code(affiliate.id)
        .await
        .unwrap();
    assert_eq!(second.id, first.id);

    let bound = app
        .state
        .services
        .affiliates
        .get(affiliate.id)
        .await
        .unwrap();
    assert_eq!(bound.promo_code_id, Some(first.id));
}
