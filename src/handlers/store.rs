use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use crate::errors::ServiceError;
use crate::services::confirmation::ConfirmationOutcome;
use crate::services::intake::IntakeRequest;
use crate::services::stock::SubscriptionMode;
use crate::AppState;

/// POST /api/store/sale/ — order intake.
pub async fn create_sale(
    State(state): State<AppState>,
    Json(request): Json<IntakeRequest>,
) -> Result<Json<Value>, ServiceError> {
    let outcome = state.services.intake.submit(request).await?;

    Ok(Json(json!({
        "status": "success",
        "message": "Sale created successfully",
        "data": { "payment_link": outcome.payment_link },
    })))
}

#[derive(Debug, Deserialize)]
pub struct SaleDoneQuery {
    #[serde(default)]
    pub use_testing: bool,
}

/// Browser-facing 302 redirect.
fn found(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// GET /api/store/sale-done/{id}/ — provider success callback. Always
/// answers with a 302 to the landing site; the engine's verdict rides in the
/// query string.
pub async fn sale_done(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Query(query): Query<SaleDoneQuery>,
) -> Response {
    let outcome = state
        .services
        .confirmation
        .confirm(&order_id, query.use_testing)
        .await;

    let landing_status = match outcome {
        Ok(ConfirmationOutcome::Success) => "success",
        Ok(ConfirmationOutcome::NotPaid) | Ok(ConfirmationOutcome::NotFound) => "error",
        Err(e) => {
            error!(%order_id, error = %e, "confirmation failed");
            "error"
        }
    };

    found(state.config.landing_redirect(&order_id, landing_status))
}

/// GET /api/store/payment-link/{id}/ — re-mints the checkout session and
/// bounces the browser to the provider-hosted page.
pub async fn payment_link(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Response {
    match state.services.orders.remint_session(&order_id).await {
        Ok(session) => found(session.redirect_url),
        Err(e) => {
            error!(%order_id, error = %e, "payment link re-mint failed");
            found(state.config.landing_redirect(&order_id, "error"))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PromoCodeRequest {
    pub promo_code: String,
}

/// POST /api/store/promo-code/ — promo validation for the landing form.
pub async fn validate_promo_code(
    State(state): State<AppState>,
    Json(request): Json<PromoCodeRequest>,
) -> Result<Json<Value>, ServiceError> {
    match state
        .services
        .catalog
        .resolve_promo(request.promo_code.trim())
        .await?
    {
        Some((promo, kind)) => Ok(Json(json!({
            "value": promo.discount,
            "type": kind.name,
        }))),
        None => Err(ServiceError::NotFound("Promo code not found".into())),
    }
}

#[derive(Debug, Deserialize)]
pub struct PendingOrderRequest {
    pub email: String,
}

/// POST /api/store/pending-order/ — pending-order probe.
pub async fn pending_order(
    State(state): State<AppState>,
    Json(request): Json<PendingOrderRequest>,
) -> Result<Json<Value>, ServiceError> {
    let has_pending_order = state
        .services
        .orders
        .has_pending_order(request.email.trim())
        .await?;

    Ok(Json(json!({ "has_pending_order": has_pending_order })))
}

/// GET /api/store/current-stock/ — reads the scalar counter.
pub async fn current_stock(State(state): State<AppState>) -> Result<Json<Value>, ServiceError> {
    let current_stock = state.services.stock.current_stock().await?;
    Ok(Json(json!({ "current_stock": current_stock })))
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionRequest {
    pub email: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// POST /api/store/future-stock-subscription/ — subscribe or unsubscribe an
/// email for the next restock.
pub async fn future_stock_subscription(
    State(state): State<AppState>,
    Json(request): Json<SubscriptionRequest>,
) -> Result<Json<Value>, ServiceError> {
    let email = request.email.trim();
    if email.is_empty() {
        return Err(ServiceError::ValidationError(
            "Missing required field: email".into(),
        ));
    }

    let mode = SubscriptionMode::parse(&request.kind)?;
    state.services.stock.subscribe(email, mode).await?;

    let message = match mode {
        SubscriptionMode::Add => "Subscribed to future stock",
        SubscriptionMode::Remove => "Unsubscribed from future stock",
    };
    Ok(Json(json!({
        "status": "success",
        "message": message,
        "data": {},
    })))
}

/// GET /api/store/next-future-stock/ — restock countdown without an email.
pub async fn next_future_stock(
    State(state): State<AppState>,
) -> Result<Json<Value>, ServiceError> {
    countdown(&state, None).await
}

/// GET /api/store/next-future-stock/{email} — countdown plus whether the
/// email already subscribed.
pub async fn next_future_stock_for(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<Value>, ServiceError> {
    countdown(&state, Some(email)).await
}

async fn countdown(state: &AppState, email: Option<String>) -> Result<Json<Value>, ServiceError> {
    let view = state
        .services
        .stock
        .next_future_stock(email.as_deref().map(str::trim))
        .await?;

    Ok(Json(json!({
        "next_future_stock": view.next_future_stock,
        "already_subscribed": view.already_subscribed,
    })))
}
