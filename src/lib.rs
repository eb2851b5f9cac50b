//! Nyx Trackers back-office API
//!
//! This crate implements the order lifecycle engine: intake and pricing,
//! payment linking, confirmation, reminders, stock control and affiliate
//! settlement.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod mailer;
pub mod migrator;
pub mod payments;
pub mod services;
pub mod storage;

use axum::{
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

/// Engine-facing HTTP surface, mounted under `/api/store`.
pub fn store_routes() -> Router<AppState> {
    Router::new()
        .route("/sale/", post(handlers::store::create_sale))
        .route("/sale-done/:order_id/", get(handlers::store::sale_done))
        .route(
            "/payment-link/:order_id/",
            get(handlers::store::payment_link),
        )
        .route("/promo-code/", post(handlers::store::validate_promo_code))
        .route("/pending-order/", post(handlers::store::pending_order))
        .route("/current-stock/", get(handlers::store::current_stock))
        .route(
            "/future-stock-subscription/",
            post(handlers::store::future_stock_subscription),
        )
        .route(
            "/next-future-stock/",
            get(handlers::store::next_future_stock),
        )
        .route(
            "/next-future-stock/:email",
            get(handlers::store::next_future_stock_for),
        )
}
