// Shared across integration test binaries; not every binary uses every helper.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

use nyx_api::{
    config::AppConfig,
    db,
    entities::{affiliate, customer, future_stock, stock_subscription},
    events::{self, EventSender},
    handlers::AppServices,
    mailer::MemoryMailer,
    payments::PaymentLinker,
    services::catalog::CatalogService,
    services::invoicing::StubInvoiceRenderer,
    storage::MemoryObjectStore,
    AppState,
};

/// Helper harness spinning up the engine over an in-memory SQLite database
/// with the testing payment variant and recording collaborators.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub mailer: Arc<MemoryMailer>,
    pub object_store: Arc<MemoryObjectStore>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "http://api.test".to_string(),
            "https://landing.test".to_string(),
        );
        cfg.payment_provider = "testing".to_string();
        cfg.is_testing = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        CatalogService::seed_defaults(&*db_arc)
            .await
            .expect("failed to seed catalog");

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let mailer = Arc::new(MemoryMailer::new());
        let object_store = Arc::new(MemoryObjectStore::new());

        let services = AppServices::new(
            db_arc.clone(),
            cfg.clone(),
            event_sender.clone(),
            mailer.clone(),
            object_store.clone(),
            Arc::new(StubInvoiceRenderer),
            Arc::new(PaymentLinker::testing()),
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/store", nyx_api::store_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            mailer,
            object_store,
            _event_task: event_task,
        }
    }

    /// Send a request against the router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> axum::response::Response {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn get(&self, uri: &str) -> axum::response::Response {
        self.request(Method::GET, uri, None).await
    }

    /// Parses a response body as JSON.
    pub async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("collect response body");
        serde_json::from_slice(&bytes).expect("response body is not JSON")
    }

    /// The Location header of a redirect response.
    pub fn location(response: &axum::response::Response) -> String {
        response
            .headers()
            .get("location")
            .expect("missing location header")
            .to_str()
            .expect("location is not utf-8")
            .to_string()
    }

    /// Seeds the stock counter by the restock path.
    pub async fn set_stock(&self, amount: i64) {
        let current = self
            .state
            .services
            .stock
            .current_stock()
            .await
            .expect("read stock");
        self.state
            .services
            .stock
            .add_stock(amount - current)
            .await
            .expect("seed stock");
    }

    pub async fn current_stock(&self) -> i64 {
        self.state
            .services
            .stock
            .current_stock()
            .await
            .expect("read stock")
    }

    /// A complete valid S1-style submission.
    pub fn sale_request(email: &str) -> Value {
        json!({
            "email": email,
            "set": "basic",
            "colors_num": 4,
            "set_color": "blue",
            "logo_color_1": "white",
            "logo_color_2": "red",
            "logo_color_3": "blue",
            "included_extras": ["Straps", "Wifi 2.4ghz USB Dongle"],
            "promo": {"code": "none"},
            "full_name": "x",
            "country": "x",
            "state": "x",
            "city": "x",
            "postal_code": "x",
            "street_address": "x",
            "phone": "x",
        })
    }

    /// Creates an intake and returns the new order id.
    pub async fn create_order(&self, email: &str) -> String {
        let response = self
            .post_json("/api/store/sale/", Self::sale_request(email))
            .await;
        assert_eq!(response.status(), StatusCode::OK, "intake failed");
        let _ = Self::body_json(response).await;

        let customer = self
            .state
            .services
            .customers
            .find_by_email(email)
            .await
            .expect("lookup customer")
            .expect("customer exists after intake");
        let orders = self
            .state
            .services
            .orders
            .pending_orders_for(customer.id)
            .await
            .expect("list pending orders");
        orders.last().expect("order exists").id.clone()
    }

    /// Inserts a customer row directly.
    pub async fn insert_customer(&self, email: &str, active: bool) -> customer::Model {
        let now = Utc::now();
        customer::ActiveModel {
            email: Set(email.to_string()),
            first_name: Set("Test".to_string()),
            last_name: Set("Customer".to_string()),
            password_hash: Set("x".to_string()),
            active: Set(active),
            staff: Set(false),
            created_by_order: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("insert customer")
    }

    /// Inserts an affiliate for an existing customer.
    pub async fn insert_affiliate(&self, customer_id: i32, balance: Decimal) -> affiliate::Model {
        let now = Utc::now();
        affiliate::ActiveModel {
            customer_id: Set(customer_id),
            promo_code_id: Set(None),
            balance: Set(balance),
            social_media: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("insert affiliate")
    }

    /// Inserts a future stock batch.
    pub async fn insert_future_stock(
        &self,
        amount: i32,
        scheduled_at: chrono::DateTime<Utc>,
        added: bool,
    ) -> future_stock::Model {
        let now = Utc::now();
        future_stock::ActiveModel {
            amount: Set(amount),
            scheduled_at: Set(scheduled_at),
            added: Set(added),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("insert future stock")
    }

    /// Inserts a stock subscription row directly.
    pub async fn insert_subscription(
        &self,
        customer_id: i32,
        future_stock_id: i32,
        active: bool,
        notified: bool,
    ) -> stock_subscription::Model {
        let now = Utc::now();
        stock_subscription::ActiveModel {
            customer_id: Set(customer_id),
            future_stock_id: Set(future_stock_id),
            active: Set(active),
            notified: Set(notified),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("insert subscription")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}
