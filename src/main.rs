use std::{net::SocketAddr, sync::Arc};

use axum::{routing::get, Router};
use tokio::{signal, sync::mpsc};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use nyx_api as api;
use nyx_api::mailer::{Mailer, NullMailer, RendererClient};
use nyx_api::services::invoicing::{HttpInvoiceRenderer, InvoiceRenderer, StubInvoiceRenderer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }

    let db_arc = Arc::new(db_pool);

    if cfg.auto_seed {
        api::services::catalog::CatalogService::seed_defaults(&*db_arc).await?;
    }

    // Init events
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = api::events::EventSender::new(event_tx);
    tokio::spawn(api::events::process_events(event_rx));

    // External collaborators behind their seams
    let mailer: Arc<dyn Mailer> = if cfg.email_renderer_url.is_empty() {
        info!("No email renderer configured; outbound email disabled");
        Arc::new(NullMailer)
    } else {
        Arc::new(RendererClient::new(cfg.email_renderer_url.clone()))
    };

    let invoice_renderer: Arc<dyn InvoiceRenderer> = if cfg.invoice_generator_url.is_empty() {
        info!("No invoice generator configured; invoices keep their handles only");
        Arc::new(StubInvoiceRenderer)
    } else {
        Arc::new(HttpInvoiceRenderer::new(cfg.invoice_generator_url.clone()))
    };

    let object_store = Arc::new(api::storage::FsObjectStore::new(
        cfg.media_root.clone(),
        format!("{}{}", cfg.host, cfg.media_url),
    ));

    let linker = Arc::new(api::payments::PaymentLinker::from_config(&cfg));
    info!(provider = %linker.default_kind(), "payment provider configured");

    // Aggregate app services used by HTTP handlers and jobs
    let services = api::handlers::AppServices::new(
        db_arc.clone(),
        cfg.clone(),
        event_sender.clone(),
        mailer,
        object_store,
        invoice_renderer,
        linker,
    );

    // Compose shared app state
    let app_state = api::AppState {
        db: db_arc,
        config: cfg.clone(),
        event_sender,
        services,
    };

    let app = Router::new()
        .route("/", get(|| async { "nyx-api up" }))
        .nest("/api/store", api::store_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", cfg.bind_address, cfg.port).parse()?;
    info!("nyx-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
