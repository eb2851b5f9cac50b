//! Scheduled job runner, invoked from cron:
//!
//! ```sh
//! nyx-jobs payment-reminder
//! nyx-jobs future-stock-update
//! nyx-jobs affiliates-payments-notification
//! nyx-jobs seed-catalog
//! ```

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::info;

use nyx_api as api;
use nyx_api::mailer::{Mailer, NullMailer, RendererClient};
use nyx_api::services::invoicing::{HttpInvoiceRenderer, InvoiceRenderer, StubInvoiceRenderer};

#[derive(Parser)]
#[command(name = "nyx-jobs", about = "Nyx Trackers scheduled jobs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send payment reminders for unpaid orders (max 3, last one discounted)
    PaymentReminder,
    /// Admit due future-stock batches and notify subscribers
    FutureStockUpdate,
    /// Email the admin about affiliates with positive balances
    AffiliatesPaymentsNotification,
    /// Seed the catalog reference data
    SeedCatalog,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await?;
    }
    let db_arc = Arc::new(db_pool);

    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = api::events::EventSender::new(event_tx);
    let event_task = tokio::spawn(api::events::process_events(event_rx));

    let mailer: Arc<dyn Mailer> = if cfg.email_renderer_url.is_empty() {
        Arc::new(NullMailer)
    } else {
        Arc::new(RendererClient::new(cfg.email_renderer_url.clone()))
    };
    let invoice_renderer: Arc<dyn InvoiceRenderer> = if cfg.invoice_generator_url.is_empty() {
        Arc::new(StubInvoiceRenderer)
    } else {
        Arc::new(HttpInvoiceRenderer::new(cfg.invoice_generator_url.clone()))
    };
    let object_store = Arc::new(api::storage::FsObjectStore::new(
        cfg.media_root.clone(),
        format!("{}{}", cfg.host, cfg.media_url),
    ));
    let linker = Arc::new(api::payments::PaymentLinker::from_config(&cfg));

    let services = api::handlers::AppServices::new(
        db_arc.clone(),
        cfg.clone(),
        event_sender.clone(),
        mailer,
        object_store,
        invoice_renderer,
        linker,
    );

    match cli.command {
        Command::PaymentReminder => {
            let report = services.reminders.run_once().await?;
            info!(
                examined = report.examined,
                sent = report.sent,
                failed = report.failed,
                "payment reminder run finished"
            );
        }
        Command::FutureStockUpdate => {
            let report = services.stock.promote_future_stocks().await?;
            info!(
                promoted = report.promoted,
                notified = report.notified,
                "future stock update finished"
            );
        }
        Command::AffiliatesPaymentsNotification => {
            let notified = services.affiliates.notify_positive_balances().await?;
            info!(notified, "affiliate payment notifications finished");
        }
        Command::SeedCatalog => {
            api::services::catalog::CatalogService::seed_defaults(&*db_arc).await?;
            info!("catalog seeded");
        }
    }

    // Let queued events drain before exiting
    drop(event_sender);
    drop(services);
    let _ = event_task.await;

    Ok(())
}
