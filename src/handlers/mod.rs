use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::mailer::{Mailbox, Mailer};
use crate::payments::PaymentLinker;
use crate::services::affiliates::AffiliateService;
use crate::services::catalog::CatalogService;
use crate::services::confirmation::ConfirmationService;
use crate::services::customers::CustomerService;
use crate::services::intake::IntakeService;
use crate::services::invoicing::InvoiceRenderer;
use crate::services::lock::OrderLocks;
use crate::services::orders::OrderService;
use crate::services::reminders::ReminderService;
use crate::services::stock::StockService;
use crate::storage::ObjectStore;

pub mod store;

/// Aggregate of the engine services used by HTTP handlers and jobs.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub customers: Arc<CustomerService>,
    pub orders: Arc<OrderService>,
    pub intake: Arc<IntakeService>,
    pub confirmation: Arc<ConfirmationService>,
    pub reminders: Arc<ReminderService>,
    pub stock: Arc<StockService>,
    pub affiliates: Arc<AffiliateService>,
}

impl AppServices {
    /// Wires every service onto the shared collaborators: one DB pool, one
    /// payment linker, one mailer, one object store, one lock registry.
    pub fn new(
        db: Arc<DbPool>,
        config: AppConfig,
        event_sender: EventSender,
        mailer: Arc<dyn Mailer>,
        object_store: Arc<dyn ObjectStore>,
        invoice_renderer: Arc<dyn InvoiceRenderer>,
        linker: Arc<PaymentLinker>,
    ) -> Self {
        let mailbox = Mailbox::new(mailer);
        let locks = Arc::new(OrderLocks::new());

        let catalog = Arc::new(CatalogService::new(db.clone()));
        let customers = Arc::new(CustomerService::new(db.clone()));
        let orders = Arc::new(OrderService::new(
            db.clone(),
            config.clone(),
            linker.clone(),
            event_sender.clone(),
            mailbox.clone(),
        ));
        let stock = Arc::new(StockService::new(
            db.clone(),
            config.clone(),
            customers.clone(),
            mailbox.clone(),
            event_sender.clone(),
        ));
        let affiliates = Arc::new(AffiliateService::new(
            db.clone(),
            config.clone(),
            mailbox.clone(),
            event_sender.clone(),
        ));
        let intake = Arc::new(IntakeService::new(
            db.clone(),
            config.clone(),
            catalog.clone(),
            customers.clone(),
            orders.clone(),
            stock.clone(),
            linker.clone(),
            object_store.clone(),
            mailbox.clone(),
            event_sender.clone(),
        ));
        let confirmation = Arc::new(ConfirmationService::new(
            db.clone(),
            config.clone(),
            orders.clone(),
            stock.clone(),
            affiliates.clone(),
            linker.clone(),
            invoice_renderer,
            object_store,
            locks.clone(),
            mailbox.clone(),
            event_sender.clone(),
        ));
        let reminders = Arc::new(ReminderService::new(
            db,
            linker,
            locks,
            mailbox,
            event_sender,
        ));

        Self {
            catalog,
            customers,
            orders,
            intake,
            confirmation,
            reminders,
            stock,
            affiliates,
        }
    }
}
