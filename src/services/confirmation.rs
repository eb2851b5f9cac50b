use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::entities::{addon, customer, order, order_addon, product_set};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::mailer::{EmailPayload, Mailbox};
use crate::payments::{PaymentLinker, ProviderKind};
use crate::services::affiliates::AffiliateService;
use crate::services::invoicing::{
    allocate_invoice_number, compute_breakdown, InvoiceFields, InvoiceRenderer,
};
use crate::services::lock::OrderLocks;
use crate::services::orders::{OrderService, OrderStatus};
use crate::services::stock::StockService;
use crate::storage::ObjectStore;

/// What the provider callback resolved to; the handler turns this into the
/// landing redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Success,
    NotPaid,
    NotFound,
}

/// Confirmation Pipeline: verifies payment with the provider, transitions
/// the order to Paid, decrements stock, mints the invoice, credits the
/// affiliate and emits the two confirmation emails. Idempotent: repeat
/// callbacks observe Paid and short-circuit.
#[derive(Clone)]
pub struct ConfirmationService {
    db: Arc<DbPool>,
    config: AppConfig,
    orders: Arc<OrderService>,
    stock: Arc<StockService>,
    affiliates: Arc<AffiliateService>,
    linker: Arc<PaymentLinker>,
    renderer: Arc<dyn InvoiceRenderer>,
    store: Arc<dyn ObjectStore>,
    locks: Arc<OrderLocks>,
    mailbox: Mailbox,
    event_sender: EventSender,
}

impl ConfirmationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DbPool>,
        config: AppConfig,
        orders: Arc<OrderService>,
        stock: Arc<StockService>,
        affiliates: Arc<AffiliateService>,
        linker: Arc<PaymentLinker>,
        renderer: Arc<dyn InvoiceRenderer>,
        store: Arc<dyn ObjectStore>,
        locks: Arc<OrderLocks>,
        mailbox: Mailbox,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            config,
            orders,
            stock,
            affiliates,
            linker,
            renderer,
            store,
            locks,
            mailbox,
            event_sender,
        }
    }

    /// Handles one provider success callback under the per-order lock.
    #[instrument(skip(self), fields(order_id = %order_id, use_testing))]
    pub async fn confirm(
        &self,
        order_id: &str,
        use_testing: bool,
    ) -> Result<ConfirmationOutcome, ServiceError> {
        let _guard = self.locks.acquire(order_id).await;

        let Some(order_model) = order::Entity::find_by_id(order_id).one(&*self.db).await? else {
            warn!(%order_id, "confirmation callback for unknown order");
            return Ok(ConfirmationOutcome::NotFound);
        };

        let status = OrderStatus::parse(&order_model.status)?;
        // A second caller observes Paid and takes the idempotent path
        if status.has_reached_paid() {
            info!(%order_id, "order already paid, idempotent redirect");
            return Ok(ConfirmationOutcome::Success);
        }

        let kind = ProviderKind::parse_or(
            order_model.payment_provider.as_deref(),
            self.linker.default_kind(),
        );
        let paid = self
            .linker
            .is_paid(
                kind,
                order_model.checkout_handle.as_deref(),
                use_testing,
                order_id,
            )
            .await;

        if !paid {
            self.flag_payment_error(order_model, status).await?;
            return Ok(ConfirmationOutcome::NotPaid);
        }

        // Write-once effects under one transaction, gated on the pre-Paid
        // status re-read inside it
        let txn = self.db.begin().await?;

        let order_model = order::Entity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        if OrderStatus::parse(&order_model.status)?.has_reached_paid() {
            txn.commit().await?;
            return Ok(ConfirmationOutcome::Success);
        }

        let order_model = self
            .orders
            .transition_on(&txn, order_model, OrderStatus::Paid)
            .await?;
        let _remaining = self.stock.decrement_on(&txn, order_id).await?;
        let invoice_num = allocate_invoice_number(&txn).await?;
        let _credit = self.affiliates.credit_for_order(&txn, &order_model).await?;

        txn.commit().await?;

        if let Err(e) = self
            .event_sender
            .send(Event::OrderPaid {
                order_id: order_id.to_string(),
                invoice_num,
            })
            .await
        {
            warn!(%order_id, error = %e, "failed to publish order paid event");
        }

        // External side effects after the commit: invoice render (attached
        // when it succeeds) and the two confirmation emails
        let order_model = self.mint_invoice(order_model, invoice_num, kind).await?;
        self.send_confirmation_emails(&order_model).await?;

        info!(%order_id, invoice_num, "order confirmed");
        Ok(ConfirmationOutcome::Success)
    }

    /// Flags a failed payment at most once: only the transition out of an
    /// awaiting-payment state sends the one-shot customer email.
    async fn flag_payment_error(
        &self,
        order_model: order::Model,
        status: OrderStatus,
    ) -> Result<(), ServiceError> {
        if !status.is_awaiting_payment() {
            return Ok(());
        }

        let order_id = order_model.id.clone();
        let customer_id = order_model.customer_id;
        self.orders
            .transition_on(&*self.db, order_model, OrderStatus::PaymentError)
            .await?;

        if let Err(e) = self
            .event_sender
            .send(Event::PaymentErrorFlagged {
                order_id: order_id.clone(),
            })
            .await
        {
            warn!(%order_id, error = %e, "failed to publish payment error event");
        }

        if let Some(customer) = customer::Entity::find_by_id(customer_id)
            .one(&*self.db)
            .await?
        {
            self.mailbox
                .deliver(
                    EmailPayload::new("There was a problem with your payment", customer.email)
                        .greeting(customer.first_name, customer.last_name)
                        .texts(vec![
                            "We could not verify the payment for your order.".to_string(),
                            "You can retry the payment using the link below.".to_string(),
                        ])
                        .cta("Try again", self.config.payment_link_url(&order_id))
                        .key_items(vec![("Order".to_string(), order_id.clone())]),
                )
                .await;
        }
        Ok(())
    }

    /// Computes the breakdown, calls the external generator and attaches the
    /// returned handle. A generator failure leaves the order paid but
    /// without an invoice file; the allocated number is not reused.
    async fn mint_invoice(
        &self,
        order_model: order::Model,
        invoice_num: i64,
        kind: ProviderKind,
    ) -> Result<order::Model, ServiceError> {
        let customer = customer::Entity::find_by_id(order_model.customer_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Customer {} not found", order_model.customer_id))
            })?;

        let breakdown = compute_breakdown(
            order_model.total,
            self.config.igi_rate,
            self.config.provider_fee_rate(&kind.to_string()),
        );

        let fields = InvoiceFields {
            invoice_num,
            date: Utc::now().format("%d/%m/%Y").to_string(),
            name: order_model.full_name.clone(),
            city: order_model.city.clone(),
            state: order_model.state.clone(),
            street: order_model.street_address.clone(),
            postal_code: order_model.postal_code.clone(),
            country: order_model.country.clone(),
            phone: order_model.phone.clone(),
            email: customer.email.clone(),
            quantity: "1".to_string(),
            base: format!("{:.2}", breakdown.base),
            igi: format!("{:.2}", breakdown.igi),
            provider_fee: format!("{:.2}", breakdown.provider_fee),
            total: format!("{:.2}", breakdown.total),
        };

        match self.renderer.render(&fields).await {
            Ok(handle) => {
                let mut active: order::ActiveModel = order_model.into();
                active.invoice_file = Set(Some(handle));
                active.updated_at = Set(Utc::now());
                Ok(active.update(&*self.db).await?)
            }
            Err(e) => {
                warn!(order_id = %order_model.id, error = %e, "invoice generation failed");
                Ok(order_model)
            }
        }
    }

    async fn send_confirmation_emails(&self, order_model: &order::Model) -> Result<(), ServiceError> {
        let customer = customer::Entity::find_by_id(order_model.customer_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Customer {} not found", order_model.customer_id))
            })?;

        let key_items = self.order_details_items(order_model).await?;
        let logo_url = order_model
            .logo
            .as_ref()
            .map(|handle| self.store.url_for(handle));

        self.mailbox
            .deliver(
                EmailPayload::new("Your order is confirmed!", customer.email.clone())
                    .greeting(customer.first_name.clone(), customer.last_name.clone())
                    .texts(vec![
                        "We received your payment and your order is confirmed.".to_string(),
                        "We will keep you posted while we build your set.".to_string(),
                    ])
                    .cta("Visit our store", self.config.landing_host.clone())
                    .key_items(key_items.clone())
                    .image_url(logo_url.clone())
                    .attachment(order_model.invoice_file.clone()),
            )
            .await;

        self.mailbox
            .deliver(
                EmailPayload::new("New sale!", self.config.admin_email.clone())
                    .greeting("Admin", "")
                    .texts(vec![format!(
                        "Order {} from {} was just paid.",
                        order_model.id, customer.email
                    )])
                    .cta(
                        "Open dashboard",
                        format!("{}/admin/store/order/", self.config.host),
                    )
                    .key_items(key_items)
                    .image_url(logo_url),
            )
            .await;

        Ok(())
    }

    /// Key/value order-details rows shared by both confirmation emails.
    async fn order_details_items(
        &self,
        order_model: &order::Model,
    ) -> Result<Vec<(String, String)>, ServiceError> {
        let set = product_set::Entity::find_by_id(order_model.set_id)
            .one(&*self.db)
            .await?;
        let set_name = set.map(|s| s.name).unwrap_or_else(|| "unknown".to_string());

        let addon_rows = order_addon::Entity::find()
            .filter(order_addon::Column::OrderId.eq(order_model.id.clone()))
            .all(&*self.db)
            .await?;
        let mut addon_names = Vec::with_capacity(addon_rows.len());
        for row in &addon_rows {
            if let Some(picked) = addon::Entity::find_by_id(row.addon_id).one(&*self.db).await? {
                addon_names.push(picked.name);
            }
        }

        let mut items = vec![
            ("Order".to_string(), order_model.id.clone()),
            ("Set".to_string(), set_name),
            ("Colors".to_string(), order_model.colors_num.to_string()),
            ("Total".to_string(), format!("{:.2} USD", order_model.total)),
        ];
        if !addon_names.is_empty() {
            items.insert(3, ("Extras".to_string(), addon_names.join(", ")));
        }
        Ok(items)
    }
}
