use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::str::FromStr;
use std::sync::Arc;
use strum::{Display, EnumString};
use tracing::{info, instrument, warn};

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::entities::{customer, order};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::mailer::{EmailPayload, Mailbox};
use crate::payments::{CheckoutSession, ProviderKind};

/// Order lifecycle states. Terminal: `Delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum OrderStatus {
    #[strum(serialize = "Pending")]
    Pending,
    #[strum(serialize = "Reminder Sent")]
    ReminderSent,
    #[strum(serialize = "Payment Error")]
    PaymentError,
    #[strum(serialize = "Paid")]
    Paid,
    #[strum(serialize = "Manufacturing")]
    Manufacturing,
    #[strum(serialize = "Shipped")]
    Shipped,
    #[strum(serialize = "Delivered")]
    Delivered,
}

impl OrderStatus {
    /// The allowed-transition table. `Reminder Sent` self-loops for repeat
    /// reminders; everything else moves strictly forward.
    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (Pending, ReminderSent)
                | (Pending, PaymentError)
                | (Pending, Paid)
                | (ReminderSent, ReminderSent)
                | (ReminderSent, PaymentError)
                | (ReminderSent, Paid)
                | (PaymentError, Paid)
                | (Paid, Manufacturing)
                | (Paid, Shipped)
                | (Manufacturing, Shipped)
                | (Shipped, Delivered)
        )
    }

    /// Still waiting on the customer to pay.
    pub fn is_awaiting_payment(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::ReminderSent)
    }

    /// Has reached `Paid` at least once.
    pub fn has_reached_paid(self) -> bool {
        matches!(
            self,
            OrderStatus::Paid
                | OrderStatus::Manufacturing
                | OrderStatus::Shipped
                | OrderStatus::Delivered
        )
    }

    /// States whose entry fires a customer notification.
    pub fn notifies_customer(self) -> bool {
        matches!(
            self,
            OrderStatus::Manufacturing | OrderStatus::Shipped | OrderStatus::Delivered
        )
    }

    pub fn parse(raw: &str) -> Result<OrderStatus, ServiceError> {
        OrderStatus::from_str(raw)
            .map_err(|_| ServiceError::InvalidOperation(format!("Unknown order status: {}", raw)))
    }
}

/// Mints a fresh 12-hex-character opaque order id.
pub fn mint_order_id() -> String {
    hex::encode(rand::random::<[u8; 6]>())
}

/// Title and description shown on the provider checkout page.
pub fn checkout_copy(
    set_name: &str,
    colors_num: i32,
    email: &str,
    full_name: &str,
) -> (String, String) {
    let title = format!("Tracker {} {} colors", set_name, colors_num);
    let description = format!(
        "Set: {} | Colors: {} | Client Email: {} | Client Full Name: {}",
        set_name, colors_num, email, full_name
    );
    (title, description)
}

/// Order persistence plus the status machine. Status coercion and
/// notification emission are explicit operations here, not save hooks.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    config: AppConfig,
    linker: Arc<crate::payments::PaymentLinker>,
    event_sender: EventSender,
    mailbox: Mailbox,
}

impl OrderService {
    pub fn new(
        db: Arc<DbPool>,
        config: AppConfig,
        linker: Arc<crate::payments::PaymentLinker>,
        event_sender: EventSender,
        mailbox: Mailbox,
    ) -> Self {
        Self {
            db,
            config,
            linker,
            event_sender,
            mailbox,
        }
    }

    pub async fn find_order(&self, order_id: &str) -> Result<Option<order::Model>, ServiceError> {
        Ok(order::Entity::find_by_id(order_id).one(&*self.db).await?)
    }

    pub async fn get_order(&self, order_id: &str) -> Result<order::Model, ServiceError> {
        self.find_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Orders of this customer still awaiting payment, oldest first.
    pub async fn pending_orders_for(
        &self,
        customer_id: i32,
    ) -> Result<Vec<order::Model>, ServiceError> {
        Ok(order::Entity::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .filter(order::Column::Status.is_in([
                OrderStatus::Pending.to_string(),
                OrderStatus::ReminderSent.to_string(),
            ]))
            .order_by_asc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Pending-order probe by email, used by the landing site.
    pub async fn has_pending_order(&self, email: &str) -> Result<bool, ServiceError> {
        let Some(customer) = customer::Entity::find()
            .filter(customer::Column::Email.eq(email))
            .one(&*self.db)
            .await?
        else {
            return Ok(false);
        };

        Ok(!self.pending_orders_for(customer.id).await?.is_empty())
    }

    /// Applies a validated status transition on the given connection.
    /// Does not emit notifications; callers decide what a transition means.
    pub async fn transition_on<C: ConnectionTrait>(
        &self,
        db: &C,
        order: order::Model,
        to: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let from = OrderStatus::parse(&order.status)?;
        if !from.can_transition_to(to) {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot transition order {} from '{}' to '{}'",
                order.id, from, to
            )));
        }

        let order_id = order.id.clone();
        let mut active: order::ActiveModel = order.into();
        active.status = Set(to.to_string());
        active.updated_at = Set(Utc::now());
        let updated = active.update(db).await?;

        if let Err(e) = self
            .event_sender
            .send(Event::OrderStatusChanged {
                order_id: order_id.clone(),
                old_status: from.to_string(),
                new_status: to.to_string(),
            })
            .await
        {
            warn!(%order_id, error = %e, "failed to publish status change event");
        }

        info!(%order_id, from = %from, to = %to, "order status changed");
        Ok(updated)
    }

    /// Back-office status update. Entering Manufacturing, Shipped or
    /// Delivered notifies the customer exactly once per distinct transition
    /// (the transition table has no self-loops for these states).
    #[instrument(skip(self), fields(order_id = %order_id, to = %to))]
    pub async fn update_status(
        &self,
        order_id: &str,
        to: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let order = self.get_order(order_id).await?;
        let updated = self.transition_on(&*self.db, order, to).await?;

        if to.notifies_customer() {
            self.notify_status(&updated, to).await?;
        }
        Ok(updated)
    }

    /// Sets the tracking number. A non-empty tracking number on a
    /// pre-shipment order forces the status to `Shipped`; every distinct
    /// tracking change notifies the customer.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn set_tracking_number(
        &self,
        order_id: &str,
        tracking_number: &str,
    ) -> Result<order::Model, ServiceError> {
        let order = self.get_order(order_id).await?;
        let status = OrderStatus::parse(&order.status)?;
        let changed = order.tracking_number.as_deref() != Some(tracking_number);

        let force_shipped = !tracking_number.is_empty()
            && !matches!(status, OrderStatus::Shipped | OrderStatus::Delivered);

        let mut active: order::ActiveModel = order.into();
        active.tracking_number = Set(Some(tracking_number.to_string()));
        if force_shipped {
            active.status = Set(OrderStatus::Shipped.to_string());
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        if force_shipped {
            info!(%order_id, "tracking number forced status to Shipped");
        }

        if changed && !tracking_number.is_empty() {
            if let Err(e) = self
                .event_sender
                .send(Event::TrackingNumberSet {
                    order_id: order_id.to_string(),
                    tracking_number: tracking_number.to_string(),
                })
                .await
            {
                warn!(%order_id, error = %e, "failed to publish tracking event");
            }
            self.notify_tracking(&updated, tracking_number).await?;
        }

        Ok(updated)
    }

    /// Re-mints the checkout session for an order still awaiting payment, at
    /// the currently stored total, and persists the new session on the order.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn remint_session(
        &self,
        order_id: &str,
    ) -> Result<crate::payments::CheckoutSession, ServiceError> {
        let order = self.get_order(order_id).await?;
        let status = OrderStatus::parse(&order.status)?;
        if status.has_reached_paid() {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} is already paid",
                order_id
            )));
        }

        let customer = customer::Entity::find_by_id(order.customer_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Customer {} not found", order.customer_id))
            })?;
        let set = crate::entities::product_set::Entity::find_by_id(order.set_id)
            .one(&*self.db)
            .await?;
        let set_name = set.map(|s| s.name).unwrap_or_else(|| "set".to_string());

        let (title, description) = checkout_copy(
            &set_name,
            order.colors_num,
            &customer.email,
            &order.full_name,
        );
        let total = order.total;
        let (kind, session) = self
            .linker
            .mint_session(order_id, &title, total, &description)
            .await
            .map_err(|e| ServiceError::PaymentProvider(e.to_string()))?;

        self.save_payment_session(&*self.db, order, kind, &session)
            .await?;
        Ok(session)
    }

    /// Stores a freshly minted provider session on the order.
    pub async fn save_payment_session<C: ConnectionTrait>(
        &self,
        db: &C,
        order: order::Model,
        kind: ProviderKind,
        session: &CheckoutSession,
    ) -> Result<order::Model, ServiceError> {
        let mut active: order::ActiveModel = order.into();
        active.payment_link = Set(Some(session.redirect_url.clone()));
        active.checkout_handle = Set(Some(session.handle.clone()));
        active.payment_provider = Set(Some(kind.to_string()));
        active.updated_at = Set(Utc::now());
        Ok(active.update(db).await?)
    }

    async fn notify_status(&self, order: &order::Model, to: OrderStatus) -> Result<(), ServiceError> {
        let customer = customer::Entity::find_by_id(order.customer_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Customer {} not found", order.customer_id))
            })?;

        let (first_paragraph, second_paragraph) = match to {
            OrderStatus::Manufacturing => (
                "Your set is now in manufacturing.".to_string(),
                "We will let you know as soon as it ships.".to_string(),
            ),
            OrderStatus::Shipped => (
                "Your order is on its way!".to_string(),
                "You will receive the tracking details shortly.".to_string(),
            ),
            _ => (
                "Your order has been delivered.".to_string(),
                "Enjoy your new set!".to_string(),
            ),
        };

        self.mailbox
            .deliver(
                EmailPayload::new(
                    format!("Order update: {}", to),
                    customer.email.clone(),
                )
                .greeting(customer.first_name.clone(), customer.last_name.clone())
                .texts(vec![first_paragraph, second_paragraph])
                .cta("Visit our store", self.config.landing_host.clone())
                .key_items(vec![
                    ("Order".to_string(), order.id.clone()),
                    ("Status".to_string(), to.to_string()),
                ]),
            )
            .await;
        Ok(())
    }

    async fn notify_tracking(
        &self,
        order: &order::Model,
        tracking_number: &str,
    ) -> Result<(), ServiceError> {
        let customer = customer::Entity::find_by_id(order.customer_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Customer {} not found", order.customer_id))
            })?;

        self.mailbox
            .deliver(
                EmailPayload::new("Your order has been shipped", customer.email.clone())
                    .greeting(customer.first_name.clone(), customer.last_name.clone())
                    .texts(vec![
                        "Your order left our workshop.".to_string(),
                        "Use the tracking number below to follow the package.".to_string(),
                    ])
                    .cta("Visit our store", self.config.landing_host.clone())
                    .key_items(vec![
                        ("Order".to_string(), order.id.clone()),
                        ("Tracking number".to_string(), tracking_number.to_string()),
                    ]),
            )
            .await;
        Ok(())
    }
}
