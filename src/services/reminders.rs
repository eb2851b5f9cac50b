use chrono::Utc;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::db::DbPool;
use crate::entities::{customer, order, product_set};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::mailer::{EmailPayload, Mailbox};
use crate::payments::PaymentLinker;
use crate::services::lock::OrderLocks;
use crate::services::orders::OrderStatus;
use crate::services::round_usd;

const MAX_REMINDERS: i32 = 3;

#[derive(Debug, Default)]
pub struct ReminderRunReport {
    pub examined: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Reminder Scheduler: re-engages unpaid orders, capped at three attempts,
/// with the final attempt cutting the stored total by 15% and re-minting the
/// checkout session at the discounted price.
#[derive(Clone)]
pub struct ReminderService {
    db: Arc<DbPool>,
    linker: Arc<PaymentLinker>,
    locks: Arc<OrderLocks>,
    mailbox: Mailbox,
    event_sender: EventSender,
}

impl ReminderService {
    pub fn new(
        db: Arc<DbPool>,
        linker: Arc<PaymentLinker>,
        locks: Arc<OrderLocks>,
        mailbox: Mailbox,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            linker,
            locks,
            mailbox,
            event_sender,
        }
    }

    /// One scheduler pass over every reminder-eligible order, id ascending.
    /// A failure on one order is logged and does not block the rest.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<ReminderRunReport, ServiceError> {
        let eligible = order::Entity::find()
            .filter(order::Column::Status.is_in([
                OrderStatus::Pending.to_string(),
                OrderStatus::ReminderSent.to_string(),
            ]))
            .filter(order::Column::RemindersSent.lt(MAX_REMINDERS))
            .order_by_asc(order::Column::Id)
            .all(&*self.db)
            .await?;

        info!(count = eligible.len(), "orders to remind");
        let mut report = ReminderRunReport {
            examined: eligible.len(),
            ..Default::default()
        };

        for order_model in eligible {
            let order_id = order_model.id.clone();
            match self.remind(order_model).await {
                Ok(true) => report.sent += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(%order_id, error = %e, "reminder failed, continuing with next order");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Sends one reminder for one order. Returns false when the order became
    /// ineligible between selection and locking.
    async fn remind(&self, order_model: order::Model) -> Result<bool, ServiceError> {
        let order_id = order_model.id.clone();
        let _guard = self.locks.acquire(&order_id).await;

        // Re-read under the lock: a concurrent confirmation may have paid it
        let Some(order_model) = order::Entity::find_by_id(order_id.as_str())
            .one(&*self.db)
            .await?
        else {
            return Ok(false);
        };
        let status = OrderStatus::parse(&order_model.status)?;
        if !status.is_awaiting_payment() || order_model.reminders_sent >= MAX_REMINDERS {
            return Ok(false);
        }

        // The third reminder promotes to a 15% discount, mutating the
        // stored total before the session is re-minted
        let is_discount = order_model.reminders_sent == 2;
        let total = if is_discount {
            let discounted = round_usd(order_model.total * dec!(0.85));
            info!(%order_id, %discounted, "discount price applied");
            discounted
        } else {
            order_model.total
        };

        let customer = customer::Entity::find_by_id(order_model.customer_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Customer {} not found", order_model.customer_id))
            })?;

        let set = product_set::Entity::find_by_id(order_model.set_id)
            .one(&*self.db)
            .await?;
        let set_name = set.map(|s| s.name).unwrap_or_else(|| "set".to_string());

        let (title, description) = crate::services::orders::checkout_copy(
            &set_name,
            order_model.colors_num,
            &customer.email,
            &order_model.full_name,
        );
        let (kind, session) = self
            .linker
            .mint_session(&order_id, &title, total, &description)
            .await
            .map_err(|e| ServiceError::PaymentProvider(e.to_string()))?;

        let mut subject = "Don't forget to pay for your order!".to_string();
        let mut texts = vec![
            "You have an order pending payment.".to_string(),
            "You are one step away from getting your dream set! Click here to finish the process."
                .to_string(),
        ];
        let mut cta_text = "Pay now".to_string();
        if is_discount {
            subject += " - 15% discount";
            texts.push("Just for you, we are offering a 15% discount on your order.".to_string());
            cta_text += " with 15% discount";
        }

        self.mailbox
            .deliver(
                EmailPayload::new(subject, customer.email.clone())
                    .greeting(customer.first_name.clone(), customer.last_name.clone())
                    .texts(texts)
                    .cta(cta_text, session.redirect_url.clone()),
            )
            .await;

        info!(%order_id, email = %customer.email, "reminder sent");

        // Persist: discounted total, fresh session, status and counter
        let attempt = order_model.reminders_sent + 1;
        let mut active: order::ActiveModel = order_model.into();
        active.total = Set(total);
        active.payment_link = Set(Some(session.redirect_url));
        active.checkout_handle = Set(Some(session.handle));
        active.payment_provider = Set(Some(kind.to_string()));
        active.status = Set(OrderStatus::ReminderSent.to_string());
        active.reminders_sent = Set(attempt);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        if let Err(e) = self
            .event_sender
            .send(Event::ReminderSent {
                order_id: order_id.clone(),
                attempt,
                discounted: is_discount,
            })
            .await
        {
            warn!(%order_id, error = %e, "failed to publish reminder event");
        }

        Ok(true)
    }
}
