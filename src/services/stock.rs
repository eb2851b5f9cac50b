use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::entities::{customer, future_stock, stock_subscription};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::mailer::{EmailPayload, Mailbox};
use crate::services::customers::CustomerService;
use crate::services::{read_status_int, write_status_int};

const CURRENT_STOCK_KEY: &str = "current_stock";
/// Fixed grace added to the restock countdown.
const COUNTDOWN_GRACE_SECS: i64 = 10 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionMode {
    Add,
    Remove,
}

impl SubscriptionMode {
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        match raw {
            "add" => Ok(SubscriptionMode::Add),
            "remove" => Ok(SubscriptionMode::Remove),
            other => Err(ServiceError::ValidationError(format!(
                "Invalid subscription type: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CountdownView {
    pub next_future_stock: i64,
    pub already_subscribed: bool,
}

#[derive(Debug, Default)]
pub struct PromoteReport {
    pub promoted: usize,
    pub notified: usize,
}

/// Stock & Restock Controller: owns the scalar `current_stock`, admits
/// scheduled `FutureStock` batches and fans out subscriber notifications.
#[derive(Clone)]
pub struct StockService {
    db: Arc<DbPool>,
    config: AppConfig,
    customers: Arc<CustomerService>,
    mailbox: Mailbox,
    event_sender: EventSender,
}

impl StockService {
    pub fn new(
        db: Arc<DbPool>,
        config: AppConfig,
        customers: Arc<CustomerService>,
        mailbox: Mailbox,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            config,
            customers,
            mailbox,
            event_sender,
        }
    }

    /// Reads the scalar counter, auto-initialising it to 0 on first access.
    pub async fn current_stock(&self) -> Result<i64, ServiceError> {
        read_status_int(&*self.db, CURRENT_STOCK_KEY, 0).await
    }

    /// Decrements the counter by one, clamped at zero. Runs on the caller's
    /// connection so the confirmation pipeline can keep it inside its
    /// transaction. Overselling is visible (warned) but not blocked.
    pub async fn decrement_on<C: ConnectionTrait>(
        &self,
        db: &C,
        order_id: &str,
    ) -> Result<i64, ServiceError> {
        let current = read_status_int(db, CURRENT_STOCK_KEY, 0).await?;
        let remaining = if current > 0 {
            current - 1
        } else {
            warn!(%order_id, "stock decrement with counter already at zero");
            0
        };
        write_status_int(db, CURRENT_STOCK_KEY, remaining).await?;

        if let Err(e) = self
            .event_sender
            .send(Event::StockDecremented {
                order_id: order_id.to_string(),
                remaining,
            })
            .await
        {
            warn!(%order_id, error = %e, "failed to publish stock event");
        }
        Ok(remaining)
    }

    /// Adds `amount` to the counter (restock path).
    pub async fn add_stock(&self, amount: i64) -> Result<i64, ServiceError> {
        let current = read_status_int(&*self.db, CURRENT_STOCK_KEY, 0).await?;
        let total = current + amount;
        write_status_int(&*self.db, CURRENT_STOCK_KEY, total).await?;
        Ok(total)
    }

    /// Periodic restock job: admits every due `FutureStock` batch in
    /// ascending schedule order, then notifies active, un-notified
    /// subscribers once each.
    #[instrument(skip(self))]
    pub async fn promote_future_stocks(&self) -> Result<PromoteReport, ServiceError> {
        let now = Utc::now();
        let due = future_stock::Entity::find()
            .filter(future_stock::Column::Added.eq(false))
            .filter(future_stock::Column::ScheduledAt.lte(now))
            .order_by_asc(future_stock::Column::ScheduledAt)
            .all(&*self.db)
            .await?;

        info!(count = due.len(), "future stocks to add");
        let mut report = PromoteReport::default();

        for batch in due {
            let batch_id = batch.id;
            let amount = batch.amount;

            let total = self.add_stock(amount as i64).await?;

            let mut active: future_stock::ActiveModel = batch.into();
            active.added = Set(true);
            active.updated_at = Set(Utc::now());
            active.update(&*self.db).await?;

            info!(future_stock_id = batch_id, amount, total, "stock updated");
            report.promoted += 1;

            if let Err(e) = self
                .event_sender
                .send(Event::StockReplenished {
                    future_stock_id: batch_id,
                    amount,
                    total,
                })
                .await
            {
                warn!(future_stock_id = batch_id, error = %e, "failed to publish restock event");
            }

            report.notified += self.notify_subscribers(batch_id).await?;
        }

        Ok(report)
    }

    async fn notify_subscribers(&self, future_stock_id: i32) -> Result<usize, ServiceError> {
        let subscriptions = stock_subscription::Entity::find()
            .filter(stock_subscription::Column::FutureStockId.eq(future_stock_id))
            .filter(stock_subscription::Column::Active.eq(true))
            .filter(stock_subscription::Column::Notified.eq(false))
            .all(&*self.db)
            .await?;

        let mut notified = 0;
        for subscription in subscriptions {
            let customer = customer::Entity::find_by_id(subscription.customer_id)
                .one(&*self.db)
                .await?;
            let Some(customer) = customer else {
                warn!(
                    subscription_id = subscription.id,
                    "subscription without customer, skipping"
                );
                continue;
            };

            self.mailbox
                .deliver(
                    EmailPayload::new("New sets available now!", customer.email.clone())
                        .greeting(customer.first_name.clone(), customer.last_name.clone())
                        .texts(vec![
                            "We have added new sets to our store.".to_string(),
                            "Check them out now!".to_string(),
                        ])
                        .cta("Buy now", format!("{}#buy-form", self.config.landing_host)),
                )
                .await;

            let mut active: stock_subscription::ActiveModel = subscription.into();
            active.notified = Set(true);
            active.updated_at = Set(Utc::now());
            active.update(&*self.db).await?;

            if let Err(e) = self
                .event_sender
                .send(Event::SubscriptionNotified {
                    customer_email: customer.email.clone(),
                    future_stock_id,
                })
                .await
            {
                warn!(error = %e, "failed to publish subscription event");
            }

            info!(email = %customer.email, "restock email sent");
            notified += 1;
        }
        Ok(notified)
    }

    /// Subscribes or unsubscribes an email for the next restock.
    #[instrument(skip(self), fields(email = %email))]
    pub async fn subscribe(
        &self,
        email: &str,
        mode: SubscriptionMode,
    ) -> Result<(), ServiceError> {
        match mode {
            SubscriptionMode::Add => self.subscribe_add(email).await,
            SubscriptionMode::Remove => self.subscribe_remove(email).await,
        }
    }

    async fn subscribe_add(&self, email: &str) -> Result<(), ServiceError> {
        let (customer, _) = self.customers.get_or_create(email).await?;

        let next = self
            .next_pending_future_stock()
            .await?
            .ok_or_else(|| ServiceError::NotFound("No future stock scheduled".into()))?;

        let existing = stock_subscription::Entity::find()
            .filter(stock_subscription::Column::CustomerId.eq(customer.id))
            .filter(stock_subscription::Column::FutureStockId.eq(next.id))
            .one(&*self.db)
            .await?;

        match existing {
            // Reactivate rather than duplicate: (customer, future_stock) is unique
            Some(subscription) => {
                if !subscription.active {
                    let mut active: stock_subscription::ActiveModel = subscription.into();
                    active.active = Set(true);
                    active.updated_at = Set(Utc::now());
                    active.update(&*self.db).await?;
                }
            }
            None => {
                let now = Utc::now();
                stock_subscription::ActiveModel {
                    customer_id: Set(customer.id),
                    future_stock_id: Set(next.id),
                    active: Set(true),
                    notified: Set(false),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(&*self.db)
                .await?;
            }
        }

        info!(%email, "restock subscription active");
        Ok(())
    }

    async fn subscribe_remove(&self, email: &str) -> Result<(), ServiceError> {
        let customer = self
            .customers
            .find_by_email(email)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Subscription not found".into()))?;

        let pending_ids: Vec<i32> = future_stock::Entity::find()
            .filter(future_stock::Column::Added.eq(false))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|fs| fs.id)
            .collect();

        let subscriptions = stock_subscription::Entity::find()
            .filter(stock_subscription::Column::CustomerId.eq(customer.id))
            .filter(stock_subscription::Column::FutureStockId.is_in(pending_ids))
            .all(&*self.db)
            .await?;

        if subscriptions.is_empty() {
            return Err(ServiceError::NotFound("Subscription not found".into()));
        }

        for subscription in subscriptions {
            let mut active: stock_subscription::ActiveModel = subscription.into();
            active.active = Set(false);
            active.updated_at = Set(Utc::now());
            active.update(&*self.db).await?;
        }

        info!(%email, "restock subscription deactivated");
        Ok(())
    }

    /// Countdown view: seconds until the next non-added batch plus a fixed
    /// 10-minute grace, zero when nothing is scheduled, plus whether the
    /// supplied email already holds an active subscription on that batch.
    pub async fn next_future_stock(
        &self,
        email: Option<&str>,
    ) -> Result<CountdownView, ServiceError> {
        let next = self.next_pending_future_stock().await?;
        let now = Utc::now();

        let (mut seconds, batch_id) = match &next {
            Some(batch) => ((batch.scheduled_at - now).num_seconds(), Some(batch.id)),
            None => (0, None),
        };
        if seconds != 0 {
            seconds += COUNTDOWN_GRACE_SECS;
        }

        let mut already_subscribed = false;
        if let (Some(email), Some(batch_id)) = (email, batch_id) {
            if let Some(customer) = self.customers.find_by_email(email).await? {
                already_subscribed = stock_subscription::Entity::find()
                    .filter(stock_subscription::Column::CustomerId.eq(customer.id))
                    .filter(stock_subscription::Column::FutureStockId.eq(batch_id))
                    .filter(stock_subscription::Column::Active.eq(true))
                    .one(&*self.db)
                    .await?
                    .is_some();
            }
        }

        Ok(CountdownView {
            next_future_stock: seconds,
            already_subscribed,
        })
    }

    async fn next_pending_future_stock(
        &self,
    ) -> Result<Option<future_stock::Model>, ServiceError> {
        Ok(future_stock::Entity::find()
            .filter(future_stock::Column::Added.eq(false))
            .order_by_asc(future_stock::Column::ScheduledAt)
            .one(&*self.db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_mode_parses_the_two_documented_values() {
        assert_eq!(
            SubscriptionMode::parse("add").unwrap(),
            SubscriptionMode::Add
        );
        assert_eq!(
            SubscriptionMode::parse("remove").unwrap(),
            SubscriptionMode::Remove
        );
        assert!(SubscriptionMode::parse("toggle").is_err());
    }
}
