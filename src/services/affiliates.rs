use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::str::FromStr;
use std::sync::Arc;
use strum::{Display, EnumString};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::entities::{affiliate, affiliate_payment, customer, order, promo_code, promo_code_type};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::mailer::{EmailPayload, Mailbox};
use crate::services::intake::commission_amount;
use crate::services::orders::OrderStatus;

/// Affiliate payout status. PENDING→COMPLETED debits the balance,
/// COMPLETED→PENDING restores it; the amount never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum PaymentStatus {
    #[strum(serialize = "PENDING")]
    Pending,
    #[strum(serialize = "COMPLETED")]
    Completed,
}

impl PaymentStatus {
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        PaymentStatus::from_str(raw).map_err(|_| {
            ServiceError::ValidationError(format!("Unknown payment status: {}", raw))
        })
    }
}

/// Affiliate settlement: commission crediting, payouts, promo-code
/// provisioning and the admin balance notification job.
#[derive(Clone)]
pub struct AffiliateService {
    db: Arc<DbPool>,
    config: AppConfig,
    mailbox: Mailbox,
    event_sender: EventSender,
}

impl AffiliateService {
    pub fn new(
        db: Arc<DbPool>,
        config: AppConfig,
        mailbox: Mailbox,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            config,
            mailbox,
            event_sender,
        }
    }

    pub async fn get(&self, affiliate_id: i32) -> Result<affiliate::Model, ServiceError> {
        affiliate::Entity::find_by_id(affiliate_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Affiliate {} not found", affiliate_id)))
    }

    pub async fn find_by_promo_code<C: ConnectionTrait>(
        &self,
        db: &C,
        promo_code_id: i32,
    ) -> Result<Option<affiliate::Model>, ServiceError> {
        Ok(affiliate::Entity::find()
            .filter(affiliate::Column::PromoCodeId.eq(promo_code_id))
            .one(db)
            .await?)
    }

    /// Credits the commission for a freshly paid order, if its promo code
    /// belongs to an affiliate. Runs on the caller's connection so the
    /// confirmation pipeline keeps it inside the paying transaction; the
    /// caller gates it on "status was not Paid before", making it write-once.
    pub async fn credit_for_order<C: ConnectionTrait>(
        &self,
        db: &C,
        paid_order: &order::Model,
    ) -> Result<Option<(i32, Decimal)>, ServiceError> {
        let Some(promo_code_id) = paid_order.promo_code_id else {
            return Ok(None);
        };
        let Some(affiliate) = self.find_by_promo_code(db, promo_code_id).await? else {
            return Ok(None);
        };

        let amount = commission_amount(paid_order.total, self.config.affiliates_commission);
        let affiliate_id = affiliate.id;
        let new_balance = affiliate.balance + amount;

        let mut active: affiliate::ActiveModel = affiliate.into();
        active.balance = Set(new_balance);
        active.updated_at = Set(Utc::now());
        active.update(db).await?;

        info!(
            affiliate_id,
            order_id = %paid_order.id,
            %amount,
            "affiliate commission credited"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::AffiliateCredited {
                affiliate_id,
                order_id: paid_order.id.clone(),
                amount,
            })
            .await
        {
            warn!(affiliate_id, error = %e, "failed to publish affiliate credit event");
        }

        Ok(Some((affiliate_id, amount)))
    }

    /// Creates a payout. A payout born `COMPLETED` debits the balance
    /// immediately.
    #[instrument(skip(self), fields(affiliate_id = affiliate_id, %amount))]
    pub async fn create_payment(
        &self,
        affiliate_id: i32,
        amount: Decimal,
        status: PaymentStatus,
    ) -> Result<affiliate_payment::Model, ServiceError> {
        if amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Payment amount must be positive".into(),
            ));
        }

        let txn = self.db.begin().await?;

        let affiliate = affiliate::Entity::find_by_id(affiliate_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Affiliate {} not found", affiliate_id))
            })?;

        let now = Utc::now();
        let payment = affiliate_payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            affiliate_id: Set(affiliate_id),
            amount: Set(amount),
            date: Set(now),
            status: Set(status.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        if status == PaymentStatus::Completed {
            let new_balance = affiliate.balance - amount;
            let mut active: affiliate::ActiveModel = affiliate.into();
            active.balance = Set(new_balance);
            active.updated_at = Set(now);
            active.update(&txn).await?;
        }

        txn.commit().await?;

        if status == PaymentStatus::Completed {
            if let Err(e) = self
                .event_sender
                .send(Event::AffiliatePaymentApplied {
                    affiliate_id,
                    amount,
                })
                .await
            {
                warn!(affiliate_id, error = %e, "failed to publish payment event");
            }
        }

        info!(payment_id = %payment.id, status = %status, "affiliate payment created");
        Ok(payment)
    }

    /// Transitions a payout between PENDING and COMPLETED. The balance moves
    /// only when the status actually changes, preventing double-apply.
    #[instrument(skip(self), fields(payment_id = %payment_id, to = %to))]
    pub async fn set_payment_status(
        &self,
        payment_id: Uuid,
        to: PaymentStatus,
    ) -> Result<affiliate_payment::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let payment = affiliate_payment::Entity::find_by_id(payment_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", payment_id)))?;

        let from = PaymentStatus::parse(&payment.status)?;
        if from == to {
            txn.commit().await?;
            return Ok(payment);
        }

        let affiliate = affiliate::Entity::find_by_id(payment.affiliate_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Affiliate {} not found", payment.affiliate_id))
            })?;

        let now = Utc::now();
        let amount = payment.amount;
        let affiliate_id = affiliate.id;

        let new_balance = match to {
            PaymentStatus::Completed => affiliate.balance - amount,
            PaymentStatus::Pending => affiliate.balance + amount,
        };
        let mut affiliate_active: affiliate::ActiveModel = affiliate.into();
        affiliate_active.balance = Set(new_balance);
        affiliate_active.updated_at = Set(now);
        affiliate_active.update(&txn).await?;

        let mut payment_active: affiliate_payment::ActiveModel = payment.into();
        payment_active.status = Set(to.to_string());
        payment_active.updated_at = Set(now);
        let updated = payment_active.update(&txn).await?;

        txn.commit().await?;

        let event = match to {
            PaymentStatus::Completed => Event::AffiliatePaymentApplied {
                affiliate_id,
                amount,
            },
            PaymentStatus::Pending => Event::AffiliatePaymentReverted {
                affiliate_id,
                amount,
            },
        };
        if let Err(e) = self.event_sender.send(event).await {
            warn!(affiliate_id, error = %e, "failed to publish payment event");
        }

        Ok(updated)
    }

    /// Provisions (or refreshes) the affiliate's percentage promo code, named
    /// after the customer's email, at the configured affiliate discount.
    #[instrument(skip(self), fields(affiliate_id = affiliate_id))]
    pub async fn provision_promo_code(
        &self,
        affiliate_id: i32,
    ) -> Result<promo_code::Model, ServiceError> {
        let affiliate = self.get(affiliate_id).await?;
        let owner = customer::Entity::find_by_id(affiliate.customer_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Customer {} not found", affiliate.customer_id))
            })?;

        let percentage = promo_code_type::Entity::find()
            .filter(promo_code_type::Column::Name.eq("percentage"))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::Configuration("promo code type 'percentage' is not seeded".into())
            })?;

        let existing = promo_code::Entity::find()
            .filter(promo_code::Column::Code.eq(owner.email.clone()))
            .one(&*self.db)
            .await?;

        let promo = match existing {
            Some(promo) => {
                let mut active: promo_code::ActiveModel = promo.into();
                active.type_id = Set(percentage.id);
                active.discount = Set(self.config.affiliates_discount);
                active.update(&*self.db).await?
            }
            None => {
                promo_code::ActiveModel {
                    code: Set(owner.email.clone()),
                    discount: Set(self.config.affiliates_discount),
                    type_id: Set(percentage.id),
                    ..Default::default()
                }
                .insert(&*self.db)
                .await?
            }
        };

        let mut affiliate_active: affiliate::ActiveModel = affiliate.into();
        affiliate_active.promo_code_id = Set(Some(promo.id));
        affiliate_active.updated_at = Set(Utc::now());
        affiliate_active.update(&*self.db).await?;

        info!(code = %promo.code, "affiliate promo code provisioned");
        Ok(promo)
    }

    /// Commission view predicate: this affiliate's orders that have reached
    /// payment, i.e. the rows a Commission screen would show.
    pub async fn commissions(&self, affiliate_id: i32) -> Result<Vec<order::Model>, ServiceError> {
        let affiliate = self.get(affiliate_id).await?;
        let Some(promo_code_id) = affiliate.promo_code_id else {
            return Ok(Vec::new());
        };

        Ok(order::Entity::find()
            .filter(order::Column::PromoCodeId.eq(promo_code_id))
            .filter(order::Column::Status.is_in([
                OrderStatus::Paid.to_string(),
                OrderStatus::Manufacturing.to_string(),
                OrderStatus::Shipped.to_string(),
                OrderStatus::Delivered.to_string(),
            ]))
            .order_by_asc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Periodic job: emails the admin one payout prompt per active affiliate
    /// holding a positive balance. The deep link seeds a COMPLETED payment.
    #[instrument(skip(self))]
    pub async fn notify_positive_balances(&self) -> Result<usize, ServiceError> {
        let affiliates = affiliate::Entity::find()
            .order_by_asc(affiliate::Column::Id)
            .all(&*self.db)
            .await?;

        let mut notified = 0;
        for affiliate in affiliates {
            let owner = customer::Entity::find_by_id(affiliate.customer_id)
                .one(&*self.db)
                .await?;
            let Some(owner) = owner else {
                warn!(affiliate_id = affiliate.id, "affiliate without customer, skipping");
                continue;
            };

            if !owner.active {
                info!(affiliate_id = affiliate.id, "affiliate inactive, skipping");
                continue;
            }
            if affiliate.balance <= Decimal::ZERO {
                info!(affiliate_id = affiliate.id, "affiliate has no balance, skipping");
                continue;
            }

            let cta_link = format!(
                "{}/admin/affiliates/payment/add/?amount={}&affiliate={}&status=COMPLETED",
                self.config.host, affiliate.balance, affiliate.id
            );

            self.mailbox
                .deliver(
                    EmailPayload::new(
                        format!("Payment Notification for {}", owner.email),
                        self.config.admin_email.clone(),
                    )
                    .greeting("Admin", "")
                    .texts(vec![
                        "Here is a payment that should be sent to the affiliate".to_string(),
                        format!("Affiliate ID: {}", affiliate.id),
                        format!("Affiliate Email: {}", owner.email),
                        format!("Amount to be paid: {}", affiliate.balance),
                        "Please review the payment details and proceed accordingly.".to_string(),
                    ])
                    .cta("Review Payment", cta_link),
                )
                .await;

            notified += 1;
        }

        info!(notified, "affiliate balance notifications sent");
        Ok(notified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_status_uses_uppercase_wire_form() {
        assert_eq!(PaymentStatus::Pending.to_string(), "PENDING");
        assert_eq!(PaymentStatus::Completed.to_string(), "COMPLETED");
        assert_eq!(
            PaymentStatus::parse("COMPLETED").unwrap(),
            PaymentStatus::Completed
        );
        assert!(PaymentStatus::parse("REFUNDED").is_err());
    }
}
