use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};

use crate::entities::store_status;
use crate::errors::ServiceError;

pub mod affiliates;
pub mod catalog;
pub mod confirmation;
pub mod customers;
pub mod intake;
pub mod invoicing;
pub mod lock;
pub mod orders;
pub mod reminders;
pub mod stock;

/// Rounds a USD amount to 2 dp, half away from zero.
pub fn round_usd(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Truncates a USD amount to whole cents (used for affiliate commissions).
pub fn trunc_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

/// Reads an integer counter from the `store_status` K/V table,
/// auto-initialising the row to `default` on first access.
pub(crate) async fn read_status_int<C: ConnectionTrait>(
    db: &C,
    key: &str,
    default: i64,
) -> Result<i64, ServiceError> {
    let row = store_status::Entity::find()
        .filter(store_status::Column::Key.eq(key))
        .one(db)
        .await?;

    match row {
        Some(row) => row
            .value
            .trim()
            .parse::<i64>()
            .map_err(|_| ServiceError::Configuration(format!("store_status.{} is not an integer", key))),
        None => {
            let now = chrono::Utc::now();
            store_status::ActiveModel {
                key: Set(key.to_string()),
                value: Set(default.to_string()),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(db)
            .await?;
            Ok(default)
        }
    }
}

/// Writes an integer counter to the `store_status` K/V table. The row is
/// created if missing.
pub(crate) async fn write_status_int<C: ConnectionTrait>(
    db: &C,
    key: &str,
    value: i64,
) -> Result<(), ServiceError> {
    let now = chrono::Utc::now();
    let row = store_status::Entity::find()
        .filter(store_status::Column::Key.eq(key))
        .one(db)
        .await?;

    match row {
        Some(row) => {
            let mut active: store_status::ActiveModel = row.into();
            active.value = Set(value.to_string());
            active.updated_at = Set(now);
            active.update(db).await?;
        }
        None => {
            store_status::ActiveModel {
                key: Set(key.to_string()),
                value: Set(value.to_string()),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(db)
            .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn round_usd_is_half_away_from_zero() {
        assert_eq!(round_usd(dec!(300.605)), dec!(300.61));
        assert_eq!(round_usd(dec!(300.604)), dec!(300.60));
        assert_eq!(round_usd(dec!(-1.005)), dec!(-1.01));
    }

    #[test]
    fn trunc_cents_never_rounds_up() {
        assert_eq!(trunc_cents(dec!(33.459)), dec!(33.45));
        assert_eq!(trunc_cents(dec!(33.451)), dec!(33.45));
        assert_eq!(trunc_cents(dec!(33.40)), dec!(33.40));
    }
}
