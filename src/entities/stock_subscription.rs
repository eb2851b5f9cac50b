use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Restock-notification subscription, unique per (customer, future_stock).
/// `active` may toggle; `notified` is monotonic false→true.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_subscriptions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub customer_id: i32,
    pub future_stock_id: i32,
    pub active: bool,
    pub notified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
    #[sea_orm(
        belongs_to = "super::future_stock::Entity",
        from = "Column::FutureStockId",
        to = "super::future_stock::Column::Id"
    )]
    FutureStock,
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl Related<super::future_stock::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FutureStock.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
