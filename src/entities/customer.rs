use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Store customer. The email doubles as the username; accounts provisioned by
/// Intake start inactive and flagged `created_by_order`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "customers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub email: String,

    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub active: bool,
    pub staff: bool,
    pub created_by_order: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order::Entity")]
    Orders,
    #[sea_orm(has_many = "super::stock_subscription::Entity")]
    StockSubscriptions,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl Related<super::stock_subscription::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockSubscriptions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
