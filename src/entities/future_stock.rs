use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Scheduled replenishment of the stock counter. `added` flips false→true
/// exactly once, when the restock job admits the batch.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "future_stocks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub amount: i32,
    pub scheduled_at: DateTime<Utc>,
    pub added: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::stock_subscription::Entity")]
    Subscriptions,
}

impl Related<super::stock_subscription::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subscriptions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
