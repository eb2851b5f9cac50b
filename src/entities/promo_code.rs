use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "promo_codes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub code: String,
    pub discount: Decimal,
    pub type_id: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::promo_code_type::Entity",
        from = "Column::TypeId",
        to = "super::promo_code_type::Column::Id"
    )]
    PromoCodeType,
    #[sea_orm(has_many = "super::order::Entity")]
    Orders,
}

impl Related<super::promo_code_type::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PromoCodeType.def()
    }
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
