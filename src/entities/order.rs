use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A single customer's request for one configured product.
///
/// The id is a 12-hex-character opaque string minted at creation. Colour slot
/// K is populated iff `colors_num >= K`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub customer_id: i32,
    pub set_id: i32,
    pub colors_num: i32,
    pub set_color_id: i32,
    pub logo_color_1_id: Option<i32>,
    pub logo_color_2_id: Option<i32>,
    pub logo_color_3_id: Option<i32>,
    pub promo_code_id: Option<i32>,

    /// Object-store handle of the uploaded logo (png or svg)
    pub logo: Option<String>,

    pub full_name: String,
    pub country: String,
    pub state: String,
    pub city: String,
    pub postal_code: String,
    pub street_address: String,
    pub phone: String,
    pub comments: Option<String>,

    /// Order total in USD, 2 dp; re-derived on re-intake and mutated by the
    /// third reminder discount.
    pub total: Decimal,

    pub status: String,
    pub reminders_sent: i32,

    /// Customer-facing checkout URL for the active provider session
    pub payment_link: Option<String>,
    /// Opaque provider session handle consulted by `is_paid`
    pub checkout_handle: Option<String>,
    /// Provider that minted the active session ("paypal" | "stripe" | "testing")
    pub payment_provider: Option<String>,

    pub tracking_number: Option<String>,
    pub invoice_file: Option<String>,

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
        belongs_to = "super::product_set::Entity",
        from = "Column::SetId",
        to = "super::product_set::Column::Id"
    )]
    ProductSet,
    #[sea_orm(
        belongs_to = "super::promo_code::Entity",
        from = "Column::PromoCodeId",
        to = "super::promo_code::Column::Id"
    )]
    PromoCode,
    #[sea_orm(has_many = "super::order_addon::Entity")]
    OrderAddons,
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl Related<super::product_set::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductSet.def()
    }
}

impl Related<super::promo_code::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PromoCode.def()
    }
}

impl Related<super::order_addon::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderAddons.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
