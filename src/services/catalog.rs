use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::db::DbPool;
use crate::entities::{addon, color, color_tier, product_set, promo_code, promo_code_type};
use crate::errors::ServiceError;

/// Read-mostly resolver over the catalog reference data (sets, colour tiers,
/// colours, add-ons, promo codes).
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DbPool>,
}

impl CatalogService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    pub async fn resolve_set(&self, name: &str) -> Result<product_set::Model, ServiceError> {
        product_set::Entity::find()
            .filter(product_set::Column::Name.eq(name))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::ValidationError(format!("Unknown set: {}", name)))
    }

    pub async fn resolve_tier(&self, num: i32) -> Result<color_tier::Model, ServiceError> {
        color_tier::Entity::find()
            .filter(color_tier::Column::Num.eq(num))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::ValidationError(format!("Unknown colour tier: {}", num))
            })
    }

    pub async fn resolve_color(&self, name: &str) -> Result<color::Model, ServiceError> {
        color::Entity::find()
            .filter(color::Column::Name.eq(name))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::ValidationError(format!("Unknown colour: {}", name)))
    }

    pub async fn resolve_addons(&self, names: &[String]) -> Result<Vec<addon::Model>, ServiceError> {
        let mut addons = Vec::with_capacity(names.len());
        for name in names {
            let addon = addon::Entity::find()
                .filter(addon::Column::Name.eq(name))
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!("Unknown addon: {}", name))
                })?;
            addons.push(addon);
        }
        Ok(addons)
    }

    /// Looks up a promo code together with its type. Lenient by design:
    /// an unknown code resolves to `None` rather than an error.
    pub async fn resolve_promo(
        &self,
        code: &str,
    ) -> Result<Option<(promo_code::Model, promo_code_type::Model)>, ServiceError> {
        let Some(promo) = promo_code::Entity::find()
            .filter(promo_code::Column::Code.eq(code))
            .one(&*self.db)
            .await?
        else {
            return Ok(None);
        };

        let kind = promo_code_type::Entity::find_by_id(promo.type_id)
            .one(&*self.db)
            .await?;

        Ok(kind.map(|kind| (promo, kind)))
    }

    pub async fn find_promo_by_code(
        &self,
        code: &str,
    ) -> Result<Option<promo_code::Model>, ServiceError> {
        Ok(promo_code::Entity::find()
            .filter(promo_code::Column::Code.eq(code))
            .one(&*self.db)
            .await?)
    }

    pub async fn promo_type_name(&self, type_id: i32) -> Result<String, ServiceError> {
        let kind = promo_code_type::Entity::find_by_id(type_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Promo code type not found".into()))?;
        Ok(kind.name)
    }

    /// Seeds the catalog with the store's reference data. Idempotent: rows
    /// that already exist are left alone.
    #[instrument(skip(db))]
    pub async fn seed_defaults<C: ConnectionTrait>(db: &C) -> Result<(), ServiceError> {
        let sets: &[(&str, Decimal, i32, i32, bool)] = &[
            ("basic", dec!(275), 1, 6, false),
            ("plus", dec!(330), 2, 8, true),
            ("pro", dec!(385), 3, 10, false),
        ];
        for (name, price, logos, points, recommended) in sets {
            let exists = product_set::Entity::find()
                .filter(product_set::Column::Name.eq(*name))
                .one(db)
                .await?;
            if exists.is_none() {
                product_set::ActiveModel {
                    name: Set(name.to_string()),
                    price: Set(*price),
                    logos: Set(*logos),
                    points: Set(*points),
                    recommended: Set(*recommended),
                    ..Default::default()
                }
                .insert(db)
                .await?;
            }
        }

        let tiers: &[(i32, Decimal, &str)] = &[
            (1, dec!(0), "Single colour set"),
            (2, dec!(10), "Set colour plus one logo colour"),
            (3, dec!(15), "Set colour plus two logo colours"),
            (4, dec!(20), "Set colour plus three logo colours"),
        ];
        for (num, price, details) in tiers {
            let exists = color_tier::Entity::find()
                .filter(color_tier::Column::Num.eq(*num))
                .one(db)
                .await?;
            if exists.is_none() {
                color_tier::ActiveModel {
                    num: Set(*num),
                    price: Set(*price),
                    details: Set(details.to_string()),
                    ..Default::default()
                }
                .insert(db)
                .await?;
            }
        }

        for name in [
            "blue", "white", "red", "black", "green", "purple", "yellow", "pink",
        ] {
            let exists = color::Entity::find()
                .filter(color::Column::Name.eq(name))
                .one(db)
                .await?;
            if exists.is_none() {
                color::ActiveModel {
                    name: Set(name.to_string()),
                    ..Default::default()
                }
                .insert(db)
                .await?;
            }
        }

        let addons: &[(&str, Decimal)] = &[
            ("Straps", dec!(15)),
            ("Wifi 2.4ghz USB Dongle", dec!(24)),
            ("Hard Case", dec!(30)),
            ("Charging Dock", dec!(35)),
        ];
        for (name, price) in addons {
            let exists = addon::Entity::find()
                .filter(addon::Column::Name.eq(*name))
                .one(db)
                .await?;
            if exists.is_none() {
                addon::ActiveModel {
                    name: Set(name.to_string()),
                    price: Set(*price),
                    ..Default::default()
                }
                .insert(db)
                .await?;
            }
        }

        for name in ["amount", "percentage"] {
            let exists = promo_code_type::Entity::find()
                .filter(promo_code_type::Column::Name.eq(name))
                .one(db)
                .await?;
            if exists.is_none() {
                promo_code_type::ActiveModel {
                    name: Set(name.to_string()),
                    ..Default::default()
                }
                .insert(db)
                .await?;
            }
        }

        info!("catalog reference data seeded");
        Ok(())
    }
}
