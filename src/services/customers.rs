use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::db::DbPool;
use crate::entities::customer;
use crate::errors::ServiceError;

/// Customer lookup and implicit provisioning. Accounts created here start
/// inactive, staff-flagged and marked `created_by_order`; they gain a
/// randomised password the owner resets later.
#[derive(Clone)]
pub struct CustomerService {
    db: Arc<DbPool>,
}

impl CustomerService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<customer::Model>, ServiceError> {
        Ok(customer::Entity::find()
            .filter(customer::Column::Email.eq(email))
            .one(&*self.db)
            .await?)
    }

    pub async fn get_by_id(&self, id: i32) -> Result<customer::Model, ServiceError> {
        customer::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Customer {} not found", id)))
    }

    /// Finds a customer by email or provisions one. Returns the customer and
    /// whether it was created by this call.
    #[instrument(skip(self), fields(email = %email))]
    pub async fn get_or_create(&self, email: &str) -> Result<(customer::Model, bool), ServiceError> {
        if let Some(existing) = self.find_by_email(email).await? {
            return Ok((existing, false));
        }

        let now = Utc::now();
        let created = customer::ActiveModel {
            email: Set(email.to_string()),
            first_name: Set(String::new()),
            last_name: Set(String::new()),
            password_hash: Set(random_password_hash()),
            active: Set(false),
            staff: Set(true),
            created_by_order: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        info!(customer_id = created.id, "customer provisioned from order intake");
        Ok((created, true))
    }
}

fn random_password_hash() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_password_hashes_are_unique() {
        let a = random_password_hash();
        let b = random_password_hash();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
