use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::entities::user::{self, UserRole};
use crate::errors::ServiceError;
use crate::repositories::Store;

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn Store>,
}

impl UserService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Registers a user. Emails are stored lowercased and must be unique.
    pub async fn create(
        &self,
        name: String,
        email: String,
        role: UserRole,
        active: bool,
    ) -> Result<user::Model, ServiceError> {
        let email = email.trim().to_lowercase();
        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "a user with email {email} already exists"
            )));
        }
        let user = self
            .store
            .insert_user(user::Model {
                id: Uuid::new_v4(),
                name: name.trim().to_string(),
                email,
                role,
                active,
                created_at: Utc::now(),
            })
            .await?;
        info!(user_id = %user.id, role = ?user.role, "user created");
        Ok(user)
    }

    pub async fn list(&self) -> Result<Vec<user::Model>, ServiceError> {
        self.store.list_users().await
    }
}
