// src/db/user.rs

use log::info;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db::error::StoreError;
use crate::db::record_store::RecordStore;
use crate::db::schema::USER;

/// Профиль пользователя (без пароля).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
}

#[derive(Clone)]
pub struct UserRepo {
    store: RecordStore,
}

impl UserRepo {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        self.store.read_one_as(USER.name, id).await
    }

    /// Сохраняет профиль. Старый профиль с тем же email, но другим id, заменяется.
    pub async fn save_user(&self, user: &User) -> Result<(), StoreError> {
        if let Some(stale) = self.find_by_email(&user.email).await? {
            if stale.id != user.id {
                self.store.remove(USER.name, stale.id).await?;
                info!("replaced stale profile {} with {}", stale.id, user.id);
            }
        }
        self.store.upsert_as(USER.name, user).await?;
        Ok(())
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let found: Vec<User> = self
            .store
            .query_by_index_as(USER.name, "email", &json!(email))
            .await?;
        Ok(found.into_iter().next())
    }

    /// Удаляет все профили.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store.replace_all(USER.name, Vec::new()).await?;
        info!("user collection cleared");
        Ok(())
    }
}
