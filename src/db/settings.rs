// src/db/settings.rs

use log::{debug, error};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::cache::SettingsCache;
use crate::db::error::StoreError;
use crate::db::record_store::RecordStore;
use crate::db::schema::SETTINGS;

pub const DEFAULT_CURRENCY: &str = "CNY";
pub const DEFAULT_THEME: &str = "light";
pub const DEFAULT_REMINDER_DAYS: u32 = 3;

/// Запись коллекции `settings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: Value,
}

#[derive(Clone)]
pub struct SettingsRepo {
    store: RecordStore,
    cache: SettingsCache,
}

impl SettingsRepo {
    pub fn new(store: RecordStore, cache_capacity: usize) -> Self {
        Self {
            store,
            cache: SettingsCache::new(cache_capacity),
        }
    }

    /// Значение настройки. `None`, если её нет или чтение упало (ошибка логируется).
    pub async fn get_setting(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.cache.get(key) {
            debug!("setting '{key}' served from cache");
            return Some(value);
        }

        match self.store.read_one_as::<Setting>(SETTINGS.name, key).await {
            Ok(Some(setting)) => {
                self.cache.put(key, setting.value.clone());
                Some(setting.value)
            }
            Ok(None) => None,
            Err(e) => {
                error!("failed to read setting '{key}': {}", e);
                None
            }
        }
    }

    pub async fn save_setting(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let setting = Setting {
            key: key.to_string(),
            value,
        };
        match self.store.upsert_as(SETTINGS.name, &setting).await {
            Ok(_) => {
                self.cache.put(key, setting.value);
                Ok(())
            }
            Err(e) => {
                self.cache.invalidate(key);
                Err(e)
            }
        }
    }

    pub async fn currency(&self) -> String {
        self.get_setting("currency")
            .await
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
    }

    pub async fn theme(&self) -> String {
        self.get_setting("theme")
            .await
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_THEME.to_string())
    }

    pub async fn reminder_days(&self) -> u32 {
        self.get_setting("reminderDays")
            .await
            .and_then(|v| v.as_u64())
            .and_then(|d| u32::try_from(d).ok())
            .unwrap_or(DEFAULT_REMINDER_DAYS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::db::Database;
    use serde_json::json;

    fn setup_test_repo() -> (SettingsRepo, RecordStore) {
        let store = RecordStore::new(Database::new(StoreConfig::in_memory()));
        (SettingsRepo::new(store.clone(), 8), store)
    }

    #[tokio::test]
    async fn test_defaults_after_migration() {
        let (repo, _) = setup_test_repo();
        assert_eq!(repo.currency().await, "CNY");
        assert_eq!(repo.theme().await, "light");
        assert_eq!(repo.reminder_days().await, 3);
    }

    #[tokio::test]
    async fn test_save_and_get_setting() {
        let (repo, store) = setup_test_repo();
        repo.save_setting("theme", json!("dark")).await.expect("save");
        assert_eq!(repo.theme().await, "dark");

        let stored: Option<Setting> = store.read_one_as(SETTINGS.name, "theme").await.expect("read");
        assert_eq!(stored.map(|s| s.value), Some(json!("dark")));
    }

    #[tokio::test]
    async fn test_missing_setting_is_none() {
        let (repo, _) = setup_test_repo();
        assert!(repo.get_setting("language").await.is_none());
    }

    #[tokio::test]
    async fn test_read_failure_is_logged_as_none() {
        let (repo, store) = setup_test_repo();
        // Запись без поля value не парсится в Setting
        store
            .upsert(SETTINGS.name, json!({"key": "broken"}))
            .await
            .expect("raw upsert");
        assert!(repo.get_setting("broken").await.is_none());
    }

    #[tokio::test]
    async fn test_cache_serves_repeated_reads() {
        let (repo, store) = setup_test_repo();
        assert_eq!(repo.get_setting("currency").await, Some(json!("CNY")));
        // Запись в обход репозитория не видна, пока значение в кэше
        store
            .upsert(SETTINGS.name, json!({"key": "currency", "value": "USD"}))
            .await
            .expect("raw upsert");
        assert_eq!(repo.get_setting("currency").await, Some(json!("CNY")));

        repo.save_setting("currency", json!("USD")).await.expect("save");
        assert_eq!(repo.currency().await, "USD");
    }
}
