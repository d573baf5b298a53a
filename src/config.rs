// src/config.rs

use serde::Deserialize;
use std::env;
use std::path::PathBuf;

pub const IN_MEMORY: &str = ":memory:";

/// Параметры хранилища.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Путь к файлу SQLite или `:memory:`.
    pub path: PathBuf,
    /// Ёмкость LRU-кэша настроек.
    pub settings_cache_capacity: usize,
    /// Сколько дней хранить завершённые элементы очереди синхронизации.
    pub queue_retention_days: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("renqing.sqlite3"),
            settings_cache_capacity: 32,
            queue_retention_days: 7,
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::from(IN_MEMORY),
            ..Self::default()
        }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == IN_MEMORY
    }

    /// Читает `RENQING_DB_PATH`, `RENQING_SETTINGS_CACHE`, `RENQING_QUEUE_RETENTION_DAYS`.
    /// Непарсящиеся значения игнорируются (остаётся значение по умолчанию).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(path) = lookup("RENQING_DB_PATH") {
            config.path = PathBuf::from(path);
        }
        if let Some(capacity) = lookup("RENQING_SETTINGS_CACHE").and_then(|v| v.parse().ok()) {
            config.settings_cache_capacity = capacity;
        }
        if let Some(days) = lookup("RENQING_QUEUE_RETENTION_DAYS").and_then(|v| v.parse().ok()) {
            config.queue_retention_days = days;
        }
        config
    }
}
