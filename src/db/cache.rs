// src/db/cache.rs

use lru::LruCache;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

/// LRU-кэш значений настроек (ключ настройки -> JSON-значение).
#[derive(Clone)]
pub struct SettingsCache {
    entries: Arc<Mutex<LruCache<String, Value>>>,
}

impl SettingsCache {
    /// Нулевая ёмкость превращается в 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    pub fn put(&self, key: &str, value: Value) {
        self.lock().put(key.to_string(), value);
    }

    pub fn invalidate(&self, key: &str) {
        self.lock().pop(key);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Отравленный мьютекс не страшен: в кэше нет инвариантов между записями
    fn lock(&self) -> MutexGuard<'_, LruCache<String, Value>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
