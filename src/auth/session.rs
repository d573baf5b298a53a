// src/auth/session.rs
//
// Долговременное хранилище сессии: строковые значения по строковым ключам.

use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

pub const USER_KEY: &str = "user";
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
/// Реестр зарегистрированных аккаунтов mock-API.
pub const USERS_KEY: &str = "users";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session storage io failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("session file {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },
}

pub trait KeyValueArea: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError>;
    fn set(&self, key: &str, value: &str) -> Result<(), SessionError>;
    /// Отсутствующий ключ это no-op.
    fn remove(&self, key: &str) -> Result<(), SessionError>;
}

/// JSON-объект в файле. Каждая запись переписывает файл целиком через `.tmp` + rename.
pub struct FileKeyValueArea {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileKeyValueArea {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| SessionError::Corrupt {
                path: path.clone(),
                message: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!("session storage {} opened", path.display());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), SessionError> {
        let text = serde_json::to_string_pretty(entries).map_err(|e| SessionError::Corrupt {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, text)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl KeyValueArea for FileKeyValueArea {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        let mut entries = self.lock();
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        let mut entries = self.lock();
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}

/// Хранилище в памяти, для тестов.
#[derive(Default)]
pub struct MemoryKeyValueArea {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueArea {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueArea for MemoryKeyValueArea {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_memory_area() {
        let area = MemoryKeyValueArea::new();
        assert!(area.get(USER_KEY).expect("get").is_none());
        area.set(USER_KEY, "{}").expect("set");
        assert_eq!(area.get(USER_KEY).expect("get").as_deref(), Some("{}"));
        area.remove(USER_KEY).expect("remove");
        area.remove(USER_KEY).expect("remove twice");
        assert!(area.get(USER_KEY).expect("get").is_none());
    }

    #[test]
    fn test_file_area_survives_reopen() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("nested").join("session.json");

        let area = FileKeyValueArea::open(&path).expect("open");
        area.set(ACCESS_TOKEN_KEY, "mock-token-1").expect("set");
        area.set(REFRESH_TOKEN_KEY, "mock-refresh-token-1").expect("set");
        area.remove(REFRESH_TOKEN_KEY).expect("remove");
        drop(area);

        let reopened = FileKeyValueArea::open(&path).expect("reopen");
        assert_eq!(
            reopened.get(ACCESS_TOKEN_KEY).expect("get").as_deref(),
            Some("mock-token-1")
        );
        assert!(reopened.get(REFRESH_TOKEN_KEY).expect("get").is_none());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("session.json");
        fs::write(&path, "not json").expect("write");
        assert!(matches!(
            FileKeyValueArea::open(&path),
            Err(SessionError::Corrupt { .. })
        ));
    }
}
