// src/db/mod.rs
//
// Хранилище поверх SQLite:
// 1) Database — владеет соединением, открывает его один раз и прогоняет миграции
// 2) RecordStore — CRUD по коллекциям
// 3) SyncQueue — очередь изменений для внешней синхронизации
// 4) репозитории предметной области поверх RecordStore

pub mod cache;
pub mod contact;
pub mod error;
pub mod event;
pub mod handler;
pub mod migrations;
pub mod monitoring;
pub mod record;
pub mod record_store;
pub mod schema;
pub mod settings;
pub mod sync_queue;
pub mod user;

use log::{error, info, trace, warn};
use rusqlite::hooks::Action;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_rusqlite::Connection;

use crate::config::StoreConfig;
use crate::db::error::StoreError;
use crate::db::migrations::{setup_migrations, LATEST_SCHEMA_VERSION};

/// Пауза между попытками, пока базу держит другой процесс.
const BUSY_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Дескриптор хранилища. Клоны разделяют одно соединение.
///
/// Соединение открывается лениво при первом `open()`; параллельные вызовы ждут
/// ту же инициализацию. Если открытие упало, ячейка остаётся пустой и следующий
/// вызов начнёт заново.
#[derive(Clone)]
pub struct Database {
    config: Arc<StoreConfig>,
    handle: Arc<OnceCell<Arc<Connection>>>,
}

impl Database {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config: Arc::new(config),
            handle: Arc::new(OnceCell::new()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.handle.initialized()
    }

    pub async fn open(&self) -> Result<Arc<Connection>, StoreError> {
        let conn = self
            .handle
            .get_or_try_init(|| open_store(&self.config))
            .await?;
        Ok(Arc::clone(conn))
    }

    pub async fn schema_version(&self) -> Result<u32, StoreError> {
        let conn = self.open().await?;
        conn.call(|conn| Ok(migrations::schema_version(conn)?))
            .await
            .map_err(|e| StoreError::Open(e.to_string()))
    }

    /// Имена коллекций из каталога.
    pub async fn collections(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.open().await?;
        conn.call(|conn| Ok(schema::collection_names(conn)?))
            .await
            .map_err(|e| StoreError::io("store_collection", e))
    }
}

async fn open_store(config: &StoreConfig) -> Result<Arc<Connection>, StoreError> {
    let conn = if config.is_in_memory() {
        Connection::open_in_memory().await
    } else {
        Connection::open(&config.path).await
    }
    .map_err(|e| {
        error!("Cannot open store {}: {}", config.path.display(), e);
        StoreError::Open(e.to_string())
    })?;

    let applied = conn
        .call(|conn| {
            conn.busy_handler(Some(on_blocked))?;
            register_hooks(conn);
            Ok(setup_migrations(conn, LATEST_SCHEMA_VERSION)?)
        })
        .await
        .map_err(|e| {
            error!("setup_migrations error: {}", e);
            StoreError::Open(e.to_string())
        })?;

    info!(
        "store {} v{} opened (migrations applied: {:?})",
        config.path.display(),
        LATEST_SCHEMA_VERSION,
        applied
    );
    Ok(Arc::new(conn))
}

/// Базу держит другой процесс: предупреждаем и продолжаем ждать.
fn on_blocked(attempt: i32) -> bool {
    if attempt == 0 || attempt % 100 == 0 {
        warn!("store is blocked by another connection, waiting (attempt {attempt})");
    }
    std::thread::sleep(BUSY_RETRY_INTERVAL);
    true
}

/// Трассировка всех INSERT/UPDATE/DELETE.
pub fn register_hooks(conn: &rusqlite::Connection) {
    conn.update_hook(Some(|action: Action, db: &str, table: &str, rowid: i64| {
        let action = match action {
            Action::SQLITE_DELETE => "Delete",
            Action::SQLITE_INSERT => "Insert",
            Action::SQLITE_UPDATE => "Update",
            _ => "Unknown",
        };
        trace!("{action} on table '{table}' in DB '{db}', rowid: {rowid}");
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_is_memoized() {
        let db = Database::new(StoreConfig::in_memory());
        assert!(!db.is_open());

        let other = db.clone();
        let (a, b) = tokio::join!(db.open(), other.open());
        let a = a.expect("Failed to open store");
        let b = b.expect("Failed to open store");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(db.is_open());

        let c = db.open().await.expect("Failed to reopen store");
        assert!(Arc::ptr_eq(&a, &c));
    }

    #[tokio::test]
    async fn test_fresh_store_has_all_collections() {
        let db = Database::new(StoreConfig::in_memory());
        assert_eq!(db.schema_version().await.expect("version"), LATEST_SCHEMA_VERSION);
        assert_eq!(
            db.collections().await.expect("collections"),
            vec!["contacts", "events", "settings", "syncQueue", "user"]
        );
    }

    #[tokio::test]
    async fn test_open_error_is_not_cached() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing").join("ledger.sqlite3");
        let db = Database::new(StoreConfig::with_path(&path));

        assert!(matches!(db.open().await, Err(StoreError::Open(_))));
        assert!(!db.is_open());

        std::fs::create_dir_all(path.parent().expect("parent")).expect("create dir");
        db.open().await.expect("open after fixing path");
        assert!(db.is_open());
    }

    #[tokio::test]
    async fn test_reopen_file_store_keeps_version() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger.sqlite3");

        let first = Database::new(StoreConfig::with_path(&path));
        assert_eq!(first.schema_version().await.expect("version"), 3);
        drop(first);

        let second = Database::new(StoreConfig::with_path(&path));
        assert_eq!(second.schema_version().await.expect("version"), 3);
        assert_eq!(second.collections().await.expect("collections").len(), 5);
    }

    #[tokio::test]
    async fn test_open_waits_while_store_is_locked() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger.sqlite3");

        let holder = rusqlite::Connection::open(&path).expect("holder connection");
        holder.execute_batch("BEGIN EXCLUSIVE;").expect("exclusive lock");
        let hold = Duration::from_millis(300);
        let started = std::time::Instant::now();
        let release = std::thread::spawn(move || {
            std::thread::sleep(hold);
            holder.execute_batch("COMMIT;").expect("release lock");
        });

        let db = Database::new(StoreConfig::with_path(&path));
        let opened = db.open().await;
        release.join().expect("holder thread");

        assert!(opened.is_ok(), "blocked open failed: {:?}", opened.err());
        assert!(started.elapsed() >= hold);
        assert_eq!(db.schema_version().await.expect("version"), LATEST_SCHEMA_VERSION);
    }
}
