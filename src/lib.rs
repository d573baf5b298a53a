// src/lib.rs
//
// Локальное хранилище учёта подарков и ответных подарков (人情):
// события, контакты, профиль, настройки, очередь синхронизации и сессия.

pub mod analysis;
pub mod auth;
pub mod config;
pub mod db;
pub mod validator;

use log::info;
use std::sync::Arc;

pub use crate::analysis::Analysis;
pub use crate::auth::session::{FileKeyValueArea, KeyValueArea, MemoryKeyValueArea};
pub use crate::auth::{AuthError, AuthService};
pub use crate::config::StoreConfig;
pub use crate::db::contact::{Contact, ContactRepo};
pub use crate::db::error::{RepoError, StoreError, ValidationError};
pub use crate::db::event::{Event, EventKind, EventRepo};
pub use crate::db::record::{Record, RecordKey};
pub use crate::db::record_store::RecordStore;
pub use crate::db::settings::SettingsRepo;
pub use crate::db::sync_queue::{SyncAction, SyncEntity, SyncQueue, SyncQueueItem, SyncStatus};
pub use crate::db::user::{User, UserRepo};
pub use crate::db::Database;

/// Все сервисы поверх одного хранилища.
pub struct Ledger {
    pub db: Database,
    pub store: RecordStore,
    pub queue: SyncQueue,
    pub events: EventRepo,
    pub contacts: ContactRepo,
    pub users: UserRepo,
    pub settings: SettingsRepo,
    pub auth: AuthService,
    pub analysis: Analysis,
}

impl Ledger {
    /// Собирает сервисы, открывает базу и восстанавливает сессию.
    pub async fn open(config: StoreConfig, session: Arc<dyn KeyValueArea>) -> Result<Self, StoreError> {
        let cache_capacity = config.settings_cache_capacity;
        let db = Database::new(config);
        db.open().await?;

        let store = RecordStore::new(db.clone());
        let queue = SyncQueue::new(store.clone());
        let events = EventRepo::new(store.clone(), queue.clone());
        let contacts = ContactRepo::new(store.clone(), queue.clone());
        let users = UserRepo::new(store.clone());
        let settings = SettingsRepo::new(store.clone(), cache_capacity);
        let auth = AuthService::new(session, users.clone());
        let analysis = Analysis::new(events.clone(), contacts.clone());

        auth.init_from_storage();
        info!("ledger opened at {}", db.config().path.display());

        Ok(Self {
            db,
            store,
            queue,
            events,
            contacts,
            users,
            settings,
            auth,
            analysis,
        })
    }

    /// Чистит очередь с настроенным сроком хранения.
    pub async fn cleanup_queue(&self) -> usize {
        self.queue.cleanup(self.db.config().queue_retention_days).await
    }
}
