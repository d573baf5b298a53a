// src/db/sync_queue.rs

use chrono::{DateTime, Duration, SubsecRound, Utc};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use crate::db::error::StoreError;
use crate::db::record_store::RecordStore;
use crate::db::schema::SYNC_QUEUE;

pub const DEFAULT_PENDING_LIMIT: usize = 10;
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

/// Какая сущность изменилась.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncEntity {
    Event,
    Contact,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Create,
    Update,
    Delete,
}

/// pending -> processing -> completed | failed -> (cleanup) удалён.
/// Обратно в pending элемент сам не возвращается.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Processing => "processing",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }

    /// Завершённые элементы, которые может удалить cleanup.
    pub fn is_finished(&self) -> bool {
        matches!(self, SyncStatus::Completed | SyncStatus::Failed)
    }
}

impl Display for SyncStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    /// Назначается хранилищем при вставке.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "type")]
    pub entity: SyncEntity,
    pub action: SyncAction,
    pub data: Value,
    pub status: SyncStatus,
    pub attempts: u32,
    #[serde(with = "iso_millis")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "iso_millis::option")]
    pub last_attempt: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Текущее время, обрезанное до миллисекунд: так оно и хранится.
fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// RFC 3339 UTC с миллисекундами: `2026-10-18T18:22:24.204Z`.
mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        DateTime::<Utc>::deserialize(deserializer)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(at) => serializer.serialize_some(&at.to_rfc3339_opts(SecondsFormat::Millis, true)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
            Option::<DateTime<Utc>>::deserialize(deserializer)
        }
    }
}

impl SyncQueueItem {
    pub fn new(entity: SyncEntity, action: SyncAction, data: Value) -> Self {
        Self {
            id: None,
            entity,
            action,
            data,
            status: SyncStatus::Pending,
            attempts: 0,
            created_at: now_millis(),
            last_attempt: None,
            last_error: None,
        }
    }
}

/// Очередь изменений, ожидающих отправки во внешнюю систему.
///
/// Очередь не знает, кто и когда её разбирает: её контракт это только
/// переходы статусов и очистка.
#[derive(Clone)]
pub struct SyncQueue {
    store: RecordStore,
}

impl SyncQueue {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Добавляет элемент в статусе pending. Возвращает его id.
    pub async fn enqueue(&self, entity: SyncEntity, action: SyncAction, data: Value) -> Result<i64, StoreError> {
        let item = SyncQueueItem::new(entity, action, data);
        let key = self.store.upsert_as(SYNC_QUEUE.name, &item).await?;
        let id = key
            .as_i64()
            .ok_or_else(|| StoreError::serialization(SYNC_QUEUE.name, format!("non-integer queue id {key}")))?;
        info!("enqueued sync item {id}: {entity:?} {action:?}");
        Ok(id)
    }

    pub async fn get(&self, id: i64) -> Result<Option<SyncQueueItem>, StoreError> {
        self.store.read_one_as(SYNC_QUEUE.name, id).await
    }

    /// Элементы в статусе pending, старые первыми. `limit == 0` без ограничения.
    pub async fn list_pending(&self, limit: usize) -> Result<Vec<SyncQueueItem>, StoreError> {
        let mut items = self.by_status(SyncStatus::Pending).await?;
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        if limit > 0 {
            items.truncate(limit);
        }
        Ok(items)
    }

    pub async fn by_status(&self, status: SyncStatus) -> Result<Vec<SyncQueueItem>, StoreError> {
        self.store
            .query_by_index_as(SYNC_QUEUE.name, "status", &json!(status.as_str()))
            .await
    }

    /// Меняет статус и ставит `last_attempt`. Переход в processing увеличивает `attempts`.
    pub async fn mark_status(
        &self,
        id: i64,
        status: SyncStatus,
        error: Option<&str>,
    ) -> Result<SyncQueueItem, StoreError> {
        let mut item = self.get(id).await?.ok_or(StoreError::QueueItemNotFound(id))?;

        item.status = status;
        item.last_attempt = Some(now_millis());
        if status == SyncStatus::Processing {
            item.attempts += 1;
        }
        if let Some(message) = error {
            item.last_error = Some(message.to_string());
        }

        self.store.upsert_as(SYNC_QUEUE.name, &item).await?;
        debug!("sync item {id} -> {status} (attempts {})", item.attempts);
        Ok(item)
    }

    /// Удаляет завершённые (completed/failed) элементы старше `retention_days`.
    /// Ошибки не пробрасываются: логируются, результат 0.
    pub async fn cleanup(&self, retention_days: u32) -> usize {
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        self.cleanup_older_than(cutoff).await
    }

    /// Удаляет завершённые элементы, у которых `last_attempt` (или `created_at`)
    /// раньше `cutoff`. Возвращает число реально удалённых, даже если удаление
    /// оборвалось на середине.
    pub async fn cleanup_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let expired = match self.expired_ids(cutoff).await {
            Ok(ids) => ids,
            Err(e) => {
                error!("sync queue cleanup failed: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        for id in expired {
            if let Err(e) = self.store.remove(SYNC_QUEUE.name, id).await {
                error!("sync queue cleanup stopped after {removed} item(s): {}", e);
                return removed;
            }
            removed += 1;
        }
        info!("cleaned up {removed} sync queue item(s)");
        removed
    }

    async fn expired_ids(&self, cutoff: DateTime<Utc>) -> Result<Vec<i64>, StoreError> {
        let items: Vec<SyncQueueItem> = self.store.read_all_as(SYNC_QUEUE.name).await?;
        let mut ids: Vec<i64> = items
            .into_iter()
            .filter(|item| item.status.is_finished() && item.last_attempt.unwrap_or(item.created_at) < cutoff)
            .filter_map(|item| item.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Количество элементов по статусам.
    pub async fn stats(&self) -> Result<BTreeMap<SyncStatus, usize>, StoreError> {
        let items: Vec<SyncQueueItem> = self.store.read_all_as(SYNC_QUEUE.name).await?;
        let mut stats = BTreeMap::new();
        for item in items {
            *stats.entry(item.status).or_insert(0) += 1;
        }
        Ok(stats)
    }
}
