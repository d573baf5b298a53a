// src/db/event.rs

use async_trait::async_trait;
use chrono::NaiveDate;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::db::error::{RepoError, StoreError, ValidationError};
use crate::db::handler::EntityRepository;
use crate::db::record_store::RecordStore;
use crate::db::schema::EVENTS;
use crate::db::sync_queue::{SyncAction, SyncEntity, SyncQueue};

/// Направление: подарок отдан или получен.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Given,
    Received,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Given => "given",
            EventKind::Received => "received",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub description: String,
    pub contact_id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub amount: f64,
    pub date: NaiveDate,
    /// gift / wedding / birthday / funeral / other
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Event {
    pub fn new(
        description: impl Into<String>,
        contact_id: impl Into<String>,
        kind: EventKind,
        amount: f64,
        date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            description: description.into(),
            contact_id: contact_id.into(),
            kind,
            amount,
            date,
            category: None,
            notes: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.description.trim().is_empty() {
            return Err(ValidationError::EmptyDescription);
        }
        if self.contact_id.trim().is_empty() {
            return Err(ValidationError::MissingContact);
        }
        if !(self.amount.is_finite() && self.amount > 0.0) {
            return Err(ValidationError::NonPositiveAmount);
        }
        Ok(())
    }

    fn matches(&self, query: &str) -> bool {
        self.description.to_lowercase().contains(query)
            || self
                .notes
                .as_ref()
                .is_some_and(|n| n.to_lowercase().contains(query))
    }
}

#[derive(Clone)]
pub struct EventRepo {
    store: RecordStore,
    queue: SyncQueue,
}

impl EventRepo {
    pub fn new(store: RecordStore, queue: SyncQueue) -> Self {
        Self { store, queue }
    }

    pub async fn get_events(&self) -> Result<Vec<Event>, RepoError> {
        Ok(self.store.read_all_as(EVENTS.name).await?)
    }

    pub async fn get_event(&self, id: &str) -> Result<Option<Event>, RepoError> {
        Ok(self.store.read_one_as(EVENTS.name, id).await?)
    }

    /// Проверяет и сохраняет событие; в очередь уходит create или update.
    pub async fn save_event(&self, mut event: Event) -> Result<Event, RepoError> {
        event.validate()?;
        if event.id.is_empty() {
            event.id = Uuid::now_v7().to_string();
        }

        let existed = self.store.read_one(EVENTS.name, &event.id).await?.is_some();
        self.store.upsert_as(EVENTS.name, &event).await?;

        let action = if existed { SyncAction::Update } else { SyncAction::Create };
        let payload = serde_json::to_value(&event)
            .map_err(|e| StoreError::serialization(EVENTS.name, e))?;
        self.queue.enqueue(SyncEntity::Event, action, payload).await?;
        Ok(event)
    }

    pub async fn delete_event(&self, id: &str) -> Result<(), RepoError> {
        self.store.remove(EVENTS.name, id).await?;
        self.queue
            .enqueue(SyncEntity::Event, SyncAction::Delete, json!({ "id": id }))
            .await?;
        info!("event {id} deleted");
        Ok(())
    }

    /// Перезаписывает весь локальный снимок событий.
    pub async fn replace_events(&self, events: &[Event]) -> Result<(), RepoError> {
        Ok(self.store.replace_all_as(EVENTS.name, events).await?)
    }

    pub async fn events_by_contact(&self, contact_id: &str) -> Result<Vec<Event>, RepoError> {
        Ok(self
            .store
            .query_by_index_as(EVENTS.name, "contactId", &json!(contact_id))
            .await?)
    }

    pub async fn events_by_type(&self, kind: EventKind) -> Result<Vec<Event>, RepoError> {
        Ok(self
            .store
            .query_by_index_as(EVENTS.name, "type", &json!(kind.as_str()))
            .await?)
    }

    pub async fn events_by_date(&self, date: NaiveDate) -> Result<Vec<Event>, RepoError> {
        Ok(self
            .store
            .query_by_index_as(EVENTS.name, "date", &json!(date.to_string()))
            .await?)
    }

    /// Поиск без учёта регистра по описанию и заметкам.
    pub async fn search_events(&self, query: &str) -> Result<Vec<Event>, RepoError> {
        let query = query.to_lowercase();
        Ok(self
            .get_events()
            .await?
            .into_iter()
            .filter(|e| e.matches(&query))
            .collect())
    }
}

#[async_trait]
impl EntityRepository<Event> for EventRepo {
    async fn get(&self, id: &str) -> Result<Option<Event>, RepoError> {
        self.get_event(id).await
    }

    async fn all(&self) -> Result<Vec<Event>, RepoError> {
        self.get_events().await
    }

    async fn save(&self, entity: Event) -> Result<Event, RepoError> {
        self.save_event(entity).await
    }

    async fn delete(&self, id: &str) -> Result<(), RepoError> {
        self.delete_event(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::db::sync_queue::SyncStatus;
    use crate::db::Database;

    fn setup_test_repo() -> (EventRepo, SyncQueue) {
        let store = RecordStore::new(Database::new(StoreConfig::in_memory()));
        let queue = SyncQueue::new(store.clone());
        (EventRepo::new(store, queue.clone()), queue)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[tokio::test]
    async fn test_save_and_get_event() {
        let (repo, queue) = setup_test_repo();
        let mut event = Event::new("王家婚礼", "c1", EventKind::Given, 800.0, date(2026, 5, 1));
        event.category = Some("wedding".into());

        let saved = repo.save_event(event.clone()).await.expect("save");
        assert_eq!(saved, event);
        assert_eq!(repo.get_event(&event.id).await.expect("get"), Some(event.clone()));

        let pending = queue.list_pending(0).await.expect("pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entity, SyncEntity::Event);
        assert_eq!(pending[0].action, SyncAction::Create);
        assert_eq!(pending[0].data["id"], json!(event.id));
        assert_eq!(pending[0].status, SyncStatus::Pending);
    }

    #[tokio::test]
    async fn test_second_save_enqueues_update() {
        let (repo, queue) = setup_test_repo();
        let mut event = Event::new("生日", "c1", EventKind::Received, 200.0, date(2026, 3, 8));
        repo.save_event(event.clone()).await.expect("create");
        event.amount = 500.0;
        repo.save_event(event.clone()).await.expect("update");

        let actions: Vec<SyncAction> = queue
            .list_pending(0)
            .await
            .expect("pending")
            .into_iter()
            .map(|i| i.action)
            .collect();
        assert_eq!(actions, vec![SyncAction::Create, SyncAction::Update]);
        assert_eq!(repo.get_events().await.expect("all").len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_event_is_rejected() {
        let (repo, queue) = setup_test_repo();
        let event = Event::new("  ", "c1", EventKind::Given, 100.0, date(2026, 1, 1));
        assert!(matches!(
            repo.save_event(event).await,
            Err(RepoError::Validation(ValidationError::EmptyDescription))
        ));

        let event = Event::new("满月酒", "c1", EventKind::Given, 0.0, date(2026, 1, 1));
        assert!(matches!(
            repo.save_event(event).await,
            Err(RepoError::Validation(ValidationError::NonPositiveAmount))
        ));

        let event = Event::new("满月酒", "", EventKind::Given, 10.0, date(2026, 1, 1));
        assert!(matches!(
            repo.save_event(event).await,
            Err(RepoError::Validation(ValidationError::MissingContact))
        ));

        assert!(queue.list_pending(0).await.expect("pending").is_empty());
    }

    #[tokio::test]
    async fn test_delete_event_enqueues_delete() {
        let (repo, queue) = setup_test_repo();
        let event = Event::new("乔迁", "c2", EventKind::Given, 300.0, date(2026, 6, 6));
        repo.save_event(event.clone()).await.expect("save");
        repo.delete_event(&event.id).await.expect("delete");

        assert!(repo.get_event(&event.id).await.expect("get").is_none());
        let pending = queue.list_pending(0).await.expect("pending");
        assert_eq!(pending.last().map(|i| i.action), Some(SyncAction::Delete));
    }

    #[tokio::test]
    async fn test_index_queries_and_search() {
        let (repo, _) = setup_test_repo();
        let mut a = Event::new("Wedding of Wang", "c1", EventKind::Given, 800.0, date(2026, 5, 1));
        a.notes = Some("hotel banquet".into());
        let b = Event::new("Birthday", "c2", EventKind::Received, 200.0, date(2026, 5, 1));
        let c = Event::new("Housewarming", "c1", EventKind::Received, 300.0, date(2026, 7, 1));
        repo.replace_events(&[a.clone(), b.clone(), c.clone()]).await.expect("replace");

        assert_eq!(repo.events_by_contact("c1").await.expect("by contact").len(), 2);
        assert_eq!(repo.events_by_type(EventKind::Received).await.expect("by type").len(), 2);
        assert_eq!(repo.events_by_date(date(2026, 5, 1)).await.expect("by date").len(), 2);

        let found = repo.search_events("BANQUET").await.expect("search");
        assert_eq!(found, vec![a]);
        assert!(repo.search_events("funeral").await.expect("search").is_empty());
    }

    #[tokio::test]
    async fn test_entity_repository_trait() {
        let (repo, _) = setup_test_repo();
        let generic: &dyn EntityRepository<Event> = &repo;
        let event = Event::new("Gift", "c9", EventKind::Given, 66.0, date(2026, 2, 14));
        generic.save(event.clone()).await.expect("save");
        assert_eq!(generic.all().await.expect("all"), vec![event.clone()]);
        generic.delete(&event.id).await.expect("delete");
        assert!(generic.get(&event.id).await.expect("get").is_none());
    }
}
