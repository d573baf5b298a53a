// src/db/contact.rs

use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::db::error::{RepoError, StoreError, ValidationError};
use crate::db::event::Event;
use crate::db::handler::EntityRepository;
use crate::db::record_store::RecordStore;
use crate::db::schema::{CONTACTS, EVENTS};
use crate::db::sync_queue::{SyncAction, SyncEntity, SyncQueue};
use crate::validator;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Родственник, друг, коллега и т.п. Свободный текст.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Contact {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            name: name.into(),
            phone: None,
            email: None,
            relationship: None,
            notes: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validator::check_name(&self.name)?;
        if let Some(phone) = &self.phone {
            validator::check_phone(phone)?;
        }
        if let Some(email) = &self.email {
            validator::check_email(email)?;
        }
        Ok(())
    }

    fn matches(&self, raw: &str, lower: &str) -> bool {
        self.name.to_lowercase().contains(lower)
            || self.phone.as_ref().is_some_and(|p| p.contains(raw))
            || self.email.as_ref().is_some_and(|e| e.to_lowercase().contains(lower))
            || self
                .relationship
                .as_ref()
                .is_some_and(|r| r.to_lowercase().contains(lower))
    }
}

#[derive(Clone)]
pub struct ContactRepo {
    store: RecordStore,
    queue: SyncQueue,
}

impl ContactRepo {
    pub fn new(store: RecordStore, queue: SyncQueue) -> Self {
        Self { store, queue }
    }

    pub async fn get_contacts(&self) -> Result<Vec<Contact>, RepoError> {
        Ok(self.store.read_all_as(CONTACTS.name).await?)
    }

    pub async fn get_contact(&self, id: &str) -> Result<Option<Contact>, RepoError> {
        Ok(self.store.read_one_as(CONTACTS.name, id).await?)
    }

    /// Проверяет и сохраняет контакт. Телефон и email уникальны в коллекции.
    pub async fn save_contact(&self, mut contact: Contact) -> Result<Contact, RepoError> {
        contact.validate()?;
        if contact.id.is_empty() {
            contact.id = Uuid::now_v7().to_string();
        }

        let existed = self.store.read_one(CONTACTS.name, &contact.id).await?.is_some();
        self.store.upsert_as(CONTACTS.name, &contact).await?;

        let action = if existed { SyncAction::Update } else { SyncAction::Create };
        let payload =
            serde_json::to_value(&contact).map_err(|e| StoreError::serialization(CONTACTS.name, e))?;
        self.queue.enqueue(SyncEntity::Contact, action, payload).await?;
        Ok(contact)
    }

    /// Удаляет контакт и его события. Сбой при удалении событий только логируется.
    pub async fn delete_contact(&self, id: &str) -> Result<(), RepoError> {
        self.store.remove(CONTACTS.name, id).await?;

        match self.remove_events_of(id).await {
            Ok(0) => {}
            Ok(n) => info!("removed {n} event(s) of contact {id}"),
            Err(e) => warn!("failed to remove events of contact {id}: {}", e),
        }

        self.queue
            .enqueue(SyncEntity::Contact, SyncAction::Delete, json!({ "id": id }))
            .await?;
        info!("contact {id} deleted");
        Ok(())
    }

    async fn remove_events_of(&self, contact_id: &str) -> Result<usize, StoreError> {
        let events: Vec<Event> = self
            .store
            .query_by_index_as(EVENTS.name, "contactId", &json!(contact_id))
            .await?;
        for event in &events {
            self.store.remove(EVENTS.name, &event.id).await?;
        }
        Ok(events.len())
    }

    pub async fn find_by_phone(&self, phone: &str) -> Result<Option<Contact>, RepoError> {
        let found: Vec<Contact> = self
            .store
            .query_by_index_as(CONTACTS.name, "phone", &json!(phone))
            .await?;
        Ok(found.into_iter().next())
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<Contact>, RepoError> {
        let found: Vec<Contact> = self
            .store
            .query_by_index_as(CONTACTS.name, "email", &json!(email))
            .await?;
        Ok(found.into_iter().next())
    }

    /// Подстрока в имени, email, отношении (без учёта регистра) или в телефоне.
    pub async fn search_contacts(&self, query: &str) -> Result<Vec<Contact>, RepoError> {
        let lower = query.to_lowercase();
        Ok(self
            .get_contacts()
            .await?
            .into_iter()
            .filter(|c| c.matches(query, &lower))
            .collect())
    }
}

#[async_trait]
impl EntityRepository<Contact> for ContactRepo {
    async fn get(&self, id: &str) -> Result<Option<Contact>, RepoError> {
        self.get_contact(id).await
    }

    async fn all(&self) -> Result<Vec<Contact>, RepoError> {
        self.get_contacts().await
    }

    async fn save(&self, entity: Contact) -> Result<Contact, RepoError> {
        self.save_contact(entity).await
    }

    async fn delete(&self, id: &str) -> Result<(), RepoError> {
        self.delete_contact(id).await
    }
}
