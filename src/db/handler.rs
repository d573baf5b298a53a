// src/db/handler.rs

use async_trait::async_trait;

use crate::db::error::RepoError;

/// Общий контракт типизированных репозиториев.
#[async_trait]
pub trait EntityRepository<T> {
    async fn get(&self, id: &str) -> Result<Option<T>, RepoError>;
    async fn all(&self) -> Result<Vec<T>, RepoError>;
    /// Сохраняет сущность и ставит изменение в очередь синхронизации.
    async fn save(&self, entity: T) -> Result<T, RepoError>;
    async fn delete(&self, id: &str) -> Result<(), RepoError>;
}
