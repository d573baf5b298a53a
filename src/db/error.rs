// src/db/error.rs

use std::fmt::Display;
use thiserror::Error;

/// Ошибки слоя хранения.
///
/// "Не найдено" ошибкой не является: `read_one` возвращает `None`,
/// `read_all` / `query_by_index` возвращают пустой вектор.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Не удалось открыть базу или применить миграции.
    #[error("store open failed: {0}")]
    Open(String),

    /// Ошибка транзакции чтения/записи/удаления/запроса.
    #[error("store io failed on '{collection}': {message}")]
    Io { collection: String, message: String },

    #[error("sync queue item {0} not found")]
    QueueItemNotFound(i64),

    /// `replace_all` упал на элементе `index`: элементы до него уже записаны,
    /// после него не записывались.
    #[error("replace_all on '{collection}' failed at item {index}: {message}")]
    PartialReplace {
        collection: String,
        index: usize,
        message: String,
    },

    #[error("record in '{collection}' has invalid shape: {message}")]
    Serialization { collection: String, message: String },
}

impl StoreError {
    pub fn io(collection: &str, err: impl Display) -> Self {
        StoreError::Io {
            collection: collection.to_string(),
            message: err.to_string(),
        }
    }

    pub fn serialization(collection: &str, err: impl Display) -> Self {
        StoreError::Serialization {
            collection: collection.to_string(),
            message: err.to_string(),
        }
    }
}

/// Удобный `map_err` для ошибок rusqlite/serde внутри замыканий `conn.call(...)`.
pub(crate) trait IoResultExt<T> {
    fn in_collection(self, collection: &str) -> Result<T, StoreError>;
}

impl<T, E: Display> IoResultExt<T> for Result<T, E> {
    fn in_collection(self, collection: &str) -> Result<T, StoreError> {
        self.map_err(|e| StoreError::io(collection, e))
    }
}

/// Ошибки проверки входных данных репозиториев.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("event description must not be empty")]
    EmptyDescription,
    #[error("event must reference a contact")]
    MissingContact,
    #[error("amount must be greater than zero")]
    NonPositiveAmount,
    #[error("name must contain at least {0} characters")]
    NameTooShort(usize),
    #[error("invalid phone number: {0}")]
    InvalidPhone(String),
    #[error("invalid email address: {0}")]
    InvalidEmail(String),
    #[error("password must contain at least {0} characters")]
    PasswordTooShort(usize),
    #[error("passwords do not match")]
    PasswordMismatch,
}

#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}
