// src/db/record_store.rs

use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::db::error::{IoResultExt, StoreError};
use crate::db::monitoring::measure_store_operation;
use crate::db::record::{extract_key, inject_key, json_to_sql, Record, RecordKey};
use crate::db::schema::{field_expr, quote_ident};
use crate::db::Database;

/// Операции над коллекциями. Все операции асинхронные: замыкание
/// выполняется в потоке соединения, вызывающий ждёт его завершения.
///
/// Никаких блокировок между вызовами нет: "прочитать, изменить, сохранить"
/// не атомарно относительно параллельного писателя.
#[derive(Clone)]
pub struct RecordStore {
    db: Database,
}

struct CollectionMeta {
    name: String,
    table: String,
    key_path: String,
    auto_increment: bool,
}

impl RecordStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn run<T, F>(&self, operation: &'static str, collection: &str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.db.open().await?;
        let name = collection.to_string();
        measure_store_operation(operation, async move {
            match conn.call(move |c| Ok::<_, tokio_rusqlite::Error>(f(c))).await {
                Ok(result) => result,
                Err(e) => Err(StoreError::io(&name, e)),
            }
        })
        .await
    }

    /// Очищает коллекцию и вставляет `records` по одной (INSERT, не upsert).
    ///
    /// Операция не атомарна: если вставка k-го элемента упала, элементы до него
    /// остаются, после него не пробуются, и возвращается `PartialReplace`.
    pub async fn replace_all(&self, collection: &str, records: Vec<Record>) -> Result<(), StoreError> {
        let name = collection.to_string();
        self.run("replace_all", collection, move |conn| {
            let meta = collection_meta(conn, &name)?;
            conn.execute(&format!("DELETE FROM {}", meta.table), [])
                .in_collection(&name)?;

            let total = records.len();
            for (index, record) in records.into_iter().enumerate() {
                if let Err(e) = insert_record(conn, &meta, record) {
                    warn!("replace_all on '{}' stopped at item {}/{}: {}", name, index, total, e);
                    return Err(StoreError::PartialReplace {
                        collection: name,
                        index,
                        message: e.to_string(),
                    });
                }
            }
            debug!("replace_all on '{}' wrote {} records", name, total);
            Ok(())
        })
        .await
    }

    /// Все записи коллекции. Порядок не гарантируется.
    pub async fn read_all(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        let name = collection.to_string();
        self.run("read_all", collection, move |conn| {
            let meta = collection_meta(conn, &name)?;
            let mut stmt = conn
                .prepare(&format!("SELECT body FROM {}", meta.table))
                .in_collection(&name)?;
            let bodies = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .in_collection(&name)?
                .collect::<Result<Vec<_>, _>>()
                .in_collection(&name)?;
            bodies.iter().map(|b| parse_body(&name, b)).collect()
        })
        .await
    }

    /// Запись по ключу или `None`. Отсутствие записи ошибкой не является.
    pub async fn read_one(&self, collection: &str, key: impl Into<RecordKey>) -> Result<Option<Record>, StoreError> {
        let name = collection.to_string();
        let key = key.into();
        self.run("read_one", collection, move |conn| {
            let meta = collection_meta(conn, &name)?;
            let body: Option<String> = conn
                .query_row(
                    &format!("SELECT body FROM {} WHERE pk = ?1", meta.table),
                    params![key],
                    |row| row.get(0),
                )
                .optional()
                .in_collection(&name)?;
            body.map(|b| parse_body(&name, &b)).transpose()
        })
        .await
    }

    /// Вставляет запись или перезаписывает существующую с тем же ключом.
    /// Для коллекций с автоинкрементом ключ можно не указывать: он будет
    /// назначен и записан в запись. Возвращает ключ записи.
    pub async fn upsert(&self, collection: &str, record: Record) -> Result<RecordKey, StoreError> {
        let name = collection.to_string();
        self.run("upsert", collection, move |conn| {
            let meta = collection_meta(conn, &name)?;
            match extract_key(&record, &meta.key_path) {
                Some(key) => {
                    let body = serde_json::to_string(&record).in_collection(&name)?;
                    conn.execute(
                        &format!(
                            "INSERT INTO {} (pk, body) VALUES (?1, ?2)
                             ON CONFLICT(pk) DO UPDATE SET body = excluded.body",
                            meta.table
                        ),
                        params![key, body],
                    )
                    .in_collection(&name)?;
                    Ok(key)
                }
                None => insert_record(conn, &meta, record),
            }
        })
        .await
    }

    /// Удаляет запись. Отсутствующий ключ это no-op.
    pub async fn remove(&self, collection: &str, key: impl Into<RecordKey>) -> Result<(), StoreError> {
        let name = collection.to_string();
        let key = key.into();
        self.run("remove", collection, move |conn| {
            let meta = collection_meta(conn, &name)?;
            let removed = conn
                .execute(&format!("DELETE FROM {} WHERE pk = ?1", meta.table), params![key])
                .in_collection(&name)?;
            debug!("remove {} from '{}': {} row(s)", key, name, removed);
            Ok(())
        })
        .await
    }

    /// Записи, у которых индексированное поле равно `value`.
    pub async fn query_by_index(&self, collection: &str, index: &str, value: &Value) -> Result<Vec<Record>, StoreError> {
        let name = collection.to_string();
        let index = index.to_string();
        let value = json_to_sql(value);
        self.run("query_by_index", collection, move |conn| {
            let meta = collection_meta(conn, &name)?;
            let field: String = conn
                .query_row(
                    "SELECT field FROM store_index WHERE collection = ?1 AND name = ?2",
                    params![name, index],
                    |row| row.get(0),
                )
                .optional()
                .in_collection(&name)?
                .ok_or_else(|| StoreError::io(&name, format!("index '{index}' not found")))?;

            let mut stmt = conn
                .prepare(&format!(
                    "SELECT body FROM {} WHERE {} = ?1",
                    meta.table,
                    field_expr(&field)
                ))
                .in_collection(&name)?;
            let bodies = stmt
                .query_map(params![value], |row| row.get::<_, String>(0))
                .in_collection(&name)?
                .collect::<Result<Vec<_>, _>>()
                .in_collection(&name)?;
            bodies.iter().map(|b| parse_body(&name, b)).collect()
        })
        .await
    }

    /// Количество записей в коллекции.
    pub async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        let name = collection.to_string();
        self.run("count", collection, move |conn| {
            let meta = collection_meta(conn, &name)?;
            let n: i64 = conn
                .query_row(&format!("SELECT count(*) FROM {}", meta.table), [], |r| r.get(0))
                .in_collection(&name)?;
            Ok(usize::try_from(n).unwrap_or_default())
        })
        .await
    }

    // Типизированные обёртки: хранилище работает с JSON, репозитории со структурами

    pub async fn read_all_as<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>, StoreError> {
        self.read_all(collection)
            .await?
            .into_iter()
            .map(|r| from_record(collection, r))
            .collect()
    }

    pub async fn read_one_as<T: DeserializeOwned>(
        &self,
        collection: &str,
        key: impl Into<RecordKey>,
    ) -> Result<Option<T>, StoreError> {
        self.read_one(collection, key)
            .await?
            .map(|r| from_record(collection, r))
            .transpose()
    }

    pub async fn upsert_as<T: Serialize>(&self, collection: &str, entity: &T) -> Result<RecordKey, StoreError> {
        let record = serde_json::to_value(entity).map_err(|e| StoreError::serialization(collection, e))?;
        self.upsert(collection, record).await
    }

    pub async fn replace_all_as<T: Serialize>(&self, collection: &str, entities: &[T]) -> Result<(), StoreError> {
        let records = entities
            .iter()
            .map(|e| serde_json::to_value(e).map_err(|err| StoreError::serialization(collection, err)))
            .collect::<Result<Vec<_>, _>>()?;
        self.replace_all(collection, records).await
    }

    pub async fn query_by_index_as<T: DeserializeOwned>(
        &self,
        collection: &str,
        index: &str,
        value: &Value,
    ) -> Result<Vec<T>, StoreError> {
        self.query_by_index(collection, index, value)
            .await?
            .into_iter()
            .map(|r| from_record(collection, r))
            .collect()
    }
}

fn collection_meta(conn: &Connection, name: &str) -> Result<CollectionMeta, StoreError> {
    conn.query_row(
        "SELECT key_path, auto_increment FROM store_collection WHERE name = ?1",
        params![name],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?)),
    )
    .optional()
    .in_collection(name)?
    .map(|(key_path, auto_increment)| CollectionMeta {
        name: name.to_string(),
        table: quote_ident(name),
        key_path,
        auto_increment,
    })
    .ok_or_else(|| StoreError::io(name, "collection does not exist"))
}

/// INSERT одной записи. Для автоинкремента без ключа: вставка, затем ключ
/// пишется обратно в тело записи (в одной транзакции).
fn insert_record(conn: &mut Connection, meta: &CollectionMeta, mut record: Record) -> Result<RecordKey, StoreError> {
    let name = meta.name.as_str();
    if !record.is_object() {
        return Err(StoreError::io(name, "record must be a JSON object"));
    }

    match extract_key(&record, &meta.key_path) {
        Some(key) => {
            let body = serde_json::to_string(&record).in_collection(name)?;
            conn.execute(
                &format!("INSERT INTO {} (pk, body) VALUES (?1, ?2)", meta.table),
                params![key, body],
            )
            .in_collection(name)?;
            Ok(key)
        }
        None if meta.auto_increment => {
            let tx = conn.transaction().in_collection(name)?;
            tx.execute(
                &format!("INSERT INTO {} (pk, body) VALUES (NULL, '{{}}')", meta.table),
                [],
            )
            .in_collection(name)?;
            let key = RecordKey::Int(tx.last_insert_rowid());
            inject_key(&mut record, &meta.key_path, &key);
            let body = serde_json::to_string(&record).in_collection(name)?;
            tx.execute(
                &format!("UPDATE {} SET body = ?1 WHERE pk = ?2", meta.table),
                params![body, key],
            )
            .in_collection(name)?;
            tx.commit().in_collection(name)?;
            Ok(key)
        }
        None => Err(StoreError::io(
            name,
            format!("record has no value for key field '{}'", meta.key_path),
        )),
    }
}

fn parse_body(collection: &str, body: &str) -> Result<Record, StoreError> {
    serde_json::from_str(body).map_err(|e| StoreError::serialization(collection, e))
}

fn from_record<T: DeserializeOwned>(collection: &str, record: Record) -> Result<T, StoreError> {
    serde_json::from_value(record).map_err(|e| StoreError::serialization(collection, e))
}
