// src/db/record.rs

use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};

/// Запись коллекции: JSON-объект, в котором всегда есть поле первичного ключа.
pub type Record = Value;

/// Значение первичного ключа. В хранилище сохраняется с исходным типом,
/// поэтому `1` и `"1"` это разные ключи.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordKey {
    Int(i64),
    Text(String),
}

impl RecordKey {
    /// Ключ из JSON-скаляра. Дробные числа, null, массивы и объекты ключом быть не могут.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(RecordKey::Int),
            Value::String(s) => Some(RecordKey::Text(s.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            RecordKey::Int(i) => Value::from(*i),
            RecordKey::Text(s) => Value::from(s.as_str()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RecordKey::Int(i) => Some(*i),
            RecordKey::Text(_) => None,
        }
    }
}

impl Display for RecordKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKey::Int(i) => write!(f, "{i}"),
            RecordKey::Text(s) => write!(f, "{s}"),
        }
    }
}

impl ToSql for RecordKey {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            RecordKey::Int(i) => ToSqlOutput::from(*i),
            RecordKey::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

impl From<i64> for RecordKey {
    fn from(value: i64) -> Self {
        RecordKey::Int(value)
    }
}

impl From<&str> for RecordKey {
    fn from(value: &str) -> Self {
        RecordKey::Text(value.to_string())
    }
}

impl From<String> for RecordKey {
    fn from(value: String) -> Self {
        RecordKey::Text(value)
    }
}

impl From<&String> for RecordKey {
    fn from(value: &String) -> Self {
        RecordKey::Text(value.clone())
    }
}

/// Извлекает ключ из записи. `None`, если запись не объект или поле ключа пустое.
pub fn extract_key(record: &Record, key_path: &str) -> Option<RecordKey> {
    record.as_object()?.get(key_path).and_then(RecordKey::from_json)
}

/// Записывает ключ в объект (для коллекций с автоинкрементом).
pub(crate) fn inject_key(record: &mut Record, key_path: &str, key: &RecordKey) {
    if let Value::Object(map) = record {
        map.insert(key_path.to_string(), key.to_json());
    } else {
        let mut map = Map::new();
        map.insert(key_path.to_string(), key.to_json());
        *record = Value::Object(map);
    }
}

/// JSON-значение -> значение SQLite в том виде, в каком его вернёт `json_extract`.
pub(crate) fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_key() {
        let rec = json!({"id": 7, "name": "x"});
        assert_eq!(extract_key(&rec, "id"), Some(RecordKey::Int(7)));

        let rec = json!({"key": "currency", "value": "CNY"});
        assert_eq!(extract_key(&rec, "key"), Some(RecordKey::Text("currency".into())));

        assert_eq!(extract_key(&json!({"id": null}), "id"), None);
        assert_eq!(extract_key(&json!({"name": "no key"}), "id"), None);
        assert_eq!(extract_key(&json!({"id": 1.5}), "id"), None);
        assert_eq!(extract_key(&json!([1, 2]), "id"), None);
    }

    #[test]
    fn test_inject_key() {
        let mut rec = json!({"type": "event"});
        inject_key(&mut rec, "id", &RecordKey::Int(3));
        assert_eq!(rec, json!({"type": "event", "id": 3}));
    }

    #[test]
    fn test_json_to_sql_matches_json_extract_types() {
        assert_eq!(json_to_sql(&json!(true)), SqlValue::Integer(1));
        assert_eq!(json_to_sql(&json!(42)), SqlValue::Integer(42));
        assert_eq!(json_to_sql(&json!(2.5)), SqlValue::Real(2.5));
        assert_eq!(json_to_sql(&json!("a")), SqlValue::Text("a".into()));
        assert_eq!(json_to_sql(&json!(null)), SqlValue::Null);
        assert_eq!(json_to_sql(&json!({"a":1})), SqlValue::Text("{\"a\":1}".into()));
    }

    #[test]
    fn test_key_serde_untagged() {
        let k: RecordKey = serde_json::from_str("5").expect("Failed to parse int key");
        assert_eq!(k, RecordKey::Int(5));
        let k: RecordKey = serde_json::from_str("\"abc\"").expect("Failed to parse text key");
        assert_eq!(k, RecordKey::Text("abc".into()));
    }
}
