// src/db/schema.rs

use rusqlite::{params, Connection, OptionalExtension, Result};

/// Каталог коллекций и индексов. Создаётся до любых миграций и версией не управляется.
pub const SCHEMA_CATALOGUE: &str = r#"
CREATE TABLE
    IF NOT EXISTS store_collection (
        name TEXT PRIMARY KEY,
        key_path TEXT NOT NULL,
        auto_increment INTEGER NOT NULL DEFAULT 0
    );

CREATE TABLE
    IF NOT EXISTS store_index (
        collection TEXT NOT NULL,
        name TEXT NOT NULL,
        field TEXT NOT NULL,
        is_unique INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (collection, name)
    );
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexDef {
    pub name: &'static str,
    pub field: &'static str,
    pub unique: bool,
}

impl IndexDef {
    pub const fn new(name: &'static str, unique: bool) -> Self {
        Self { name, field: name, unique }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionDef {
    pub name: &'static str,
    pub key_path: &'static str,
    pub auto_increment: bool,
    pub indexes: &'static [IndexDef],
}

pub const USER: CollectionDef = CollectionDef {
    name: "user",
    key_path: "id",
    auto_increment: false,
    indexes: &[IndexDef::new("email", true)],
};

pub const EVENTS: CollectionDef = CollectionDef {
    name: "events",
    key_path: "id",
    auto_increment: false,
    indexes: &[
        IndexDef::new("date", false),
        IndexDef::new("contactId", false),
        IndexDef::new("type", false),
    ],
};

pub const CONTACTS: CollectionDef = CollectionDef {
    name: "contacts",
    key_path: "id",
    auto_increment: false,
    indexes: &[
        IndexDef::new("name", false),
        IndexDef::new("phone", true),
        IndexDef::new("email", true),
    ],
};

pub const SETTINGS: CollectionDef = CollectionDef {
    name: "settings",
    key_path: "key",
    auto_increment: false,
    indexes: &[],
};

pub const SYNC_QUEUE: CollectionDef = CollectionDef {
    name: "syncQueue",
    key_path: "id",
    auto_increment: true,
    indexes: &[
        IndexDef::new("type", false),
        IndexDef::new("status", false),
        IndexDef::new("createdAt", false),
    ],
};

/// Имя таблицы/индекса в двойных кавычках.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Выражение индекса. Должно совпадать с тем, что пишется в WHERE, иначе SQLite индекс не использует.
pub fn field_expr(field: &str) -> String {
    format!("json_extract(body, '$.{}')", field.replace('\'', "''"))
}

pub fn index_sql_name(collection: &str, index: &str) -> String {
    quote_ident(&format!("{collection}__{index}"))
}

pub fn collection_exists(conn: &Connection, name: &str) -> Result<bool> {
    conn.query_row(
        "SELECT 1 FROM store_collection WHERE name = ?1",
        params![name],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

pub fn index_exists(conn: &Connection, collection: &str, index: &str) -> Result<bool> {
    conn.query_row(
        "SELECT 1 FROM store_index WHERE collection = ?1 AND name = ?2",
        params![collection, index],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

/// Создаёт коллекцию без индексов. Повторное создание падает на CREATE TABLE,
/// поэтому вызывающий обязан сначала проверить `collection_exists`.
pub fn create_collection(conn: &Connection, def: &CollectionDef) -> Result<()> {
    let pk = if def.auto_increment {
        "pk INTEGER PRIMARY KEY AUTOINCREMENT"
    } else {
        "pk PRIMARY KEY"
    };
    conn.execute_batch(&format!(
        "CREATE TABLE {} ({pk}, body TEXT NOT NULL);",
        quote_ident(def.name)
    ))?;
    conn.execute(
        "INSERT INTO store_collection (name, key_path, auto_increment) VALUES (?1, ?2, ?3)",
        params![def.name, def.key_path, def.auto_increment],
    )?;
    Ok(())
}

pub fn create_index(conn: &Connection, collection: &str, index: &IndexDef) -> Result<()> {
    let unique = if index.unique { "UNIQUE " } else { "" };
    conn.execute_batch(&format!(
        "CREATE {unique}INDEX {} ON {} ({});",
        index_sql_name(collection, index.name),
        quote_ident(collection),
        field_expr(index.field)
    ))?;
    conn.execute(
        "INSERT INTO store_index (collection, name, field, is_unique) VALUES (?1, ?2, ?3, ?4)",
        params![collection, index.name, index.field, index.unique],
    )?;
    Ok(())
}

/// Создаёт коллекцию и недостающие индексы. Возвращает `true`, если коллекция была создана.
pub fn ensure_collection(conn: &Connection, def: &CollectionDef) -> Result<bool> {
    let created = if collection_exists(conn, def.name)? {
        false
    } else {
        create_collection(conn, def)?;
        true
    };
    for index in def.indexes {
        if !index_exists(conn, def.name, index.name)? {
            create_index(conn, def.name, index)?;
        }
    }
    Ok(created)
}

/// Имена всех коллекций из каталога, по алфавиту.
pub fn collection_names(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM store_collection ORDER BY name")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_test_db() -> Connection {
        let conn = Connection::open_in_memory().expect("Failed to open in-memory database");
        conn.execute_batch(SCHEMA_CATALOGUE)
            .expect("Failed to create catalogue");
        conn
    }

    #[test]
    fn test_ensure_collection_is_idempotent() {
        let conn = setup_test_db();
        assert!(ensure_collection(&conn, &CONTACTS).expect("first ensure"));
        assert!(!ensure_collection(&conn, &CONTACTS).expect("second ensure"));

        assert!(collection_exists(&conn, "contacts").expect("exists"));
        assert!(index_exists(&conn, "contacts", "phone").expect("index exists"));
        assert_eq!(collection_names(&conn).expect("names"), vec!["contacts"]);
    }

    #[test]
    fn test_create_existing_collection_is_an_error() {
        let conn = setup_test_db();
        create_collection(&conn, &EVENTS).expect("Failed to create events");
        assert!(create_collection(&conn, &EVENTS).is_err());
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("syncQueue"), "\"syncQueue\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(field_expr("contactId"), "json_extract(body, '$.contactId')");
    }
}
