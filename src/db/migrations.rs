// src/db/migrations.rs

use log::{debug, info};
use rusqlite::{params, Connection, Result, Transaction, TransactionBehavior};

use crate::db::schema::{self, SCHEMA_CATALOGUE};

/// Текущая (целевая) версия схемы.
pub const LATEST_SCHEMA_VERSION: u32 = 3;

pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub apply: fn(&Transaction<'_>) -> Result<()>,
}

/// Шаги миграции строго по возрастанию версии.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "user, events, contacts",
        apply: migrate_v1,
    },
    Migration {
        version: 2,
        description: "settings with defaults",
        apply: migrate_v2,
    },
    Migration {
        version: 3,
        description: "sync queue",
        apply: migrate_v3,
    },
];

/// Настройки, которые появляются вместе с коллекцией `settings`.
pub const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    ("currency", r#""CNY""#),
    ("theme", r#""light""#),
    ("reminderDays", "3"),
];

fn migrate_v1(tx: &Transaction<'_>) -> Result<()> {
    for def in [&schema::USER, &schema::EVENTS, &schema::CONTACTS] {
        if schema::ensure_collection(tx, def)? {
            info!("created collection '{}'", def.name);
        }
    }
    Ok(())
}

fn migrate_v2(tx: &Transaction<'_>) -> Result<()> {
    // Значения по умолчанию пишем только вместе с созданием коллекции
    if schema::ensure_collection(tx, &schema::SETTINGS)? {
        info!("created collection '{}'", schema::SETTINGS.name);
        for (key, value) in DEFAULT_SETTINGS {
            tx.execute(
                r#"INSERT INTO "settings" (pk, body)
                   VALUES (?1, json_object('key', ?1, 'value', json(?2)))"#,
                params![key, value],
            )?;
        }
    }
    Ok(())
}

fn migrate_v3(tx: &Transaction<'_>) -> Result<()> {
    if schema::ensure_collection(tx, &schema::SYNC_QUEUE)? {
        info!("created collection '{}'", schema::SYNC_QUEUE.name);
    }
    Ok(())
}

pub fn schema_version(conn: &Connection) -> Result<u32> {
    conn.query_row("PRAGMA user_version;", [], |r| r.get(0))
}

/// Поднимает схему до `target`. Каждый шаг вместе с `user_version` идёт в своей транзакции.
/// Возвращает версии, которые были применены (пусто, если схема уже актуальна).
pub fn setup_migrations(conn: &mut Connection, target: u32) -> Result<Vec<u32>> {
    conn.execute_batch(SCHEMA_CATALOGUE)?;

    let stored = schema_version(conn)?;
    debug!("stored schema version {stored}, target {target}");

    let mut applied = Vec::new();
    for migration in MIGRATIONS
        .iter()
        .filter(|m| m.version > stored && m.version <= target)
    {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        (migration.apply)(&tx)?;
        tx.pragma_update(None, "user_version", migration.version)?;
        tx.commit()?;

        info!(
            "schema migrated to v{} ({})",
            migration.version, migration.description
        );
        applied.push(migration.version);
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::collection_names;

    #[test]
    fn test_fresh_store_applies_all_steps() {
        let mut conn = Connection::open_in_memory().expect("Failed to open in-memory database");
        let applied = setup_migrations(&mut conn, LATEST_SCHEMA_VERSION).expect("migrate");

        assert_eq!(applied, vec![1, 2, 3]);
        assert_eq!(schema_version(&conn).expect("version"), 3);
        assert_eq!(
            collection_names(&conn).expect("names"),
            vec!["contacts", "events", "settings", "syncQueue", "user"]
        );

        let settings: i64 = conn
            .query_row(r#"SELECT count(*) FROM "settings""#, [], |r| r.get(0))
            .expect("count settings");
        assert_eq!(settings, 3);
    }

    #[test]
    fn test_second_run_applies_nothing() {
        let mut conn = Connection::open_in_memory().expect("Failed to open in-memory database");
        setup_migrations(&mut conn, LATEST_SCHEMA_VERSION).expect("first migrate");
        let applied = setup_migrations(&mut conn, LATEST_SCHEMA_VERSION).expect("second migrate");
        assert!(applied.is_empty());
    }

    #[test]
    fn test_partial_upgrade_applies_only_newer_steps() {
        let mut conn = Connection::open_in_memory().expect("Failed to open in-memory database");
        assert_eq!(setup_migrations(&mut conn, 1).expect("migrate to v1"), vec![1]);
        assert_eq!(schema_version(&conn).expect("version"), 1);

        let applied = setup_migrations(&mut conn, LATEST_SCHEMA_VERSION).expect("migrate to v3");
        assert_eq!(applied, vec![2, 3]);
        assert_eq!(schema_version(&conn).expect("version"), 3);
    }

    #[test]
    fn test_default_settings_are_json_records() {
        let mut conn = Connection::open_in_memory().expect("Failed to open in-memory database");
        setup_migrations(&mut conn, LATEST_SCHEMA_VERSION).expect("migrate");

        let body: String = conn
            .query_row(
                r#"SELECT body FROM "settings" WHERE pk = 'reminderDays'"#,
                [],
                |r| r.get(0),
            )
            .expect("reminderDays row");
        let value: serde_json::Value = serde_json::from_str(&body).expect("json body");
        assert_eq!(value, serde_json::json!({"key": "reminderDays", "value": 3}));
    }
}
