// src/main.rs
//
// Пробный запуск: открыть хранилище по переменным окружения, показать
// состояние схемы и очереди, почистить очередь.

use anyhow::Context;
use log::{debug, info};
use std::env;
use std::sync::Arc;

use renqing_store::db::monitoring::gather_metrics;
use renqing_store::{FileKeyValueArea, Ledger, StoreConfig};

const SESSION_PATH_VAR: &str = "RENQING_SESSION_PATH";
const DEFAULT_SESSION_PATH: &str = "renqing-session.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = StoreConfig::from_env();
    let session_path = env::var(SESSION_PATH_VAR).unwrap_or_else(|_| DEFAULT_SESSION_PATH.to_string());
    let session = FileKeyValueArea::open(&session_path)
        .with_context(|| format!("Failed to open session storage {session_path}"))?;

    let ledger = Ledger::open(config, Arc::new(session))
        .await
        .context("Failed to open store")?;

    let version = ledger.db.schema_version().await?;
    let collections = ledger.db.collections().await?;
    let pending = ledger.queue.list_pending(0).await?;

    println!("schema version: {version}");
    println!("collections: {}", collections.join(", "));
    println!("pending sync items: {}", pending.len());
    match ledger.auth.current_user() {
        Some(user) => println!("signed in as {} <{}>", user.name, user.email),
        None => println!("not signed in"),
    }

    let removed = ledger.cleanup_queue().await;
    info!("queue cleanup removed {removed} item(s)");

    debug!("{}", gather_metrics());
    Ok(())
}
