use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{query, query_as, SqlitePool};

use crate::db::schema::KvEntry;

pub async fn migrate(conn: &SqlitePool) -> anyhow::Result<()> {
    query(
        "CREATE TABLE IF NOT EXISTS kv (
             key   TEXT PRIMARY KEY,
             value TEXT NOT NULL
         );")
        .execute(conn)
        .await?;

    Ok(())
}

pub async fn get_value(conn: &SqlitePool, key: &str) -> anyhow::Result<Option<String>> {
    let r = query_as::<_, KvEntry>("SELECT key, value FROM kv WHERE key=?;")
        .bind(key)
        .fetch_optional(conn)
        .await?;

    Ok(r.map(|entry| entry.value))
}

pub async fn put_value(conn: &SqlitePool, key: &str, value: &str) -> anyhow::Result<()> {
    query(
        "INSERT INTO kv (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value;")
        .bind(key)
        .bind(value)
        .execute(conn)
        .await?;

    Ok(())
}

pub async fn put_json<T: Serialize + ?Sized>(conn: &SqlitePool, key: &str, value: &T) -> anyhow::Result<()> {
    let raw = serde_json::to_string(value)?;
    put_value(conn, key, &raw).await
}

/// Parses the value stored under `key`. Malformed JSON is an error; the caller decides whether to
/// fall back to a default.
pub async fn get_json<T: DeserializeOwned>(conn: &SqlitePool, key: &str) -> anyhow::Result<Option<T>> {
    let raw = match get_value(conn, key).await? {
        None => return Ok(None),
        Some(v) => v,
    };

    Ok(Some(serde_json::from_str(&raw)?))
}
