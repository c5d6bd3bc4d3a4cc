use sqlx::FromRow;

/// One row of the local key-value store.
#[derive(Debug, Clone, FromRow)]
pub struct KvEntry {
    pub key: String,
    pub value: String,
}
