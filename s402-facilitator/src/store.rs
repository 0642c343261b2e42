//! SQLite-backed replay and discovery store.
//!
//! One database file serves every facilitator worker. Replay records are
//! write-once via `INSERT OR IGNORE`, which is the conditional write that
//! keeps settlement exactly-once across workers; discovery entries are
//! keyed by resource URL with newest-wins overwrite semantics.

use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use s402::proto::{DiscoveryEntry, SettleResponse};
use s402::store::{DiscoveryStore, ReplayStore, StoreError};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS replay_records (
    tx_hash TEXT PRIMARY KEY,
    settle_result TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS discovery_resources (
    resource TEXT PRIMARY KEY,
    resource_type TEXT NOT NULL,
    entry TEXT NOT NULL,
    last_updated TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_discovery_updated ON discovery_resources(last_updated);
";

/// Shared keyed store over a SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens (and migrates) the store at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the database cannot be opened or the
    /// schema cannot be applied.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(sql_err)?;
        conn.execute_batch(SCHEMA).map_err(sql_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens a throwaway in-memory database. Test use only.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(sql_err)?;
        conn.execute_batch(SCHEMA).map_err(sql_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError("store lock poisoned".to_owned()))
    }
}

fn sql_err(e: rusqlite::Error) -> StoreError {
    StoreError(e.to_string())
}

fn json_err(e: serde_json::Error) -> StoreError {
    StoreError(e.to_string())
}

fn collect_entries(
    conn: &Connection,
    sql: &str,
    binder: &[&dyn rusqlite::ToSql],
) -> Result<Vec<DiscoveryEntry>, StoreError> {
    let mut stmt = conn.prepare(sql).map_err(sql_err)?;
    let rows = stmt
        .query_map(binder, |row| row.get::<_, String>(0))
        .map_err(sql_err)?;
    let mut entries = Vec::new();
    for row in rows {
        let json = row.map_err(sql_err)?;
        entries.push(serde_json::from_str(&json).map_err(json_err)?);
    }
    Ok(entries)
}

#[async_trait::async_trait]
impl ReplayStore for SqliteStore {
    async fn get(&self, tx_hash: &str) -> Result<Option<SettleResponse>, StoreError> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT settle_result FROM replay_records WHERE tx_hash = ?1",
                params![tx_hash],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql_err)?;
        raw.map(|json| serde_json::from_str(&json).map_err(json_err))
            .transpose()
    }

    async fn put_if_absent(
        &self,
        tx_hash: &str,
        result: &SettleResponse,
    ) -> Result<bool, StoreError> {
        let json = serde_json::to_string(result).map_err(json_err)?;
        let conn = self.lock()?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO replay_records (tx_hash, settle_result, created_at)
                 VALUES (?1, ?2, ?3)",
                params![tx_hash, json, chrono::Utc::now().timestamp()],
            )
            .map_err(sql_err)?;
        Ok(inserted == 1)
    }
}

#[async_trait::async_trait]
impl DiscoveryStore for SqliteStore {
    async fn list(
        &self,
        type_filter: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<DiscoveryEntry>, u64), StoreError> {
        let conn = self.lock()?;

        let total: u64 = match type_filter {
            Some(kind) => conn.query_row(
                "SELECT COUNT(*) FROM discovery_resources WHERE resource_type = ?1",
                params![kind],
                |row| row.get(0),
            ),
            None => conn.query_row("SELECT COUNT(*) FROM discovery_resources", [], |row| {
                row.get(0)
            }),
        }
        .map_err(sql_err)?;

        let entries = match type_filter {
            Some(kind) => collect_entries(
                &conn,
                "SELECT entry FROM discovery_resources WHERE resource_type = ?1
                 ORDER BY last_updated DESC LIMIT ?2 OFFSET ?3",
                &[&kind, &limit, &offset],
            )?,
            None => collect_entries(
                &conn,
                "SELECT entry FROM discovery_resources
                 ORDER BY last_updated DESC LIMIT ?1 OFFSET ?2",
                &[&limit, &offset],
            )?,
        };

        Ok((entries, total))
    }

    async fn register(&self, entry: DiscoveryEntry) -> Result<(), StoreError> {
        let json = serde_json::to_string(&entry).map_err(json_err)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO discovery_resources
                 (resource, resource_type, entry, last_updated)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.resource,
                entry.r#type,
                json,
                entry.last_updated.to_rfc3339(),
            ],
        )
        .map_err(sql_err)?;
        Ok(())
    }

    async fn unregister(&self, resource: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let removed = conn
            .execute(
                "DELETE FROM discovery_resources WHERE resource = ?1",
                params![resource],
            )
            .map_err(sql_err)?;
        Ok(removed > 0)
    }

    async fn get(&self, resource: &str) -> Result<Option<DiscoveryEntry>, StoreError> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT entry FROM discovery_resources WHERE resource = ?1",
                params![resource],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql_err)?;
        raw.map(|json| serde_json::from_str(&json).map_err(json_err))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use s402::proto::Network;

    fn entry(resource: &str, kind: &str, age_secs: i64) -> DiscoveryEntry {
        DiscoveryEntry {
            resource: resource.to_owned(),
            r#type: kind.to_owned(),
            accepts: vec![],
            last_updated: Utc::now() - Duration::seconds(age_secs),
            metadata: Some(serde_json::json!({"category": "test"})),
        }
    }

    #[tokio::test]
    async fn replay_insert_is_conditional() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = SettleResponse::success("h1", Network::StellarTestnet, "GPAYER");
        let second = SettleResponse::success("other", Network::StellarTestnet, "GPAYER");

        assert!(store.put_if_absent("h1", &first).await.unwrap());
        assert!(!store.put_if_absent("h1", &second).await.unwrap());

        let cached = ReplayStore::get(&store, "h1").await.unwrap().unwrap();
        assert_eq!(cached.transaction, "h1");
        assert!(ReplayStore::get(&store, "h2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn discovery_pagination_newest_first() {
        let store = SqliteStore::open_in_memory().unwrap();
        for (i, age) in [300, 200, 100, 50, 10].iter().enumerate() {
            store
                .register(entry(&format!("https://r{i}"), "http", *age))
                .await
                .unwrap();
        }

        let (page, total) = store.list(None, 2, 0).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page[0].resource, "https://r4");
        assert_eq!(page[1].resource, "https://r3");

        let (page, _) = store.list(None, 2, 2).await.unwrap();
        assert_eq!(page[0].resource, "https://r2");
    }

    #[tokio::test]
    async fn discovery_type_filter() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.register(entry("https://a", "http", 10)).await.unwrap();
        store.register(entry("https://b", "mcp", 5)).await.unwrap();

        let (page, total) = store.list(Some("mcp"), 20, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(page[0].resource, "https://b");
    }

    #[tokio::test]
    async fn register_overwrites_and_unregister_removes() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.register(entry("https://a", "http", 100)).await.unwrap();
        store.register(entry("https://a", "api", 0)).await.unwrap();

        let current = DiscoveryStore::get(&store, "https://a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.r#type, "api");

        let (_, total) = store.list(None, 20, 0).await.unwrap();
        assert_eq!(total, 1);

        assert!(store.unregister("https://a").await.unwrap());
        assert!(!store.unregister("https://a").await.unwrap());
    }
}
