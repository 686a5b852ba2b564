//! SQLite realisation of the shared key-value store.
//!
//! Several processes may open the same database file. Cross-process change
//! detection relies on `PRAGMA data_version`, which SQLite bumps for a
//! connection whenever a *different* connection commits.
//!
//! SQLite skips the page write when an update leaves the row unchanged, and
//! `data_version` then stays put. Every upsert bumps the row's `revision` so
//! rewriting identical bytes still counts as a commit.

use super::{KvStore, StoreKey, StoreResult};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};

/// Key-value store over the `kv_entries` table of a migrated connection.
#[derive(Clone, Copy)]
pub struct SqliteKvStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteKvStore<'conn> {
    /// Wraps a connection returned by `open_db` / `open_db_in_memory`.
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl KvStore for SqliteKvStore<'_> {
    fn read(&self, key: StoreKey) -> StoreResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_entries WHERE key = ?1;",
                [key.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn write(&self, key: StoreKey, value: &str) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO kv_entries (key, value, updated_at)
             VALUES (?1, ?2, strftime('%s', 'now') * 1000)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at,
                revision = kv_entries.revision + 1;",
            params![key.as_str(), value],
        )?;
        debug!(
            "event=store_write module=store status=ok key={key} bytes={}",
            value.len()
        );
        Ok(())
    }

    fn remove(&self, key: StoreKey) -> StoreResult<()> {
        self.conn
            .execute("DELETE FROM kv_entries WHERE key = ?1;", [key.as_str()])?;
        debug!("event=store_remove module=store status=ok key={key}");
        Ok(())
    }

    fn external_version(&self) -> StoreResult<u64> {
        let version = self
            .conn
            .query_row("PRAGMA data_version;", [], |row| row.get::<_, i64>(0))?;
        Ok(version.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteKvStore;
    use crate::db::{open_db, open_db_in_memory};
    use crate::store::{KvStore, StoreKey};

    #[test]
    fn read_missing_key_returns_none() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteKvStore::new(&conn);
        assert_eq!(store.read(StoreKey::Books).unwrap(), None);
    }

    #[test]
    fn write_replaces_previous_value_and_remove_clears_it() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteKvStore::new(&conn);

        store.write(StoreKey::Session, "{\"a\":1}").unwrap();
        store.write(StoreKey::Session, "{\"a\":2}").unwrap();
        assert_eq!(
            store.read(StoreKey::Session).unwrap().as_deref(),
            Some("{\"a\":2}")
        );

        store.remove(StoreKey::Session).unwrap();
        store.remove(StoreKey::Session).unwrap();
        assert_eq!(store.read(StoreKey::Session).unwrap(), None);
    }

    #[test]
    fn external_version_ignores_own_writes_and_tracks_other_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.sqlite3");
        let conn_a = open_db(&path).unwrap();
        let conn_b = open_db(&path).unwrap();
        let store_a = SqliteKvStore::new(&conn_a);
        let store_b = SqliteKvStore::new(&conn_b);

        let before = store_a.external_version().unwrap();
        store_a.write(StoreKey::Loans, "[]").unwrap();
        assert_eq!(store_a.external_version().unwrap(), before);

        store_b.write(StoreKey::Loans, "[]").unwrap();
        assert_ne!(store_a.external_version().unwrap(), before);
    }

    #[test]
    fn identical_write_from_other_connection_moves_external_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.sqlite3");
        let conn_a = open_db(&path).unwrap();
        let conn_b = open_db(&path).unwrap();
        let store_a = SqliteKvStore::new(&conn_a);
        let store_b = SqliteKvStore::new(&conn_b);

        store_b.write(StoreKey::Books, "[1]").unwrap();
        let first = store_a.external_version().unwrap();

        store_b.write(StoreKey::Books, "[1]").unwrap();
        let same_bytes = store_a.external_version().unwrap();
        assert_ne!(same_bytes, first);

        store_b.write(StoreKey::Books, "[2]").unwrap();
        assert_ne!(store_a.external_version().unwrap(), same_bytes);
        assert_eq!(store_a.read(StoreKey::Books).unwrap().as_deref(), Some("[2]"));
    }
}
