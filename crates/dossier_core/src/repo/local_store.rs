//! Local durable key-value storage used as the canvas fallback.
//!
//! # Responsibility
//! - Persist opaque string values under namespaced keys.
//! - Derive canvas keys from project ids.
//!
//! # Invariants
//! - `put` overwrites; the last write for a key wins.
//! - Canvas keys are `dossier_canvas_<project_id>`.

use crate::repo::canvas_repo::{RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Mutex;

const CANVAS_KEY_PREFIX: &str = "dossier_canvas_";

/// Returns the local storage key holding a project's canvas.
pub fn canvas_key(project_id: &str) -> String {
    format!("{CANVAS_KEY_PREFIX}{project_id}")
}

/// Key-value storage contract for local durable fallback.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> RepoResult<Option<String>>;
    fn put(&self, key: &str, value: &str) -> RepoResult<()>;
}

/// SQLite-backed local store (`local_kv` table).
pub struct SqliteLocalStore {
    conn: Mutex<Connection>,
}

impl SqliteLocalStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> RepoResult<T>) -> RepoResult<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| RepoError::Unavailable("local store lock poisoned".to_string()))?;
        f(&conn)
    }
}

impl LocalStore for SqliteLocalStore {
    fn get(&self, key: &str) -> RepoResult<Option<String>> {
        self.with_conn(|conn| {
            let value = conn
                .query_row("SELECT value FROM local_kv WHERE key = ?1;", [key], |row| {
                    row.get::<_, String>(0)
                })
                .optional()?;
            Ok(value)
        })
    }

    fn put(&self, key: &str, value: &str) -> RepoResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO local_kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = (strftime('%s', 'now') * 1000);",
                params![key, value],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{canvas_key, LocalStore, SqliteLocalStore};
    use crate::db::open_db_in_memory;

    #[test]
    fn canvas_key_is_namespaced_by_project() {
        assert_eq!(canvas_key("p-42"), "dossier_canvas_p-42");
    }

    #[test]
    fn put_overwrites_previous_value() {
        let store = SqliteLocalStore::new(open_db_in_memory().unwrap());
        store.put("k", "one").unwrap();
        store.put("k", "two").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("two"));
        assert!(store.get("other").unwrap().is_none());
    }
}
