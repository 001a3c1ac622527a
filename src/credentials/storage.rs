//! Persisted access tokens.
//!
//! Tokens are stored as vault ciphertext keyed by the LMS setup id, so a
//! restarted process can reuse a token the LMS still accepts.

use super::StoredToken;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Storage for encrypted access tokens, keyed by LMS setup id.
pub trait TokenStore: Send + Sync {
    fn load(&self, lms_setup_id: i64) -> Result<Option<StoredToken>>;

    /// Stores a token, replacing any previous one for the setup.
    fn save(&self, lms_setup_id: i64, token: &StoredToken) -> Result<()>;

    /// Removes the token. Returns false if none was stored.
    fn remove(&self, lms_setup_id: i64) -> Result<bool>;
}

/// Process-local token store.
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<HashMap<i64, StoredToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tokens(&self) -> Result<MutexGuard<'_, HashMap<i64, StoredToken>>> {
        self.tokens
            .lock()
            .map_err(|_| anyhow!("Token store lock poisoned"))
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self, lms_setup_id: i64) -> Result<Option<StoredToken>> {
        Ok(self.tokens()?.get(&lms_setup_id).cloned())
    }

    fn save(&self, lms_setup_id: i64, token: &StoredToken) -> Result<()> {
        self.tokens()?.insert(lms_setup_id, token.clone());
        Ok(())
    }

    fn remove(&self, lms_setup_id: i64) -> Result<bool> {
        Ok(self.tokens()?.remove(&lms_setup_id).is_some())
    }
}

/// Token store backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE lms_access_tokens (
///     lms_setup_id INTEGER PRIMARY KEY,
///     ciphertext TEXT NOT NULL,   -- setup-scoped vault ciphertext
///     expires_at TEXT,            -- ISO 8601 timestamp (optional)
///     updated_at TEXT NOT NULL    -- ISO 8601 timestamp
/// );
/// ```
pub struct SqliteTokenStore {
    conn: Mutex<Connection>,
}

impl SqliteTokenStore {
    /// Creates or opens a token store.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open(db_path).context("Failed to open token database")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS lms_access_tokens (
                lms_setup_id INTEGER PRIMARY KEY,
                ciphertext TEXT NOT NULL,
                expires_at TEXT,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create lms_access_tokens table")?;

        info!(path = %db_path.display(), "Token store opened");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Token database lock poisoned"))
    }
}

impl TokenStore for SqliteTokenStore {
    fn load(&self, lms_setup_id: i64) -> Result<Option<StoredToken>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT ciphertext, expires_at FROM lms_access_tokens WHERE lms_setup_id = ?1",
            )
            .context("Failed to prepare query")?;

        let mut rows = stmt
            .query(params![lms_setup_id])
            .context("Failed to execute query")?;

        let Some(row) = rows.next().context("Failed to read row")? else {
            return Ok(None);
        };

        let ciphertext: String = row.get(0)?;
        let expires_at: Option<String> = row.get(1)?;
        let expires_at = expires_at
            .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
            .transpose()
            .context("Failed to parse expires_at timestamp")?;

        Ok(Some(StoredToken {
            ciphertext,
            expires_at,
        }))
    }

    fn save(&self, lms_setup_id: i64, token: &StoredToken) -> Result<()> {
        let expires_at = token.expires_at.map(|dt| dt.to_rfc3339());
        let now = Utc::now().to_rfc3339();

        self.conn()?
            .execute(
                r#"
                INSERT INTO lms_access_tokens (lms_setup_id, ciphertext, expires_at, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(lms_setup_id) DO UPDATE SET
                    ciphertext = excluded.ciphertext,
                    expires_at = excluded.expires_at,
                    updated_at = excluded.updated_at
                "#,
                params![lms_setup_id, token.ciphertext, expires_at, now],
            )
            .context("Failed to store access token")?;

        Ok(())
    }

    fn remove(&self, lms_setup_id: i64) -> Result<bool> {
        let rows_affected = self
            .conn()?
            .execute(
                "DELETE FROM lms_access_tokens WHERE lms_setup_id = ?1",
                params![lms_setup_id],
            )
            .context("Failed to delete access token")?;

        debug!(lms_setup = lms_setup_id, removed = rows_affected > 0, "Removed stored access token");
        Ok(rows_affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token(ciphertext: &str) -> StoredToken {
        StoredToken {
            ciphertext: ciphertext.to_string(),
            expires_at: Some(Utc::now() + Duration::hours(1)),
        }
    }

    fn exercise_store(store: &dyn TokenStore) {
        assert!(store.load(1).unwrap().is_none());

        store.save(1, &token("first")).unwrap();
        store.save(2, &token("other")).unwrap();
        assert_eq!(store.load(1).unwrap().unwrap().ciphertext, "first");

        // Upsert replaces
        store
            .save(
                1,
                &StoredToken {
                    ciphertext: "second".to_string(),
                    expires_at: None,
                },
            )
            .unwrap();
        let loaded = store.load(1).unwrap().unwrap();
        assert_eq!(loaded.ciphertext, "second");
        assert!(loaded.expires_at.is_none());

        assert!(store.remove(1).unwrap());
        assert!(!store.remove(1).unwrap());
        assert!(store.load(1).unwrap().is_none());
        assert_eq!(store.load(2).unwrap().unwrap().ciphertext, "other");
    }

    #[test]
    fn test_memory_store() {
        exercise_store(&MemoryTokenStore::new());
    }

    #[test]
    fn test_sqlite_store() {
        exercise_store(&SqliteTokenStore::new(":memory:").unwrap());
    }

    #[test]
    fn test_sqlite_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.db");

        let expires_at = Utc::now() + Duration::minutes(30);
        {
            let store = SqliteTokenStore::new(&path).unwrap();
            store
                .save(
                    5,
                    &StoredToken {
                        ciphertext: "persisted".to_string(),
                        expires_at: Some(expires_at),
                    },
                )
                .unwrap();
        }

        let reopened = SqliteTokenStore::new(&path).unwrap();
        let loaded = reopened.load(5).unwrap().unwrap();
        assert_eq!(loaded.ciphertext, "persisted");
        assert_eq!(loaded.expires_at.unwrap().timestamp(), expires_at.timestamp());
    }
}
