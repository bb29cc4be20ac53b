//! Session Revocation
//! Mission: Let issued tokens die before they expire, without rotating the key
//!
//! Every issued token carries a sign id. A token only authenticates while its
//! sign id is registered here. The durable store is authoritative; the cache
//! mirrors it for the hot path and is filled lazily on miss.
//!
//! The cache is per process. With several instances, an invalidation in one
//! process is not seen by another process's cache until restart, so
//! horizontally scaled deployments should plug in a shared
//! [`ValidTokenCache`] implementation.

use crate::auth::error::AuthResult;
use crate::db::{is_constraint_violation, Database};
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use rusqlite::params;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Durable, key-unique registry of valid sign ids.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Record `sign_id` for a token expiring at `expires_at` (unix seconds).
    /// `Ok(false)` when it is already present.
    async fn insert(&self, sign_id: &str, expires_at: i64) -> anyhow::Result<bool>;

    /// Remove `sign_id`. Absent ids are not an error.
    async fn delete(&self, sign_id: &str) -> anyhow::Result<()>;

    async fn contains(&self, sign_id: &str) -> anyhow::Result<bool>;

    /// Delete every record whose token expired before `now` (unix seconds)
    /// and return the removed ids.
    async fn purge_expired(&self, now: i64) -> anyhow::Result<Vec<String>>;
}

/// Fast mirror of the store's keys.
pub trait ValidTokenCache: Send + Sync {
    fn contains(&self, sign_id: &str) -> bool;
    fn insert(&self, sign_id: &str);
    fn remove(&self, sign_id: &str);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local cache. Grows with every token issued until invalidated or
/// swept.
#[derive(Default)]
pub struct InMemoryValidCache {
    ids: RwLock<HashSet<String>>,
}

impl InMemoryValidCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ValidTokenCache for InMemoryValidCache {
    fn contains(&self, sign_id: &str) -> bool {
        self.ids.read().contains(sign_id)
    }

    fn insert(&self, sign_id: &str) {
        self.ids.write().insert(sign_id.to_string());
    }

    fn remove(&self, sign_id: &str) {
        self.ids.write().remove(sign_id);
    }

    fn len(&self) -> usize {
        self.ids.read().len()
    }
}

/// `valid_tokens` table.
#[derive(Clone)]
pub struct SqliteRevocationStore {
    db: Database,
}

impl SqliteRevocationStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RevocationStore for SqliteRevocationStore {
    async fn insert(&self, sign_id: &str, expires_at: i64) -> anyhow::Result<bool> {
        let sign_id = sign_id.to_string();
        self.db
            .run(move |conn| {
                match conn.execute(
                    "INSERT INTO valid_tokens (sign_id, expires_at) VALUES (?1, ?2)",
                    params![sign_id, expires_at],
                ) {
                    Ok(_) => Ok(true),
                    Err(e) if is_constraint_violation(&e) => Ok(false),
                    Err(e) => Err(e).context("Failed to register sign id"),
                }
            })
            .await
    }

    async fn delete(&self, sign_id: &str) -> anyhow::Result<()> {
        let sign_id = sign_id.to_string();
        self.db
            .run(move |conn| {
                conn.execute(
                    "DELETE FROM valid_tokens WHERE sign_id = ?1",
                    params![sign_id],
                )
                .context("Failed to delete sign id")?;
                Ok(())
            })
            .await
    }

    async fn contains(&self, sign_id: &str) -> anyhow::Result<bool> {
        let sign_id = sign_id.to_string();
        self.db
            .run(move |conn| {
                let count: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM valid_tokens WHERE sign_id = ?1",
                        params![sign_id],
                        |row| row.get(0),
                    )
                    .context("Failed to look up sign id")?;
                Ok(count > 0)
            })
            .await
    }

    async fn purge_expired(&self, now: i64) -> anyhow::Result<Vec<String>> {
        self.db
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "DELETE FROM valid_tokens WHERE expires_at < ?1 RETURNING sign_id",
                )?;
                let removed = stmt
                    .query_map(params![now], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()
                    .context("Failed to purge stale sign ids")?;
                Ok(removed)
            })
            .await
    }
}

/// Cache-aside registry of which sign ids may still authenticate.
pub struct RevocationTracker {
    store: Arc<dyn RevocationStore>,
    cache: Arc<dyn ValidTokenCache>,
    // Held by writers across their store call, and by cache fills. Store
    // reads on the lookup path never take it.
    write_gate: Mutex<()>,
    // Bumped under the gate after every removal. A lookup whose store read
    // started before a removal must not fill the cache.
    removals: AtomicU64,
}

impl RevocationTracker {
    pub fn new(store: Arc<dyn RevocationStore>, cache: Arc<dyn ValidTokenCache>) -> Self {
        Self {
            store,
            cache,
            write_gate: Mutex::new(()),
            removals: AtomicU64::new(0),
        }
    }

    /// SQLite store with a process-local cache.
    pub fn sqlite(db: Database) -> Self {
        Self::new(
            Arc::new(SqliteRevocationStore::new(db)),
            Arc::new(InMemoryValidCache::new()),
        )
    }

    pub async fn is_valid(&self, sign_id: &str) -> AuthResult<bool> {
        if self.cache.contains(sign_id) {
            return Ok(true);
        }

        let seen = self.removals.load(Ordering::SeqCst);
        if !self.store.contains(sign_id).await? {
            return Ok(false);
        }

        let _gate = self.write_gate.lock().await;
        if self.removals.load(Ordering::SeqCst) == seen {
            debug!("Sign id loaded into cache from store");
            self.cache.insert(sign_id);
        }
        Ok(true)
    }

    /// Durably record `sign_id` for a token expiring at `expires_at` (unix
    /// seconds), then cache it. `Ok(false)` on collision; the caller should
    /// pick a new id.
    pub async fn register(&self, sign_id: &str, expires_at: i64) -> AuthResult<bool> {
        let _gate = self.write_gate.lock().await;
        if !self.store.insert(sign_id, expires_at).await? {
            return Ok(false);
        }
        self.cache.insert(sign_id);
        Ok(true)
    }

    /// Drop `sign_id` from store and cache. Idempotent.
    pub async fn invalidate(&self, sign_id: &str) -> AuthResult<()> {
        let _gate = self.write_gate.lock().await;
        self.store.delete(sign_id).await?;
        self.cache.remove(sign_id);
        self.removals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Remove records whose token `exp` has passed. Such tokens already fail
    /// expiry validation, so no verification outcome changes.
    pub async fn sweep_expired(&self) -> AuthResult<usize> {
        let now = Utc::now().timestamp();

        let _gate = self.write_gate.lock().await;
        let removed = self.store.purge_expired(now).await?;
        for sign_id in &removed {
            self.cache.remove(sign_id);
        }
        self.removals.fetch_add(1, Ordering::SeqCst);

        if !removed.is_empty() {
            info!("🧹 Swept {} expired sign ids", removed.len());
        }
        Ok(removed.len())
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}
