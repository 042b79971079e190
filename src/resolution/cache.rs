//! Cross-run resolution cache
//!
//! Only resolved outcomes are stored, as the raw latest text. Parsing is
//! deterministic, so re-parsing on load yields the same identity that was
//! computed when the entry was written.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

#[cfg(test)]
use mockall::automock;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, error, info};

use crate::error::CacheError;
use crate::resolution::outcome::ResolutionOutcome;
use crate::source::StrategyKind;

/// One stored resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResolution {
    pub latest: String,
    pub source: StrategyKind,
    /// Milliseconds since UNIX epoch
    pub fetched_at: i64,
}

/// Storage backend keyed by application key. Last writer wins.
#[cfg_attr(test, automock)]
pub trait OutcomeStore: Send + Sync {
    fn get(&self, app_key: &str) -> Result<Option<CachedResolution>, CacheError>;

    fn put(&self, app_key: &str, entry: &CachedResolution) -> Result<(), CacheError>;
}

/// Get current timestamp in milliseconds since UNIX epoch
pub(crate) fn current_timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// In-process store bounded by entry count; the oldest entry is evicted first
pub struct MemoryStore {
    entries: Mutex<HashMap<String, CachedResolution>>,
    max_entries: usize,
}

impl MemoryStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, CachedResolution>>, CacheError> {
        self.entries.lock().map_err(|_| CacheError::LockPoisoned)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OutcomeStore for MemoryStore {
    fn get(&self, app_key: &str) -> Result<Option<CachedResolution>, CacheError> {
        Ok(self.lock()?.get(app_key).cloned())
    }

    fn put(&self, app_key: &str, entry: &CachedResolution) -> Result<(), CacheError> {
        let mut entries = self.lock()?;

        if !entries.contains_key(app_key) && entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.fetched_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                debug!("Evicting cached resolution for {}", oldest);
                entries.remove(&oldest);
            }
        }

        entries.insert(app_key.to_string(), entry.clone());
        Ok(())
    }
}

/// Schema migrations
/// Each version contains a list of SQL statements to execute
const MIGRATIONS: &[&[&str]] = &[
    // v1: index for pruning by age
    &["CREATE INDEX IF NOT EXISTS idx_resolutions_fetched_at ON resolutions(fetched_at)"],
];

/// SQLite-backed store shared across runs
pub struct SqliteStore {
    conn: Mutex<Connection>,
    max_entries: usize,
}

impl SqliteStore {
    pub fn new(db_path: &Path, max_entries: usize) -> Result<Self, CacheError> {
        info!("Initializing cache database at {:?}", db_path);

        let conn = Connection::open(db_path)?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let store = Self {
            conn: Mutex::new(conn),
            max_entries: max_entries.max(1),
        };

        store.create_schema()?;
        debug!("Cache database ready");

        Ok(store)
    }

    /// Acquire database connection lock with proper error handling
    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn.lock().map_err(|_| CacheError::LockPoisoned)
    }

    fn create_schema(&self) -> Result<(), CacheError> {
        let conn = self.lock_conn()?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS resolutions (
                app_key TEXT PRIMARY KEY,
                latest TEXT NOT NULL,
                source TEXT NOT NULL,
                fetched_at INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        Self::apply_migrations(&conn)
    }

    /// Apply pending migrations based on user_version pragma
    fn apply_migrations(conn: &Connection) -> Result<(), CacheError> {
        let current_version: i32 =
            conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        for (i, statements) in MIGRATIONS.iter().enumerate() {
            let version = (i + 1) as i32;
            if version > current_version {
                for sql in *statements {
                    conn.execute(sql, [])?;
                }
                debug!("Applied migration v{}", version);
            }
        }

        let target_version = MIGRATIONS.len() as i32;
        if target_version > current_version {
            conn.pragma_update(None, "user_version", target_version)?;
        }

        Ok(())
    }
}

impl OutcomeStore for SqliteStore {
    fn get(&self, app_key: &str) -> Result<Option<CachedResolution>, CacheError> {
        let conn = self.lock_conn()?;
        let row = conn
            .query_row(
                "SELECT latest, source, fetched_at FROM resolutions WHERE app_key = ?1",
                [app_key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        // Rows written by a build with other source kinds read as misses
        Ok(row.and_then(|(latest, source, fetched_at)| {
            StrategyKind::from_str(&source)
                .ok()
                .map(|source| CachedResolution {
                    latest,
                    source,
                    fetched_at,
                })
        }))
    }

    fn put(&self, app_key: &str, entry: &CachedResolution) -> Result<(), CacheError> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO resolutions (app_key, latest, source, fetched_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(app_key) DO UPDATE SET
                latest = excluded.latest,
                source = excluded.source,
                fetched_at = excluded.fetched_at
            "#,
            (app_key, &entry.latest, entry.source.as_str(), entry.fetched_at),
        )?;

        tx.execute(
            r#"
            DELETE FROM resolutions WHERE app_key IN (
                SELECT app_key FROM resolutions
                ORDER BY fetched_at DESC
                LIMIT -1 OFFSET ?1
            )
            "#,
            [self.max_entries as i64],
        )?;

        tx.commit()?;
        Ok(())
    }
}

/// TTL-bounded view over an [`OutcomeStore`]
///
/// Store failures never fail a run: they are logged and read as misses.
pub struct ResolutionCache {
    store: Box<dyn OutcomeStore>,
    ttl_ms: i64,
}

impl ResolutionCache {
    pub fn new(store: Box<dyn OutcomeStore>, ttl_ms: i64) -> Self {
        Self { store, ttl_ms }
    }

    /// Fresh cached outcome for the application, if any
    pub fn lookup(&self, app_key: &str) -> Option<ResolutionOutcome> {
        self.lookup_at(app_key, current_timestamp_ms())
    }

    pub(crate) fn lookup_at(&self, app_key: &str, now_ms: i64) -> Option<ResolutionOutcome> {
        let entry = self
            .store
            .get(app_key)
            .inspect_err(|e| error!("Failed to read cache for {}: {}", app_key, e))
            .ok()
            .flatten()?;

        if now_ms - entry.fetched_at > self.ttl_ms {
            debug!("Cached resolution for {} expired", app_key);
            return None;
        }

        debug!("Cache hit for {}: {}", app_key, entry.latest);
        Some(ResolutionOutcome::resolved(&entry.latest, entry.source))
    }

    /// Remember a resolved outcome; anything else is ignored
    pub fn record(&self, app_key: &str, outcome: &ResolutionOutcome) {
        self.record_at(app_key, outcome, current_timestamp_ms());
    }

    pub(crate) fn record_at(&self, app_key: &str, outcome: &ResolutionOutcome, now_ms: i64) {
        let ResolutionOutcome::Resolved { latest, source } = outcome else {
            return;
        };

        let entry = CachedResolution {
            latest: latest.raw().to_string(),
            source: *source,
            fetched_at: now_ms,
        };
        let _ = self
            .store
            .put(app_key, &entry)
            .inspect_err(|e| error!("Failed to write cache for {}: {}", app_key, e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::outcome::UnresolvedReason;
    use tempfile::TempDir;

    const HOUR_MS: i64 = 60 * 60 * 1000;

    fn entry(latest: &str, fetched_at: i64) -> CachedResolution {
        CachedResolution {
            latest: latest.to_string(),
            source: StrategyKind::WebPage,
            fetched_at,
        }
    }

    #[test]
    fn memory_store_last_writer_wins() {
        let store = MemoryStore::new(10);

        store.put("com.example.app", &entry("1.0", 1)).unwrap();
        store.put("com.example.app", &entry("1.1", 2)).unwrap();

        assert_eq!(store.get("com.example.app").unwrap(), Some(entry("1.1", 2)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn memory_store_evicts_oldest_when_full() {
        let store = MemoryStore::new(2);

        store.put("a", &entry("1.0", 10)).unwrap();
        store.put("b", &entry("1.0", 5)).unwrap();
        store.put("c", &entry("1.0", 20)).unwrap();

        assert_eq!(store.get("b").unwrap(), None);
        assert!(store.get("a").unwrap().is_some());
        assert!(store.get("c").unwrap().is_some());
    }

    #[test]
    fn sqlite_store_round_trips_and_upserts() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::new(&temp_dir.path().join("cache.db"), 100).unwrap();

        assert_eq!(store.get("com.example.app").unwrap(), None);

        store.put("com.example.app", &entry("2.0", 100)).unwrap();
        store.put("com.example.app", &entry("2.1", 200)).unwrap();

        assert_eq!(
            store.get("com.example.app").unwrap(),
            Some(entry("2.1", 200))
        );
    }

    #[test]
    fn sqlite_store_persists_across_connections() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("cache.db");

        SqliteStore::new(&db_path, 100)
            .unwrap()
            .put("com.example.app", &entry("3.0", 100))
            .unwrap();

        let reopened = SqliteStore::new(&db_path, 100).unwrap();
        assert_eq!(
            reopened.get("com.example.app").unwrap(),
            Some(entry("3.0", 100))
        );
    }

    #[test]
    fn sqlite_store_keeps_newest_entries_within_bound() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::new(&temp_dir.path().join("cache.db"), 2).unwrap();

        store.put("a", &entry("1.0", 10)).unwrap();
        store.put("b", &entry("1.0", 20)).unwrap();
        store.put("c", &entry("1.0", 30)).unwrap();

        assert_eq!(store.get("a").unwrap(), None);
        assert!(store.get("b").unwrap().is_some());
        assert!(store.get("c").unwrap().is_some());
    }

    #[test]
    fn lookup_returns_fresh_entry_reparsed() {
        let cache = ResolutionCache::new(Box::new(MemoryStore::new(10)), HOUR_MS);
        let outcome = ResolutionOutcome::resolved("5.1.2 (5102)", StrategyKind::Feed);

        cache.record_at("com.example.app", &outcome, 0);

        assert_eq!(cache.lookup_at("com.example.app", HOUR_MS), Some(outcome));
    }

    #[test]
    fn lookup_ignores_expired_entry() {
        let cache = ResolutionCache::new(Box::new(MemoryStore::new(10)), HOUR_MS);
        let outcome = ResolutionOutcome::resolved("1.0", StrategyKind::Feed);

        cache.record_at("com.example.app", &outcome, 0);

        assert_eq!(cache.lookup_at("com.example.app", HOUR_MS + 1), None);
    }

    #[test]
    fn record_skips_unresolved_outcomes() {
        let mut store = MockOutcomeStore::new();
        store.expect_put().never();
        let cache = ResolutionCache::new(Box::new(store), HOUR_MS);

        cache.record("com.example.app", &ResolutionOutcome::TimedOut);
        cache.record(
            "com.example.app",
            &ResolutionOutcome::Unresolved(UnresolvedReason::NoStrategy),
        );
    }

    #[test]
    fn lookup_treats_store_failure_as_miss() {
        let mut store = MockOutcomeStore::new();
        store
            .expect_get()
            .withf(|key| key == "com.example.app")
            .times(1)
            .returning(|_| Err(CacheError::LockPoisoned));
        let cache = ResolutionCache::new(Box::new(store), HOUR_MS);

        assert_eq!(cache.lookup("com.example.app"), None);
    }
}
