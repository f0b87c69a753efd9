//! SQLite baseline registry.
//!
//! Holds the tracked files, their baselines (including the full content
//! snapshot), the append-only check log with its forensic side tables, and the
//! raw change-notification audit log.
//!
//! The store assumes a single writer: one daemon instance, or one CLI command
//! while no daemon runs.

use crate::baseline::{self, CapturedBaseline};
use crate::hasher::{ContentHasher, HashAlgorithm};
use crate::models::*;
use crate::probe::MetadataProber;
use crate::{Result, SentinelError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

const GENERATION_KEY: &str = "watch_generation";
const ALGORITHM_KEY: &str = "hash_algorithm";

const TRACKED_SELECT: &str = "SELECT f.id, f.path, f.good_digest, f.degraded, f.auto_restore, f.auto_email,
        b.permission, b.owner, b.grp, b.mod_time_ns, length(b.raw_snapshot)
     FROM files AS f JOIN file_baseline AS b ON b.file_id = f.id";

pub struct BaselineStore {
    conn: Mutex<Connection>,
    location: Option<PathBuf>,
}

impl BaselineStore {
    /// Create a new, empty store. Fails if a store already exists at `path`.
    pub fn create(path: &Path, algorithm: HashAlgorithm) -> Result<Self> {
        if path.exists() {
            return Err(SentinelError::StoreExists(path.display().to_string()));
        }
        let conn = Connection::open(path)?;
        restrict_permissions(path)?;
        let store = Self::configure(conn, Some(path.to_path_buf()))?;
        store.init_meta(algorithm)?;
        info!(path = %path.display(), algorithm = algorithm.as_str(), "baseline store created");
        Ok(store)
    }

    /// Open an existing store.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(SentinelError::StoreMissing(path.display().to_string()));
        }
        let conn = Connection::open(path)?;
        Self::configure(conn, Some(path.to_path_buf()))
    }

    /// Open in-memory store (for testing)
    pub fn open_in_memory(algorithm: HashAlgorithm) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self::configure(conn, None)?;
        store.init_meta(algorithm)?;
        Ok(store)
    }

    /// Build a store from a list of paths in one transaction.
    ///
    /// All-or-nothing: a duplicated path, a symbolic link, a non-regular file
    /// or an unreadable file aborts the whole generation and removes the
    /// partially created store.
    pub fn bulk_generate(
        store_path: &Path,
        paths: &[PathBuf],
        policy: Policy,
        hasher: &dyn ContentHasher,
        prober: &dyn MetadataProber,
    ) -> Result<Self> {
        if store_path.exists() {
            return Err(SentinelError::StoreExists(store_path.display().to_string()));
        }

        let mut seen = HashSet::new();
        for path in paths {
            let normalized = baseline::normalize_path(path)?;
            if !seen.insert(normalized.clone()) {
                return Err(SentinelError::Duplicate(normalized.display().to_string()));
            }
        }

        let store = Self::create(store_path, hasher.algorithm())?;
        let outcome = store.insert_all(paths, policy, hasher, prober);
        match outcome {
            Ok(count) => {
                info!(files = count, "bulk baseline generation complete");
                Ok(store)
            }
            Err(e) => {
                drop(store);
                remove_store_files(store_path);
                warn!(error = %e, "bulk generation failed; partial store removed");
                Err(e)
            }
        }
    }

    fn insert_all(
        &self,
        paths: &[PathBuf],
        policy: Policy,
        hasher: &dyn ContentHasher,
        prober: &dyn MetadataProber,
    ) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for path in paths {
            let captured = baseline::capture(path, hasher, prober)?;
            Self::insert_captured(&tx, &captured, policy)?;
            debug!(path = %captured.path, "baseline captured");
        }
        bump_generation(&tx)?;
        tx.commit()?;
        Ok(paths.len())
    }

    fn configure(conn: Connection, location: Option<PathBuf>) -> Result<Self> {
        if location.is_some() {
            conn.execute_batch(
                "PRAGMA foreign_keys = ON;
                 PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = FULL;",
            )?;
        } else {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        }
        let store = Self {
            conn: Mutex::new(conn),
            location,
        };
        store.migrate()?;
        Ok(store)
    }

    /// Run schema migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            [],
        )?;
        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )?;
        if current_version < 1 {
            Self::migrate_v1(&conn)?;
        }
        if current_version > SCHEMA_VERSION {
            return Err(SentinelError::Config(format!(
                "store schema version {current_version} is newer than supported {SCHEMA_VERSION}"
            )));
        }
        Ok(())
    }

    /// Schema version 1 - Initial schema
    fn migrate_v1(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE,
                good_digest TEXT NOT NULL,
                degraded INTEGER NOT NULL DEFAULT 0,
                auto_restore INTEGER NOT NULL DEFAULT 1,
                auto_email INTEGER NOT NULL DEFAULT 0,
                enrolled_at TEXT NOT NULL
            );

            -- 1:1 with files
            CREATE TABLE IF NOT EXISTS file_baseline (
                file_id INTEGER PRIMARY KEY,
                permission INTEGER NOT NULL,
                owner INTEGER NOT NULL,
                grp INTEGER NOT NULL,
                mod_time_ns INTEGER NOT NULL,
                raw_snapshot BLOB NOT NULL,
                FOREIGN KEY (file_id) REFERENCES files(id)
            );

            CREATE TABLE IF NOT EXISTS logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_id INTEGER NOT NULL,
                mismatch TEXT NOT NULL,
                ts TEXT NOT NULL,
                FOREIGN KEY (file_id) REFERENCES files(id)
            );

            CREATE INDEX IF NOT EXISTS idx_logs_file_id ON logs(file_id);

            CREATE TABLE IF NOT EXISTS bad_checksum_record (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                log_id INTEGER NOT NULL,
                bad_digest TEXT NOT NULL,
                bad_raw_data BLOB NOT NULL,
                FOREIGN KEY (log_id) REFERENCES logs(id)
            );

            CREATE TABLE IF NOT EXISTS bad_metadata_record (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                log_id INTEGER NOT NULL,
                bad_owner INTEGER NOT NULL,
                bad_group INTEGER NOT NULL,
                bad_permission INTEGER NOT NULL,
                FOREIGN KEY (log_id) REFERENCES logs(id)
            );

            CREATE TABLE IF NOT EXISTS change_notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts TEXT NOT NULL,
                raw_payload TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS store_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            INSERT OR REPLACE INTO schema_version (version) VALUES (1);
        "#,
        )?;
        Ok(())
    }

    fn init_meta(&self, algorithm: HashAlgorithm) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO store_meta (key, value) VALUES (?1, '0')",
            params![GENERATION_KEY],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO store_meta (key, value) VALUES (?1, ?2)",
            params![ALGORITHM_KEY, algorithm.as_str()],
        )?;
        Ok(())
    }

    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Algorithm the stored digests were computed with.
    pub fn hash_algorithm(&self) -> Result<HashAlgorithm> {
        let conn = self.conn.lock();
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM store_meta WHERE key = ?1",
                params![ALGORITHM_KEY],
                |row| row.get(0),
            )
            .optional()?;
        match value.as_deref() {
            Some("blake3") => Ok(HashAlgorithm::Blake3),
            Some("sha256") | None => Ok(HashAlgorithm::Sha256),
            Some(other) => Err(SentinelError::Config(format!(
                "unknown hash algorithm in store: {other}"
            ))),
        }
    }

    /// Counter bumped whenever the active set or a policy changes. The
    /// scheduler rebuilds its watch set when it observes a new value.
    pub fn watch_generation(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM store_meta WHERE key = ?1",
                params![GENERATION_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    // ========================================================================
    // Tracked files
    // ========================================================================

    /// Enroll one additional file.
    pub fn enroll(
        &self,
        path: &Path,
        policy: Policy,
        hasher: &dyn ContentHasher,
        prober: &dyn MetadataProber,
    ) -> Result<TrackedFile> {
        let normalized = baseline::normalize_path(path)?;
        let key = normalized.display().to_string();
        if self.get_by_path(&key)?.is_some() {
            return Err(SentinelError::Duplicate(key));
        }
        let captured = baseline::capture(&normalized, hasher, prober)?;

        let id = {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            let id = Self::insert_captured(&tx, &captured, policy)?;
            bump_generation(&tx)?;
            tx.commit()?;
            id
        };
        info!(path = %captured.path, id, "file enrolled");
        self.get(id)?
            .ok_or_else(|| SentinelError::UnknownFile(captured.path.clone()))
    }

    /// Explicit administrative baseline refresh: recapture content and
    /// metadata and clear the degraded flag.
    pub fn reenroll(
        &self,
        path: &Path,
        hasher: &dyn ContentHasher,
        prober: &dyn MetadataProber,
    ) -> Result<TrackedFile> {
        let normalized = baseline::normalize_path(path)?;
        let key = normalized.display().to_string();
        let existing = self
            .get_by_path(&key)?
            .ok_or_else(|| SentinelError::UnknownFile(key.clone()))?;
        let captured = baseline::capture(&normalized, hasher, prober)?;
        {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE files SET good_digest = ?1, degraded = 0 WHERE id = ?2",
                params![captured.digest, existing.id],
            )?;
            tx.execute(
                "UPDATE file_baseline
                 SET permission = ?1, owner = ?2, grp = ?3, mod_time_ns = ?4, raw_snapshot = ?5
                 WHERE file_id = ?6",
                params![
                    captured.metadata.permission,
                    captured.metadata.owner,
                    captured.metadata.group,
                    captured.metadata.mod_time_ns,
                    captured.snapshot,
                    existing.id,
                ],
            )?;
            bump_generation(&tx)?;
            tx.commit()?;
        }
        info!(path = %key, "baseline re-enrolled");
        self.get(existing.id)?
            .ok_or_else(|| SentinelError::UnknownFile(key))
    }

    fn insert_captured(tx: &Transaction<'_>, captured: &CapturedBaseline, policy: Policy) -> Result<i64> {
        let inserted = tx.execute(
            "INSERT INTO files (path, good_digest, degraded, auto_restore, auto_email, enrolled_at)
             VALUES (?1, ?2, 0, ?3, ?4, ?5)",
            params![
                captured.path,
                captured.digest,
                policy.auto_restore,
                policy.auto_email,
                Utc::now().to_rfc3339(),
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(SentinelError::Duplicate(captured.path.clone()));
            }
            Err(e) => return Err(e.into()),
        }
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO file_baseline (file_id, permission, owner, grp, mod_time_ns, raw_snapshot)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                captured.metadata.permission,
                captured.metadata.owner,
                captured.metadata.group,
                captured.metadata.mod_time_ns,
                captured.snapshot,
            ],
        )?;
        Ok(id)
    }

    pub fn get(&self, id: i64) -> Result<Option<TrackedFile>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("{TRACKED_SELECT} WHERE f.id = ?1"),
            params![id],
            row_to_tracked,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn get_by_path(&self, path: &str) -> Result<Option<TrackedFile>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("{TRACKED_SELECT} WHERE f.path = ?1"),
            params![path],
            row_to_tracked,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Non-degraded files, in enrollment order.
    pub fn list_active(&self) -> Result<Vec<TrackedFile>> {
        self.query_tracked(&format!("{TRACKED_SELECT} WHERE f.degraded = 0 ORDER BY f.id"))
    }

    pub fn list_all(&self) -> Result<Vec<TrackedFile>> {
        self.query_tracked(&format!("{TRACKED_SELECT} ORDER BY f.id"))
    }

    fn query_tracked(&self, sql: &str) -> Result<Vec<TrackedFile>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let files = stmt
            .query_map([], row_to_tracked)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(files)
    }

    /// Full baseline content of a tracked file.
    pub fn snapshot(&self, id: i64) -> Result<Vec<u8>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT raw_snapshot FROM file_baseline WHERE file_id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| SentinelError::UnknownFile(format!("id {id}")))
    }

    /// Exclude a file from automatic checks. There is no inverse short of
    /// [`reenroll`](Self::reenroll).
    pub fn mark_degraded(&self, id: i64) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let changed = tx.execute("UPDATE files SET degraded = 1 WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(SentinelError::UnknownFile(format!("id {id}")));
        }
        bump_generation(&tx)?;
        tx.commit()?;
        Ok(())
    }

    pub fn refresh_baseline_mod_time(&self, id: i64, mod_time_ns: i64) -> Result<()> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE file_baseline SET mod_time_ns = ?1 WHERE file_id = ?2",
            params![mod_time_ns, id],
        )?;
        if changed == 0 {
            return Err(SentinelError::UnknownFile(format!("id {id}")));
        }
        Ok(())
    }

    pub fn set_policy(&self, id: i64, policy: Policy) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE files SET auto_restore = ?1, auto_email = ?2 WHERE id = ?3",
            params![policy.auto_restore, policy.auto_email, id],
        )?;
        if changed == 0 {
            return Err(SentinelError::UnknownFile(format!("id {id}")));
        }
        bump_generation(&tx)?;
        tx.commit()?;
        Ok(())
    }

    // ========================================================================
    // Check log and forensic records
    // ========================================================================

    pub fn append_log(&self, file_id: i64, mismatch: MismatchKind) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO logs (file_id, mismatch, ts) VALUES (?1, ?2, ?3)",
            params![file_id, mismatch.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn append_forensic_checksum(&self, log_id: i64, bad_digest: &str, bad_content: &[u8]) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO bad_checksum_record (log_id, bad_digest, bad_raw_data) VALUES (?1, ?2, ?3)",
            params![log_id, bad_digest, bad_content],
        )?;
        Ok(())
    }

    pub fn append_forensic_metadata(&self, log_id: i64, owner: u32, group: u32, permission: u32) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO bad_metadata_record (log_id, bad_owner, bad_group, bad_permission)
             VALUES (?1, ?2, ?3, ?4)",
            params![log_id, owner, group, permission],
        )?;
        Ok(())
    }

    pub fn append_change_notification(&self, raw_payload: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO change_notifications (ts, raw_payload) VALUES (?1, ?2)",
            params![Utc::now().to_rfc3339(), raw_payload],
        )?;
        Ok(())
    }

    /// Log entries joined with their paths, oldest first. `limit` keeps the
    /// most recent entries.
    pub fn logs(&self, limit: Option<usize>) -> Result<Vec<LogEntry>> {
        let conn = self.conn.lock();
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = conn.prepare(
            "SELECT * FROM (
                SELECT l.id, l.file_id, f.path, l.mismatch, l.ts
                FROM logs AS l JOIN files AS f ON f.id = l.file_id
                ORDER BY l.id DESC LIMIT ?1
             ) ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![limit], row_to_log)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn logs_for_file(&self, file_id: i64) -> Result<Vec<LogEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT l.id, l.file_id, f.path, l.mismatch, l.ts
             FROM logs AS l JOIN files AS f ON f.id = l.file_id
             WHERE l.file_id = ?1 ORDER BY l.id ASC",
        )?;
        let entries = stmt
            .query_map(params![file_id], row_to_log)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn checksum_record(&self, log_id: i64) -> Result<Option<ForensicChecksumRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT log_id, bad_digest, bad_raw_data FROM bad_checksum_record WHERE log_id = ?1",
            params![log_id],
            |row| {
                let bad_raw_data: Vec<u8> = row.get(2)?;
                Ok(ForensicChecksumRecord {
                    log_id: row.get(0)?,
                    bad_digest: row.get(1)?,
                    bad_size: bad_raw_data.len() as u64,
                    bad_raw_data,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn metadata_record(&self, log_id: i64) -> Result<Option<ForensicMetadataRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT log_id, bad_owner, bad_group, bad_permission FROM bad_metadata_record WHERE log_id = ?1",
            params![log_id],
            |row| {
                Ok(ForensicMetadataRecord {
                    log_id: row.get(0)?,
                    bad_owner: row.get(1)?,
                    bad_group: row.get(2)?,
                    bad_permission: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn change_notifications(&self, limit: usize) -> Result<Vec<ChangeNotification>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, ts, raw_payload FROM change_notifications ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                let ts: String = row.get(1)?;
                Ok(ChangeNotification {
                    id: row.get(0)?,
                    timestamp: parse_ts(&ts),
                    raw_payload: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn row_to_tracked(row: &rusqlite::Row) -> rusqlite::Result<TrackedFile> {
    Ok(TrackedFile {
        id: row.get(0)?,
        path: row.get(1)?,
        good_digest: row.get(2)?,
        degraded: row.get(3)?,
        policy: Policy {
            auto_restore: row.get(4)?,
            auto_email: row.get(5)?,
        },
        baseline: FileMetadata {
            permission: row.get(6)?,
            owner: row.get(7)?,
            group: row.get(8)?,
            mod_time_ns: row.get(9)?,
        },
        snapshot_size: row.get::<_, i64>(10)? as u64,
    })
}

fn row_to_log(row: &rusqlite::Row) -> rusqlite::Result<LogEntry> {
    let ts: String = row.get(4)?;
    Ok(LogEntry {
        id: row.get(0)?,
        file_id: row.get(1)?,
        path: row.get(2)?,
        mismatch: row.get::<_, String>(3)?.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?,
        timestamp: parse_ts(&ts),
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

fn bump_generation(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO store_meta (key, value) VALUES (?1, '1')
         ON CONFLICT(key) DO UPDATE SET value = CAST(value AS INTEGER) + 1",
        params![GENERATION_KEY],
    )?;
    Ok(())
}

fn remove_store_files(path: &Path) {
    let mut candidates = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm", "-journal"] {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        candidates.push(PathBuf::from(name));
    }
    for candidate in candidates {
        if candidate.exists() {
            if let Err(e) = std::fs::remove_file(&candidate) {
                warn!(path = %candidate.display(), error = %e, "could not remove partial store file");
            }
        }
    }
}

fn restrict_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::Hasher;
    use crate::probe::SystemProber;
    use std::fs;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn enroll_and_fetch() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "a.conf", b"alpha");
        let store = BaselineStore::open_in_memory(HashAlgorithm::Sha256).unwrap();

        let tracked = store
            .enroll(&path, Policy::default(), &Hasher::default(), &SystemProber)
            .unwrap();
        assert_eq!(tracked.path, path.display().to_string());
        assert!(!tracked.degraded);
        assert_eq!(tracked.snapshot_size, 5);
        assert_eq!(store.snapshot(tracked.id).unwrap(), b"alpha");
        assert_eq!(store.list_active().unwrap().len(), 1);
    }

    #[test]
    fn duplicate_enroll_leaves_registry_unchanged() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "a.conf", b"alpha");
        let store = BaselineStore::open_in_memory(HashAlgorithm::Sha256).unwrap();
        let hasher = Hasher::default();

        let first = store.enroll(&path, Policy::default(), &hasher, &SystemProber).unwrap();
        let generation = store.watch_generation().unwrap();
        fs::write(&path, b"changed").unwrap();

        let err = store
            .enroll(&path, Policy::default(), &hasher, &SystemProber)
            .unwrap_err();
        assert!(matches!(err, SentinelError::Duplicate(_)));

        let all = store.list_all().unwrap();
        assert_eq!(all, vec![first.clone()]);
        assert_eq!(store.snapshot(first.id).unwrap(), b"alpha");
        assert_eq!(store.watch_generation().unwrap(), generation);
    }

    #[test]
    fn aliased_spelling_is_a_duplicate() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "a.conf", b"alpha");
        let store = BaselineStore::open_in_memory(HashAlgorithm::Sha256).unwrap();
        let hasher = Hasher::default();
        store.enroll(&path, Policy::default(), &hasher, &SystemProber).unwrap();

        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        for alias in [
            dir.path().join(".").join("a.conf"),
            PathBuf::from(format!("{}//a.conf", dir.path().display())),
            sub.join("..").join("a.conf"),
        ] {
            let err = store
                .enroll(&alias, Policy::default(), &hasher, &SystemProber)
                .unwrap_err();
            assert!(matches!(err, SentinelError::Duplicate(_)), "{}", alias.display());
        }
        assert_eq!(store.list_all().unwrap().len(), 1);
        assert!(store
            .get_by_path(&path.display().to_string())
            .unwrap()
            .is_some());
    }

    #[test]
    fn degraded_files_leave_active_list() {
        let dir = tempdir().unwrap();
        let a = write(dir.path(), "a", b"a");
        let b = write(dir.path(), "b", b"b");
        let store = BaselineStore::open_in_memory(HashAlgorithm::Sha256).unwrap();
        let hasher = Hasher::default();
        let fa = store.enroll(&a, Policy::default(), &hasher, &SystemProber).unwrap();
        store.enroll(&b, Policy::default(), &hasher, &SystemProber).unwrap();

        let before = store.watch_generation().unwrap();
        store.mark_degraded(fa.id).unwrap();
        assert!(store.watch_generation().unwrap() > before);

        let active = store.list_active().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].path, b.display().to_string());
        assert!(store.get(fa.id).unwrap().unwrap().degraded);
    }

    #[test]
    fn reenroll_clears_degraded_and_replaces_baseline() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "a", b"old");
        let store = BaselineStore::open_in_memory(HashAlgorithm::Sha256).unwrap();
        let hasher = Hasher::default();
        let tracked = store.enroll(&path, Policy::default(), &hasher, &SystemProber).unwrap();
        store.mark_degraded(tracked.id).unwrap();

        fs::write(&path, b"new content").unwrap();
        let refreshed = store.reenroll(&path, &hasher, &SystemProber).unwrap();
        assert!(!refreshed.degraded);
        assert_eq!(refreshed.good_digest, hasher.hash_bytes(b"new content"));
        assert_eq!(store.snapshot(tracked.id).unwrap(), b"new content");
    }

    #[test]
    fn bulk_generate_is_all_or_nothing() {
        let dir = tempdir().unwrap();
        let good = write(dir.path(), "good", b"g");
        let db = dir.path().join("sentinel.db");
        let paths = vec![good.clone(), dir.path().join("missing")];

        let result = BaselineStore::bulk_generate(
            &db,
            &paths,
            Policy::default(),
            &Hasher::default(),
            &SystemProber,
        );
        assert!(result.is_err());
        assert!(!db.exists());
        assert!(!dir.path().join("sentinel.db-wal").exists());
    }

    #[test]
    fn bulk_generate_rejects_duplicates_in_list() {
        let dir = tempdir().unwrap();
        let good = write(dir.path(), "good", b"g");
        let db = dir.path().join("sentinel.db");

        let err = BaselineStore::bulk_generate(
            &db,
            &[good.clone(), good],
            Policy::default(),
            &Hasher::default(),
            &SystemProber,
        )
        .err()
        .unwrap();
        assert!(matches!(err, SentinelError::Duplicate(_)));
        assert!(!db.exists());
    }

    #[test]
    fn bulk_generate_rejects_aliased_duplicates() {
        let dir = tempdir().unwrap();
        let good = write(dir.path(), "good", b"g");
        let db = dir.path().join("sentinel.db");

        let err = BaselineStore::bulk_generate(
            &db,
            &[good, dir.path().join(".").join("good")],
            Policy::default(),
            &Hasher::default(),
            &SystemProber,
        )
        .err()
        .unwrap();
        assert!(matches!(err, SentinelError::Duplicate(_)));
        assert!(!db.exists());
    }

    #[test]
    fn bulk_generate_persists_and_reopens() {
        let dir = tempdir().unwrap();
        let a = write(dir.path(), "a", b"a");
        let b = write(dir.path(), "b", b"b");
        let db = dir.path().join("sentinel.db");
        let hasher = Hasher::new(HashAlgorithm::Blake3);

        let store =
            BaselineStore::bulk_generate(&db, &[a, b], Policy::default(), &hasher, &SystemProber)
                .unwrap();
        drop(store);

        let reopened = BaselineStore::open(&db).unwrap();
        assert_eq!(reopened.list_active().unwrap().len(), 2);
        assert_eq!(reopened.hash_algorithm().unwrap(), HashAlgorithm::Blake3);
        assert!(matches!(
            BaselineStore::create(&db, HashAlgorithm::Sha256),
            Err(SentinelError::StoreExists(_))
        ));
    }

    #[test]
    fn unknown_mismatch_tag_fails_to_load() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "a", b"a");
        let store = BaselineStore::open_in_memory(HashAlgorithm::Sha256).unwrap();
        let tracked = store
            .enroll(&path, Policy::default(), &Hasher::default(), &SystemProber)
            .unwrap();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO logs (file_id, mismatch, ts) VALUES (?1, 'Tampered', ?2)",
                params![tracked.id, Utc::now().to_rfc3339()],
            )
            .unwrap();

        assert!(matches!(store.logs(None), Err(SentinelError::Database(_))));
    }

    #[test]
    fn logs_and_forensic_records() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "a", b"a");
        let store = BaselineStore::open_in_memory(HashAlgorithm::Sha256).unwrap();
        let tracked = store
            .enroll(&path, Policy::default(), &Hasher::default(), &SystemProber)
            .unwrap();

        store.append_log(tracked.id, MismatchKind::Clean).unwrap();
        let log_id = store.append_log(tracked.id, MismatchKind::Checksum).unwrap();
        store.append_forensic_checksum(log_id, "deadbeef", b"bad bytes").unwrap();
        let meta_log = store.append_log(tracked.id, MismatchKind::Metadata).unwrap();
        store.append_forensic_metadata(meta_log, 1, 2, 0o777).unwrap();

        let logs = store.logs(None).unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].mismatch, MismatchKind::Clean);
        assert_eq!(logs[2].mismatch, MismatchKind::Metadata);
        assert_eq!(store.logs(Some(1)).unwrap()[0].id, meta_log);
        assert_eq!(store.logs_for_file(tracked.id).unwrap().len(), 3);

        let record = store.checksum_record(log_id).unwrap().unwrap();
        assert_eq!(record.bad_digest, "deadbeef");
        assert_eq!(record.bad_raw_data, b"bad bytes");
        assert_eq!(record.bad_size, 9);

        let meta = store.metadata_record(meta_log).unwrap().unwrap();
        assert_eq!(meta.bad_permission, 0o777);
        assert!(store.metadata_record(log_id).unwrap().is_none());
    }

    #[test]
    fn change_notifications_newest_first() {
        let store = BaselineStore::open_in_memory(HashAlgorithm::Sha256).unwrap();
        store.append_change_notification("first").unwrap();
        store.append_change_notification("second").unwrap();
        let rows = store.change_notifications(10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].raw_payload, "second");
    }

    #[test]
    fn policy_update_bumps_generation() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "a", b"a");
        let store = BaselineStore::open_in_memory(HashAlgorithm::Sha256).unwrap();
        let tracked = store
            .enroll(&path, Policy::default(), &Hasher::default(), &SystemProber)
            .unwrap();
        let before = store.watch_generation().unwrap();
        let policy = Policy {
            auto_restore: false,
            auto_email: true,
        };
        store.set_policy(tracked.id, policy).unwrap();
        assert_eq!(store.get(tracked.id).unwrap().unwrap().policy, policy);
        assert!(store.watch_generation().unwrap() > before);
        assert!(matches!(
            store.set_policy(999, policy),
            Err(SentinelError::UnknownFile(_))
        ));
    }
}
