// SPDX-License-Identifier: MIT OR Apache-2.0
//! Synchronous SQLite-backed index of cache entries and pins.
//!
//! Kept deliberately free of async — callers drive every method from
//! inside `tokio::task::spawn_blocking`, the same boundary `rusqlite`
//! users draw everywhere since the crate has no async story of its own.

use mlx_core::LoaderError;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// A cache entry's position in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Bytes are being written to a dirty-suffixed temp path.
    DirtyDownload,
    /// Bytes are on disk under their final name and safe to serve.
    Ready,
}

impl EntryState {
    fn as_str(self) -> &'static str {
        match self {
            Self::DirtyDownload => "dirty_download",
            Self::Ready => "ready",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "dirty_download" => Some(Self::DirtyDownload),
            "ready" => Some(Self::Ready),
            _ => None,
        }
    }
}

/// A row of the `files` table.
#[derive(Debug, Clone)]
pub struct FileRow {
    /// Hex-encoded SHA-256 of the file's contents.
    pub hash: String,
    /// Size in bytes.
    pub size: u64,
    /// Current lifecycle state.
    pub state: EntryState,
    /// Milliseconds since the Unix epoch of the last `getOrPut` hit.
    pub last_used_ms: i64,
}

fn corrupt(hash: &str, detail: impl std::fmt::Display) -> LoaderError {
    LoaderError::CacheCorrupt {
        hash: hash.to_string(),
        detail: detail.to_string(),
    }
}

/// Owns the index database connection and the schema inside it.
pub struct CacheIndex {
    conn: Connection,
}

impl CacheIndex {
    /// Open (creating if absent) the index database at `path`, ensuring
    /// the schema from [§6](crate) exists.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::CacheCorrupt`] if the database cannot be
    /// opened or the schema cannot be created.
    pub fn open(path: &Path) -> Result<Self, LoaderError> {
        let conn = Connection::open(path)
            .map_err(|e| corrupt("", format!("open index at {}: {e}", path.display())))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS files (
                hash TEXT PRIMARY KEY,
                size INTEGER NOT NULL,
                state TEXT NOT NULL,
                last_used_ms INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS pins (
                app_name TEXT NOT NULL,
                manifest_hash TEXT NOT NULL,
                file_hash TEXT NOT NULL,
                PRIMARY KEY (app_name, manifest_hash, file_hash)
            );",
        )
        .map_err(|e| corrupt("", format!("create schema: {e}")))?;
        Ok(Self { conn })
    }

    /// Open an in-memory index, for tests.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, LoaderError> {
        let conn = Connection::open_in_memory().map_err(|e| corrupt("", e))?;
        conn.execute_batch(
            "CREATE TABLE files (hash TEXT PRIMARY KEY, size INTEGER NOT NULL, state TEXT NOT NULL, last_used_ms INTEGER NOT NULL);
             CREATE TABLE pins (app_name TEXT NOT NULL, manifest_hash TEXT NOT NULL, file_hash TEXT NOT NULL, PRIMARY KEY (app_name, manifest_hash, file_hash));",
        )
        .map_err(|e| corrupt("", e))?;
        Ok(Self { conn })
    }

    /// Look up a file row by hash.
    pub fn get(&self, hash: &str) -> Result<Option<FileRow>, LoaderError> {
        self.conn
            .query_row(
                "SELECT hash, size, state, last_used_ms FROM files WHERE hash = ?1",
                params![hash],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| corrupt(hash, e))?
            .map(|(hash, size, state, last_used_ms)| {
                let state = EntryState::parse(&state)
                    .ok_or_else(|| corrupt(&hash, format!("unknown state {state:?}")))?;
                Ok(FileRow {
                    hash,
                    size: size as u64,
                    state,
                    last_used_ms,
                })
            })
            .transpose()
    }

    /// Insert a new row in `DirtyDownload` state, or error if one already exists.
    pub fn insert_dirty(&self, hash: &str, size: u64, now_ms: i64) -> Result<(), LoaderError> {
        self.conn
            .execute(
                "INSERT INTO files (hash, size, state, last_used_ms) VALUES (?1, ?2, ?3, ?4)",
                params![hash, size as i64, EntryState::DirtyDownload.as_str(), now_ms],
            )
            .map_err(|e| corrupt(hash, e))?;
        Ok(())
    }

    /// Flip a row to `Ready`, stamping the current time as last-used.
    pub fn mark_ready(&self, hash: &str, now_ms: i64) -> Result<(), LoaderError> {
        let changed = self
            .conn
            .execute(
                "UPDATE files SET state = ?2, last_used_ms = ?3 WHERE hash = ?1",
                params![hash, EntryState::Ready.as_str(), now_ms],
            )
            .map_err(|e| corrupt(hash, e))?;
        if changed == 0 {
            return Err(corrupt(hash, "mark_ready on absent row"));
        }
        Ok(())
    }

    /// Update the last-used timestamp of a `Ready` row (an LRU touch).
    pub fn touch(&self, hash: &str, now_ms: i64) -> Result<(), LoaderError> {
        self.conn
            .execute(
                "UPDATE files SET last_used_ms = ?2 WHERE hash = ?1",
                params![hash, now_ms],
            )
            .map_err(|e| corrupt(hash, e))?;
        Ok(())
    }

    /// Remove a row entirely (used for eviction and for cleaning up a
    /// failed dirty download).
    pub fn delete(&self, hash: &str) -> Result<(), LoaderError> {
        self.conn
            .execute("DELETE FROM files WHERE hash = ?1", params![hash])
            .map_err(|e| corrupt(hash, e))?;
        Ok(())
    }

    /// Hashes of every row still in `DirtyDownload` state.
    ///
    /// Used by `prune()` at startup: a row left in this state was being
    /// written by a process that no longer exists, so its backing file
    /// (if any) is an abandoned partial write, not a resumable one.
    pub fn dirty_download_hashes(&self) -> Result<Vec<String>, LoaderError> {
        let mut stmt = self
            .conn
            .prepare("SELECT hash FROM files WHERE state = ?1")
            .map_err(|e| corrupt("", e))?;
        let rows = stmt
            .query_map(params![EntryState::DirtyDownload.as_str()], |row| {
                row.get::<_, String>(0)
            })
            .map_err(|e| corrupt("", e))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| corrupt("", e))?);
        }
        Ok(out)
    }

    /// `Ready` rows with zero pin references, ordered oldest-`last_used_ms`-first.
    pub fn unpinned_ready_by_lru(&self) -> Result<Vec<FileRow>, LoaderError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT f.hash, f.size, f.state, f.last_used_ms
                 FROM files f
                 WHERE f.state = ?1
                   AND NOT EXISTS (SELECT 1 FROM pins p WHERE p.file_hash = f.hash)
                 ORDER BY f.last_used_ms ASC",
            )
            .map_err(|e| corrupt("", e))?;
        let rows = stmt
            .query_map(params![EntryState::Ready.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })
            .map_err(|e| corrupt("", e))?;
        let mut out = Vec::new();
        for row in rows {
            let (hash, size, state, last_used_ms) = row.map_err(|e| corrupt("", e))?;
            let state =
                EntryState::parse(&state).ok_or_else(|| corrupt(&hash, "unknown state"))?;
            out.push(FileRow {
                hash,
                size: size as u64,
                state,
                last_used_ms,
            });
        }
        Ok(out)
    }

    /// Total size, in bytes, of every unpinned `Ready` row.
    pub fn total_unpinned_size(&self) -> Result<u64, LoaderError> {
        let total: i64 = self
            .conn
            .query_row(
                "SELECT COALESCE(SUM(f.size), 0)
                 FROM files f
                 WHERE f.state = ?1
                   AND NOT EXISTS (SELECT 1 FROM pins p WHERE p.file_hash = f.hash)",
                params![EntryState::Ready.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| corrupt("", e))?;
        Ok(total as u64)
    }

    /// Total size, in bytes, of every `Ready` row, pinned or not.
    pub fn total_ready_size(&self) -> Result<u64, LoaderError> {
        let total: i64 = self
            .conn
            .query_row(
                "SELECT COALESCE(SUM(size), 0) FROM files WHERE state = ?1",
                params![EntryState::Ready.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| corrupt("", e))?;
        Ok(total as u64)
    }

    /// Total size, in bytes, of every `Ready` row with at least one pin.
    pub fn total_pinned_size(&self) -> Result<u64, LoaderError> {
        let total: i64 = self
            .conn
            .query_row(
                "SELECT COALESCE(SUM(f.size), 0)
                 FROM files f
                 WHERE f.state = ?1
                   AND EXISTS (SELECT 1 FROM pins p WHERE p.file_hash = f.hash)",
                params![EntryState::Ready.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| corrupt("", e))?;
        Ok(total as u64)
    }

    /// Returns `true` if `hash` has at least one pin.
    pub fn is_pinned(&self, hash: &str) -> Result<bool, LoaderError> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM pins WHERE file_hash = ?1",
                params![hash],
                |row| row.get(0),
            )
            .map_err(|e| corrupt(hash, e))?;
        Ok(count > 0)
    }

    /// Replace every pin owned by `app_name` with the given manifest hash
    /// and file hash set, in a single transaction.
    pub fn set_pins(
        &mut self,
        app_name: &str,
        manifest_hash: &str,
        file_hashes: &[String],
    ) -> Result<(), LoaderError> {
        let tx = self.conn.transaction().map_err(|e| corrupt("", e))?;
        tx.execute("DELETE FROM pins WHERE app_name = ?1", params![app_name])
            .map_err(|e| corrupt("", e))?;
        for file_hash in file_hashes {
            tx.execute(
                "INSERT INTO pins (app_name, manifest_hash, file_hash) VALUES (?1, ?2, ?3)",
                params![app_name, manifest_hash, file_hash],
            )
            .map_err(|e| corrupt(file_hash, e))?;
        }
        tx.commit().map_err(|e| corrupt("", e))?;
        Ok(())
    }

    /// Remove every pin owned by `app_name` for `manifest_hash`.
    pub fn clear_pins(&self, app_name: &str, manifest_hash: &str) -> Result<(), LoaderError> {
        self.conn
            .execute(
                "DELETE FROM pins WHERE app_name = ?1 AND manifest_hash = ?2",
                params![app_name, manifest_hash],
            )
            .map_err(|e| corrupt("", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_roundtrips() {
        let index = CacheIndex::open_in_memory().unwrap();
        index.insert_dirty("h1", 10, 100).unwrap();
        let row = index.get("h1").unwrap().unwrap();
        assert_eq!(row.size, 10);
        assert_eq!(row.state, EntryState::DirtyDownload);
    }

    #[test]
    fn mark_ready_requires_existing_row() {
        let index = CacheIndex::open_in_memory().unwrap();
        assert!(index.mark_ready("ghost", 100).is_err());
    }

    #[test]
    fn dirty_download_hashes_excludes_ready_rows() {
        let index = CacheIndex::open_in_memory().unwrap();
        index.insert_dirty("dirty", 1, 1).unwrap();
        index.insert_dirty("ready", 1, 2).unwrap();
        index.mark_ready("ready", 2).unwrap();
        assert_eq!(index.dirty_download_hashes().unwrap(), vec!["dirty".to_string()]);
    }

    #[test]
    fn unpinned_ready_excludes_pinned_and_dirty() {
        let mut index = CacheIndex::open_in_memory().unwrap();
        index.insert_dirty("dirty", 1, 1).unwrap();
        index.insert_dirty("ready-unpinned", 1, 2).unwrap();
        index.mark_ready("ready-unpinned", 2).unwrap();
        index.insert_dirty("ready-pinned", 1, 3).unwrap();
        index.mark_ready("ready-pinned", 3).unwrap();
        index
            .set_pins("app", "manifest", &["ready-pinned".to_string()])
            .unwrap();

        let evictable = index.unpinned_ready_by_lru().unwrap();
        let hashes: Vec<_> = evictable.iter().map(|r| r.hash.as_str()).collect();
        assert_eq!(hashes, vec!["ready-unpinned"]);
    }

    #[test]
    fn set_pins_replaces_prior_pins_for_app() {
        let mut index = CacheIndex::open_in_memory().unwrap();
        index.insert_dirty("a", 1, 1).unwrap();
        index.mark_ready("a", 1).unwrap();
        index.insert_dirty("b", 1, 1).unwrap();
        index.mark_ready("b", 1).unwrap();

        index.set_pins("app", "m1", &["a".to_string()]).unwrap();
        assert!(index.is_pinned("a").unwrap());

        index.set_pins("app", "m2", &["b".to_string()]).unwrap();
        assert!(!index.is_pinned("a").unwrap());
        assert!(index.is_pinned("b").unwrap());
    }

    #[test]
    fn total_unpinned_size_excludes_dirty_and_pinned() {
        let mut index = CacheIndex::open_in_memory().unwrap();
        index.insert_dirty("dirty", 500, 1).unwrap();
        index.insert_dirty("ready", 200, 1).unwrap();
        index.mark_ready("ready", 1).unwrap();
        index.insert_dirty("pinned", 300, 1).unwrap();
        index.mark_ready("pinned", 1).unwrap();
        index.set_pins("app", "m", &["pinned".to_string()]).unwrap();

        assert_eq!(index.total_unpinned_size().unwrap(), 200);
        assert_eq!(index.total_ready_size().unwrap(), 500);
    }
}
