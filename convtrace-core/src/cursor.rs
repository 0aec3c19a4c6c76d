//! Persistent per-session cursors
//!
//! The store is a single JSON document mapping session id to [`Cursor`],
//! read fully and rewritten fully on each save. Saves happen via
//! write-to-temporary-file-then-atomic-rename so no reader ever observes a
//! half-written document, and the read-modify-write cycle runs under an
//! exclusive advisory file lock to serialize concurrent invocations.
//!
//! Corruption is never fatal: an unreadable document is preserved under a
//! quarantine name and the store proceeds as if empty, bounding data loss to
//! the unreadable session positions.

use crate::error::{Error, Result};
use crate::types::Cursor;
use chrono::Utc;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// File-backed cursor store.
pub struct CursorStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl CursorStore {
    /// Open a store backed by the given document path. The lock file lives
    /// alongside it.
    pub fn new(path: PathBuf) -> Self {
        let lock_path = path.with_extension("lock");
        Self { path, lock_path }
    }

    /// Load the cursor for one session, defaulting to the zero cursor when
    /// absent or when the store is unreadable.
    pub fn load(&self, session_id: &str) -> Cursor {
        self.read_document()
            .remove(session_id)
            .unwrap_or_default()
    }

    /// Persist one session's cursor.
    ///
    /// Holds the lock for the whole read-modify-write cycle and enforces the
    /// monotonic invariant: a concurrently-advanced entry is never regressed.
    pub fn update(&self, session_id: &str, cursor: Cursor) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let _lock = FileLock::acquire(&self.lock_path)?;

        let mut document = self.read_document();
        match document.get(session_id) {
            Some(existing) if existing.last_line > cursor.last_line => {
                tracing::warn!(
                    session_id,
                    ours = cursor.last_line,
                    theirs = existing.last_line,
                    "Concurrent run advanced this session further; keeping its cursor"
                );
            }
            _ => {
                document.insert(session_id.to_string(), cursor);
            }
        }

        self.write_document(&document)
    }

    /// Read the full document, quarantining it on decode failure.
    fn read_document(&self) -> HashMap<String, Cursor> {
        if !self.path.exists() {
            return HashMap::new();
        }

        let parsed = fs::read_to_string(&self.path)
            .map_err(|e| e.to_string())
            .and_then(|content| {
                serde_json::from_str::<HashMap<String, Cursor>>(&content)
                    .map_err(|e| e.to_string())
            });

        match parsed {
            Ok(document) => document,
            Err(e) => {
                self.quarantine(&e);
                HashMap::new()
            }
        }
    }

    /// Preserve an unreadable document under a timestamped name.
    fn quarantine(&self, reason: &str) {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let quarantine_path = self.path.with_extension(format!("json.corrupt.{}", stamp));
        match fs::rename(&self.path, &quarantine_path) {
            Ok(()) => tracing::warn!(
                from = %self.path.display(),
                to = %quarantine_path.display(),
                "Corrupt cursor store quarantined: {}",
                reason
            ),
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                "Corrupt cursor store could not be quarantined ({}): {}",
                e,
                reason
            ),
        }
    }

    /// Rewrite the document atomically: temp file then rename.
    fn write_document(&self, document: &HashMap<String, Cursor>) -> Result<()> {
        let tmp_path = self.path.with_extension("json.tmp");
        let serialized = serde_json::to_string_pretty(document)?;

        let write_result = fs::write(&tmp_path, serialized)
            .and_then(|_| fs::rename(&tmp_path, &self.path));

        if let Err(e) = write_result {
            let _ = fs::remove_file(&tmp_path);
            return Err(Error::Cursor(format!(
                "failed to save cursor store {}: {}",
                self.path.display(),
                e
            )));
        }
        Ok(())
    }
}

/// Exclusive advisory lock on a file, held until dropped.
///
/// Blocks until the lock is available: concurrent invocations queue on the
/// store update rather than failing.
struct FileLock {
    file: File,
}

impl FileLock {
    fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| Error::Cursor(format!("failed to open lock file {}: {}", path.display(), e)))?;

        lock_file_exclusive(&file)
            .map_err(|e| Error::Cursor(format!("failed to lock {}: {}", path.display(), e)))?;
        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = unlock_file(&self.file);
    }
}

#[cfg(unix)]
fn lock_file_exclusive(file: &File) -> std::io::Result<()> {
    use std::os::fd::AsRawFd;
    const LOCK_EX: i32 = 2;
    let fd = file.as_raw_fd();
    // SAFETY: flock is called with a valid file descriptor and constant flags.
    let rc = unsafe { flock(fd, LOCK_EX) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(unix)]
fn unlock_file(file: &File) -> std::io::Result<()> {
    use std::os::fd::AsRawFd;
    const LOCK_UN: i32 = 8;
    let fd = file.as_raw_fd();
    // SAFETY: flock is called with a valid file descriptor and constant flags.
    let rc = unsafe { flock(fd, LOCK_UN) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(unix)]
extern "C" {
    fn flock(fd: i32, operation: i32) -> i32;
}

#[cfg(not(unix))]
compile_error!("convtrace cursor locking currently requires Unix (macOS/Linux)");
