//! Persisted ingestion ledger and run lock.
//!
//! The ledger maps each remote file identifier to the revision indicator it
//! carried when the file was last fully ingested. A file is re-processed only
//! when its current indicator differs from the recorded one or no entry
//! exists. Entries are written through to disk on every update so a crash
//! mid-run loses at most the file being processed, never a completed one.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors raised by ledger persistence and locking.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Filesystem operation on the ledger or lock file failed.
    #[error("ledger I/O failed at {path}: {source}")]
    Io {
        /// Path the failing operation targeted.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },
    /// Ledger file exists but does not hold a valid entry map.
    #[error("ledger at {path} is not valid JSON: {source}")]
    Corrupt {
        /// Path of the unreadable ledger.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
    /// Another process holds the run lock for this ledger.
    #[error("another ingestion run is already in progress (lock held at {0})")]
    RunInProgress(PathBuf),
}

/// Persisted mapping from remote file identifier to last-ingested revision.
#[derive(Debug)]
pub struct IngestionLedger {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl IngestionLedger {
    /// Open the ledger at `path`, creating parent directories as needed. A
    /// missing file starts an empty ledger.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| LedgerError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let entries = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|source| LedgerError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&raw).map_err(|source| LedgerError::Corrupt {
                path: path.clone(),
                source,
            })?
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "Opened ingestion ledger");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Revision recorded for `file_id`, if the file was ever fully ingested.
    pub async fn revision(&self, file_id: &str) -> Option<String> {
        self.entries.lock().await.get(file_id).cloned()
    }

    /// Record `revision` for `file_id` and persist the ledger.
    ///
    /// Called as the final step of a file's ingestion; on failure the entry
    /// is rolled back in memory so the ledger never claims more than what is
    /// durable on disk.
    pub async fn record(&self, file_id: &str, revision: &str) -> Result<(), LedgerError> {
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(file_id.to_string(), revision.to_string());
        if let Err(error) = self.persist(&entries) {
            match previous {
                Some(value) => entries.insert(file_id.to_string(), value),
                None => entries.remove(file_id),
            };
            return Err(error);
        }
        Ok(())
    }

    /// Snapshot of all entries, for diagnostics and tests.
    pub async fn entries(&self) -> BTreeMap<String, String> {
        self.entries.lock().await.clone()
    }

    /// Acquire the exclusive run lock guarding this ledger.
    ///
    /// Fails fast with [`LedgerError::RunInProgress`] when another process
    /// already holds it, so two runs never race on the same ledger.
    pub fn lock(&self) -> Result<RunLock, LedgerError> {
        let lock_path = self.path.with_extension("lock");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|source| LedgerError::Io {
                path: lock_path.clone(),
                source,
            })?;

        file.try_lock_exclusive().map_err(|source| {
            if source.kind() == fs2::lock_contended_error().kind() {
                LedgerError::RunInProgress(lock_path.clone())
            } else {
                LedgerError::Io {
                    path: lock_path.clone(),
                    source,
                }
            }
        })?;

        tracing::debug!(path = %lock_path.display(), "Acquired run lock");
        Ok(RunLock {
            file,
            path: lock_path,
        })
    }

    /// Write the entry map atomically: serialize into a temp file in the
    /// ledger's directory, then rename over the target.
    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), LedgerError> {
        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let io_err = |source: std::io::Error| LedgerError::Io {
            path: self.path.clone(),
            source,
        };

        let mut scratch = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
        let serialized =
            serde_json::to_vec_pretty(entries).map_err(|source| LedgerError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        scratch.write_all(&serialized).map_err(io_err)?;
        scratch
            .persist(&self.path)
            .map_err(|err| io_err(err.error))?;
        Ok(())
    }
}

/// Guard holding the exclusive run lock; released on drop.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(error) = fs2::FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %error, "Failed to release run lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger.json");

        let ledger = IngestionLedger::open(&path).expect("open");
        ledger.record("f1", "rev-1").await.expect("record");
        ledger.record("f2", "rev-2").await.expect("record");
        drop(ledger);

        let reopened = IngestionLedger::open(&path).expect("reopen");
        assert_eq!(reopened.revision("f1").await.as_deref(), Some("rev-1"));
        assert_eq!(reopened.revision("f2").await.as_deref(), Some("rev-2"));
        assert_eq!(reopened.revision("f3").await, None);
    }

    #[tokio::test]
    async fn record_overwrites_previous_revision() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = IngestionLedger::open(dir.path().join("ledger.json")).expect("open");

        ledger.record("f1", "rev-1").await.expect("record");
        ledger.record("f1", "rev-2").await.expect("record");
        assert_eq!(ledger.revision("f1").await.as_deref(), Some("rev-2"));
        assert_eq!(ledger.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = IngestionLedger::open(dir.path().join("fresh.json")).expect("open");
        assert!(ledger.entries().await.is_empty());
    }

    #[test]
    fn corrupt_ledger_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger.json");
        fs::write(&path, "not json").expect("write");

        let error = IngestionLedger::open(&path).unwrap_err();
        assert!(matches!(error, LedgerError::Corrupt { .. }));
    }

    #[test]
    fn second_lock_fails_fast_until_released() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger.json");
        let first = IngestionLedger::open(&path).expect("open");
        let second = IngestionLedger::open(&path).expect("open");

        let guard = first.lock().expect("first lock");
        let error = second.lock().unwrap_err();
        assert!(matches!(error, LedgerError::RunInProgress(_)));

        drop(guard);
        second.lock().expect("lock after release");
    }
}
