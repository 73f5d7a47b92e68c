//! Durable writer and reader for the provenance log.

use super::{LogRecord, Status};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Errors that can occur while writing or reading the log.
#[derive(Debug, Error)]
pub enum ProvenanceError {
    #[error("failed to open provenance log {path}: {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("failed to append to provenance log: {0}")]
    Append(#[source] io::Error),
    #[error("failed to read provenance log {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
}

/// Append-only provenance log.
///
/// Opened once at the start of a run and shared by reference with every
/// worker. Appends are serialized by an internal lock and each record is
/// written with a single call and synced, so lines never interleave and a
/// crash loses at most the record being written.
pub struct ProvenanceLog {
    path: PathBuf,
    file: Mutex<File>,
    appended: AtomicU64,
}

impl ProvenanceLog {
    /// Opens the log for appending, creating it and its parent
    /// directories if needed. Existing records are preserved.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ProvenanceError> {
        let path = path.as_ref().to_path_buf();
        let open_err = |source| ProvenanceError::Open {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(open_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(open_err)?;

        tracing::debug!(path = %path.display(), "Opened provenance log");

        Ok(Self {
            path,
            file: Mutex::new(file),
            appended: AtomicU64::new(0),
        })
    }

    /// Appends one record.
    pub fn append(&self, key: &str, status: Status) -> Result<(), ProvenanceError> {
        let line = LogRecord::new(key, status).to_line();

        let mut file = self.file.lock();
        file.write_all(line.as_bytes())
            .and_then(|()| file.sync_data())
            .map_err(ProvenanceError::Append)?;
        self.appended.fetch_add(1, Ordering::Relaxed);

        tracing::trace!(key, %status, "Appended provenance record");
        Ok(())
    }

    /// Returns the log path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns how many records this handle has appended.
    pub fn appended(&self) -> u64 {
        self.appended.load(Ordering::Relaxed)
    }

    /// Flushes and closes the log.
    pub fn close(self) -> Result<(), ProvenanceError> {
        let file = self.file.into_inner();
        file.sync_all().map_err(ProvenanceError::Append)?;
        tracing::debug!(path = %self.path.display(), "Closed provenance log");
        Ok(())
    }
}

impl std::fmt::Debug for ProvenanceLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvenanceLog")
            .field("path", &self.path)
            .field("appended", &self.appended())
            .finish_non_exhaustive()
    }
}

/// Reads every parseable record in file order.
///
/// A missing log reads as empty. Unparseable lines are skipped with a
/// warning.
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<LogRecord>, ProvenanceError> {
    let path = path.as_ref();
    let read_err = |source| ProvenanceError::Read {
        path: path.to_path_buf(),
        source,
    };

    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(read_err(e)),
    };

    let mut records = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(read_err)?;
        if line.trim().is_empty() {
            continue;
        }
        match LogRecord::parse_line(&line) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(
                path = %path.display(),
                line = number + 1,
                error = %e,
                "Skipping unreadable provenance record"
            ),
        }
    }
    Ok(records)
}

/// Loads the keys whose most recent record is `Success`.
pub fn load_success_set(path: impl AsRef<Path>) -> Result<HashSet<String>, ProvenanceError> {
    let mut latest: HashMap<String, Status> = HashMap::new();
    for record in read_records(path)? {
        latest.insert(record.key, record.status);
    }
    Ok(latest
        .into_iter()
        .filter(|(_, status)| *status == Status::Success)
        .map(|(key, _)| key)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_append_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("conversion_log.txt");

        let log = ProvenanceLog::open(&path).unwrap();
        log.append("/out/a.png", Status::Success).unwrap();
        log.append("/out/b.png", Status::Failed).unwrap();
        assert_eq!(log.appended(), 2);
        log.close().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "/out/a.png,Success\n/out/b.png,Failed\n");

        let successes = load_success_set(&path).unwrap();
        assert_eq!(successes.len(), 1);
        assert!(successes.contains("/out/a.png"));
    }

    #[test]
    fn test_reopen_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");

        ProvenanceLog::open(&path)
            .unwrap()
            .append("k1", Status::Success)
            .unwrap();
        ProvenanceLog::open(&path)
            .unwrap()
            .append("k2", Status::Success)
            .unwrap();

        assert_eq!(read_records(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_latest_record_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        fs::write(
            &path,
            "k1,Failed\nk1,Success\nk2,Success\nk2,Failed\ngarbage\n",
        )
        .unwrap();

        let successes = load_success_set(&path).unwrap();
        assert!(successes.contains("k1"));
        assert!(!successes.contains("k2"));
        // Earlier records remain readable for audit.
        assert_eq!(read_records(&path).unwrap().len(), 4);
    }

    #[test]
    fn test_missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_success_set(dir.path().join("absent.txt"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        let log = Arc::new(ProvenanceLog::open(&path).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        log.append(&format!("/out/t{t}/f{i}.png"), Status::Success)
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 100);
        assert!(records.iter().all(|r| r.status == Status::Success));
    }
}
