//! Resumable batch driver.
//!
//! Walks manifest entries in order, resolves each directory's qualifying
//! files, and converts every file whose artifact is not already on disk.
//! Every failure is contained to the file or entry it belongs to and is
//! recorded in the provenance log.

use super::manifest::ManifestEntry;
use super::resolver::{Candidate, ResolveError, Resolver};
use super::summary::{EntryOutcome, FailureKind, FileOutcome, FileStatus, RunSummary};
use crate::provenance::{ProvenanceLog, Status};
use crate::raster::{DecodeError, RasterDecoder};
use crate::transform::{TransformError, Transformer};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::HashSet;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Errors converting a single file.
#[derive(Debug, Error)]
pub enum FileError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("failed to encode PNG: {0}")]
    Encode(#[from] image::ImageError),
    #[error("failed to write artifact: {0}")]
    Io(#[from] io::Error),
}

impl FileError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FileError::Decode(DecodeError::Io(_)) => FailureKind::Io,
            FileError::Decode(_) => FailureKind::Decode,
            FileError::Transform(_) => FailureKind::Transform,
            FileError::Encode(_) | FileError::Io(_) => FailureKind::Io,
        }
    }
}

/// Receives progress notifications from the driver.
///
/// File notifications may arrive from several worker threads at once.
pub trait ProgressObserver: Send + Sync {
    fn entry_started(&self, _entry: &ManifestEntry) {}
    fn file_finished(&self, _outcome: &FileOutcome) {}
    fn entry_finished(&self, _entry: &ManifestEntry, _outcome: &EntryOutcome) {}
}

/// Reports progress through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn entry_started(&self, entry: &ManifestEntry) {
        tracing::debug!(
            row = entry.row,
            source = %entry.log_key(),
            category = entry.category.as_deref().unwrap_or("-"),
            "Processing manifest entry"
        );
    }

    fn file_finished(&self, outcome: &FileOutcome) {
        match &outcome.status {
            FileStatus::Converted => tracing::info!(
                source = %outcome.source.display(),
                key = %outcome.key,
                "Converted"
            ),
            FileStatus::AlreadyDone => {
                tracing::debug!(key = %outcome.key, "Artifact already present")
            }
            FileStatus::Duplicate => {
                tracing::debug!(key = %outcome.key, "Output key already claimed")
            }
            FileStatus::Failed { kind, message } => tracing::warn!(
                source = %outcome.source.display(),
                kind = %kind,
                error = %message,
                "Conversion failed"
            ),
        }
    }

    fn entry_finished(&self, entry: &ManifestEntry, outcome: &EntryOutcome) {
        match outcome {
            EntryOutcome::InvalidPath { reason } => {
                tracing::warn!(row = entry.row, reason = %reason, "Invalid or missing folder path")
            }
            EntryOutcome::FolderMissing => {
                tracing::warn!(source = %entry.log_key(), "Folder does not exist")
            }
            EntryOutcome::ScanFailed { message } => {
                tracing::warn!(source = %entry.log_key(), error = %message, "Folder scan failed")
            }
            EntryOutcome::Excluded => tracing::debug!(row = entry.row, "Entry excluded"),
            EntryOutcome::Scanned { candidates } => tracing::debug!(
                source = %entry.log_key(),
                candidates,
                "Entry complete"
            ),
        }
    }
}

/// Orchestrates manifest entries through selection, transform and
/// provenance logging.
pub struct BatchDriver<D: RasterDecoder> {
    resolver: Resolver,
    decoder: D,
    transformer: Transformer,
    observer: Box<dyn ProgressObserver>,
    workers: usize,
    /// Keys recorded as `Success` by earlier runs.
    success_set: HashSet<String>,
    /// Keys dispatched during this run.
    claimed: Mutex<HashSet<String>>,
    /// Provenance appends that failed.
    log_errors: AtomicU64,
}

impl<D: RasterDecoder> BatchDriver<D> {
    pub fn new(resolver: Resolver, decoder: D) -> Self {
        Self {
            resolver,
            decoder,
            transformer: Transformer::default(),
            observer: Box::new(TracingObserver),
            workers: 1,
            success_set: HashSet::new(),
            claimed: Mutex::new(HashSet::new()),
            log_errors: AtomicU64::new(0),
        }
    }

    pub fn with_transformer(mut self, transformer: Transformer) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Sets the number of concurrent file conversions (minimum 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Seeds the driver with keys previously logged as `Success`.
    pub fn with_success_set(mut self, success_set: HashSet<String>) -> Self {
        self.success_set = success_set;
        self
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    /// Processes every entry and returns the run summary.
    pub fn run(&self, entries: &[ManifestEntry], log: &ProvenanceLog) -> RunSummary {
        let mut summary = RunSummary::new();
        let log_errors_before = self.log_errors.load(Ordering::Relaxed);

        let pool = if self.workers > 1 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.workers)
                .thread_name(|i| format!("convert-{i}"))
                .build()
            {
                Ok(pool) => Some(pool),
                Err(e) => {
                    tracing::warn!(error = %e, "Worker pool unavailable, running sequentially");
                    None
                }
            }
        } else {
            None
        };

        tracing::info!(
            entries = entries.len(),
            workers = self.workers,
            previous_successes = self.success_set.len(),
            "Starting batch"
        );

        match &pool {
            Some(pool) => self.run_pooled(entries, log, pool, &mut summary),
            None => {
                for entry in entries {
                    self.observer.entry_started(entry);
                    let outcome = match self.resolve_entry(entry) {
                        Ok(candidates) => {
                            for candidate in &candidates {
                                let file = self.process_file(candidate, log);
                                summary.record_file(&file);
                            }
                            EntryOutcome::Scanned {
                                candidates: candidates.len(),
                            }
                        }
                        Err(outcome) => outcome,
                    };
                    self.finish_entry(entry, &outcome, log, &mut summary);
                }
            }
        }

        summary.log_errors = self.log_errors.load(Ordering::Relaxed) - log_errors_before;
        summary.finish();
        tracing::info!(
            elapsed_ms = summary.elapsed().num_milliseconds(),
            "{}",
            summary
        );
        summary
    }

    /// Resolves every entry in manifest order, then converts all of their
    /// candidates on the pool at once. Claims keep shared output keys
    /// converted once across entries.
    fn run_pooled(
        &self,
        entries: &[ManifestEntry],
        log: &ProvenanceLog,
        pool: &rayon::ThreadPool,
        summary: &mut RunSummary,
    ) {
        let resolved: Vec<(&ManifestEntry, Result<Vec<Candidate>, EntryOutcome>)> = entries
            .iter()
            .map(|entry| {
                self.observer.entry_started(entry);
                (entry, self.resolve_entry(entry))
            })
            .collect();

        let candidates: Vec<&Candidate> = resolved
            .iter()
            .filter_map(|(_, r)| r.as_ref().ok())
            .flatten()
            .collect();
        let files: Vec<FileOutcome> = pool.install(|| {
            candidates
                .par_iter()
                .map(|candidate| self.process_file(candidate, log))
                .collect()
        });
        for file in &files {
            summary.record_file(file);
        }

        for (entry, result) in resolved {
            let outcome = match result {
                Ok(candidates) => EntryOutcome::Scanned {
                    candidates: candidates.len(),
                },
                Err(outcome) => outcome,
            };
            self.finish_entry(entry, &outcome, log, summary);
        }
    }

    /// Lists an entry's candidates, or the terminal outcome that stops it.
    /// Performs no writes.
    fn resolve_entry(&self, entry: &ManifestEntry) -> Result<Vec<Candidate>, EntryOutcome> {
        if entry.excluded {
            return Err(EntryOutcome::Excluded);
        }

        self.resolver
            .validate_source(entry.source.as_deref())
            .and_then(|dir| self.resolver.select(&dir))
            .map_err(|e| match e {
                ResolveError::InvalidPath(reason) => EntryOutcome::InvalidPath { reason },
                ResolveError::FolderMissing(_) => EntryOutcome::FolderMissing,
                e @ ResolveError::Scan { .. } => EntryOutcome::ScanFailed {
                    message: e.to_string(),
                },
            })
    }

    fn finish_entry(
        &self,
        entry: &ManifestEntry,
        outcome: &EntryOutcome,
        log: &ProvenanceLog,
        summary: &mut RunSummary,
    ) {
        summary.record_entry(outcome);
        if let Some(status) = entry_status(outcome) {
            self.append(log, &entry.log_key(), status);
        }
        self.observer.entry_finished(entry, outcome);
    }

    fn process_file(&self, candidate: &Candidate, log: &ProvenanceLog) -> FileOutcome {
        let outcome = self.process_candidate(candidate, log);
        self.observer.file_finished(&outcome);
        outcome
    }

    /// Reconciles one candidate against disk and this run's claims, then
    /// converts it if needed.
    fn process_candidate(&self, candidate: &Candidate, log: &ProvenanceLog) -> FileOutcome {
        let key = candidate.key();
        let outcome = |status| FileOutcome {
            key: key.clone(),
            source: candidate.source.clone(),
            status,
        };

        if !self.claim(&key) {
            return outcome(FileStatus::Duplicate);
        }
        if candidate.destination.exists() {
            return outcome(FileStatus::AlreadyDone);
        }
        if self.success_set.contains(&key) {
            tracing::warn!(key = %key, "Logged as converted but missing on disk, converting again");
        }

        let (status, log_status) = match self.convert(candidate) {
            Ok(()) => (FileStatus::Converted, Status::Success),
            Err(e) => (
                FileStatus::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                },
                Status::Failed,
            ),
        };

        self.append(log, &key, log_status);
        outcome(status)
    }

    /// Decode, transform, encode and atomically write one artifact.
    fn convert(&self, candidate: &Candidate) -> Result<(), FileError> {
        let raw = self.decoder.decode(&candidate.source)?;
        let image = self.transformer.transform(&raw)?;
        drop(raw);
        let png = image.encode_png()?;

        self.resolver.ensure_parent(candidate)?;
        write_atomically(&candidate.destination, &png)?;
        Ok(())
    }

    /// Returns false if the key was already dispatched this run.
    fn claim(&self, key: &str) -> bool {
        self.claimed.lock().insert(key.to_string())
    }

    fn append(&self, log: &ProvenanceLog, key: &str, status: Status) {
        if let Err(e) = log.append(key, status) {
            self.log_errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(key, %status, error = %e, "Failed to record outcome");
        }
    }
}

/// Writes through a temporary file in the destination directory so a
/// present artifact is always complete.
fn write_atomically(destination: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = destination.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".partial-")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(destination).map_err(|e| e.error)?;
    Ok(())
}

fn entry_status(outcome: &EntryOutcome) -> Option<Status> {
    match outcome {
        EntryOutcome::InvalidPath { .. } => Some(Status::InvalidPath),
        EntryOutcome::FolderMissing => Some(Status::FolderMissing),
        EntryOutcome::ScanFailed { .. } => Some(Status::Failed),
        EntryOutcome::Excluded | EntryOutcome::Scanned { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provenance::read_records;
    use crate::raster::MockDecoder;
    use std::fs;

    struct Fixture {
        _dir: tempfile::TempDir,
        base: std::path::PathBuf,
        out: std::path::PathBuf,
        log_path: std::path::PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("archive");
        let out = dir.path().join("out");
        fs::create_dir_all(&base).unwrap();
        let log_path = dir.path().join("log.txt");
        Fixture {
            _dir: dir,
            base,
            out,
            log_path,
        }
    }

    fn driver(f: &Fixture) -> BatchDriver<MockDecoder> {
        let resolver = Resolver::new(&f.base, &f.out, vec!["LCC".into(), "RCC".into()]);
        BatchDriver::new(resolver, MockDecoder::new(4, 4))
    }

    #[test]
    fn test_file_error_kinds() {
        let io = FileError::from(io::Error::new(io::ErrorKind::Other, "disk"));
        assert_eq!(io.kind(), FailureKind::Io);
        let decode = FileError::from(DecodeError::Malformed("x".into()));
        assert_eq!(decode.kind(), FailureKind::Decode);
        let transform = FileError::from(TransformError::EmptyImage);
        assert_eq!(transform.kind(), FailureKind::Transform);
    }

    #[test]
    fn test_excluded_entry_logs_nothing() {
        let f = fixture();
        let log = ProvenanceLog::open(&f.log_path).unwrap();
        let mut entry = ManifestEntry::new(1, f.base.join("p1").to_string_lossy());
        entry.excluded = true;

        let summary = driver(&f).run(&[entry], &log);

        assert_eq!(summary.excluded, 1);
        assert!(read_records(&f.log_path).unwrap().is_empty());
    }

    #[test]
    fn test_failed_file_does_not_stop_siblings() {
        let f = fixture();
        let dir = f.base.join("p1");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("A_LCC.raw"), b"").unwrap();
        fs::write(dir.join("B_RCC.raw"), b"\x01\x02\x03").unwrap();

        let log = ProvenanceLog::open(&f.log_path).unwrap();
        let entry = ManifestEntry::new(1, dir.to_string_lossy());
        let summary = driver(&f).run(&[entry], &log);

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failures(FailureKind::Decode), 1);
        assert!(f.out.join("p1/B_RCC.png").is_file());
        assert!(!f.out.join("p1/A_LCC.png").exists());

        let statuses: Vec<_> = read_records(&f.log_path)
            .unwrap()
            .into_iter()
            .map(|r| r.status)
            .collect();
        assert_eq!(statuses, vec![Status::Failed, Status::Success]);
    }

    #[test]
    fn test_stale_success_is_reconverted() {
        let f = fixture();
        let dir = f.base.join("p1");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("A_LCC.raw"), b"\x09\x08\x07").unwrap();
        let key = f.out.join("p1/A_LCC.png").to_string_lossy().into_owned();

        let log = ProvenanceLog::open(&f.log_path).unwrap();
        let driver = driver(&f).with_success_set(HashSet::from([key]));
        let summary = driver.run(&[ManifestEntry::new(1, dir.to_string_lossy())], &log);

        assert_eq!(summary.succeeded, 1);
        assert_eq!(driver.decoder().decode_count(), 1);
        assert!(f.out.join("p1/A_LCC.png").is_file());
    }

    #[test]
    fn test_no_partial_files_left_behind() {
        let f = fixture();
        let dir = f.base.join("p1");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("A_LCC.raw"), b"\x01\x02").unwrap();

        let log = ProvenanceLog::open(&f.log_path).unwrap();
        driver(&f).run(&[ManifestEntry::new(1, dir.to_string_lossy())], &log);

        let names: Vec<_> = fs::read_dir(f.out.join("p1"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["A_LCC.png".to_string()]);
    }

    #[test]
    fn test_shared_output_key_converted_once() {
        let f = fixture();
        let dir = f.base.join("p1");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("A_LCC.dcm"), b"\x01\x02").unwrap();
        fs::write(dir.join("A_LCC.raw"), b"\x03\x04").unwrap();
        fs::write(dir.join("B_RCC.dcm"), b"\x05\x06").unwrap();

        let log = ProvenanceLog::open(&f.log_path).unwrap();
        let driver = driver(&f).with_workers(4);
        let entry = ManifestEntry::new(1, dir.to_string_lossy());
        let summary = driver.run(&[entry.clone(), entry], &log);

        assert_eq!(driver.decoder().decode_count(), 2);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.skipped, 4);

        let records = read_records(&f.log_path).unwrap();
        let key = f.out.join("p1/A_LCC.png").to_string_lossy().into_owned();
        assert_eq!(records.iter().filter(|r| r.key == key).count(), 1);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_pooled_run_spans_entries() {
        let f = fixture();
        for (folder, name) in [("p1", "A_LCC.raw"), ("p2", "B_RCC.raw"), ("p3", "C_LCC.raw")] {
            let dir = f.base.join(folder);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(name), b"\x01\x02\x03").unwrap();
        }

        let log = ProvenanceLog::open(&f.log_path).unwrap();
        let entries: Vec<_> = ["p1", "gone", "p2", "p3"]
            .iter()
            .enumerate()
            .map(|(i, folder)| ManifestEntry::new(i + 1, f.base.join(folder).to_string_lossy()))
            .collect();
        let driver = driver(&f).with_workers(3);
        let summary = driver.run(&entries, &log);

        assert_eq!(summary.entries, 4);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.missing_folders, 1);
        assert_eq!(driver.decoder().decode_count(), 3);
        for folder in ["p1", "p2", "p3"] {
            assert_eq!(fs::read_dir(f.out.join(folder)).unwrap().count(), 1);
        }

        let records = read_records(&f.log_path).unwrap();
        assert_eq!(records.len(), 4);
        let missing: Vec<_> = records
            .iter()
            .filter(|r| r.status == Status::FolderMissing)
            .collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].key, entries[1].log_key());
    }
}
