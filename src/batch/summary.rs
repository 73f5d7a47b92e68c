//! Per-file and per-entry outcomes and their run-level aggregate.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Failure taxonomy. Every failure is caught at the driver boundary and
/// recorded; none aborts the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FailureKind {
    InvalidPath,
    FolderMissing,
    Decode,
    Transform,
    Io,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::InvalidPath => "invalid_path",
            FailureKind::FolderMissing => "folder_missing",
            FailureKind::Decode => "decode",
            FailureKind::Transform => "transform",
            FailureKind::Io => "io",
        };
        f.write_str(name)
    }
}

/// Terminal state of one candidate file.
#[derive(Debug, Clone, PartialEq)]
pub enum FileStatus {
    /// Artifact written and logged as `Success`.
    Converted,
    /// Artifact already on disk; nothing done, nothing logged.
    AlreadyDone,
    /// Another candidate claimed the same output key this run.
    Duplicate,
    /// Logged as `Failed`.
    Failed { kind: FailureKind, message: String },
}

/// Outcome of one candidate file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileOutcome {
    /// Output key (destination path).
    pub key: String,
    pub source: PathBuf,
    pub status: FileStatus,
}

/// Terminal state of one manifest entry.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    /// Skipped by the manifest's exclusion column.
    Excluded,
    /// Path absent or unusable; logged as `Invalid Path`.
    InvalidPath { reason: String },
    /// Directory absent; logged as `Folder Missing`.
    FolderMissing,
    /// Directory could not be listed; logged as `Failed`.
    ScanFailed { message: String },
    /// Directory scanned and its candidates processed.
    Scanned { candidates: usize },
}

/// Aggregate counts for a whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Manifest entries seen.
    pub entries: u64,
    pub excluded: u64,
    pub invalid_paths: u64,
    pub missing_folders: u64,
    /// Files that reached decode/transform.
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Files skipped as already done or duplicate.
    pub skipped: u64,
    /// Provenance appends that failed.
    pub log_errors: u64,
    pub failures_by_kind: BTreeMap<FailureKind, u64>,
}

impl RunSummary {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            entries: 0,
            excluded: 0,
            invalid_paths: 0,
            missing_folders: 0,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            log_errors: 0,
            failures_by_kind: BTreeMap::new(),
        }
    }

    /// Folds one entry outcome into the totals.
    pub fn record_entry(&mut self, outcome: &EntryOutcome) {
        self.entries += 1;
        match outcome {
            EntryOutcome::Excluded => self.excluded += 1,
            EntryOutcome::InvalidPath { .. } => {
                self.invalid_paths += 1;
                self.count_failure(FailureKind::InvalidPath);
            }
            EntryOutcome::FolderMissing => {
                self.missing_folders += 1;
                self.count_failure(FailureKind::FolderMissing);
            }
            EntryOutcome::ScanFailed { .. } => self.count_failure(FailureKind::Io),
            EntryOutcome::Scanned { .. } => {}
        }
    }

    /// Folds one file outcome into the totals.
    pub fn record_file(&mut self, outcome: &FileOutcome) {
        match &outcome.status {
            FileStatus::Converted => {
                self.attempted += 1;
                self.succeeded += 1;
            }
            FileStatus::AlreadyDone | FileStatus::Duplicate => self.skipped += 1,
            FileStatus::Failed { kind, .. } => {
                self.attempted += 1;
                self.failed += 1;
                self.count_failure(*kind);
            }
        }
    }

    /// Marks the run as finished now.
    pub fn finish(&mut self) {
        self.finished_at = Utc::now();
    }

    /// Wall-clock duration of the run.
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Returns the failure count for one kind.
    pub fn failures(&self, kind: FailureKind) -> u64 {
        self.failures_by_kind.get(&kind).copied().unwrap_or(0)
    }

    fn count_failure(&mut self, kind: FailureKind) {
        *self.failures_by_kind.entry(kind).or_insert(0) += 1;
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entries ({} excluded, {} invalid, {} missing); {} files attempted: {} succeeded, {} failed, {} skipped",
            self.entries,
            self.excluded,
            self.invalid_paths,
            self.missing_folders,
            self.attempted,
            self.succeeded,
            self.failed,
            self.skipped
        )
    }
}
