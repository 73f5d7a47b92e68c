//! Metrics collection and registry.

use crate::batch::{FailureKind, RunSummary};
use crate::report::CountReport;
use prometheus::{
    Encoder, Gauge, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("failed to write metrics to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

const FAILURE_KINDS: [FailureKind; 5] = [
    FailureKind::InvalidPath,
    FailureKind::FolderMissing,
    FailureKind::Decode,
    FailureKind::Transform,
    FailureKind::Io,
];

/// Prometheus metrics registry for conversion runs.
pub struct MetricsRegistry {
    registry: Registry,

    // Entry metrics
    entries_total: IntCounter,
    entries_excluded: IntCounter,
    invalid_paths: IntCounter,
    missing_folders: IntCounter,

    // File metrics
    files_attempted: IntCounter,
    files_succeeded: IntCounter,
    files_failed: IntCounter,
    files_skipped: IntCounter,
    failures: IntCounterVec,

    // Run metrics
    log_errors: IntCounter,
    run_duration: Gauge,
    artifacts: IntGaugeVec,
}

impl MetricsRegistry {
    /// Creates a new registry with all run metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let entries_total =
            IntCounter::new("dicom_mirror_entries_total", "Manifest entries seen")?;
        let entries_excluded = IntCounter::new(
            "dicom_mirror_entries_excluded_total",
            "Manifest entries skipped by the exclusion column",
        )?;
        let invalid_paths = IntCounter::new(
            "dicom_mirror_invalid_paths_total",
            "Manifest entries with an unusable source path",
        )?;
        let missing_folders = IntCounter::new(
            "dicom_mirror_missing_folders_total",
            "Manifest entries whose source folder does not exist",
        )?;

        let files_attempted = IntCounter::new(
            "dicom_mirror_files_attempted_total",
            "Files that reached decode and transform",
        )?;
        let files_succeeded =
            IntCounter::new("dicom_mirror_files_succeeded_total", "Artifacts written")?;
        let files_failed =
            IntCounter::new("dicom_mirror_files_failed_total", "Failed file conversions")?;
        let files_skipped = IntCounter::new(
            "dicom_mirror_files_skipped_total",
            "Files skipped as already converted or duplicate",
        )?;
        let failures = IntCounterVec::new(
            Opts::new("dicom_mirror_failures_total", "Failures by kind"),
            &["kind"],
        )?;

        let log_errors = IntCounter::new(
            "dicom_mirror_log_errors_total",
            "Provenance log appends that failed",
        )?;
        let run_duration = Gauge::new(
            "dicom_mirror_run_duration_seconds",
            "Wall-clock duration of the last run",
        )?;
        let artifacts = IntGaugeVec::new(
            Opts::new("dicom_mirror_artifacts", "Artifacts per first-level folder"),
            &["folder"],
        )?;

        registry.register(Box::new(entries_total.clone()))?;
        registry.register(Box::new(entries_excluded.clone()))?;
        registry.register(Box::new(invalid_paths.clone()))?;
        registry.register(Box::new(missing_folders.clone()))?;
        registry.register(Box::new(files_attempted.clone()))?;
        registry.register(Box::new(files_succeeded.clone()))?;
        registry.register(Box::new(files_failed.clone()))?;
        registry.register(Box::new(files_skipped.clone()))?;
        registry.register(Box::new(failures.clone()))?;
        registry.register(Box::new(log_errors.clone()))?;
        registry.register(Box::new(run_duration.clone()))?;
        registry.register(Box::new(artifacts.clone()))?;

        Ok(Self {
            registry,
            entries_total,
            entries_excluded,
            invalid_paths,
            missing_folders,
            files_attempted,
            files_succeeded,
            files_failed,
            files_skipped,
            failures,
            log_errors,
            run_duration,
            artifacts,
        })
    }

    /// Adds a finished run's totals.
    pub fn record_run(&self, summary: &RunSummary) {
        self.entries_total.inc_by(summary.entries);
        self.entries_excluded.inc_by(summary.excluded);
        self.invalid_paths.inc_by(summary.invalid_paths);
        self.missing_folders.inc_by(summary.missing_folders);

        self.files_attempted.inc_by(summary.attempted);
        self.files_succeeded.inc_by(summary.succeeded);
        self.files_failed.inc_by(summary.failed);
        self.files_skipped.inc_by(summary.skipped);
        for kind in FAILURE_KINDS {
            let label = kind.to_string();
            self.failures
                .with_label_values(&[label.as_str()])
                .inc_by(summary.failures(kind));
        }

        self.log_errors.inc_by(summary.log_errors);
        let elapsed = summary.elapsed().num_milliseconds().max(0) as f64 / 1000.0;
        self.run_duration.set(elapsed);
    }

    /// Sets per-folder artifact gauges from a count report.
    pub fn record_counts(&self, report: &CountReport) {
        self.artifacts.reset();
        for (folder, count) in report.iter() {
            self.artifacts
                .with_label_values(&[folder])
                .set(i64::try_from(count).unwrap_or(i64::MAX));
        }
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Writes the encoded metrics to a file.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), MetricsError> {
        let path = path.as_ref();
        std::fs::write(path, self.encode()?).map_err(|source| MetricsError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
