//! Prometheus metrics for conversion runs.
//!
//! Metrics mirror the run summary and the count report so a run can be
//! scraped through a node-exporter textfile collector.
//!
//! # Metrics Exposed
//!
//! ## Entry Metrics
//! - `dicom_mirror_entries_total` - Manifest entries seen
//! - `dicom_mirror_entries_excluded_total` - Entries skipped by the manifest
//! - `dicom_mirror_invalid_paths_total` - Entries with unusable paths
//! - `dicom_mirror_missing_folders_total` - Entries whose folder is absent
//!
//! ## File Metrics
//! - `dicom_mirror_files_attempted_total` - Files that reached decode
//! - `dicom_mirror_files_succeeded_total` - Artifacts written
//! - `dicom_mirror_files_failed_total` - Failed conversions
//! - `dicom_mirror_files_skipped_total` - Already-present or duplicate artifacts
//! - `dicom_mirror_failures_total{kind}` - Failures by taxonomy kind
//!
//! ## Run Metrics
//! - `dicom_mirror_log_errors_total` - Provenance appends that failed
//! - `dicom_mirror_run_duration_seconds` - Wall-clock duration
//! - `dicom_mirror_artifacts{folder}` - Artifacts per first-level folder

mod collector;

pub use collector::{MetricsError, MetricsRegistry};
