//! One complete conversion run, from configuration to count report.

use super::driver::BatchDriver;
use super::manifest::{Manifest, ManifestError};
use super::resolver::Resolver;
use super::summary::RunSummary;
use crate::config::{ConfigError, FileConfig};
use crate::metrics::{MetricsError, MetricsRegistry};
use crate::provenance::{load_success_set, ProvenanceError, ProvenanceLog};
use crate::raster::{DicomDecoder, RasterDecoder};
use crate::report::{count_artifacts, CountReport, ReportError};
use crate::transform::Transformer;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop a run before or after the batch itself.
///
/// Per-file and per-entry failures never surface here; they are logged
/// and counted in the [`RunSummary`].
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("cannot create output root {path}: {source}")]
    OutputRoot {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Log(#[from] ProvenanceError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct JobOutput {
    pub summary: RunSummary,
    pub counts: CountReport,
}

/// A configured conversion run.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    config: FileConfig,
}

impl ConversionJob {
    pub fn new(config: FileConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FileConfig {
        &self.config
    }

    /// Runs with the DICOM decoder.
    pub fn run(&self) -> Result<JobOutput, SetupError> {
        self.run_with(DicomDecoder::new())
    }

    /// Runs the batch with `decoder`, then aggregates the output tree.
    ///
    /// The count report is produced only after the driver has returned
    /// and the provenance log is closed.
    pub fn run_with<D: RasterDecoder>(&self, decoder: D) -> Result<JobOutput, SetupError> {
        let config = &self.config;
        config.validate()?;

        let manifest = Manifest::load(&config.paths.manifest, &config.manifest)?;

        let output_root = &config.paths.output_root;
        std::fs::create_dir_all(output_root).map_err(|source| SetupError::OutputRoot {
            path: output_root.clone(),
            source,
        })?;

        let log_path = config.paths.log_path();
        let success_set = load_success_set(&log_path)?;
        let log = ProvenanceLog::open(&log_path)?;

        let resolver = Resolver::new(
            &config.paths.base_root,
            output_root,
            config.selection.filter_tokens.clone(),
        );
        let driver = BatchDriver::new(resolver, decoder)
            .with_transformer(Transformer::new(config.transform.window_selection))
            .with_workers(config.run.workers)
            .with_success_set(success_set);

        let summary = driver.run(manifest.entries(), &log);
        log.close()?;

        let counts = write_counts(config)?;

        if let Some(path) = &config.run.metrics_file {
            let metrics = MetricsRegistry::new()?;
            metrics.record_run(&summary);
            metrics.record_counts(&counts);
            metrics.write_to(path)?;
            tracing::info!(path = %path.display(), "Wrote run metrics");
        }

        Ok(JobOutput { summary, counts })
    }
}

/// Aggregates an existing output tree without converting anything.
pub fn count_only(config: &FileConfig) -> Result<CountReport, SetupError> {
    config.validate_report()?;
    write_counts(config)
}

fn write_counts(config: &FileConfig) -> Result<CountReport, SetupError> {
    let counts = count_artifacts(&config.paths.output_root, &config.report.extensions)?;
    let report_path = config.paths.report_path();
    counts.write_to(&report_path)?;
    tracing::info!(path = %report_path.display(), "Wrote count report");
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provenance::{read_records, Status};
    use crate::raster::MockDecoder;
    use std::fs;
    use std::path::Path;

    struct Tree {
        dir: tempfile::TempDir,
    }

    impl Tree {
        fn new() -> Self {
            let tree = Self {
                dir: tempfile::tempdir().unwrap(),
            };
            fs::create_dir_all(tree.base()).unwrap();
            tree
        }

        fn base(&self) -> PathBuf {
            self.dir.path().join("archive")
        }

        fn out(&self) -> PathBuf {
            self.dir.path().join("out")
        }

        fn source(&self, rel: &str, name: &str, bytes: &[u8]) {
            let dir = self.base().join(rel);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(name), bytes).unwrap();
        }

        fn manifest(&self, rows: &[&str]) -> FileConfig {
            let path = self.dir.path().join("manifest.csv");
            let mut text = String::from("ID,FilePath\n");
            for (i, row) in rows.iter().enumerate() {
                text.push_str(&format!("{},{}\n", i + 1, row));
            }
            fs::write(&path, text).unwrap();

            let mut config = FileConfig::default();
            config.paths.manifest = path;
            config.paths.base_root = self.base();
            config.paths.output_root = self.out();
            config
        }

        fn entry(&self, rel: &str) -> String {
            self.base().join(rel).to_string_lossy().into_owned()
        }
    }

    fn tree_listing(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
        let mut files: Vec<_> = walkdir::WalkDir::new(root)
            .into_iter()
            .map(|e| e.unwrap())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().is_some_and(|x| x == "png"))
            .map(|e| (e.path().to_path_buf(), fs::read(e.path()).unwrap()))
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_selects_only_tokened_files() {
        let tree = Tree::new();
        for name in ["P1_LCC.dcm", "P1_RCC.dcm", "P1_LMLO.dcm"] {
            tree.source("site/p1", name, b"\x10\x20\x30");
        }
        let config = tree.manifest(&[&tree.entry("site/p1")]);

        let output = ConversionJob::new(config).run_with(MockDecoder::new(4, 4)).unwrap();

        assert_eq!(output.summary.succeeded, 2);
        assert!(tree.out().join("site/p1/P1_LCC.png").is_file());
        assert!(tree.out().join("site/p1/P1_RCC.png").is_file());
        assert!(!tree.out().join("site/p1/P1_LMLO.png").exists());
        assert_eq!(output.counts.get("site"), 2);
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let tree = Tree::new();
        tree.source("p1", "A_LCC.dcm", b"\x01\x02\x03");
        tree.source("p2", "B_RCC.dcm", b"\x04\x05");
        let config = tree.manifest(&[&tree.entry("p1"), &tree.entry("p2")]);
        let job = ConversionJob::new(config.clone());

        let first = job.run_with(MockDecoder::default()).unwrap();
        assert_eq!(first.summary.succeeded, 2);
        let before = tree_listing(&tree.out());
        let records_before = read_records(config.paths.log_path()).unwrap().len();

        let decoder = MockDecoder::default();
        let second = job.run_with(decoder).unwrap();

        assert_eq!(second.summary.succeeded, 0);
        assert_eq!(second.summary.attempted, 0);
        assert_eq!(second.summary.skipped, 2);
        assert_eq!(tree_listing(&tree.out()), before);
        assert_eq!(
            read_records(config.paths.log_path()).unwrap().len(),
            records_before
        );
        assert_eq!(second.counts, first.counts);
    }

    #[test]
    fn test_missing_folder_logged_once() {
        let tree = Tree::new();
        let missing = tree.entry("gone");
        let config = tree.manifest(&[&missing]);

        let output = ConversionJob::new(config.clone())
            .run_with(MockDecoder::default())
            .unwrap();

        assert_eq!(output.summary.missing_folders, 1);
        assert_eq!(output.summary.attempted, 0);
        let records = read_records(config.paths.log_path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, missing);
        assert_eq!(records[0].status, Status::FolderMissing);
        assert!(tree_listing(&tree.out()).is_empty());
    }

    #[test]
    fn test_blank_path_logged_as_invalid() {
        let tree = Tree::new();
        let config = tree.manifest(&[""]);

        let output = ConversionJob::new(config.clone())
            .run_with(MockDecoder::default())
            .unwrap();

        assert_eq!(output.summary.invalid_paths, 1);
        let records = read_records(config.paths.log_path()).unwrap();
        assert_eq!(records[0].status, Status::InvalidPath);
    }

    #[test]
    fn test_duplicate_entries_convert_once() {
        let tree = Tree::new();
        tree.source("p1", "A_LCC.dcm", b"\x01\x02\x03");
        tree.source("p1", "A_LCC.raw", b"\x04\x05\x06");
        let entry = tree.entry("p1");
        let mut config = tree.manifest(&[&entry, &entry]);
        config.run.workers = 4;

        let job = ConversionJob::new(config.clone());
        let decoder = MockDecoder::default();
        let output = job.run_with(decoder).unwrap();

        assert_eq!(output.summary.succeeded, 1);
        assert_eq!(output.summary.skipped, 3);
        let records = read_records(config.paths.log_path()).unwrap();
        let successes = records
            .iter()
            .filter(|r| r.status == Status::Success)
            .count();
        assert_eq!(successes, 1);
    }

    #[test]
    fn test_counts_sum_to_artifacts() {
        let tree = Tree::new();
        tree.source("a/p1", "X_LCC.dcm", b"\x01");
        tree.source("a/p2", "Y_RCC.dcm", b"\x02");
        tree.source("b/p3", "Z_LCC.dcm", b"\x03");
        tree.source("b/p3", "BAD_RCC.dcm", b"");
        let config = tree.manifest(&[&tree.entry("a/p1"), &tree.entry("a/p2"), &tree.entry("b/p3")]);

        let output = ConversionJob::new(config.clone())
            .run_with(MockDecoder::default())
            .unwrap();

        assert_eq!(output.summary.failed, 1);
        assert_eq!(output.counts.get("a"), 2);
        assert_eq!(output.counts.get("b"), 1);
        assert_eq!(output.counts.total(), tree_listing(&tree.out()).len() as u64);

        let report = fs::read_to_string(config.paths.report_path()).unwrap();
        assert_eq!(report, "a: 2\nb: 1\n");
    }

    #[test]
    fn test_prefix_rewrite_from_manifest() {
        let tree = Tree::new();
        tree.source("Study/P1", "P1_LCC.dcm", b"\x07\x08");
        let mut config = tree.manifest(&[r"Q:\Study\P1"]);
        config.manifest.rewrite_prefix = Some(r"Q:\".to_string());
        config.manifest.rewrite_to = Some(format!("{}/", tree.base().display()));

        let output = ConversionJob::new(config).run_with(MockDecoder::default()).unwrap();

        assert_eq!(output.summary.succeeded, 1);
        assert!(tree.out().join("Study/P1/P1_LCC.png").is_file());
    }

    #[test]
    fn test_metrics_file_written() {
        let tree = Tree::new();
        tree.source("p1", "A_LCC.dcm", b"\x01\x02");
        let mut config = tree.manifest(&[&tree.entry("p1")]);
        let metrics_path = tree.dir.path().join("run.prom");
        config.run.metrics_file = Some(metrics_path.clone());

        ConversionJob::new(config).run_with(MockDecoder::default()).unwrap();

        let text = fs::read_to_string(metrics_path).unwrap();
        assert!(text.contains("dicom_mirror_files_succeeded_total 1"));
        assert!(text.contains("dicom_mirror_artifacts{folder=\"p1\"} 1"));
    }

    #[test]
    fn test_invalid_config_is_setup_error() {
        let result = ConversionJob::new(FileConfig::default()).run_with(MockDecoder::default());
        assert!(matches!(result, Err(SetupError::Config(_))));
    }

    #[test]
    fn test_missing_manifest_is_setup_error() {
        let tree = Tree::new();
        let mut config = tree.manifest(&[]);
        config.paths.manifest = tree.dir.path().join("absent.csv");

        let result = ConversionJob::new(config).run_with(MockDecoder::default());
        assert!(matches!(result, Err(SetupError::Manifest(_))));
    }

    #[test]
    fn test_count_only_reads_existing_tree() {
        let tree = Tree::new();
        fs::create_dir_all(tree.out().join("x")).unwrap();
        fs::write(tree.out().join("x/a.png"), b"png").unwrap();
        fs::write(tree.out().join("x/b.PNG"), b"png").unwrap();
        fs::write(tree.out().join("x/notes.txt"), b"").unwrap();
        fs::write(tree.out().join("top.png"), b"png").unwrap();

        let mut config = FileConfig::default();
        config.paths.output_root = tree.out();
        let counts = count_only(&config).unwrap();

        assert_eq!(counts.get("x"), 2);
        assert_eq!(counts.get(crate::report::ROOT_BUCKET), 1);
        assert!(config.paths.report_path().is_file());
    }
}
