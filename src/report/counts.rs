//! Per-folder artifact counts.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Bucket for artifacts stored directly under the root.
pub const ROOT_BUCKET: &str = ".";

/// Errors that can occur while aggregating or writing the report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("output root {0} does not exist")]
    MissingRoot(PathBuf),
    #[error("failed to write count report {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Artifact counts keyed by first-level folder name, sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountReport {
    counts: BTreeMap<String, u64>,
}

impl CountReport {
    /// Returns the count for one folder.
    pub fn get(&self, folder: &str) -> u64 {
        self.counts.get(folder).copied().unwrap_or(0)
    }

    /// Returns the sum over all folders.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Iterates `(folder, count)` in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(k, &v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Renders `folder: count` lines.
    pub fn render(&self) -> String {
        self.iter()
            .map(|(folder, count)| format!("{folder}: {count}\n"))
            .collect()
    }

    /// Writes the rendered report, replacing any previous one atomically.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let path = path.as_ref();
        let write_err = |source| ReportError::Write {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(write_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(self.render().as_bytes()).map_err(write_err)?;
        tmp.persist(path).map_err(|e| write_err(e.error))?;
        Ok(())
    }

    fn add(mut self, folder: String) -> Self {
        *self.counts.entry(folder).or_insert(0) += 1;
        self
    }
}

/// Lazily enumerates artifacts under `root` whose extension matches one
/// of `extensions`, ignoring case.
///
/// Unreadable entries are skipped with a warning. Calling it again
/// restarts the walk.
pub fn artifact_paths<'a>(
    root: &'a Path,
    extensions: &'a [String],
) -> impl Iterator<Item = PathBuf> + 'a {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                tracing::warn!(error = %err, "Skipping unreadable entry during count");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(move |path| has_extension(path, extensions))
}

/// Counts artifacts under `root` by their first path segment below it.
pub fn count_artifacts(root: &Path, extensions: &[String]) -> Result<CountReport, ReportError> {
    if !root.is_dir() {
        return Err(ReportError::MissingRoot(root.to_path_buf()));
    }

    let report = artifact_paths(root, extensions)
        .map(|path| bucket_for(root, &path))
        .fold(CountReport::default(), CountReport::add);

    tracing::info!(
        root = %root.display(),
        folders = report.len(),
        artifacts = report.total(),
        "Counted artifacts"
    );
    Ok(report)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
}

fn bucket_for(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut components = relative.components().filter(|c| matches!(c, Component::Normal(_)));
    match (components.next(), components.next()) {
        (Some(first), Some(_)) => first.as_os_str().to_string_lossy().into_owned(),
        _ => ROOT_BUCKET.to_string(),
    }
}
