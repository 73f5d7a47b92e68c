//! Source file selection and mirrored destination naming.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while resolving a manifest directory.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid source path: {0}")]
    InvalidPath(String),
    #[error("source folder does not exist: {0}")]
    FolderMissing(PathBuf),
    #[error("failed to list {path}: {source}")]
    Scan { path: PathBuf, source: io::Error },
}

/// A qualifying source file and its artifact location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl Candidate {
    /// Provenance key for this artifact.
    pub fn key(&self) -> String {
        self.destination.to_string_lossy().into_owned()
    }
}

/// Selects source files by name token and mirrors their location from
/// `base_root` into `output_root`.
#[derive(Debug, Clone)]
pub struct Resolver {
    base_root: PathBuf,
    output_root: PathBuf,
    tokens: Vec<String>,
}

impl Resolver {
    pub fn new(
        base_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
        tokens: Vec<String>,
    ) -> Self {
        Self {
            base_root: base_root.into(),
            output_root: output_root.into(),
            tokens,
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Returns true if `name` contains any filter token (case-sensitive).
    pub fn matches(&self, name: &str) -> bool {
        self.tokens.iter().any(|t| name.contains(t.as_str()))
    }

    /// Checks a manifest path without touching the filesystem.
    ///
    /// Rejects absent or blank values, embedded NUL bytes, and
    /// directories that do not lie below `base_root`.
    pub fn validate_source(&self, raw: Option<&str>) -> Result<PathBuf, ResolveError> {
        let raw = raw
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ResolveError::InvalidPath("missing path".to_string()))?;
        if raw.contains('\0') {
            return Err(ResolveError::InvalidPath(format!("{raw:?} contains NUL")));
        }

        let dir = PathBuf::from(raw);
        self.relative_dir(&dir)?;
        Ok(dir)
    }

    /// Path of `source_dir` below `base_root`.
    fn relative_dir<'a>(&self, source_dir: &'a Path) -> Result<&'a Path, ResolveError> {
        let relative = source_dir.strip_prefix(&self.base_root).map_err(|_| {
            ResolveError::InvalidPath(format!(
                "{} is not under {}",
                source_dir.display(),
                self.base_root.display()
            ))
        })?;
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(ResolveError::InvalidPath(format!(
                "{} escapes {}",
                source_dir.display(),
                self.base_root.display()
            )));
        }
        Ok(relative)
    }

    /// Destination `output_root/relative(source_dir)/stem(file).png`.
    pub fn destination_for(&self, source_dir: &Path, file: &Path) -> Result<PathBuf, ResolveError> {
        let relative = self.relative_dir(source_dir)?;
        let stem = file
            .file_stem()
            .ok_or_else(|| ResolveError::InvalidPath(format!("{} has no name", file.display())))?;

        let mut name = stem.to_os_string();
        name.push(".png");
        Ok(self.output_root.join(relative).join(name))
    }

    /// Lists qualifying files in `source_dir`, sorted by name.
    ///
    /// Performs no writes. A missing directory is reported as
    /// `FolderMissing`.
    pub fn select(&self, source_dir: &Path) -> Result<Vec<Candidate>, ResolveError> {
        if !source_dir.is_dir() {
            return Err(ResolveError::FolderMissing(source_dir.to_path_buf()));
        }

        let scan_err = |source| ResolveError::Scan {
            path: source_dir.to_path_buf(),
            source,
        };

        let mut sources = Vec::new();
        for entry in fs::read_dir(source_dir).map_err(scan_err)? {
            let entry = entry.map_err(scan_err)?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if self.matches(&entry.file_name().to_string_lossy()) {
                sources.push(path);
            }
        }
        sources.sort();

        sources
            .into_iter()
            .map(|source| {
                let destination = self.destination_for(source_dir, &source)?;
                Ok(Candidate {
                    source,
                    destination,
                })
            })
            .collect()
    }

    /// Creates the destination's parent directories. Safe to call
    /// repeatedly and from several threads.
    pub fn ensure_parent(&self, candidate: &Candidate) -> io::Result<()> {
        match candidate.destination.parent() {
            Some(parent) => fs::create_dir_all(parent),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(base: &Path, out: &Path) -> Resolver {
        Resolver::new(base, out, vec!["LCC".to_string(), "RCC".to_string()])
    }

    #[test]
    fn test_token_match_is_case_sensitive() {
        let r = resolver(Path::new("/b"), Path::new("/o"));
        assert!(r.matches("P1_LCC.dcm"));
        assert!(r.matches("xRCCx"));
        assert!(!r.matches("p1_lcc.dcm"));
        assert!(!r.matches("P1_MLO.dcm"));
    }

    #[test]
    fn test_destination_mirrors_relative_path() {
        let r = resolver(Path::new("/archive"), Path::new("/out"));
        let dest = r
            .destination_for(Path::new("/archive/site/p1"), Path::new("P1_LCC.dcm"))
            .unwrap();
        assert_eq!(dest, PathBuf::from("/out/site/p1/P1_LCC.png"));
    }

    #[test]
    fn test_validate_source() {
        let r = resolver(Path::new("/archive"), Path::new("/out"));
        assert!(r.validate_source(Some("/archive/a")).is_ok());
        assert!(matches!(
            r.validate_source(None),
            Err(ResolveError::InvalidPath(_))
        ));
        assert!(matches!(
            r.validate_source(Some("   ")),
            Err(ResolveError::InvalidPath(_))
        ));
        assert!(matches!(
            r.validate_source(Some("/elsewhere/a")),
            Err(ResolveError::InvalidPath(_))
        ));
        assert!(matches!(
            r.validate_source(Some("/archive/../etc")),
            Err(ResolveError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_select_filters_and_sorts() {
        let base = tempfile::tempdir().unwrap();
        let dir = base.path().join("p1");
        fs::create_dir_all(dir.join("P1_LCC_subdir")).unwrap();
        for name in ["P1_RCC.raw", "P1_LCC.raw", "P1_OTHER.raw"] {
            fs::write(dir.join(name), b"x").unwrap();
        }

        let r = resolver(base.path(), Path::new("/out"));
        let candidates = r.select(&dir).unwrap();

        let names: Vec<_> = candidates
            .iter()
            .map(|c| c.destination.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["P1_LCC.png", "P1_RCC.png"]);
        assert_eq!(candidates[0].destination, PathBuf::from("/out/p1/P1_LCC.png"));
    }

    #[test]
    fn test_select_missing_folder() {
        let base = tempfile::tempdir().unwrap();
        let r = resolver(base.path(), Path::new("/out"));
        assert!(matches!(
            r.select(&base.path().join("absent")),
            Err(ResolveError::FolderMissing(_))
        ));
    }

    #[test]
    fn test_ensure_parent_is_idempotent() {
        let out = tempfile::tempdir().unwrap();
        let candidate = Candidate {
            source: PathBuf::from("/src/a.dcm"),
            destination: out.path().join("x/y/a.png"),
        };
        let r = resolver(Path::new("/src"), out.path());

        r.ensure_parent(&candidate).unwrap();
        r.ensure_parent(&candidate).unwrap();
        assert!(out.path().join("x/y").is_dir());
    }
}
