//! Manifest loading.
//!
//! The manifest is a CSV file with a header row. One column names the
//! source directory of each record; optional columns carry a category
//! and an exclusion flag. Quoted fields may contain commas and doubled
//! quotes but not line breaks.

use crate::config::ManifestConfig;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("manifest has no header row")]
    MissingHeader,
    #[error("manifest has no column named {0:?}")]
    MissingColumn(String),
}

/// One manifest record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// 1-based data row number (the header is row 0).
    pub row: usize,
    /// Source directory after rewriting; `None` when the field is blank.
    pub source: Option<String>,
    pub category: Option<String>,
    pub excluded: bool,
}

impl ManifestEntry {
    /// An included entry with only a source directory.
    pub fn new(row: usize, source: impl Into<String>) -> Self {
        Self {
            row,
            source: Some(source.into()),
            category: None,
            excluded: false,
        }
    }

    /// Key under which entry-level outcomes are logged.
    pub fn log_key(&self) -> String {
        match &self.source {
            Some(s) => s.clone(),
            None => format!("<row {} has no path>", self.row),
        }
    }
}

/// A loaded manifest.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn from_entries(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    /// Loads a manifest file.
    pub fn load(path: impl AsRef<Path>, config: &ManifestConfig) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest = Self::from_reader(BufReader::new(file), config).map_err(|e| match e {
            ManifestError::Read { source, .. } => ManifestError::Read {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;

        tracing::info!(
            path = %path.display(),
            entries = manifest.len(),
            "Loaded manifest"
        );
        Ok(manifest)
    }

    /// Parses a manifest from any buffered reader.
    pub fn from_reader(reader: impl BufRead, config: &ManifestConfig) -> Result<Self, ManifestError> {
        let mut lines = reader.lines();
        let read_err = |source| ManifestError::Read {
            path: PathBuf::new(),
            source,
        };

        let header = loop {
            match lines.next() {
                Some(line) => {
                    let line = line.map_err(read_err)?;
                    if !line.trim().is_empty() {
                        break split_record(line.trim_start_matches('\u{feff}'));
                    }
                }
                None => return Err(ManifestError::MissingHeader),
            }
        };

        let column = |name: &str| {
            header
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| ManifestError::MissingColumn(name.to_string()))
        };
        let path_idx = column(config.path_column.as_str())?;
        let category_idx = config.category_column.as_deref().map(column).transpose()?;
        let exclude_idx = config.exclude_column.as_deref().map(column).transpose()?;

        let mut entries = Vec::new();
        for (i, line) in lines.enumerate() {
            let line = line.map_err(read_err)?;
            if line.trim().is_empty() {
                continue;
            }
            let fields = split_record(&line);
            let field = |idx: usize| {
                fields
                    .get(idx)
                    .map(|f| f.trim())
                    .filter(|f| !f.is_empty())
            };

            entries.push(ManifestEntry {
                row: i + 1,
                source: field(path_idx).map(|raw| rewrite_path(raw, config)),
                category: category_idx.and_then(field).map(str::to_string),
                excluded: exclude_idx.and_then(field).is_some_and(is_truthy),
            });
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Applies the configured prefix rewrite, then separator normalization.
fn rewrite_path(raw: &str, config: &ManifestConfig) -> String {
    let mut path = match (&config.rewrite_prefix, &config.rewrite_to) {
        (Some(prefix), Some(to)) if !prefix.is_empty() && raw.starts_with(prefix.as_str()) => {
            format!("{}{}", to, &raw[prefix.len()..])
        }
        _ => raw.to_string(),
    };
    if config.normalize_separators {
        path = path.replace('\\', "/");
        while path.contains("//") {
            path = path.replace("//", "/");
        }
    }
    path
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "x"
    )
}

/// Splits one CSV record into fields.
fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            ('"', _) => in_quotes = !in_quotes,
            (',', false) => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(text: &str, config: &ManifestConfig) -> Manifest {
        Manifest::from_reader(Cursor::new(text), config).unwrap()
    }

    #[test]
    fn test_split_record_quotes() {
        assert_eq!(
            split_record(r#"a,"b,c","say ""hi""",,"#),
            vec!["a", "b,c", r#"say "hi""#, "", ""]
        );
    }

    #[test]
    fn test_reads_path_column() {
        let manifest = parse(
            "ID,FilePath,Site\n1,/archive/p1,A\n2,,B\n",
            &ManifestConfig::default(),
        );

        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.entries()[0].source.as_deref(), Some("/archive/p1"));
        assert_eq!(manifest.entries()[1].source, None);
        assert_eq!(manifest.entries()[1].row, 2);
    }

    #[test]
    fn test_missing_column() {
        let result = Manifest::from_reader(Cursor::new("A,B\n1,2\n"), &ManifestConfig::default());
        assert!(matches!(result, Err(ManifestError::MissingColumn(c)) if c == "FilePath"));
    }

    #[test]
    fn test_empty_manifest_has_no_header() {
        let result = Manifest::from_reader(Cursor::new("\n\n"), &ManifestConfig::default());
        assert!(matches!(result, Err(ManifestError::MissingHeader)));
    }

    #[test]
    fn test_prefix_rewrite_and_separators() {
        let config = ManifestConfig {
            rewrite_prefix: Some(r"Q:\".to_string()),
            rewrite_to: Some("/mnt/share/".to_string()),
            ..Default::default()
        };
        let manifest = parse("FilePath\n\"Q:\\Study\\\\P1\"\n", &config);

        assert_eq!(
            manifest.entries()[0].source.as_deref(),
            Some("/mnt/share/Study/P1")
        );
    }

    #[test]
    fn test_category_and_exclusion() {
        let config = ManifestConfig {
            category_column: Some("Group".to_string()),
            exclude_column: Some("Skip".to_string()),
            ..Default::default()
        };
        let manifest = parse("FilePath,Group,Skip\n/a,White,\n/b,Asian,TRUE\n", &config);

        let entries = manifest.entries();
        assert_eq!(entries[0].category.as_deref(), Some("White"));
        assert!(!entries[0].excluded);
        assert!(entries[1].excluded);
    }

    #[test]
    fn test_log_key_for_blank_path() {
        let entry = ManifestEntry {
            row: 7,
            source: None,
            category: None,
            excluded: false,
        };
        assert_eq!(entry.log_key(), "<row 7 has no path>");
    }
}
