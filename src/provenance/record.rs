//! Log record type and its line format.

use std::fmt;
use std::str::FromStr;

/// Outcome recorded for an output key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Artifact written.
    Success,
    /// Decode, transform or write failed.
    Failed,
    /// Manifest path absent or unusable.
    InvalidPath,
    /// Manifest directory does not exist.
    FolderMissing,
}

impl Status {
    /// Returns the text written to the log.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "Success",
            Status::Failed => "Failed",
            Status::InvalidPath => "Invalid Path",
            Status::FolderMissing => "Folder Missing",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a log line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseRecordError {
    #[error("missing status field")]
    MissingStatus,
    #[error("unknown status {0:?}")]
    UnknownStatus(String),
}

impl FromStr for Status {
    type Err = ParseRecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Success" => Ok(Status::Success),
            "Failed" => Ok(Status::Failed),
            "Invalid Path" => Ok(Status::InvalidPath),
            "Folder Missing" => Ok(Status::FolderMissing),
            other => Err(ParseRecordError::UnknownStatus(other.to_string())),
        }
    }
}

/// One provenance entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Output path for file outcomes, source directory for entry outcomes.
    pub key: String,
    pub status: Status,
}

impl LogRecord {
    pub fn new(key: impl Into<String>, status: Status) -> Self {
        Self {
            key: key.into(),
            status,
        }
    }

    /// Formats the record as a single line including the terminator.
    ///
    /// Line breaks inside the key are replaced so one record always
    /// occupies exactly one line.
    pub fn to_line(&self) -> String {
        let key: String = self
            .key
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        format!("{},{}\n", key, self.status)
    }

    /// Parses a line. The status is the text after the last comma, so
    /// keys may themselves contain commas.
    pub fn parse_line(line: &str) -> Result<Self, ParseRecordError> {
        let line = line.trim_end_matches(['\n', '\r']);
        let (key, status) = line
            .rsplit_once(',')
            .ok_or(ParseRecordError::MissingStatus)?;
        Ok(Self {
            key: key.to_string(),
            status: status.parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_format() {
        let record = LogRecord::new("/out/a/b.png", Status::Success);
        assert_eq!(record.to_line(), "/out/a/b.png,Success\n");

        let missing = LogRecord::new("/src/x", Status::FolderMissing);
        assert_eq!(missing.to_line(), "/src/x,Folder Missing\n");
    }

    #[test]
    fn test_parse_key_with_comma() {
        let record = LogRecord::parse_line("/out/a,b/c.png,Failed\n").unwrap();
        assert_eq!(record.key, "/out/a,b/c.png");
        assert_eq!(record.status, Status::Failed);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(
            LogRecord::parse_line("no separator"),
            Err(ParseRecordError::MissingStatus)
        );
        assert!(matches!(
            LogRecord::parse_line("/x,Maybe"),
            Err(ParseRecordError::UnknownStatus(_))
        ));
    }

    #[test]
    fn test_newline_in_key_stays_on_one_line() {
        let line = LogRecord::new("a\nb", Status::InvalidPath).to_line();
        assert_eq!(line.matches('\n').count(), 1);
        assert_eq!(
            LogRecord::parse_line(&line).unwrap(),
            LogRecord::new("a b", Status::InvalidPath)
        );
    }
}
