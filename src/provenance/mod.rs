//! Append-only provenance log.
//!
//! Every artifact outcome is recorded as one `key,status` line. The log
//! is never rewritten; it is the source of truth for resuming a run,
//! although recorded successes are always re-checked against the
//! output tree before being trusted.

mod journal;
mod record;

pub use journal::{load_success_set, read_records, ProvenanceError, ProvenanceLog};
pub use record::{LogRecord, ParseRecordError, Status};
