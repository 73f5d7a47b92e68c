//! Batch conversion.
//!
//! The flow for one run:
//!
//! ```text
//! manifest → resolver → (decode → transform → write) per file → provenance log
//! ```
//!
//! followed, once the driver has returned, by the aggregation pass in
//! [`crate::report`].

mod driver;
mod job;
mod manifest;
mod resolver;
mod summary;

pub use driver::{BatchDriver, FileError, ProgressObserver, TracingObserver};
pub use job::{count_only, ConversionJob, JobOutput, SetupError};
pub use manifest::{Manifest, ManifestEntry, ManifestError};
pub use resolver::{Candidate, ResolveError, Resolver};
pub use summary::{EntryOutcome, FailureKind, FileOutcome, FileStatus, RunSummary};
