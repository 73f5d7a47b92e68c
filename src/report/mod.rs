//! Artifact aggregation over a completed output tree.
//!
//! This pass is strictly read-only with respect to the tree it walks and
//! must only run once the batch driver has returned.

mod counts;

pub use counts::{artifact_paths, count_artifacts, CountReport, ReportError, ROOT_BUCKET};
