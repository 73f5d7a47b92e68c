//! DICOM Mirror Library
//!
//! Resumable batch conversion of an archive of DICOM images into a
//! mirrored tree of normalized 8-bit PNGs, with an append-only
//! provenance log and a per-folder count report.
//!
//! # Architecture
//!
//! The system follows an explicit data flow:
//!
//! ```text
//! manifest → resolver → raster → transform → artifact
//!                          ↓          ↓          ↓
//!                      provenance (one line per outcome)
//!
//! (after the batch) output tree → report
//! ```
//!
//! # Design Principles
//!
//! - **Resumable**: an artifact on disk is never recomputed
//! - **Failure isolation**: a bad file or folder is logged and skipped
//! - **Append-only provenance**: the log is never rewritten
//! - **Read-only aggregation**: counting never touches the tree it walks
//!
//! # Example
//!
//! ```no_run
//! use dicom_mirror::{
//!     batch::{BatchDriver, Manifest, Resolver},
//!     config::ManifestConfig,
//!     provenance::ProvenanceLog,
//!     raster::DicomDecoder,
//!     report::count_artifacts,
//! };
//!
//! let manifest = Manifest::load("manifest.csv", &ManifestConfig::default()).unwrap();
//! let log = ProvenanceLog::open("out/conversion_log.txt").unwrap();
//!
//! let resolver = Resolver::new("/archive", "out", vec!["LCC".into(), "RCC".into()]);
//! let driver = BatchDriver::new(resolver, DicomDecoder::new()).with_workers(4);
//! let summary = driver.run(manifest.entries(), &log);
//! log.close().unwrap();
//!
//! let counts = count_artifacts(std::path::Path::new("out"), &["png".to_string()]).unwrap();
//! println!("{summary}\n{}", counts.render());
//! ```

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod batch;
pub mod config;
pub mod metrics;
pub mod provenance;
pub mod raster;
pub mod report;
pub mod transform;

// Re-export commonly used types at crate root
pub use batch::{BatchDriver, ConversionJob, JobOutput, Manifest, Resolver, RunSummary, SetupError};
pub use config::FileConfig;
pub use provenance::{ProvenanceLog, Status};
pub use raster::{DicomDecoder, MockDecoder, RasterDecoder, RawImage};
pub use report::CountReport;
pub use transform::{NormalizedImage, Transformer, WindowSelection};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
