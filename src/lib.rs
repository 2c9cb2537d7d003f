//! # hotspot
//!
//! Bounded-memory, multi-pass k-means for locating dense geographic clusters in
//! point datasets too large to hold in memory.
//!
//! The engine streams: each pass is one traversal of a replayable [`Source`],
//! and working memory stays at O(K·d) no matter how large the dataset is.
//! **Default build** is core-only (minimal dependencies). The zipped-CSV source
//! adapter is opt-in via the `csv-source` feature.

pub mod cluster;
/// Error types used across `hotspot`.
pub mod error;
pub mod source;

#[cfg(feature = "csv-source")]
pub mod ingest;


pub use cluster::{EmptyClusterPolicy, FitStats, StreamingFit, StreamingKmeans};
pub use error::{Error, Result};
pub use source::{FnSource, Source, VecSource};

#[cfg(feature = "csv-source")]
pub use ingest::ZipCsvSource;
