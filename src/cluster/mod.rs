//! Multi-pass streaming clustering.
//!
//! One algorithm lives here: a streaming variant of Lloyd's k-means that
//! never materializes the dataset. Each pass is one full traversal of a
//! replayable [`Source`](crate::source::Source); working memory stays at
//! O(K·d) regardless of dataset size.
//!
//! ## Why streaming
//!
//! Classic Lloyd keeps the whole `n × d` matrix resident and iterates over
//! it in place. For the datasets this crate targets (years of geotagged
//! sensor readings) that matrix does not fit. The streaming variant trades
//! one dataset traversal per pass for bounded memory:
//!
//! | | memory | traversals |
//! |---|---|---|
//! | full-batch Lloyd | O(n·d) | 1 |
//! | streaming Lloyd  | O(K·d) | max_iter + 1 |
//!
//! ## What stays fixed
//!
//! The engine is deliberately narrow: Euclidean distance only,
//! first-K-seen seeding only, and a fixed pass count as the sole stopping
//! rule. No convergence check means total traversal cost is known up
//! front, which matters when a traversal is a multi-minute scan.
//!
//! ## Usage
//!
//! ```rust
//! use hotspot::{StreamingKmeans, VecSource};
//!
//! let source = VecSource::new(vec![
//!     vec![0.0, 0.0],
//!     vec![10.0, 0.0],
//!     vec![0.1, 0.1],
//!     vec![10.1, 0.1],
//! ]);
//!
//! let fit = StreamingKmeans::new(2)
//!     .with_max_iter(5)
//!     .fit(&source)
//!     .unwrap();
//!
//! assert_eq!(fit.centroids.nrows(), 2);
//! assert_eq!(fit.centroids.ncols(), 2);
//! ```

mod streaming;

pub use streaming::{EmptyClusterPolicy, FitStats, StreamingFit, StreamingKmeans};
