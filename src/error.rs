use core::fmt;

/// Result alias for `hotspot`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the streaming clustering engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The seed traversal ended before K vectors were observed.
    InsufficientSeedData {
        /// Requested number of centroids.
        requested: usize,
        /// Vectors actually available.
        available: usize,
    },

    /// A vector's dimension differs from the dimension fixed by the first
    /// vector observed during initialization.
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Found dimension.
        found: usize,
    },

    /// Invalid parameter value.
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: &'static str,
    },

    /// A cluster received zero assignments in a pass and the configured
    /// policy treats that as fatal.
    EmptyCluster {
        /// Cluster index.
        cluster: usize,
        /// Zero-based pass in which the cluster starved.
        pass: usize,
    },

    /// The cancel flag was set at a pass boundary.
    Cancelled {
        /// Passes fully completed before cancellation.
        completed_passes: usize,
    },

    /// Archive could not be opened or inspected.
    #[cfg(feature = "csv-source")]
    Archive {
        /// Path of the offending archive.
        path: String,
        /// Underlying failure description.
        message: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InsufficientSeedData {
                requested,
                available,
            } => {
                write!(
                    f,
                    "cannot seed {requested} centroids from {available} vectors"
                )
            }
            Error::DimensionMismatch { expected, found } => {
                write!(f, "dimension mismatch: expected {expected}, found {found}")
            }
            Error::InvalidParameter { name, message } => {
                write!(f, "invalid parameter '{name}': {message}")
            }
            Error::EmptyCluster { cluster, pass } => {
                write!(f, "cluster {cluster} received no assignments in pass {pass}")
            }
            Error::Cancelled { completed_passes } => {
                write!(f, "cancelled after {completed_passes} completed passes")
            }
            #[cfg(feature = "csv-source")]
            Error::Archive { path, message } => {
                write!(f, "archive '{path}': {message}")
            }
        }
    }
}

impl std::error::Error for Error {}
