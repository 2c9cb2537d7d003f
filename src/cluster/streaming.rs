//! Streaming Lloyd iteration.
//!
//! One *pass* = one full traversal of the source plus one centroid update:
//!
//! 1. **Seed**: the first K vectors of a dedicated traversal become the
//!    initial centroids, in encounter order. No randomization.
//! 2. **Assign + accumulate**: every finite vector of a fresh traversal is
//!    assigned to the nearest centroid (squared Euclidean argmin, ties to
//!    the lowest index) and folded into that cluster's running sum and
//!    count. Vectors with a non-finite component are skipped, not errors.
//! 3. **Update**: each cluster's new centroid is `sum / count`,
//!    replacing the old matrix wholesale. A cluster with zero assignments
//!    is resolved by the configured [`EmptyClusterPolicy`].
//!
//! Steps 2–3 repeat exactly `max_iter` times. There is no convergence
//! check: the pass count is the sole stopping rule, so the total traversal
//! cost is always `max_iter + 1`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ndarray::{Array2, ArrayView1};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::source::Source;

/// What to do when a cluster receives zero assignments in a pass.
///
/// The mean of an empty cluster is undefined; silently dividing by zero
/// would poison the centroid matrix with NaN. Both policies below are
/// deterministic and need no access to the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyClusterPolicy {
    /// Carry the previous centroid forward unchanged.
    #[default]
    KeepPrevious,
    /// Abort the run with [`Error::EmptyCluster`].
    Fail,
}

/// Per-run accounting, surfaced alongside the centroids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitStats {
    /// Passes actually run (equals the configured `max_iter` on success).
    pub passes: usize,
    /// Vectors excluded for having a non-finite component, summed over all
    /// passes.
    pub skipped_non_finite: u64,
    /// Clusters carried forward under [`EmptyClusterPolicy::KeepPrevious`],
    /// summed over all passes.
    pub empty_clusters_kept: u64,
    /// Assignment counts of the final pass, indexed by cluster. Empty when
    /// no pass ran.
    pub last_pass_counts: Vec<u64>,
}

/// Result of a completed run: K centroid rows plus accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingFit {
    /// Final centroids, one row per cluster, shape `K × d`. Row order is
    /// the seed order; no re-sorting is ever applied.
    pub centroids: Array2<f64>,
    /// Counters accumulated over the run.
    pub stats: FitStats,
}

/// Bounded-memory k-means over a replayable [`Source`].
#[derive(Debug, Clone)]
pub struct StreamingKmeans {
    /// Number of clusters.
    k: usize,
    /// Fixed number of passes.
    max_iter: usize,
    /// Empty-cluster resolution.
    empty_cluster_policy: EmptyClusterPolicy,
    /// Cooperative cancellation flag, polled once before each pass.
    cancel: Option<Arc<AtomicBool>>,
}

/// Transient per-pass state. Created fresh each pass, never shared.
struct PassAccumulation {
    sums: Array2<f64>,
    counts: Vec<u64>,
    skipped: u64,
}

impl StreamingKmeans {
    /// Create a new engine for `k` clusters.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iter: 10,
            empty_cluster_policy: EmptyClusterPolicy::default(),
            cancel: None,
        }
    }

    /// Set the number of passes. Zero is valid and returns the seed
    /// centroids untouched.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the empty-cluster policy.
    pub fn with_empty_cluster_policy(mut self, policy: EmptyClusterPolicy) -> Self {
        self.empty_cluster_policy = policy;
        self
    }

    /// Install a shared cancellation flag.
    ///
    /// The flag is polled once before each pass begins, never mid-pass: a
    /// pass is an atomic unit of work. A run cancelled before pass `p`
    /// fails with [`Error::Cancelled`] reporting `p` completed passes.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Run the full fixed-pass schedule against `source`.
    ///
    /// Costs exactly `max_iter + 1` traversals: one to seed, one per pass.
    pub fn fit<S: Source + ?Sized>(&self, source: &S) -> Result<StreamingFit> {
        if self.k == 0 {
            return Err(Error::InvalidParameter {
                name: "k",
                message: "must be at least 1",
            });
        }

        debug!(k = self.k, max_iter = self.max_iter, "starting streaming k-means");

        let mut centroids = self.seed_centroids(source)?;
        let mut stats = FitStats::default();

        for pass in 0..self.max_iter {
            if let Some(flag) = &self.cancel {
                if flag.load(Ordering::Relaxed) {
                    debug!(pass, "cancel flag set, aborting at pass boundary");
                    return Err(Error::Cancelled {
                        completed_passes: pass,
                    });
                }
            }

            let acc = self.accumulate(source, &centroids)?;
            centroids = self.updated_centroids(&centroids, &acc, pass, &mut stats)?;

            stats.passes += 1;
            stats.skipped_non_finite += acc.skipped;
            debug!(pass, skipped = acc.skipped, "pass complete");
            stats.last_pass_counts = acc.counts;
        }

        debug!(
            passes = stats.passes,
            skipped = stats.skipped_non_finite,
            "fit complete"
        );

        Ok(StreamingFit { centroids, stats })
    }

    /// First-K-seen seeding from a dedicated traversal.
    ///
    /// The first vector fixes the dimension `d` for the whole run. Seeds
    /// are taken verbatim; a non-finite seed attracts no assignments (NaN
    /// distances lose every comparison) and is then subject to the
    /// empty-cluster policy.
    fn seed_centroids<S: Source + ?Sized>(&self, source: &S) -> Result<Array2<f64>> {
        let mut traversal = source.traversal();

        let first = traversal.next().ok_or(Error::InsufficientSeedData {
            requested: self.k,
            available: 0,
        })?;
        let d = first.len();

        let mut centroids = Array2::zeros((self.k, d));
        centroids.row_mut(0).assign(&ArrayView1::from(&first[..]));

        for i in 1..self.k {
            let v = traversal.next().ok_or(Error::InsufficientSeedData {
                requested: self.k,
                available: i,
            })?;
            if v.len() != d {
                return Err(Error::DimensionMismatch {
                    expected: d,
                    found: v.len(),
                });
            }
            centroids.row_mut(i).assign(&ArrayView1::from(&v[..]));
        }

        Ok(centroids)
    }

    /// One assignment/accumulation pass over a fresh traversal.
    ///
    /// O(N·K·d) time, O(K·d) memory: only the accumulators and the vector
    /// currently in flight are held.
    fn accumulate<S: Source + ?Sized>(
        &self,
        source: &S,
        centroids: &Array2<f64>,
    ) -> Result<PassAccumulation> {
        let d = centroids.ncols();
        let mut sums = Array2::zeros((self.k, d));
        let mut counts = vec![0u64; self.k];
        let mut skipped = 0u64;

        for x in source.traversal() {
            if x.len() != d {
                return Err(Error::DimensionMismatch {
                    expected: d,
                    found: x.len(),
                });
            }
            if !x.iter().all(|v| v.is_finite()) {
                skipped += 1;
                trace!(vector = ?x, "skipping non-finite vector");
                continue;
            }

            let nearest = Self::nearest_centroid(&x, centroids);
            for (j, xi) in x.iter().enumerate() {
                sums[[nearest, j]] += xi;
            }
            counts[nearest] += 1;
        }

        Ok(PassAccumulation {
            sums,
            counts,
            skipped,
        })
    }

    /// Build the next centroid matrix from one pass's accumulators.
    ///
    /// The previous matrix is consulted only for clusters resolved by
    /// [`EmptyClusterPolicy::KeepPrevious`]; everything else is replaced
    /// wholesale.
    fn updated_centroids(
        &self,
        previous: &Array2<f64>,
        acc: &PassAccumulation,
        pass: usize,
        stats: &mut FitStats,
    ) -> Result<Array2<f64>> {
        let d = previous.ncols();
        let mut next = Array2::zeros((self.k, d));

        for k in 0..self.k {
            if acc.counts[k] > 0 {
                let count = acc.counts[k] as f64;
                for j in 0..d {
                    next[[k, j]] = acc.sums[[k, j]] / count;
                }
            } else {
                match self.empty_cluster_policy {
                    EmptyClusterPolicy::KeepPrevious => {
                        warn!(cluster = k, pass, "no assignments, keeping previous centroid");
                        next.row_mut(k).assign(&previous.row(k));
                        stats.empty_clusters_kept += 1;
                    }
                    EmptyClusterPolicy::Fail => {
                        return Err(Error::EmptyCluster { cluster: k, pass });
                    }
                }
            }
        }

        Ok(next)
    }

    /// Index of the centroid minimizing squared Euclidean distance.
    ///
    /// Squared distance selects the same argmin as true distance. The scan
    /// runs in index order with a strict `<`, so exact ties resolve to the
    /// lowest index. A centroid with a non-finite component yields a NaN
    /// distance, which loses every `<` comparison and is never selected.
    fn nearest_centroid(x: &[f64], centroids: &Array2<f64>) -> usize {
        let mut best = 0;
        let mut best_dist = f64::INFINITY;

        for k in 0..centroids.nrows() {
            let dist = Self::squared_distance(x, centroids.row(k));
            if dist < best_dist {
                best_dist = dist;
                best = k;
            }
        }

        best
    }

    /// Squared Euclidean distance between a vector and a centroid row.
    fn squared_distance(x: &[f64], c: ArrayView1<'_, f64>) -> f64 {
        x.iter().zip(c.iter()).map(|(a, b)| (a - b).powi(2)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::VecSource;
    use ndarray::array;

    #[test]
    fn test_zero_k_is_rejected_before_any_traversal() {
        let source = VecSource::new(vec![vec![0.0]]);
        let err = StreamingKmeans::new(0).fit(&source).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "k", .. }));
    }

    #[test]
    fn test_seeding_fails_on_short_source() {
        let source = VecSource::new(vec![vec![0.0, 0.0]]);
        let err = StreamingKmeans::new(2).fit(&source).unwrap_err();
        assert_eq!(
            err,
            Error::InsufficientSeedData {
                requested: 2,
                available: 1,
            }
        );
    }

    #[test]
    fn test_seeding_fails_on_empty_source() {
        let source = VecSource::new(vec![]);
        let err = StreamingKmeans::new(1).fit(&source).unwrap_err();
        assert_eq!(
            err,
            Error::InsufficientSeedData {
                requested: 1,
                available: 0,
            }
        );
    }

    #[test]
    fn test_seeding_detects_dimension_mismatch() {
        let source = VecSource::new(vec![vec![0.0, 0.0], vec![1.0, 2.0, 3.0]]);
        let err = StreamingKmeans::new(2).fit(&source).unwrap_err();
        assert_eq!(
            err,
            Error::DimensionMismatch {
                expected: 2,
                found: 3,
            }
        );
    }

    #[test]
    fn test_zero_passes_returns_seeds_untouched() {
        let source = VecSource::new(vec![
            vec![1.0, 2.0],
            vec![3.0, 4.0],
            vec![100.0, 100.0],
        ]);

        let fit = StreamingKmeans::new(2)
            .with_max_iter(0)
            .fit(&source)
            .unwrap();

        assert_eq!(fit.centroids, array![[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(fit.stats.passes, 0);
        assert!(fit.stats.last_pass_counts.is_empty());
    }

    #[test]
    fn test_ties_resolve_to_lowest_index() {
        // (1, 0) is exactly equidistant from the seeds (0,0) and (2,0).
        let source = VecSource::new(vec![vec![0.0, 0.0], vec![2.0, 0.0], vec![1.0, 0.0]]);

        let fit = StreamingKmeans::new(2)
            .with_max_iter(1)
            .fit(&source)
            .unwrap();

        assert_eq!(fit.stats.last_pass_counts, vec![2, 1]);
        assert_eq!(fit.centroids, array![[0.5, 0.0], [2.0, 0.0]]);
    }

    #[test]
    fn test_non_finite_vectors_are_counted_not_accumulated() {
        let source = VecSource::new(vec![
            vec![0.0, 0.0],
            vec![4.0, 0.0],
            vec![f64::NAN, 1.0],
            vec![f64::INFINITY, 0.0],
            vec![0.5, 0.0],
        ]);

        let fit = StreamingKmeans::new(2)
            .with_max_iter(1)
            .fit(&source)
            .unwrap();

        assert_eq!(fit.stats.skipped_non_finite, 2);
        assert_eq!(fit.stats.last_pass_counts, vec![2, 1]);
        assert_eq!(fit.centroids, array![[0.25, 0.0], [4.0, 0.0]]);
    }

    #[test]
    fn test_empty_cluster_keeps_previous_centroid_by_default() {
        // Duplicate seeds: every vector ties to index 0, starving cluster 1.
        let source = VecSource::new(vec![vec![0.0, 0.0], vec![0.0, 0.0], vec![1.0, 1.0]]);

        let fit = StreamingKmeans::new(2)
            .with_max_iter(1)
            .fit(&source)
            .unwrap();

        let third = 1.0 / 3.0;
        assert_eq!(fit.centroids, array![[third, third], [0.0, 0.0]]);
        assert_eq!(fit.stats.empty_clusters_kept, 1);
        assert_eq!(fit.stats.last_pass_counts, vec![3, 0]);
    }

    #[test]
    fn test_empty_cluster_fail_policy_aborts() {
        let source = VecSource::new(vec![vec![0.0, 0.0], vec![0.0, 0.0], vec![1.0, 1.0]]);

        let err = StreamingKmeans::new(2)
            .with_max_iter(1)
            .with_empty_cluster_policy(EmptyClusterPolicy::Fail)
            .fit(&source)
            .unwrap_err();

        assert_eq!(err, Error::EmptyCluster { cluster: 1, pass: 0 });
    }

    #[test]
    fn test_non_finite_seed_starves_and_is_kept() {
        // The NaN seed never wins an argmin comparison; under the default
        // policy it is carried forward unchanged (NaN != NaN, so compare
        // the finite cluster and the counters instead of the whole matrix).
        let source = VecSource::new(vec![
            vec![f64::NAN, 0.0],
            vec![1.0, 1.0],
            vec![3.0, 3.0],
        ]);

        let fit = StreamingKmeans::new(2)
            .with_max_iter(1)
            .fit(&source)
            .unwrap();

        assert_eq!(fit.stats.last_pass_counts, vec![0, 2]);
        assert_eq!(fit.stats.empty_clusters_kept, 1);
        assert_eq!(fit.stats.skipped_non_finite, 1);
        assert_eq!(fit.centroids.row(1), ArrayView1::from(&[2.0, 2.0][..]));
        assert!(fit.centroids[[0, 0]].is_nan());
    }

    #[test]
    fn test_cancellation_checked_before_each_pass() {
        let source = VecSource::new(vec![vec![0.0], vec![1.0]]);
        let flag = Arc::new(AtomicBool::new(true));

        let err = StreamingKmeans::new(1)
            .with_max_iter(3)
            .with_cancel_flag(Arc::clone(&flag))
            .fit(&source)
            .unwrap_err();

        assert_eq!(err, Error::Cancelled { completed_passes: 0 });

        // Zero passes never reach a pass boundary, so a set flag is moot.
        let fit = StreamingKmeans::new(1)
            .with_max_iter(0)
            .with_cancel_flag(flag)
            .fit(&source)
            .unwrap();
        assert_eq!(fit.centroids, array![[0.0]]);
    }

    #[test]
    fn test_dimension_mismatch_detected_mid_pass() {
        // Seeds are consistent; the stray vector only appears during the
        // accumulation traversal.
        let source = VecSource::new(vec![
            vec![0.0, 0.0],
            vec![5.0, 5.0],
            vec![1.0, 2.0, 3.0],
        ]);

        let err = StreamingKmeans::new(2)
            .with_max_iter(1)
            .fit(&source)
            .unwrap_err();

        assert_eq!(
            err,
            Error::DimensionMismatch {
                expected: 2,
                found: 3,
            }
        );
    }

    #[test]
    fn test_nearest_centroid_tie_break_and_nan_row() {
        let centroids = array![[0.0, 0.0], [2.0, 0.0], [f64::NAN, 0.0]];

        assert_eq!(StreamingKmeans::nearest_centroid(&[1.0, 0.0], &centroids), 0);
        assert_eq!(StreamingKmeans::nearest_centroid(&[1.9, 0.0], &centroids), 1);
        // The NaN row is never selected, even for a point sitting on it.
        assert_eq!(
            StreamingKmeans::nearest_centroid(&[100.0, 0.0], &centroids),
            1
        );
    }
}
