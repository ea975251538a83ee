//! Exact and filtered brute-force nearest-neighbor scans.

use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::info;

use crate::vector::encoding::Encoding;
use crate::vector::filter::CandidateFilter;
use crate::vector::metric::{DistanceKernel, Metric};
use crate::vector::storage::VectorStorage;
use crate::vector::types::VectorError;

/// Outcome of one scan over a query set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Nearest data index per query, `None` if no candidate was evaluated.
    ///
    /// Recorded as integers with `-1` for `None`.
    #[serde(serialize_with = "serialize_nearest", deserialize_with = "deserialize_nearest")]
    pub nearest: Vec<Option<usize>>,
    /// Wall-clock duration of the scan.
    pub running_time_ns: u64,
    /// Number of exact distance evaluations.
    pub comparisons: u64,
    /// `|data| * |queries|`.
    pub total_pairs: u64,
}

impl ScanResult {
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.running_time_ns)
    }

    /// Fraction of query/candidate pairs evaluated exactly.
    ///
    /// An empty scan has selectivity `0.0`.
    #[must_use]
    pub fn selectivity(&self) -> f64 {
        if self.total_pairs == 0 {
            0.0
        } else {
            self.comparisons as f64 / self.total_pairs as f64
        }
    }

    /// Fraction of queries whose nearest index equals the one in `baseline`.
    ///
    /// Returns `None` if the results cover different numbers of queries.
    #[must_use]
    pub fn recall_against(&self, baseline: &ScanResult) -> Option<f64> {
        if self.nearest.len() != baseline.nearest.len() {
            return None;
        }
        if self.nearest.is_empty() {
            return Some(1.0);
        }
        let hits = self
            .nearest
            .iter()
            .zip(&baseline.nearest)
            .filter(|(a, b)| a == b)
            .count();
        Some(hits as f64 / self.nearest.len() as f64)
    }

    /// Nearest indices with `-1` for queries without a neighbor.
    #[must_use]
    pub fn nearest_as_i64(&self) -> Vec<i64> {
        self.nearest.iter().copied().map(nearest_to_i64).collect()
    }
}

#[inline]
fn nearest_to_i64(nearest: Option<usize>) -> i64 {
    nearest.map_or(-1, |i| i as i64)
}

fn serialize_nearest<S: Serializer>(nearest: &[Option<usize>], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(nearest.iter().copied().map(nearest_to_i64))
}

fn deserialize_nearest<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Option<usize>>, D::Error> {
    let raw = Vec::<i64>::deserialize(d)?;
    Ok(raw.into_iter().map(|i| usize::try_from(i).ok()).collect())
}

fn check_descriptions<E: Encoding>(
    data: &VectorStorage<E>,
    queries: &VectorStorage<E>,
) -> Result<(), VectorError> {
    let (d, q) = (data.description(), queries.description());
    if d != q {
        return Err(VectorError::DimensionMismatch {
            expected: d.args.get(),
            actual: q.args.get(),
        });
    }
    Ok(())
}

/// Scans every candidate for one query, returning the best index and the
/// number of exact comparisons.
#[inline]
fn scan_query<E, M, F>(
    query_index: usize,
    query: &[E::Scalar],
    data: &VectorStorage<E>,
    kernel: &DistanceKernel<E::Scalar, M>,
    filter: &mut F,
) -> (Option<usize>, u64)
where
    E: Encoding,
    M: Metric<E::Scalar>,
    F: CandidateFilter<E>,
{
    let mut best = kernel.worst_possible();
    let mut best_index = None;
    let mut comparisons = 0u64;

    for (candidate, row) in data.rows().enumerate() {
        if !filter.passes(query_index, candidate) {
            continue;
        }
        let distance = kernel.distance(query, row);
        comparisons += 1;
        if kernel.is_closer(distance, best) {
            best = distance;
            filter.update(kernel.similarity(best));
            best_index = Some(candidate);
        }
    }

    (best_index, comparisons)
}

fn finish<E: Encoding, M: Metric<E::Scalar>>(
    nearest: Vec<Option<usize>>,
    comparisons: u64,
    started: Instant,
    data: &VectorStorage<E>,
    kernel: &DistanceKernel<E::Scalar, M>,
    filter_name: &str,
    parallel: bool,
) -> ScanResult {
    let result = ScanResult {
        total_pairs: (data.size() as u64) * (nearest.len() as u64),
        nearest,
        running_time_ns: started.elapsed().as_nanos() as u64,
        comparisons,
    };
    info!(
        encoding = E::NAME,
        metric = %kernel.metric(),
        kernel = %kernel.variant(),
        filter = filter_name,
        parallel,
        queries = result.nearest.len(),
        elapsed_ms = result.elapsed().as_millis() as u64,
        comparisons = result.comparisons,
        selectivity = result.selectivity(),
        "Scan complete"
    );
    result
}

/// Sequential scan of every query against every admitted candidate.
///
/// The filter radius carries from one query to the next; call
/// [`CandidateFilter::setup`] beforehand to start from the full radius.
pub fn scan<E, M, F>(
    data: &VectorStorage<E>,
    queries: &VectorStorage<E>,
    kernel: &DistanceKernel<E::Scalar, M>,
    filter: &mut F,
) -> Result<ScanResult, VectorError>
where
    E: Encoding,
    M: Metric<E::Scalar>,
    F: CandidateFilter<E>,
{
    check_descriptions(data, queries)?;
    let started = Instant::now();

    let mut nearest = Vec::with_capacity(queries.size());
    let mut comparisons = 0u64;
    for (query_index, query) in queries.rows().enumerate() {
        let (best, evaluated) = scan_query(query_index, query, data, kernel, filter);
        nearest.push(best);
        comparisons += evaluated;
    }

    Ok(finish(
        nearest,
        comparisons,
        started,
        data,
        kernel,
        filter.name(),
        false,
    ))
}

/// Parallel scan on the current rayon pool.
///
/// Every query works on its own clone of `filter`, so each starts from the
/// radius `filter` holds when the scan begins.
pub fn scan_parallel<E, M, F>(
    data: &VectorStorage<E>,
    queries: &VectorStorage<E>,
    kernel: &DistanceKernel<E::Scalar, M>,
    filter: &F,
) -> Result<ScanResult, VectorError>
where
    E: Encoding,
    M: Metric<E::Scalar>,
    F: CandidateFilter<E>,
{
    check_descriptions(data, queries)?;
    let started = Instant::now();

    let per_query: Vec<(Option<usize>, u64)> = queries
        .as_slice()
        .par_chunks_exact(queries.description().storage_len)
        .enumerate()
        .map(|(query_index, query)| {
            let mut local = filter.clone();
            scan_query(query_index, query, data, kernel, &mut local)
        })
        .collect();

    let comparisons: u64 = per_query.iter().map(|(_, c)| c).sum();
    let nearest: Vec<Option<usize>> = per_query.into_iter().map(|(n, _)| n).collect();

    Ok(finish(
        nearest,
        comparisons,
        started,
        data,
        kernel,
        filter.name(),
        true,
    ))
}
