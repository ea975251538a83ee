//! Candidate pre-filters for the brute-force scan.
//!
//! The [`SketchFilter`] summarizes every vector by a 64-bit SimHash sketch:
//! bit `i` is the sign of the projection onto random Gaussian hash vector `i`,
//! packed MSB first. The Hamming distance between two sketches estimates the
//! angle between the vectors (`angle ≈ pi * hamming / 64`), so a candidate
//! whose sketch is too far from the query's sketch is unlikely to beat the
//! current best and is skipped without computing its exact distance.
//!
//! The admission radius adapts during the scan. Each time a closer candidate
//! is found, [`CandidateFilter::update`] shrinks the radius to the expected
//! Hamming distance at the new best similarity plus a slack chosen so that a
//! true improvement is admitted with probability close to the target recall.

use std::f32::consts::PI;
use std::sync::Arc;
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::vector::encoding::Encoding;
use crate::vector::storage::VectorStorage;
use crate::vector::types::{Recall, VectorDimension, VectorError};

/// Number of hash vectors, one per sketch bit.
pub const SKETCH_BITS: u32 = 64;

/// Default tolerance on `| |v| - 1 |` accepted by [`SketchFilter::setup`](CandidateFilter::setup).
pub const DEFAULT_NORMALIZATION_TOLERANCE: f32 = 1e-2;

/// Decides which candidates the scanner evaluates exactly.
pub trait CandidateFilter<E: Encoding>: Clone + Send + Sync {
    /// Name recorded in run metadata.
    fn name(&self) -> &'static str;

    /// Whether the filter can skip candidates at all.
    fn is_enabled(&self) -> bool;

    /// Prepares the filter for scanning `queries` against `data`.
    fn setup(
        &mut self,
        data: &VectorStorage<E>,
        queries: &VectorStorage<E>,
        seed: u64,
    ) -> Result<(), VectorError>;

    /// Whether `candidate` must be evaluated for `query`.
    fn passes(&self, query: usize, candidate: usize) -> bool;

    /// Narrows admission after a new best similarity was found.
    fn update(&mut self, similarity: f32);
}

/// Filter that admits every candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoFilter;

impl<E: Encoding> CandidateFilter<E> for NoFilter {
    fn name(&self) -> &'static str {
        "nofilter"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    fn setup(
        &mut self,
        _data: &VectorStorage<E>,
        _queries: &VectorStorage<E>,
        _seed: u64,
    ) -> Result<(), VectorError> {
        Ok(())
    }

    #[inline(always)]
    fn passes(&self, _query: usize, _candidate: usize) -> bool {
        true
    }

    #[inline(always)]
    fn update(&mut self, _similarity: f32) {}
}

/// Maximum Hamming distance admitted once the best similarity is `similarity`.
///
/// `expected = 64 * acos(similarity) / pi` and the result is
/// `round(expected + sqrt(expected * ln(1 / (1 - recall))))`, saturated to `[0, 64]`.
#[must_use]
pub fn admission_radius(similarity: f32, recall: Recall) -> u32 {
    let angle = similarity.clamp(-1.0, 1.0).acos();
    let expected = SKETCH_BITS as f32 * angle / PI;
    let slack = (expected * (1.0 / (1.0 - recall.get())).ln()).sqrt();
    (expected + slack).round().clamp(0.0, SKETCH_BITS as f32) as u32
}

/// SimHash sketch filter with an adaptive admission radius.
///
/// Clones share the hash vectors and sketch tables and carry their own radius.
#[derive(Debug, Clone)]
pub struct SketchFilter<E: Encoding> {
    recall: Recall,
    normalization_tolerance: f32,
    radius: u32,
    hash_vectors: Option<Arc<VectorStorage<E>>>,
    data_sketches: Arc<[u64]>,
    query_sketches: Arc<[u64]>,
}

impl<E: Encoding> SketchFilter<E> {
    pub fn new(recall: Recall) -> Self {
        Self {
            recall,
            normalization_tolerance: DEFAULT_NORMALIZATION_TOLERANCE,
            radius: SKETCH_BITS,
            hash_vectors: None,
            data_sketches: Arc::from(Vec::new()),
            query_sketches: Arc::from(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_normalization_tolerance(mut self, tolerance: f32) -> Self {
        self.normalization_tolerance = tolerance;
        self
    }

    #[must_use]
    pub fn recall(&self) -> Recall {
        self.recall
    }

    /// Current maximum admitted Hamming distance.
    #[must_use]
    pub fn radius(&self) -> u32 {
        self.radius
    }

    /// Restores the radius to its post-setup value.
    pub fn reset(&mut self) {
        self.radius = SKETCH_BITS;
    }

    #[must_use]
    pub fn data_sketches(&self) -> &[u64] {
        &self.data_sketches
    }

    #[must_use]
    pub fn query_sketches(&self) -> &[u64] {
        &self.query_sketches
    }

    /// Hash vectors drawn by the last setup.
    #[must_use]
    pub fn hash_vectors(&self) -> Option<&VectorStorage<E>> {
        self.hash_vectors.as_deref()
    }

    fn check_normalized(
        &self,
        set: &'static str,
        storage: &VectorStorage<E>,
    ) -> Result<(), VectorError> {
        let args = storage.description().args.get();
        for (index, row) in storage.rows().enumerate() {
            let norm = row[..args]
                .iter()
                .map(|&v| {
                    let x = E::decode(v);
                    x * x
                })
                .sum::<f32>()
                .sqrt();
            if (norm - 1.0).abs() > self.normalization_tolerance {
                return Err(VectorError::NotNormalized {
                    set,
                    index,
                    norm,
                    tolerance: self.normalization_tolerance,
                });
            }
        }
        Ok(())
    }

    fn sketch_all(hashes: &VectorStorage<E>, storage: &VectorStorage<E>) -> Arc<[u64]> {
        storage
            .rows()
            .map(|row| {
                hashes.rows().fold(0u64, |sketch, hash| {
                    (sketch << 1) | u64::from(E::projection_sign(hash, row))
                })
            })
            .collect()
    }
}

impl<E: Encoding> CandidateFilter<E> for SketchFilter<E> {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn setup(
        &mut self,
        data: &VectorStorage<E>,
        queries: &VectorStorage<E>,
        seed: u64,
    ) -> Result<(), VectorError> {
        let started = Instant::now();
        let description = data.description();
        if description != queries.description() {
            return Err(VectorError::DimensionMismatch {
                expected: description.args.get(),
                actual: queries.description().args.get(),
            });
        }

        self.check_normalized("data", data)?;
        self.check_normalized("query", queries)?;

        let mut rng = StdRng::seed_from_u64(seed);
        let args: VectorDimension = description.args;
        let mut hashes = VectorStorage::<E>::create(args, SKETCH_BITS as usize)?;
        for _ in 0..SKETCH_BITS {
            hashes.insert(&E::generate_random(args, &mut rng))?;
        }

        self.data_sketches = Self::sketch_all(&hashes, data);
        self.query_sketches = Self::sketch_all(&hashes, queries);
        self.hash_vectors = Some(Arc::new(hashes));
        self.reset();

        debug!(
            data = data.size(),
            queries = queries.size(),
            "Computed sketches"
        );
        info!(
            encoding = E::NAME,
            seed,
            hash_bits = SKETCH_BITS,
            recall = self.recall.get(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sketch filter ready"
        );
        Ok(())
    }

    // Indices without a sketch are admitted so an un-setup filter never
    // hides candidates.
    #[inline]
    fn passes(&self, query: usize, candidate: usize) -> bool {
        match (self.query_sketches.get(query), self.data_sketches.get(candidate)) {
            (Some(q), Some(c)) => (q ^ c).count_ones() <= self.radius,
            _ => true,
        }
    }

    #[inline]
    fn update(&mut self, similarity: f32) {
        self.radius = admission_radius(similarity, self.recall);
    }
}
