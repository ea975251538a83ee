//! Raw vector batches handed to the benchmark by a loader.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use tracing::debug;

use crate::vector::types::{VectorDimension, VectorError};

/// A read-only batch of `f32` vectors of equal dimension.
pub trait VectorBatch: Sync {
    /// Number of vectors.
    fn count(&self) -> usize;

    /// Number of values per vector.
    fn dimension(&self) -> usize;

    /// Vector `index`; panics if `index >= count()`.
    fn row(&self, index: usize) -> &[f32];
}

/// In-memory row-major batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RowMajorBatch {
    values: Vec<f32>,
    dimension: VectorDimension,
}

impl RowMajorBatch {
    /// Wraps a flat buffer of `values.len() / dimension` rows.
    pub fn new(values: Vec<f32>, dimension: usize) -> Result<Self, VectorError> {
        let dimension = VectorDimension::new(dimension)?;
        if values.len() % dimension.get() != 0 {
            return Err(VectorError::DimensionMismatch {
                expected: dimension.get(),
                actual: values.len() % dimension.get(),
            });
        }
        Ok(Self { values, dimension })
    }

    /// Builds a batch from individual rows, which must all share one length.
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self, VectorError> {
        let dimension = VectorDimension::new(rows.first().map_or(0, |r| r.as_ref().len()))?;
        let mut values = Vec::with_capacity(rows.len() * dimension.get());
        for row in rows {
            dimension.validate_vector(row.as_ref())?;
            values.extend_from_slice(row.as_ref());
        }
        Ok(Self { values, dimension })
    }

    /// L2-normalizes every row in place.
    pub fn normalize(&mut self) {
        for row in self.values.chunks_exact_mut(self.dimension.get()) {
            l2_normalize(row);
        }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }
}

impl VectorBatch for RowMajorBatch {
    fn count(&self) -> usize {
        self.values.len() / self.dimension.get()
    }

    fn dimension(&self) -> usize {
        self.dimension.get()
    }

    fn row(&self, index: usize) -> &[f32] {
        let d = self.dimension.get();
        &self.values[index * d..(index + 1) * d]
    }
}

/// Scales `vector` to unit length. Zero vectors are left unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Seeded synthetic data and query sets of unit vectors.
///
/// Data rows are Gaussian samples normalized to unit length. Each query is a
/// random data row perturbed by Gaussian noise and re-normalized, so queries
/// have a well-defined nearest neighbor in the data set.
#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    pub data: RowMajorBatch,
    pub queries: RowMajorBatch,
    pub seed: u64,
}

impl SyntheticDataset {
    pub fn generate(
        data_count: usize,
        query_count: usize,
        dimension: usize,
        noise: f32,
        seed: u64,
    ) -> Result<Self, VectorError> {
        let dim = VectorDimension::new(dimension)?;
        let mut rng = StdRng::seed_from_u64(seed);

        let mut data = Vec::with_capacity(data_count * dimension);
        for _ in 0..data_count {
            let start = data.len();
            data.extend((0..dimension).map(|_| -> f32 { StandardNormal.sample(&mut rng) }));
            l2_normalize(&mut data[start..]);
        }

        let mut queries = Vec::with_capacity(query_count * dimension);
        for _ in 0..query_count {
            let start = queries.len();
            if data_count == 0 {
                queries.extend((0..dimension).map(|_| -> f32 { StandardNormal.sample(&mut rng) }));
            } else {
                let source = rng.random_range(0..data_count) * dimension;
                for i in 0..dimension {
                    let jitter: f32 = StandardNormal.sample(&mut rng);
                    queries.push(data[source + i] + noise * jitter);
                }
            }
            l2_normalize(&mut queries[start..]);
        }

        debug!(
            data_count,
            query_count, dimension, noise, seed, "Generated synthetic dataset"
        );

        Ok(Self {
            data: RowMajorBatch {
                values: data,
                dimension: dim,
            },
            queries: RowMajorBatch {
                values: queries,
                dimension: dim,
            },
            seed,
        })
    }
}
