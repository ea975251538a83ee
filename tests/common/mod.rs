use nnbench::vector::{RowMajorBatch, SyntheticDataset};

/// Small dataset where every query is a noisy copy of one data row.
pub fn noisy_copies(data_count: usize, query_count: usize, dimension: usize) -> SyntheticDataset {
    SyntheticDataset::generate(data_count, query_count, dimension, 0.1, 42)
        .expect("Failed to generate synthetic dataset")
}

pub fn batch(rows: &[&[f32]]) -> RowMajorBatch {
    RowMajorBatch::from_rows(rows).expect("Failed to build batch")
}
