//! Contiguous, alignment-padded vector storage.
//!
//! A [`VectorStorage`] owns a single zeroed buffer of `capacity * storage_len`
//! scalars. Rows are padded to a whole number of SIMD blocks so every kernel
//! variant can process them without a remainder, and for aligned encodings
//! every row starts on a [`SIMD_ALIGNMENT`](super::encoding::SIMD_ALIGNMENT)
//! boundary.
//!
//! # Layout
//!
//! ```text
//! | pad | row 0 (storage_len) | row 1 (storage_len) | ... | row capacity-1 |
//!       ^ aligned to E::ALIGNMENT
//! ```
//!
//! Storage is insert-only. Once filled it is read concurrently by scans.

use std::fmt;
use std::mem::size_of;

use tracing::debug;

use crate::vector::batch::VectorBatch;
use crate::vector::encoding::Encoding;
use crate::vector::types::{StorageDescription, VectorDimension, VectorError};

/// Fixed-capacity storage for vectors of one encoding.
pub struct VectorStorage<E: Encoding> {
    /// Backing buffer, over-allocated by up to one alignment block.
    buffer: Vec<E::Scalar>,

    /// Index of the first aligned scalar in `buffer`.
    offset: usize,

    /// Nominal and padded row length.
    description: StorageDescription,

    /// Number of rows written so far.
    inserted: usize,

    /// Maximum number of rows.
    capacity: usize,
}

impl<E: Encoding> VectorStorage<E> {
    /// Allocates zeroed storage for `capacity` vectors of `args` values.
    pub fn create(args: VectorDimension, capacity: usize) -> Result<Self, VectorError> {
        let storage_len = E::storage_dimensions(args);
        let scalar_size = size_of::<E::Scalar>();
        let alignment = if E::ALIGNMENT == 0 {
            std::mem::align_of::<E::Scalar>()
        } else {
            E::ALIGNMENT
        };

        let invalid_layout = |reason: &str| VectorError::AllocationError {
            bytes: capacity.saturating_mul(storage_len).saturating_mul(scalar_size),
            alignment,
            reason: reason.to_string(),
        };

        if !alignment.is_power_of_two() {
            return Err(invalid_layout("alignment is not a power of two"));
        }

        let row_scalars = capacity
            .checked_mul(storage_len)
            .ok_or_else(|| invalid_layout("requested size overflows usize"))?;
        let pad = alignment / scalar_size;
        let total = row_scalars
            .checked_add(pad)
            .filter(|total| total.checked_mul(scalar_size).is_some_and(|b| b <= isize::MAX as usize))
            .ok_or_else(|| invalid_layout("requested size exceeds the address space"))?;

        let mut buffer: Vec<E::Scalar> = Vec::new();
        buffer
            .try_reserve_exact(total)
            .map_err(|e| invalid_layout(&e.to_string()))?;
        buffer.resize(total, E::Scalar::default());

        let offset = buffer.as_ptr().align_offset(alignment);
        if offset > pad {
            return Err(invalid_layout("allocator returned a buffer that cannot be aligned"));
        }

        debug!(
            encoding = E::NAME,
            args = args.get(),
            storage_len,
            capacity,
            alignment,
            "Created vector storage"
        );

        Ok(Self {
            buffer,
            offset,
            description: StorageDescription { args, storage_len },
            inserted: 0,
            capacity,
        })
    }

    /// Creates a storage sized for `batch` and inserts every row of it.
    pub fn from_batch<B: VectorBatch + ?Sized>(batch: &B) -> Result<Self, VectorError> {
        let args = VectorDimension::new(batch.dimension())?;
        let mut storage = Self::create(args, batch.count())?;
        for i in 0..batch.count() {
            storage.insert(batch.row(i))?;
        }
        Ok(storage)
    }

    /// Encodes and appends one vector, returning its index.
    pub fn insert(&mut self, vector: &[f32]) -> Result<usize, VectorError> {
        if self.inserted >= self.capacity {
            return Err(VectorError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.description.args.validate_vector(vector)?;

        let index = self.inserted;
        let len = self.description.storage_len;
        let start = self.offset + index * len;
        E::store(vector, &mut self.buffer[start..start + len], self.description)?;
        self.inserted += 1;
        Ok(index)
    }

    /// Stored row `index`, including its zero padding.
    pub fn get(&self, index: usize) -> Result<&[E::Scalar], VectorError> {
        if index >= self.inserted {
            return Err(VectorError::IndexOutOfRange {
                index,
                size: self.inserted,
            });
        }
        let len = self.description.storage_len;
        let start = self.offset + index * len;
        Ok(&self.buffer[start..start + len])
    }

    /// Iterates over the inserted rows in index order.
    pub fn rows(&self) -> std::slice::ChunksExact<'_, E::Scalar> {
        self.as_slice().chunks_exact(self.description.storage_len)
    }

    /// All inserted rows as one contiguous slice.
    #[must_use]
    pub fn as_slice(&self) -> &[E::Scalar] {
        let end = self.offset + self.inserted * self.description.storage_len;
        &self.buffer[self.offset..end]
    }

    /// Number of inserted vectors.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inserted
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserted == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.inserted == self.capacity
    }

    /// Nominal and padded row length.
    #[must_use]
    pub fn description(&self) -> StorageDescription {
        self.description
    }
}

impl<E: Encoding> fmt::Debug for VectorStorage<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorStorage")
            .field("encoding", &E::NAME)
            .field("args", &self.description.args.get())
            .field("storage_len", &self.description.storage_len)
            .field("inserted", &self.inserted)
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::encoding::{Fixed16, Fixed16Unaligned, Float32, Float32Unaligned, SIMD_ALIGNMENT};

    fn dim(d: usize) -> VectorDimension {
        VectorDimension::new(d).unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let mut storage = VectorStorage::<Float32>::create(dim(3), 2).unwrap();
        assert!(storage.is_empty());
        assert_eq!(storage.insert(&[1.0, 2.0, 3.0]).unwrap(), 0);
        assert_eq!(storage.insert(&[4.0, 5.0, 6.0]).unwrap(), 1);
        assert!(storage.is_full());

        let row = storage.get(1).unwrap();
        assert_eq!(row.len(), 16);
        assert_eq!(&row[..3], &[4.0, 5.0, 6.0]);
        assert!(row[3..].iter().all(|&v| v == 0.0));
        assert_eq!(storage.size(), 2);
        assert_eq!(storage.capacity(), 2);
    }

    #[test]
    fn test_capacity_exceeded() {
        let mut storage = VectorStorage::<Float32Unaligned>::create(dim(2), 1).unwrap();
        storage.insert(&[0.0, 1.0]).unwrap();
        assert_eq!(
            storage.insert(&[1.0, 0.0]),
            Err(VectorError::CapacityExceeded { capacity: 1 })
        );
        assert_eq!(storage.size(), 1);
    }

    #[test]
    fn test_dimension_mismatch_leaves_storage_untouched() {
        let mut storage = VectorStorage::<Fixed16>::create(dim(4), 2).unwrap();
        assert_eq!(
            storage.insert(&[0.1, 0.2]),
            Err(VectorError::DimensionMismatch {
                expected: 4,
                actual: 2
            })
        );
        assert!(storage.is_empty());
    }

    #[test]
    fn test_index_out_of_range() {
        let mut storage = VectorStorage::<Float32>::create(dim(2), 4).unwrap();
        storage.insert(&[0.5, 0.5]).unwrap();
        assert_eq!(
            storage.get(1).unwrap_err(),
            VectorError::IndexOutOfRange { index: 1, size: 1 }
        );
    }

    #[test]
    fn test_aligned_rows_start_on_simd_boundary() {
        let mut storage = VectorStorage::<Fixed16>::create(dim(5), 3).unwrap();
        for _ in 0..3 {
            storage.insert(&[0.1, 0.2, 0.3, 0.4, 0.5]).unwrap();
        }
        for row in storage.rows() {
            assert_eq!(row.as_ptr() as usize % SIMD_ALIGNMENT, 0);
            assert_eq!(row.len(), 32);
        }
    }

    #[test]
    fn test_rows_iterates_only_inserted() {
        let mut storage = VectorStorage::<Fixed16Unaligned>::create(dim(2), 10).unwrap();
        storage.insert(&[0.5, -0.5]).unwrap();
        storage.insert(&[0.25, 0.0]).unwrap();

        let rows: Vec<_> = storage.rows().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[1][..2], &[8192, 0]);
    }

    #[test]
    fn test_zero_capacity_is_valid() {
        let storage = VectorStorage::<Float32>::create(dim(8), 0).unwrap();
        assert_eq!(storage.rows().count(), 0);
        assert!(storage.is_full());
    }

    #[test]
    fn test_oversized_allocation_fails() {
        let result = VectorStorage::<Float32>::create(dim(1024), usize::MAX / 2);
        assert!(matches!(result, Err(VectorError::AllocationError { .. })));
    }

    #[test]
    fn test_description() {
        let storage = VectorStorage::<Fixed16>::create(dim(40), 1).unwrap();
        let description = storage.description();
        assert_eq!(description.args.get(), 40);
        assert_eq!(description.storage_len, 64);
    }
}
