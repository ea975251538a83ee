//! Storage encodings for vector data.
//!
//! An [`Encoding`] binds the in-storage scalar type, the SIMD alignment of a
//! storage buffer and the mapping between external `f32` values and stored
//! scalars. Encodings are zero-sized marker types used for static dispatch;
//! the runtime [`StorageFormat`] enum selects one of them once per run.

use std::fmt;

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::vector::batch::l2_normalize;
use crate::vector::kernels::{dot_product_f32_scalar, dot_product_i16_scalar};
use crate::vector::types::{StorageDescription, VectorDimension, VectorError};

/// Bytes covered by the widest kernel variant per step.
pub const LANE_BYTES: usize = 64;

/// Byte alignment of aligned encodings.
pub const SIMD_ALIGNMENT: usize = 64;

/// Scale of the Q15 fixed-point representation.
pub const Q15_SCALE: f32 = 32767.0;

/// Rounds a nominal dimension up to a whole number of `LANE_BYTES` blocks of `S`.
#[must_use]
pub const fn pad_dimensions<S>(dimension: usize) -> usize {
    let lanes = LANE_BYTES / std::mem::size_of::<S>();
    dimension.div_ceil(lanes) * lanes
}

/// Representation of vectors inside a [`VectorStorage`](crate::vector::VectorStorage).
pub trait Encoding: Copy + Default + Send + Sync + fmt::Debug + 'static {
    /// In-storage element type.
    type Scalar: Copy + Default + PartialEq + Send + Sync + fmt::Debug + 'static;

    /// Stable name used in configuration and run metadata.
    const NAME: &'static str;

    /// Element family, independent of alignment.
    const KIND: EncodingKind;

    /// Required byte alignment of a row; `0` means the scalar's natural alignment.
    const ALIGNMENT: usize;

    /// Number of scalars per stored row for `args` meaningful values.
    fn storage_dimensions(args: VectorDimension) -> usize {
        pad_dimensions::<Self::Scalar>(args.get())
    }

    /// Maps one external value into its stored representation.
    fn encode(value: f32) -> Self::Scalar;

    /// Inverse of [`encode`](Self::encode), up to quantization error.
    fn decode(value: Self::Scalar) -> f32;

    /// Writes `input` into a padded row, zeroing the tail lanes.
    fn store(
        input: &[f32],
        output: &mut [Self::Scalar],
        description: StorageDescription,
    ) -> Result<(), VectorError> {
        description.args.validate_vector(input)?;
        if output.len() != description.storage_len {
            return Err(VectorError::DimensionMismatch {
                expected: description.storage_len,
                actual: output.len(),
            });
        }

        let (head, tail) = output.split_at_mut(input.len());
        for (slot, &value) in head.iter_mut().zip(input) {
            *slot = Self::encode(value);
        }
        tail.fill(Self::Scalar::default());
        Ok(())
    }

    /// Samples a random hash vector suitable for this encoding.
    fn generate_random<R: Rng + ?Sized>(args: VectorDimension, rng: &mut R) -> Vec<f32>;

    /// Sign of the projection of `vector` onto `hash`; `true` sets the sketch bit.
    fn projection_sign(hash: &[Self::Scalar], vector: &[Self::Scalar]) -> bool;

    /// Whether rows of this encoding are SIMD aligned.
    #[must_use]
    fn is_aligned() -> bool {
        Self::ALIGNMENT != 0
    }
}

fn gaussian_vector<R: Rng + ?Sized>(args: VectorDimension, rng: &mut R) -> Vec<f32> {
    (0..args.get())
        .map(|_| -> f32 { StandardNormal.sample(&mut *rng) })
        .collect()
}

#[inline]
fn q15_encode(value: f32) -> i16 {
    (value * Q15_SCALE)
        .round()
        .clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

macro_rules! float_encoding {
    ($name:ident, $label:literal, $alignment:expr) => {
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name;

        impl Encoding for $name {
            type Scalar = f32;
            const NAME: &'static str = $label;
            const KIND: EncodingKind = EncodingKind::Float32;
            const ALIGNMENT: usize = $alignment;

            #[inline]
            fn encode(value: f32) -> f32 {
                value
            }

            #[inline]
            fn decode(value: f32) -> f32 {
                value
            }

            fn generate_random<R: Rng + ?Sized>(args: VectorDimension, rng: &mut R) -> Vec<f32> {
                gaussian_vector(args, rng)
            }

            #[inline]
            fn projection_sign(hash: &[f32], vector: &[f32]) -> bool {
                dot_product_f32_scalar(hash, vector) >= 0.0
            }
        }
    };
}

macro_rules! fixed_encoding {
    ($name:ident, $label:literal, $alignment:expr) => {
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name;

        impl Encoding for $name {
            type Scalar = i16;
            const NAME: &'static str = $label;
            const KIND: EncodingKind = EncodingKind::Fixed16;
            const ALIGNMENT: usize = $alignment;

            #[inline]
            fn encode(value: f32) -> i16 {
                q15_encode(value)
            }

            #[inline]
            fn decode(value: i16) -> f32 {
                f32::from(value) / Q15_SCALE
            }

            // Only the projection sign matters, so the Gaussian sample is
            // shrunk to unit length to fit the Q15 range.
            fn generate_random<R: Rng + ?Sized>(args: VectorDimension, rng: &mut R) -> Vec<f32> {
                let mut vector = gaussian_vector(args, rng);
                l2_normalize(&mut vector);
                vector
            }

            #[inline]
            fn projection_sign(hash: &[i16], vector: &[i16]) -> bool {
                dot_product_i16_scalar(hash, vector) >= 0
            }
        }
    };
}

float_encoding!(Float32, "float32", SIMD_ALIGNMENT);
float_encoding!(Float32Unaligned, "float32_unaligned", 0);
fixed_encoding!(Fixed16, "fixed16", SIMD_ALIGNMENT);
fixed_encoding!(Fixed16Unaligned, "fixed16_unaligned", 0);

/// Element family of an encoding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum EncodingKind {
    #[default]
    #[value(name = "float32")]
    Float32,
    #[value(name = "fixed16")]
    Fixed16,
}

impl EncodingKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Float32 => "float32",
            Self::Fixed16 => "fixed16",
        }
    }
}

/// Whether storage rows are SIMD aligned.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    #[default]
    Aligned,
    Unaligned,
}

impl Alignment {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Aligned => "aligned",
            Self::Unaligned => "unaligned",
        }
    }
}

/// Concrete encoding selected at runtime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum StorageFormat {
    #[default]
    #[value(name = "float32")]
    Float32,
    #[value(name = "float32_unaligned")]
    Float32Unaligned,
    #[value(name = "fixed16")]
    Fixed16,
    #[value(name = "fixed16_unaligned")]
    Fixed16Unaligned,
}

impl StorageFormat {
    pub const ALL: [StorageFormat; 4] = [
        Self::Float32,
        Self::Float32Unaligned,
        Self::Fixed16,
        Self::Fixed16Unaligned,
    ];

    /// Combines an element family and an alignment.
    #[must_use]
    pub const fn from_parts(kind: EncodingKind, alignment: Alignment) -> Self {
        match (kind, alignment) {
            (EncodingKind::Float32, Alignment::Aligned) => Self::Float32,
            (EncodingKind::Float32, Alignment::Unaligned) => Self::Float32Unaligned,
            (EncodingKind::Fixed16, Alignment::Aligned) => Self::Fixed16,
            (EncodingKind::Fixed16, Alignment::Unaligned) => Self::Fixed16Unaligned,
        }
    }

    #[must_use]
    pub const fn kind(self) -> EncodingKind {
        match self {
            Self::Float32 | Self::Float32Unaligned => EncodingKind::Float32,
            Self::Fixed16 | Self::Fixed16Unaligned => EncodingKind::Fixed16,
        }
    }

    #[must_use]
    pub const fn alignment(self) -> Alignment {
        match self {
            Self::Float32 | Self::Fixed16 => Alignment::Aligned,
            Self::Float32Unaligned | Self::Fixed16Unaligned => Alignment::Unaligned,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Float32 => Float32::NAME,
            Self::Float32Unaligned => Float32Unaligned::NAME,
            Self::Fixed16 => Fixed16::NAME,
            Self::Fixed16Unaligned => Fixed16Unaligned::NAME,
        }
    }
}

macro_rules! display_and_parse {
    ($ty:ty, $kind:literal, $expected:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = VectorError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <Self as clap::ValueEnum>::from_str(s, true).map_err(|_| {
                    VectorError::UnknownOption {
                        kind: $kind,
                        value: s.to_string(),
                        expected: $expected.to_string(),
                    }
                })
            }
        }
    };
}

display_and_parse!(EncodingKind, "encoding", "float32, fixed16");
display_and_parse!(Alignment, "alignment", "aligned, unaligned");
display_and_parse!(
    StorageFormat,
    "storage format",
    "float32, float32_unaligned, fixed16, fixed16_unaligned"
);
