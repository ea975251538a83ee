//! Distance metrics and resolved distance kernels.
//!
//! A [`Metric`] fixes the direction of a distance (whether lower or higher is
//! closer) and how it maps onto cosine similarity. A [`DistanceKernel`] pairs a
//! metric with the kernel variant resolved for one encoding.

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::vector::encoding::{EncodingKind, Encoding, Q15_SCALE};
use crate::vector::kernels::{
    KernelVariant, resolve_dot_product_f32, resolve_dot_product_i16, resolve_l2_squared_f32,
};
use crate::vector::types::VectorError;

/// Runtime selection of a metric.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    #[value(name = "euclidean")]
    Euclidean,
    #[default]
    #[value(name = "dot_product")]
    DotProduct,
}

impl MetricKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Euclidean => "euclidean",
            Self::DotProduct => "dot_product",
        }
    }

    /// Fails with [`VectorError::UnsupportedCombination`] if no kernel exists
    /// for this metric over `encoding`.
    pub fn check_encoding(self, encoding: EncodingKind) -> Result<(), VectorError> {
        match (self, encoding) {
            (Self::Euclidean, EncodingKind::Fixed16) => Err(VectorError::UnsupportedCombination {
                metric: self.as_str(),
                encoding: encoding.as_str(),
            }),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricKind {
    type Err = VectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as clap::ValueEnum>::from_str(s, true).map_err(|_| VectorError::UnknownOption {
            kind: "metric",
            value: s.to_string(),
            expected: "euclidean, dot_product".to_string(),
        })
    }
}

/// Direction and similarity mapping of a distance over scalars `S`.
pub trait Metric<S>: Copy + Default + Send + Sync + fmt::Debug + 'static {
    /// Value produced by the kernel.
    type Distance: Copy + PartialOrd + Send + Sync + fmt::Debug;

    const KIND: MetricKind;

    /// Sentinel that every real distance beats.
    fn worst_possible() -> Self::Distance;

    /// Strict comparison: `true` if `candidate` is closer than `best`.
    fn is_closer(candidate: Self::Distance, best: Self::Distance) -> bool;

    /// Cosine similarity of two unit vectors at `distance`.
    fn similarity(distance: Self::Distance) -> f32;

    /// Resolves the kernel function for `variant`.
    fn resolve(
        variant: KernelVariant,
        aligned: bool,
    ) -> Result<fn(&[S], &[S]) -> Self::Distance, VectorError>;
}

/// Squared Euclidean distance. Lower is closer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SquaredEuclidean;

/// Dot product similarity. Higher is closer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DotProduct;

impl Metric<f32> for SquaredEuclidean {
    type Distance = f32;
    const KIND: MetricKind = MetricKind::Euclidean;

    fn worst_possible() -> f32 {
        f32::INFINITY
    }

    #[inline]
    fn is_closer(candidate: f32, best: f32) -> bool {
        candidate < best
    }

    // |a - b|^2 = 2 - 2 cos for unit vectors
    #[inline]
    fn similarity(distance: f32) -> f32 {
        1.0 - distance / 2.0
    }

    fn resolve(variant: KernelVariant, aligned: bool) -> Result<fn(&[f32], &[f32]) -> f32, VectorError> {
        resolve_l2_squared_f32(variant, aligned)
    }
}

impl Metric<f32> for DotProduct {
    type Distance = f32;
    const KIND: MetricKind = MetricKind::DotProduct;

    fn worst_possible() -> f32 {
        f32::NEG_INFINITY
    }

    #[inline]
    fn is_closer(candidate: f32, best: f32) -> bool {
        candidate > best
    }

    #[inline]
    fn similarity(distance: f32) -> f32 {
        distance
    }

    fn resolve(variant: KernelVariant, aligned: bool) -> Result<fn(&[f32], &[f32]) -> f32, VectorError> {
        resolve_dot_product_f32(variant, aligned)
    }
}

impl Metric<i16> for DotProduct {
    type Distance = i16;
    const KIND: MetricKind = MetricKind::DotProduct;

    fn worst_possible() -> i16 {
        i16::MIN
    }

    #[inline]
    fn is_closer(candidate: i16, best: i16) -> bool {
        candidate > best
    }

    #[inline]
    fn similarity(distance: i16) -> f32 {
        f32::from(distance) / Q15_SCALE
    }

    fn resolve(variant: KernelVariant, aligned: bool) -> Result<fn(&[i16], &[i16]) -> i16, VectorError> {
        resolve_dot_product_i16(variant, aligned)
    }
}

/// A metric bound to a resolved kernel function.
pub struct DistanceKernel<S, M: Metric<S>> {
    compute: fn(&[S], &[S]) -> M::Distance,
    variant: KernelVariant,
    _metric: PhantomData<M>,
}

impl<S, M: Metric<S>> Clone for DistanceKernel<S, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S, M: Metric<S>> Copy for DistanceKernel<S, M> {}

impl<S, M: Metric<S>> fmt::Debug for DistanceKernel<S, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistanceKernel")
            .field("metric", &M::KIND)
            .field("variant", &self.variant)
            .finish()
    }
}

impl<S, M: Metric<S>> DistanceKernel<S, M> {
    /// Resolves `variant` once; fails fast if it cannot run here.
    pub fn resolve(variant: KernelVariant, aligned: bool) -> Result<Self, VectorError> {
        Ok(Self {
            compute: M::resolve(variant, aligned)?,
            variant,
            _metric: PhantomData,
        })
    }

    /// Resolves `variant` with the load alignment of encoding `E`.
    pub fn for_encoding<E>(variant: KernelVariant) -> Result<Self, VectorError>
    where
        E: Encoding<Scalar = S>,
    {
        Self::resolve(variant, E::is_aligned())
    }

    #[inline(always)]
    pub fn distance(&self, lhs: &[S], rhs: &[S]) -> M::Distance {
        (self.compute)(lhs, rhs)
    }

    #[inline(always)]
    pub fn worst_possible(&self) -> M::Distance {
        M::worst_possible()
    }

    #[inline(always)]
    pub fn is_closer(&self, candidate: M::Distance, best: M::Distance) -> bool {
        M::is_closer(candidate, best)
    }

    #[inline(always)]
    pub fn similarity(&self, distance: M::Distance) -> f32 {
        M::similarity(distance)
    }

    #[must_use]
    pub fn variant(&self) -> KernelVariant {
        self.variant
    }

    #[must_use]
    pub fn metric(&self) -> MetricKind {
        M::KIND
    }
}
