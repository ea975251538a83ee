//! Scalar and SIMD distance kernels.
//!
//! Every kernel has three interchangeable variants with identical contracts:
//!
//! | Variant  | `f32` lanes per step | `i16` lanes per step | x86_64 requirement        |
//! |----------|----------------------|----------------------|---------------------------|
//! | `scalar` | 1                    | 1                    | none                      |
//! | `simd_a` | 8                    | 16                   | AVX2                      |
//! | `simd_b` | 16                   | 32                   | AVX-512F (+ AVX-512BW i16) |
//!
//! SIMD variants are only handed out by the `resolve_*` functions after the
//! required instruction sets were detected at runtime. A variant that is not
//! available fails with [`VectorError::UnsupportedInstructionSet`]; it is
//! never replaced by the scalar loop behind the caller's back.
//!
//! # Fixed-point dot product
//!
//! The `i16` kernels reproduce the `mulhrs` primitive: each lane product is
//! computed at 32 bits, shifted right by 14, incremented, shifted right by one
//! more and truncated to 16 bits. Accumulation wraps at 16 bits like
//! `add_epi16`, so the scalar and SIMD variants agree bit for bit regardless
//! of summation order.

use serde::{Deserialize, Serialize};

use crate::vector::types::VectorError;

/// Resolved `f32` kernel.
pub type F32Kernel = fn(&[f32], &[f32]) -> f32;

/// Resolved `i16` kernel.
pub type I16Kernel = fn(&[i16], &[i16]) -> i16;

/// Implementation strategy of a distance kernel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum KernelVariant {
    /// Portable per-element loop.
    #[default]
    #[value(name = "scalar")]
    Scalar,
    /// 256-bit data-parallel variant.
    #[value(name = "simd_a")]
    SimdA,
    /// 512-bit data-parallel variant.
    #[value(name = "simd_b")]
    SimdB,
}

/// Element type a kernel operates on, used to determine SIMD requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneType {
    F32,
    I16,
}

/// CPU capabilities the SIMD variants depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionSet {
    Avx2,
    Avx512F,
    Avx512Bw,
}

impl InstructionSet {
    /// Human-readable name, as reported in errors.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Avx2 => "AVX2",
            Self::Avx512F => "AVX-512F",
            Self::Avx512Bw => "AVX-512BW",
        }
    }

    /// Whether the running CPU supports this instruction set.
    #[must_use]
    pub fn is_detected(self) -> bool {
        #[cfg(target_arch = "x86_64")]
        {
            match self {
                Self::Avx2 => is_x86_feature_detected!("avx2"),
                Self::Avx512F => is_x86_feature_detected!("avx512f"),
                Self::Avx512Bw => is_x86_feature_detected!("avx512bw"),
            }
        }

        #[cfg(not(target_arch = "x86_64"))]
        {
            let _ = self;
            false
        }
    }
}

impl KernelVariant {
    /// All variants, in increasing width.
    pub const ALL: [KernelVariant; 3] = [Self::Scalar, Self::SimdA, Self::SimdB];

    /// Stable name used in configuration and run metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::SimdA => "simd_a",
            Self::SimdB => "simd_b",
        }
    }

    /// Number of elements processed per step for the given lane type.
    #[must_use]
    pub const fn lanes(self, lane: LaneType) -> usize {
        match (self, lane) {
            (Self::Scalar, _) => 1,
            (Self::SimdA, LaneType::F32) => 8,
            (Self::SimdA, LaneType::I16) => 16,
            (Self::SimdB, LaneType::F32) => 16,
            (Self::SimdB, LaneType::I16) => 32,
        }
    }

    /// Instruction sets this variant needs for the given lane type.
    #[must_use]
    pub const fn required_instruction_sets(self, lane: LaneType) -> &'static [InstructionSet] {
        match (self, lane) {
            (Self::Scalar, _) => &[],
            (Self::SimdA, _) => &[InstructionSet::Avx2],
            (Self::SimdB, LaneType::F32) => &[InstructionSet::Avx512F],
            (Self::SimdB, LaneType::I16) => &[InstructionSet::Avx512F, InstructionSet::Avx512Bw],
        }
    }

    /// Whether this variant can run on the current machine.
    #[must_use]
    pub fn is_available(self, lane: LaneType) -> bool {
        self.ensure_available(lane).is_ok()
    }

    /// Fails with [`VectorError::UnsupportedInstructionSet`] if a required
    /// instruction set is missing.
    pub fn ensure_available(self, lane: LaneType) -> Result<(), VectorError> {
        match self
            .required_instruction_sets(lane)
            .iter()
            .find(|set| !set.is_detected())
        {
            Some(missing) => Err(VectorError::UnsupportedInstructionSet {
                variant: self.as_str(),
                instruction_set: missing.name(),
            }),
            None => Ok(()),
        }
    }
}

impl std::fmt::Display for KernelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for KernelVariant {
    type Err = VectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as clap::ValueEnum>::from_str(s, true).map_err(|_| VectorError::UnknownOption {
            kind: "kernel variant",
            value: s.to_string(),
            expected: "scalar, simd_a, simd_b".to_string(),
        })
    }
}

// ============================================================================
// Scalar reference implementations
// ============================================================================

/// Fixed-point multiply-high with rounding, matching `mulhrs_epi16` per lane.
#[inline(always)]
#[must_use]
pub fn mulhrs_i16(lhs: i16, rhs: i16) -> i16 {
    let precise = i32::from(lhs) * i32::from(rhs);
    (((precise >> 14) + 1) >> 1) as i16
}

/// Squared Euclidean distance without the final square root.
#[inline]
#[must_use]
pub fn l2_squared_f32_scalar(lhs: &[f32], rhs: &[f32]) -> f32 {
    debug_assert_eq!(lhs.len(), rhs.len(), "Vector length mismatch");
    let mut res = 0.0f32;
    for (a, b) in lhs.iter().zip(rhs) {
        let diff = a - b;
        res += diff * diff;
    }
    res
}

/// Dot product of two `f32` vectors.
#[inline]
#[must_use]
pub fn dot_product_f32_scalar(lhs: &[f32], rhs: &[f32]) -> f32 {
    debug_assert_eq!(lhs.len(), rhs.len(), "Vector length mismatch");
    let mut res = 0.0f32;
    for (a, b) in lhs.iter().zip(rhs) {
        res += a * b;
    }
    res
}

/// Fixed-point dot product of two Q15 vectors.
#[inline]
#[must_use]
pub fn dot_product_i16_scalar(lhs: &[i16], rhs: &[i16]) -> i16 {
    debug_assert_eq!(lhs.len(), rhs.len(), "Vector length mismatch");
    lhs.iter()
        .zip(rhs)
        .fold(0i16, |acc, (&a, &b)| acc.wrapping_add(mulhrs_i16(a, b)))
}

// ============================================================================
// x86_64 intrinsics
// ============================================================================

#[cfg(target_arch = "x86_64")]
mod x86 {
    use super::mulhrs_i16;
    use std::arch::x86_64::*;

    /// AVX2 squared L2 distance: 8 floats per step.
    #[target_feature(enable = "avx2")]
    pub(super) unsafe fn l2_squared_f32_avx2<const ALIGNED: bool>(a: &[f32], b: &[f32]) -> f32 {
        const LANES: usize = 8;
        let n = a.len().min(b.len());
        let chunks = n / LANES;

        unsafe {
            let mut acc = _mm256_setzero_ps();
            for i in 0..chunks {
                let pa = a.as_ptr().add(i * LANES);
                let pb = b.as_ptr().add(i * LANES);
                let (va, vb) = if ALIGNED {
                    (_mm256_load_ps(pa), _mm256_load_ps(pb))
                } else {
                    (_mm256_loadu_ps(pa), _mm256_loadu_ps(pb))
                };
                let diff = _mm256_sub_ps(va, vb);
                acc = _mm256_add_ps(acc, _mm256_mul_ps(diff, diff));
            }

            let mut lanes = [0.0f32; LANES];
            _mm256_storeu_ps(lanes.as_mut_ptr(), acc);
            let mut sum: f32 = lanes.iter().sum();

            for i in chunks * LANES..n {
                let d = a[i] - b[i];
                sum += d * d;
            }
            sum
        }
    }

    /// AVX2 dot product: 8 floats per step.
    #[target_feature(enable = "avx2")]
    pub(super) unsafe fn dot_product_f32_avx2<const ALIGNED: bool>(a: &[f32], b: &[f32]) -> f32 {
        const LANES: usize = 8;
        let n = a.len().min(b.len());
        let chunks = n / LANES;

        unsafe {
            let mut acc = _mm256_setzero_ps();
            for i in 0..chunks {
                let pa = a.as_ptr().add(i * LANES);
                let pb = b.as_ptr().add(i * LANES);
                let (va, vb) = if ALIGNED {
                    (_mm256_load_ps(pa), _mm256_load_ps(pb))
                } else {
                    (_mm256_loadu_ps(pa), _mm256_loadu_ps(pb))
                };
                acc = _mm256_add_ps(acc, _mm256_mul_ps(va, vb));
            }

            let mut lanes = [0.0f32; LANES];
            _mm256_storeu_ps(lanes.as_mut_ptr(), acc);
            let mut sum: f32 = lanes.iter().sum();

            for i in chunks * LANES..n {
                sum += a[i] * b[i];
            }
            sum
        }
    }

    /// AVX2 fixed-point dot product: 16 lanes per step.
    #[target_feature(enable = "avx2")]
    pub(super) unsafe fn dot_product_i16_avx2<const ALIGNED: bool>(a: &[i16], b: &[i16]) -> i16 {
        const LANES: usize = 16;
        let n = a.len().min(b.len());
        let chunks = n / LANES;

        unsafe {
            let mut acc = _mm256_setzero_si256();
            for i in 0..chunks {
                let pa = a.as_ptr().add(i * LANES) as *const __m256i;
                let pb = b.as_ptr().add(i * LANES) as *const __m256i;
                let (va, vb) = if ALIGNED {
                    (_mm256_load_si256(pa), _mm256_load_si256(pb))
                } else {
                    (_mm256_loadu_si256(pa), _mm256_loadu_si256(pb))
                };
                acc = _mm256_add_epi16(acc, _mm256_mulhrs_epi16(va, vb));
            }

            let mut lanes = [0i16; LANES];
            _mm256_storeu_si256(lanes.as_mut_ptr() as *mut __m256i, acc);
            let mut sum = lanes.iter().fold(0i16, |s, &v| s.wrapping_add(v));

            for i in chunks * LANES..n {
                sum = sum.wrapping_add(mulhrs_i16(a[i], b[i]));
            }
            sum
        }
    }

    /// AVX-512 squared L2 distance: 16 floats per step.
    #[target_feature(enable = "avx512f")]
    pub(super) unsafe fn l2_squared_f32_avx512<const ALIGNED: bool>(a: &[f32], b: &[f32]) -> f32 {
        const LANES: usize = 16;
        let n = a.len().min(b.len());
        let chunks = n / LANES;

        unsafe {
            let mut acc = _mm512_setzero_ps();
            for i in 0..chunks {
                let pa = a.as_ptr().add(i * LANES);
                let pb = b.as_ptr().add(i * LANES);
                let (va, vb) = if ALIGNED {
                    (_mm512_load_ps(pa), _mm512_load_ps(pb))
                } else {
                    (_mm512_loadu_ps(pa), _mm512_loadu_ps(pb))
                };
                let diff = _mm512_sub_ps(va, vb);
                acc = _mm512_add_ps(acc, _mm512_mul_ps(diff, diff));
            }

            let mut lanes = [0.0f32; LANES];
            _mm512_storeu_ps(lanes.as_mut_ptr(), acc);
            let mut sum: f32 = lanes.iter().sum();

            for i in chunks * LANES..n {
                let d = a[i] - b[i];
                sum += d * d;
            }
            sum
        }
    }

    /// AVX-512 dot product: 16 floats per step.
    #[target_feature(enable = "avx512f")]
    pub(super) unsafe fn dot_product_f32_avx512<const ALIGNED: bool>(a: &[f32], b: &[f32]) -> f32 {
        const LANES: usize = 16;
        let n = a.len().min(b.len());
        let chunks = n / LANES;

        unsafe {
            let mut acc = _mm512_setzero_ps();
            for i in 0..chunks {
                let pa = a.as_ptr().add(i * LANES);
                let pb = b.as_ptr().add(i * LANES);
                let (va, vb) = if ALIGNED {
                    (_mm512_load_ps(pa), _mm512_load_ps(pb))
                } else {
                    (_mm512_loadu_ps(pa), _mm512_loadu_ps(pb))
                };
                acc = _mm512_add_ps(acc, _mm512_mul_ps(va, vb));
            }

            let mut lanes = [0.0f32; LANES];
            _mm512_storeu_ps(lanes.as_mut_ptr(), acc);
            let mut sum: f32 = lanes.iter().sum();

            for i in chunks * LANES..n {
                sum += a[i] * b[i];
            }
            sum
        }
    }

    /// AVX-512 fixed-point dot product: 32 lanes per step.
    ///
    /// Integer lanes are moved through the float load/store intrinsics; the
    /// bit patterns are untouched by the casts.
    #[target_feature(enable = "avx512f,avx512bw")]
    pub(super) unsafe fn dot_product_i16_avx512<const ALIGNED: bool>(a: &[i16], b: &[i16]) -> i16 {
        const LANES: usize = 32;
        let n = a.len().min(b.len());
        let chunks = n / LANES;

        unsafe {
            let mut acc = _mm512_setzero_si512();
            for i in 0..chunks {
                let pa = a.as_ptr().add(i * LANES) as *const f32;
                let pb = b.as_ptr().add(i * LANES) as *const f32;
                let (va, vb) = if ALIGNED {
                    (_mm512_load_ps(pa), _mm512_load_ps(pb))
                } else {
                    (_mm512_loadu_ps(pa), _mm512_loadu_ps(pb))
                };
                let product = _mm512_mulhrs_epi16(_mm512_castps_si512(va), _mm512_castps_si512(vb));
                acc = _mm512_add_epi16(acc, product);
            }

            let mut lanes = [0i16; LANES];
            _mm512_storeu_ps(lanes.as_mut_ptr() as *mut f32, _mm512_castsi512_ps(acc));
            let mut sum = lanes.iter().fold(0i16, |s, &v| s.wrapping_add(v));

            for i in chunks * LANES..n {
                sum = sum.wrapping_add(mulhrs_i16(a[i], b[i]));
            }
            sum
        }
    }
}

// ============================================================================
// Safe entry points (reachable only through the resolve functions)
// ============================================================================

#[cfg(target_arch = "x86_64")]
#[inline(always)]
fn is_aligned<T>(values: &[T], alignment: usize) -> bool {
    (values.as_ptr() as usize) % alignment == 0
}

/// Wraps an intrinsic kernel into a safe `fn` with the resolved signature.
///
/// Aligned entry points re-check pointer alignment and use unaligned loads
/// when a caller passes slices that do not come from aligned storage, which
/// keeps the aligned-load path sound for arbitrary inputs.
#[cfg(target_arch = "x86_64")]
macro_rules! simd_entry {
    ($name:ident, $inner:ident, $scalar:ty, $out:ty, $align:expr) => {
        fn $name<const ALIGNED: bool>(a: &[$scalar], b: &[$scalar]) -> $out {
            debug_assert_eq!(a.len(), b.len(), "Vector length mismatch");
            // SAFETY: these entry points are private and only returned by the
            // resolve functions after `ensure_available` confirmed the
            // instruction sets `$inner` is compiled for.
            if ALIGNED && is_aligned(a, $align) && is_aligned(b, $align) {
                unsafe { x86::$inner::<true>(a, b) }
            } else {
                unsafe { x86::$inner::<false>(a, b) }
            }
        }
    };
}

#[cfg(target_arch = "x86_64")]
simd_entry!(l2_squared_f32_simd_a, l2_squared_f32_avx2, f32, f32, 32);
#[cfg(target_arch = "x86_64")]
simd_entry!(l2_squared_f32_simd_b, l2_squared_f32_avx512, f32, f32, 64);
#[cfg(target_arch = "x86_64")]
simd_entry!(dot_product_f32_simd_a, dot_product_f32_avx2, f32, f32, 32);
#[cfg(target_arch = "x86_64")]
simd_entry!(dot_product_f32_simd_b, dot_product_f32_avx512, f32, f32, 64);
#[cfg(target_arch = "x86_64")]
simd_entry!(dot_product_i16_simd_a, dot_product_i16_avx2, i16, i16, 32);
#[cfg(target_arch = "x86_64")]
simd_entry!(dot_product_i16_simd_b, dot_product_i16_avx512, i16, i16, 64);

// ============================================================================
// Resolution
// ============================================================================

/// Resolves the squared Euclidean kernel for `variant`.
///
/// `aligned` selects aligned loads for SIMD variants; pass `true` only for
/// rows of storage with SIMD alignment.
pub fn resolve_l2_squared_f32(variant: KernelVariant, aligned: bool) -> Result<F32Kernel, VectorError> {
    variant.ensure_available(LaneType::F32)?;
    let kernel: F32Kernel = match variant {
        KernelVariant::Scalar => l2_squared_f32_scalar,
        #[cfg(target_arch = "x86_64")]
        KernelVariant::SimdA => {
            if aligned {
                l2_squared_f32_simd_a::<true>
            } else {
                l2_squared_f32_simd_a::<false>
            }
        }
        #[cfg(target_arch = "x86_64")]
        KernelVariant::SimdB => {
            if aligned {
                l2_squared_f32_simd_b::<true>
            } else {
                l2_squared_f32_simd_b::<false>
            }
        }
        #[cfg(not(target_arch = "x86_64"))]
        KernelVariant::SimdA | KernelVariant::SimdB => {
            let _ = aligned;
            return Err(VectorError::UnsupportedInstructionSet {
                variant: variant.as_str(),
                instruction_set: "x86_64 SIMD",
            });
        }
    };
    Ok(kernel)
}

/// Resolves the `f32` dot product kernel for `variant`.
pub fn resolve_dot_product_f32(variant: KernelVariant, aligned: bool) -> Result<F32Kernel, VectorError> {
    variant.ensure_available(LaneType::F32)?;
    let kernel: F32Kernel = match variant {
        KernelVariant::Scalar => dot_product_f32_scalar,
        #[cfg(target_arch = "x86_64")]
        KernelVariant::SimdA => {
            if aligned {
                dot_product_f32_simd_a::<true>
            } else {
                dot_product_f32_simd_a::<false>
            }
        }
        #[cfg(target_arch = "x86_64")]
        KernelVariant::SimdB => {
            if aligned {
                dot_product_f32_simd_b::<true>
            } else {
                dot_product_f32_simd_b::<false>
            }
        }
        #[cfg(not(target_arch = "x86_64"))]
        KernelVariant::SimdA | KernelVariant::SimdB => {
            let _ = aligned;
            return Err(VectorError::UnsupportedInstructionSet {
                variant: variant.as_str(),
                instruction_set: "x86_64 SIMD",
            });
        }
    };
    Ok(kernel)
}

/// Resolves the fixed-point dot product kernel for `variant`.
pub fn resolve_dot_product_i16(variant: KernelVariant, aligned: bool) -> Result<I16Kernel, VectorError> {
    variant.ensure_available(LaneType::I16)?;
    let kernel: I16Kernel = match variant {
        KernelVariant::Scalar => dot_product_i16_scalar,
        #[cfg(target_arch = "x86_64")]
        KernelVariant::SimdA => {
            if aligned {
                dot_product_i16_simd_a::<true>
            } else {
                dot_product_i16_simd_a::<false>
            }
        }
        #[cfg(target_arch = "x86_64")]
        KernelVariant::SimdB => {
            if aligned {
                dot_product_i16_simd_b::<true>
            } else {
                dot_product_i16_simd_b::<false>
            }
        }
        #[cfg(not(target_arch = "x86_64"))]
        KernelVariant::SimdA | KernelVariant::SimdB => {
            let _ = aligned;
            return Err(VectorError::UnsupportedInstructionSet {
                variant: variant.as_str(),
                instruction_set: "x86_64 SIMD",
            });
        }
    };
    Ok(kernel)
}
