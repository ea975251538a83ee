//! SIMD kernels must agree with the scalar reference: `f32` within
//! rounding tolerance, `i16` bit for bit.
//!
//! Variants missing on the host are skipped.

use nnbench::vector::kernels::{
    dot_product_f32_scalar, dot_product_i16_scalar, l2_squared_f32_scalar, resolve_dot_product_f32,
    resolve_dot_product_i16, resolve_l2_squared_f32,
};
use nnbench::vector::{
    Fixed16, Float32, KernelVariant, LaneType, RowMajorBatch, VectorStorage,
};
use proptest::prelude::*;

const SIMD_VARIANTS: [KernelVariant; 2] = [KernelVariant::SimdA, KernelVariant::SimdB];

fn close(simd: f32, scalar: f32) -> bool {
    (simd - scalar).abs() <= 1e-3 * (1.0 + scalar.abs())
}

fn f32_pair() -> impl Strategy<Value = (Vec<f32>, Vec<f32>)> {
    (1usize..300).prop_flat_map(|n| {
        (
            prop::collection::vec(-1.0f32..1.0, n),
            prop::collection::vec(-1.0f32..1.0, n),
        )
    })
}

fn i16_pair() -> impl Strategy<Value = (Vec<i16>, Vec<i16>)> {
    (1usize..300).prop_flat_map(|n| {
        (
            prop::collection::vec(any::<i16>(), n),
            prop::collection::vec(any::<i16>(), n),
        )
    })
}

proptest! {
    #[test]
    fn test_unaligned_f32_kernels_match_scalar((a, b) in f32_pair()) {
        let l2 = l2_squared_f32_scalar(&a, &b);
        let dot = dot_product_f32_scalar(&a, &b);
        for variant in SIMD_VARIANTS {
            if !variant.is_available(LaneType::F32) {
                continue;
            }
            let simd_l2 = resolve_l2_squared_f32(variant, false).unwrap()(&a, &b);
            let simd_dot = resolve_dot_product_f32(variant, false).unwrap()(&a, &b);
            prop_assert!(close(simd_l2, l2), "{variant}: l2 {simd_l2} vs {l2}");
            prop_assert!(close(simd_dot, dot), "{variant}: dot {simd_dot} vs {dot}");
        }
    }

    #[test]
    fn test_unaligned_i16_kernels_are_bit_exact((a, b) in i16_pair()) {
        let expected = dot_product_i16_scalar(&a, &b);
        for variant in SIMD_VARIANTS {
            if !variant.is_available(LaneType::I16) {
                continue;
            }
            let actual = resolve_dot_product_i16(variant, false).unwrap()(&a, &b);
            prop_assert_eq!(actual, expected, "{}", variant);
        }
    }

    #[test]
    fn test_aligned_rows_match_scalar(
        rows in (1usize..100).prop_flat_map(|n| prop::collection::vec(
            prop::collection::vec(-0.5f32..0.5, n),
            2,
        ))
    ) {
        let batch = RowMajorBatch::from_rows(&rows).unwrap();
        let floats = VectorStorage::<Float32>::from_batch(&batch).unwrap();
        let fixed = VectorStorage::<Fixed16>::from_batch(&batch).unwrap();

        let (fa, fb) = (floats.get(0).unwrap(), floats.get(1).unwrap());
        let (ia, ib) = (fixed.get(0).unwrap(), fixed.get(1).unwrap());
        let dot = dot_product_f32_scalar(fa, fb);
        let fixed_dot = dot_product_i16_scalar(ia, ib);

        for variant in SIMD_VARIANTS {
            if variant.is_available(LaneType::F32) {
                let simd = resolve_dot_product_f32(variant, true).unwrap()(fa, fb);
                prop_assert!(close(simd, dot), "{variant}: {simd} vs {dot}");
            }
            if variant.is_available(LaneType::I16) {
                let simd = resolve_dot_product_i16(variant, true).unwrap()(ia, ib);
                prop_assert_eq!(simd, fixed_dot, "{}", variant);
            }
        }
    }
}

#[test]
fn test_unavailable_variants_fail_to_resolve() {
    for variant in SIMD_VARIANTS {
        let resolved = resolve_dot_product_i16(variant, false);
        assert_eq!(resolved.is_ok(), variant.is_available(LaneType::I16));
    }
    assert!(resolve_l2_squared_f32(KernelVariant::Scalar, true).is_ok());
}
