use simba::simd::{SimdValue, WideBoolF32x4, WideF32x4};

pub trait SimbaWorkarounds: SimdValue {
    fn is_nan(self) -> Self::SimdBool;

    fn infinity() -> Self;
    fn neg_infinity() -> Self;
}

impl SimbaWorkarounds for WideF32x4 {
    #[inline(always)]
    fn is_nan(self) -> Self::SimdBool {
        WideBoolF32x4(self.0.is_nan())
    }

    #[inline(always)]
    fn infinity() -> Self {
        Self::splat(f32::INFINITY)
    }

    #[inline(always)]
    fn neg_infinity() -> Self {
        Self::splat(f32::NEG_INFINITY)
    }
}

/// Lane-wise minimum, result is unspecified if any of the inputs is NaN.
#[inline(always)]
pub fn fast_min(a: WideF32x4, b: WideF32x4) -> WideF32x4 {
    WideF32x4(a.0.fast_min(b.0))
}

/// Lane-wise maximum, result is unspecified if any of the inputs is NaN.
#[inline(always)]
pub fn fast_max(a: WideF32x4, b: WideF32x4) -> WideF32x4 {
    WideF32x4(a.0.fast_max(b.0))
}
