use glam::Vec3;

/// Clamps a value between a minimum and maximum value.
#[inline(always)]
pub fn clamp<T: PartialOrd>(value: T, min: T, max: T) -> T {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

/// Returns -1 if the value is negative and 1 otherwise.
#[inline(always)]
pub fn binary_sign(x: f32) -> f32 {
    if x < 0.0 {
        -1.0
    } else {
        1.0
    }
}

/// Integer division rounding toward positive infinity. Both operands must be positive.
#[inline(always)]
pub fn ceil_div(numerator: i32, denominator: i32) -> i32 {
    debug_assert!(numerator >= 0 && denominator > 0);
    (numerator + denominator - 1) / denominator
}

/// Componentwise reciprocal with near-zero components clamped to a tiny magnitude.
/// The sign is preserved, so a parallel axis produces an enormous but finite slab interval
/// instead of a NaN.
#[inline(always)]
pub fn clamped_reciprocal(v: Vec3) -> Vec3 {
    Vec3::new(binary_sign(v.x), binary_sign(v.y), binary_sign(v.z))
        / Vec3::max(Vec3::splat(1e-15), v.abs())
}

/// Componentwise reciprocal that maps zero components to `f32::MAX`.
#[inline(always)]
pub fn inverse_scale(scale: Vec3) -> Vec3 {
    Vec3::new(
        if scale.x != 0.0 { 1.0 / scale.x } else { f32::MAX },
        if scale.y != 0.0 { 1.0 / scale.y } else { f32::MAX },
        if scale.z != 0.0 { 1.0 / scale.z } else { f32::MAX },
    )
}
