//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::{Float, FloatConst};

/// Clamp a value into `[min, max]`.
pub fn clamp<T>(value: T, min: T, max: T) -> T
where
    T: Float,
{
    value.max(min).min(max)
}

/// Limit the magnitude of a value to `max_abs` while preserving its sign.
///
/// NaN maps to zero, infinities saturate like any other value.
pub fn saturate<T>(value: T, max_abs: T) -> T
where
    T: Float,
{
    if value.is_nan() {
        T::zero()
    } else if value > max_abs {
        max_abs
    } else if value < -max_abs {
        -max_abs
    } else {
        value
    }
}

/// Get the signed angular distance between two angles in the range of [0, 2pi].
///
/// This function will return the shortest signed distance from a to b accounting for wrapping
/// between 0 and 2pi.
pub fn get_ang_dist_2pi<T>(a: T, b: T) -> T
where
    T: Float + FloatConst,
{
    let tau_t = T::PI() + T::PI();

    let c = rem_euclid(a - b, tau_t);
    let d = rem_euclid(b - a, tau_t);

    if c < d {
        -c
    } else {
        d
    }
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
///
/// This function is taken from the std library as num is missing it.
///
/// In particular, the return value `r` satisfies `0.0 <= r < rhs.abs()` in
/// most cases. However, due to a floating point round-off error it can
/// result in `r == rhs.abs()` if `lhs` is much smaller than `rhs.abs()` in
/// magnitude and `lhs < 0.0`.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float,
{
    let r = lhs % rhs;
    if r < T::zero() {
        r + rhs.abs()
    } else {
        r
    }
}

/// Wrap any angle into [0, 2pi).
pub fn wrap_to_2pi<T>(value: T) -> T
where
    T: Float + FloatConst,
{
    let tau_t = T::PI() + T::PI();
    let r = rem_euclid(value, tau_t);

    // Round-off can land exactly on tau
    if r >= tau_t {
        T::zero()
    } else {
        r
    }
}

/// Wrap any angle into (-pi, pi].
pub fn wrap_to_pi<T>(value: T) -> T
where
    T: Float + FloatConst,
{
    let r = wrap_to_2pi(value);

    if r > T::PI() {
        r - (T::PI() + T::PI())
    } else {
        r
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const TAU: f64 = std::f64::consts::TAU;
    const PI: f64 = std::f64::consts::PI;

    #[test]
    fn test_get_ang_dist_2pi() {
        assert_eq!(get_ang_dist_2pi(1f64, 2f64), 1f64);
        assert_eq!(get_ang_dist_2pi(2f64, 1f64), -1f64);
        assert_eq!(get_ang_dist_2pi(0f64, TAU), 0f64);
        assert_eq!(get_ang_dist_2pi(TAU, 0f64), 0f64);
        assert_eq!(get_ang_dist_2pi(1f64, TAU), -1f64);
        assert_eq!(get_ang_dist_2pi(0f64, TAU - 1f64), -1f64);
        assert_eq!(get_ang_dist_2pi(TAU - 1f64, 1f64), 2f64);
    }

    #[test]
    fn test_wrap() {
        assert!((wrap_to_2pi(-0.5f64) - (TAU - 0.5)).abs() < 1e-12);
        assert!((wrap_to_2pi(TAU + 0.25f64) - 0.25).abs() < 1e-12);
        assert!((wrap_to_pi(TAU - 0.5f64) + 0.5).abs() < 1e-12);
        assert!((wrap_to_pi(PI) - PI).abs() < 1e-12);
        assert!((wrap_to_pi(-PI) - PI).abs() < 1e-12);
    }

    #[test]
    fn test_saturate() {
        assert_eq!(saturate(15f64, 12f64), 12f64);
        assert_eq!(saturate(-15f64, 12f64), -12f64);
        assert_eq!(saturate(3f64, 12f64), 3f64);
        assert_eq!(saturate(f64::NAN, 12f64), 0f64);
        assert_eq!(saturate(f64::INFINITY, 12f64), 12f64);
        assert_eq!(saturate(f64::NEG_INFINITY, 12f64), -12f64);
        assert_eq!(clamp(900f64, -750f64, 750f64), 750f64);
    }
}
