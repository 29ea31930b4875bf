//! Utility maths functions
//!
//! General numeric helpers shared by the rover modules. Angle helpers work in
//! degrees since that is the unit used at the telemetry and demand
//! boundaries; perception-internal maths is done in radians with the
//! standard library.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float,
{
    target_range.0
        + ((value - source_range.0) * (target_range.1 - target_range.0)
            / (source_range.1 - source_range.0))
}

/// Clamp a value into the range `[min, max]`.
pub fn clamp<T>(value: T, min: T, max: T) -> T
where
    T: Float,
{
    if value > max {
        max
    } else if value < min {
        min
    } else {
        value
    }
}

/// Return the euclidian distance between two points of equal dimension, or
/// `None` if the dimensions don't match.
pub fn norm<T>(point_0: &[T], point_1: &[T]) -> Option<T>
where
    T: Float + std::ops::AddAssign,
{
    if point_0.len() != point_1.len() {
        return None;
    }

    let mut sum = T::zero();

    for i in 0..point_0.len() {
        sum += (point_0[i] - point_1[i]).powi(2);
    }

    Some(sum.sqrt())
}

/// Wrap an angle in degrees into the range `[0, 360)`.
pub fn wrap_deg_360(angle_deg: f64) -> f64 {
    let wrapped = angle_deg % 360.0;
    if wrapped < 0.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}

/// Shortest signed angular difference `a - b` in degrees, in `[-180, 180)`.
///
/// A positive result means `a` lies anticlockwise of `b`.
pub fn ang_delta_deg(a_deg: f64, b_deg: f64) -> f64 {
    let mut delta = wrap_deg_360(a_deg) - wrap_deg_360(b_deg);
    if delta >= 180.0 {
        delta -= 360.0;
    }
    if delta < -180.0 {
        delta += 360.0;
    }
    delta
}

/// Test whether an angle in degrees is within `tol_deg` of level (zero),
/// accounting for wraparound, so that both `0.2` and `359.8` are considered
/// level for a tolerance of `0.5`.
pub fn near_level_deg(angle_deg: f64, tol_deg: f64) -> bool {
    ang_delta_deg(angle_deg, 0.0).abs() <= tol_deg
}

/// Mean of a slice, or `None` if the slice is empty.
///
/// Empty perception sets are an expected condition, so the degenerate case
/// must produce `None` rather than a NaN that would propagate into a steer
/// demand.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation of a slice, or `None` if the slice is
/// empty.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;

    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;

    Some(var.sqrt())
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
