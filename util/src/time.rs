//! General time utility functions

use chrono::Duration;

/// Number of nanoseconds in one second
pub const NANOS_PER_SECOND: f64 = 1e9;

/// Convert a `chrono::Duration` into fractional seconds, or `None` if the
/// duration is too large to be represented in nanoseconds.
pub fn duration_to_seconds(duration: Duration) -> Option<f64> {
    duration
        .num_nanoseconds()
        .map(|ns| ns as f64 / NANOS_PER_SECOND)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_duration_to_seconds() {
        assert_eq!(
            duration_to_seconds(Duration::milliseconds(1500)),
            Some(1.5)
        );
        assert_eq!(duration_to_seconds(Duration::seconds(0)), Some(0.0));
    }
}
