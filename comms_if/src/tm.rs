//! # Rover Telemetry
//!
//! Telemetry is the executive's only view of the vehicle. A [`RoverTm`]
//! arrives once per cycle and must be validated before use, since a single
//! NaN reaching the perception or decision modules would propagate into the
//! demands.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Telemetry record sent by the vehicle once per cycle.
///
/// The default record is a stationary, level vehicle at the world origin.
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
pub struct RoverTm {
    /// Vehicle time at which this record was sampled, in seconds. Strictly
    /// increasing over a session, and the time base for every timer in the
    /// executive.
    pub time_s: f64,

    /// Current speed over ground in metres per second, signed, negative when
    /// reversing.
    pub speed_mps: f64,

    /// Position in the world frame in metres, `[x, y]`.
    pub pos_m: [f64; 2],

    /// Yaw angle in degrees, `[0, 360)`, anticlockwise positive.
    pub yaw_deg: f64,

    /// Pitch angle in degrees, `[0, 360)`.
    pub pitch_deg: f64,

    /// Roll angle in degrees, `[0, 360)`.
    pub roll_deg: f64,

    /// Echo of the throttle currently applied by the vehicle.
    pub throttle_echo: f64,

    /// Echo of the steering angle currently applied by the vehicle, in
    /// degrees.
    pub steer_echo_deg: f64,

    /// True when the vehicle is close enough to a sample to pick it up.
    pub near_sample: bool,

    /// True while the pickup mechanism is running.
    pub picking_up: bool,

    /// Number of samples still to be collected.
    pub samples_remaining: u32,

    /// Ground truth sample locations, sent on the first record of a session
    /// only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_manifest: Option<SampleManifest>,
}

/// Ground truth sample locations for the session, world frame metres.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SampleManifest {
    /// World frame x coordinates of the samples, in metres
    pub samples_x: Vec<f64>,

    /// World frame y coordinates of the samples, in metres
    pub samples_y: Vec<f64>,

    /// Total number of samples to find this session
    pub samples_to_find: u32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Reasons a telemetry record can be rejected.
#[derive(Debug, Error)]
pub enum TmError {
    #[error("Telemetry field {0} is not finite")]
    NonFiniteField(&'static str),

    #[error(
        "Telemetry time {time_s} s is not after the previous record ({prev_time_s} s)"
    )]
    NonMonotonicTime { time_s: f64, prev_time_s: f64 },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RoverTm {
    /// Check every numeric field of the record is finite.
    ///
    /// A record failing validation must be answered with neutral demands and
    /// never reach the autonomy modules.
    pub fn validate(&self) -> Result<(), TmError> {
        let checks: [(&'static str, f64); 9] = [
            ("time_s", self.time_s),
            ("speed_mps", self.speed_mps),
            ("pos_m[0]", self.pos_m[0]),
            ("pos_m[1]", self.pos_m[1]),
            ("yaw_deg", self.yaw_deg),
            ("pitch_deg", self.pitch_deg),
            ("roll_deg", self.roll_deg),
            ("throttle_echo", self.throttle_echo),
            ("steer_echo_deg", self.steer_echo_deg),
        ];

        for (name, value) in checks.iter() {
            if !value.is_finite() {
                return Err(TmError::NonFiniteField(name));
            }
        }

        if let Some(ref manifest) = self.sample_manifest {
            manifest.validate()?;
        }

        Ok(())
    }
}

impl SampleManifest {
    /// Check every sample coordinate is finite.
    pub fn validate(&self) -> Result<(), TmError> {
        for x in self.samples_x.iter() {
            if !x.is_finite() {
                return Err(TmError::NonFiniteField("samples_x"));
            }
        }
        for y in self.samples_y.iter() {
            if !y.is_finite() {
                return Err(TmError::NonFiniteField("samples_y"));
            }
        }
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn nominal_tm() -> RoverTm {
        RoverTm {
            time_s: 12.5,
            speed_mps: 1.2,
            pos_m: [99.6, 85.6],
            yaw_deg: 45.0,
            pitch_deg: 359.9,
            roll_deg: 0.1,
            throttle_echo: 0.2,
            steer_echo_deg: -5.0,
            near_sample: false,
            picking_up: false,
            samples_remaining: 6,
            sample_manifest: None,
        }
    }

    #[test]
    fn test_validate_nominal() {
        assert!(nominal_tm().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_non_finite() {
        let mut tm = nominal_tm();
        tm.speed_mps = f64::NAN;
        assert!(matches!(
            tm.validate(),
            Err(TmError::NonFiniteField("speed_mps"))
        ));

        let mut tm = nominal_tm();
        tm.pos_m[1] = f64::INFINITY;
        assert!(tm.validate().is_err());
    }

    #[test]
    fn test_manifest_round_trip() {
        let mut tm = nominal_tm();
        tm.sample_manifest = Some(SampleManifest {
            samples_x: vec![100.0, 50.0],
            samples_y: vec![80.0, 120.0],
            samples_to_find: 6,
        });

        let json = serde_json::to_string(&tm).unwrap();
        let back: RoverTm = serde_json::from_str(&json).unwrap();
        assert_eq!(tm, back);
    }
}
