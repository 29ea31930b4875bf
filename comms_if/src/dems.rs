//! # Rover Demands
//!
//! Demands are the executive's only way of acting on the vehicle. Every
//! cycle produces exactly one [`RoverDems`], even when the cycle failed, in
//! which case the neutral demand is sent.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Demands sent from the executive to the vehicle once per cycle.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct RoverDems {
    /// Throttle demand, signed, negative to reverse.
    pub throttle: f64,

    /// Brake demand, zero or positive.
    pub brake: f64,

    /// Steering angle demand in degrees, anticlockwise (left) positive.
    pub steer_deg: f64,

    /// Trigger the sample pickup mechanism.
    pub pickup: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RoverDems {
    /// The all-zero safe demand. Sent whenever the executive cannot produce
    /// a meaningful demand, so the vehicle coasts to a stop rather than
    /// continuing on a stale command.
    pub fn neutral() -> Self {
        Self {
            throttle: 0.0,
            brake: 0.0,
            steer_deg: 0.0,
            pickup: false,
        }
    }
}

impl Default for RoverDems {
    fn default() -> Self {
        Self::neutral()
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
