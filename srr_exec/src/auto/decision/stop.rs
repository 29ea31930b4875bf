//! # Stop mode
//!
//! Brake to rest, then spin in place until enough navigable terrain comes
//! into view to resume driving.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::info;
use serde::Deserialize;

// Internal
use super::{Mode, StepOutput, STEER_LIMIT_DEG};
use crate::rover_state::RoverState;
use comms_if::dems::RoverDems;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StopParams {
    /// Speed below which the rover is considered settled, metres per
    /// second.
    pub settle_vel_mps: f64,

    /// Brake applied while settling.
    pub brake: f64,

    /// Navigable count at which driving may resume.
    pub go_nav_count: usize,

    /// Throttle applied on the resume cycle, Forward takes over from the
    /// next cycle.
    pub resume_throttle: f64,
}

/// Stop mode of the decision module.
///
/// Possible transitions:
/// - Forward, once enough navigable terrain is in view
#[derive(Debug)]
pub struct Stop {
    /// True once the rover has settled and begun spinning for a view.
    spinning: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Stop {
    pub fn new() -> Self {
        Self { spinning: false }
    }

    /// Reset on mode entry.
    pub fn begin(&mut self) {
        self.spinning = false;
    }

    pub fn step(&mut self, params: &StopParams, state: &mut RoverState) -> StepOutput {
        let mut dems = RoverDems::neutral();

        // Still moving, keep braking
        if state.vel_mps.abs() > params.settle_vel_mps {
            dems.brake = params.brake;
            return StepOutput {
                dems,
                next_mode: None,
            };
        }

        // Settled with a clear view, pull away and hand back to Forward
        if state.nav_count() >= params.go_nav_count {
            dems.throttle = params.resume_throttle;
            return StepOutput {
                dems,
                next_mode: Some(Mode::Forward),
            };
        }

        // Settled but boxed in, spin on the spot for a better view
        if !self.spinning {
            info!(
                "Settled with only {} navigable samples in view, spinning for a way out",
                state.nav_count()
            );
            self.spinning = true;
        }
        dems.steer_deg = -STEER_LIMIT_DEG;

        StepOutput {
            dems,
            next_mode: None,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
