//! # Unstuck mode
//!
//! Scripted recovery manouvre run when the stuck monitor latches. Phases
//! are gated purely on time since mode entry: settle, probe for a way
//! forward, reverse out, turn onto a fresh heading, then hand back to
//! forward driving and clear the latch.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::info;
use serde::Deserialize;

// Internal
use super::{Mode, StepOutput, STEER_LIMIT_DEG};
use crate::auto::monitor::StuckMonitor;
use crate::rover_state::RoverState;
use comms_if::dems::RoverDems;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct UnstuckParams {
    /// End of the settling phase, seconds since mode entry.
    pub brake_end_s: f64,

    /// End of the probe phase, seconds since mode entry.
    pub probe_end_s: f64,

    /// End of the reversing phase, seconds since mode entry.
    pub reverse_end_s: f64,

    /// End of the turning phase, seconds since mode entry. The manouvre
    /// completes here.
    pub turn_end_s: f64,

    /// Throttle applied when the probe phase finds navigable terrain.
    pub probe_throttle: f64,

    /// Throttle applied while reversing, negative.
    pub reverse_throttle: f64,

    /// Navigable count the probe phase needs to drive rather than spin.
    pub go_nav_count: usize,

    /// Brake applied while settling.
    pub brake: f64,
}

/// Phase of the unstuck manouvre, derived from time since mode entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnstuckPhase {
    Brake,
    Probe,
    Reverse,
    Turn,
}

/// Unstuck mode of the decision module.
///
/// Possible transitions:
/// - Forward, when the manouvre completes
#[derive(Debug)]
pub struct Unstuck {
    /// Phase at the last cycle, for transition logging only.
    phase: UnstuckPhase,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Unstuck {
    pub fn new() -> Self {
        Self {
            phase: UnstuckPhase::Brake,
        }
    }

    /// Reset on mode entry.
    pub fn begin(&mut self) {
        self.phase = UnstuckPhase::Brake;
    }

    pub fn step(
        &mut self,
        params: &UnstuckParams,
        state: &mut RoverState,
        stuck: &mut StuckMonitor,
    ) -> StepOutput {
        let elapsed_s = state.elapsed_in_mode_s();
        let mut dems = RoverDems::neutral();

        if elapsed_s >= params.turn_end_s {
            info!("Unstuck manouvre complete, resuming forward drive");
            stuck.clear(state.time_s);
            return StepOutput {
                dems,
                next_mode: Some(Mode::Forward),
            };
        }

        let phase = if elapsed_s < params.brake_end_s {
            UnstuckPhase::Brake
        } else if elapsed_s < params.probe_end_s {
            UnstuckPhase::Probe
        } else if elapsed_s < params.reverse_end_s {
            UnstuckPhase::Reverse
        } else {
            UnstuckPhase::Turn
        };

        if phase != self.phase {
            info!("Unstuck phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }

        match phase {
            UnstuckPhase::Brake => {
                dems.brake = params.brake;
            }
            UnstuckPhase::Probe => {
                // If a way forward is visible try driving out, otherwise
                // spin to look for one
                if state.nav_count() >= params.go_nav_count {
                    dems.throttle = params.probe_throttle;
                } else {
                    dems.steer_deg = STEER_LIMIT_DEG;
                }
            }
            UnstuckPhase::Reverse => {
                dems.throttle = params.reverse_throttle;
            }
            UnstuckPhase::Turn => {
                dems.steer_deg = STEER_LIMIT_DEG;
            }
        }

        StepOutput {
            dems,
            next_mode: None,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
