//! # Loop recovery mode
//!
//! Breaks a perpetual circling pattern flagged by the loop monitor: brake
//! to rest, hold a hard counter steer against the dominant direction for a
//! few seconds, then resume forward driving on the new heading.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::info;
use serde::Deserialize;

// Internal
use super::{Mode, StepOutput, STEER_LIMIT_DEG};
use crate::auto::monitor::LoopMonitor;
use crate::rover_state::RoverState;
use comms_if::dems::RoverDems;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LoopRecoveryParams {
    /// Length of the settling phase, seconds since mode entry.
    pub brake_time_s: f64,

    /// Length of the counter steer phase, seconds.
    pub counter_steer_time_s: f64,

    /// Brake applied while settling.
    pub brake: f64,
}

/// Loop recovery mode of the decision module.
///
/// Possible transitions:
/// - Forward, when the counter steer completes
#[derive(Debug)]
pub struct LoopRecovery;

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LoopRecovery {
    pub fn new() -> Self {
        Self
    }

    pub fn step(
        &mut self,
        params: &LoopRecoveryParams,
        state: &mut RoverState,
        loop_mon: &mut LoopMonitor,
    ) -> StepOutput {
        let elapsed_s = state.elapsed_in_mode_s();
        let mut dems = RoverDems::neutral();

        if elapsed_s >= params.brake_time_s + params.counter_steer_time_s {
            info!("Loop recovery complete, resuming forward drive");
            loop_mon.clear(state.time_s);
            return StepOutput {
                dems,
                next_mode: Some(Mode::Forward),
            };
        }

        if elapsed_s < params.brake_time_s {
            dems.brake = params.brake;
        } else {
            // Point turn against the direction the rover has been circling
            dems.steer_deg = -loop_mon.dominant_sign() * STEER_LIMIT_DEG;
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

#[cfg(test)]
mod test {
    use super::*;
    use crate::auto::map::WorldMapParams;
    use crate::auto::monitor::LoopMonitorParams;
    use comms_if::tm::RoverTm;

    fn recovery_params() -> LoopRecoveryParams {
        LoopRecoveryParams {
            brake_time_s: 1.5,
            counter_steer_time_s: 3.0,
            brake: 10.0,
        }
    }

    /// Monitor latched by a window of left turns.
    fn latched_monitor() -> LoopMonitor {
        let mut mon = LoopMonitor::new(LoopMonitorParams {
            window_len: 240,
            steer_deadband_deg: 2.5,
            grace_s: 10.0,
        });
        for i in 0..240 {
            mon.update(i as f64 * 0.1, 12.0, false);
        }
        assert!(mon.is_triggered());
        mon
    }

    fn state_at(elapsed_s: f64) -> RoverState {
        let mut state = RoverState::new(&WorldMapParams {
            num_cells: 200,
            cell_size_m: 1.0,
            attitude_tol_deg: 0.5,
        });

        let mut tm = RoverTm::default();
        tm.time_s = 50.0;
        state.tick_start(&tm);
        state.set_mode(Mode::LoopRecovery);

        tm.time_s = 50.0 + elapsed_s;
        state.tick_start(&tm);

        state
    }

    #[test]
    fn test_settle_then_counter_steer() {
        let params = recovery_params();
        let mut recovery = LoopRecovery::new();
        let mut mon = latched_monitor();

        let out = recovery.step(&params, &mut state_at(0.5), &mut mon);
        assert_eq!(out.dems.brake, params.brake);
        assert_eq!(out.dems.steer_deg, 0.0);

        // Circling left, so the counter steer is hard right
        let out = recovery.step(&params, &mut state_at(3.0), &mut mon);
        assert_eq!(out.dems.steer_deg, -STEER_LIMIT_DEG);
        assert_eq!(out.dems.brake, 0.0);
        assert!(mon.is_triggered(), "latch cleared before completion");
    }

    #[test]
    fn test_completion_clears_latch() {
        let params = recovery_params();
        let mut recovery = LoopRecovery::new();
        let mut mon = latched_monitor();

        let out = recovery.step(&params, &mut state_at(4.6), &mut mon);

        assert_eq!(out.next_mode, Some(Mode::Forward));
        assert!(!mon.is_triggered());
    }
}
