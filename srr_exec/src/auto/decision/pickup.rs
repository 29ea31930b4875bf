//! # Pickup mode
//!
//! Holds the rover still while the pickup mechanism runs, records the
//! collection when it finishes, then reverses clear so the search does not
//! immediately re-detect the collection site.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{info, warn};
use serde::Deserialize;

// Internal
use super::{Mode, StepOutput};
use crate::rover_state::RoverState;
use comms_if::dems::RoverDems;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PickupParams {
    /// Time to wait for the mechanism to start before giving up, seconds.
    pub await_timeout_s: f64,

    /// Length of the clearing reverse, seconds.
    pub reverse_time_s: f64,

    /// Throttle applied while reversing, negative.
    pub reverse_throttle: f64,

    /// Brake held while waiting on the mechanism.
    pub brake: f64,
}

/// Phase of the pickup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PickupPhase {
    /// Request issued, waiting for the mechanism to start.
    Await,

    /// Mechanism running, hold still.
    Hold,

    /// Reverse clear of the collection site.
    Reverse,
}

/// Pickup mode of the decision module.
///
/// Possible transitions:
/// - Forward, once the clearing reverse completes
#[derive(Debug)]
pub struct Pickup {
    phase: PickupPhase,

    /// Vehicle time at which the current phase began.
    phase_start_s: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Pickup {
    pub fn new() -> Self {
        Self {
            phase: PickupPhase::Await,
            phase_start_s: 0.0,
        }
    }

    /// Reset on mode entry.
    pub fn begin(&mut self, time_s: f64) {
        self.phase = PickupPhase::Await;
        self.phase_start_s = time_s;
    }

    pub fn step(&mut self, params: &PickupParams, state: &mut RoverState) -> StepOutput {
        let time_s = state.time_s;
        let mut dems = RoverDems::neutral();

        match self.phase {
            PickupPhase::Await => {
                // Hold the request up until the mechanism reports running
                dems.brake = params.brake;
                dems.pickup = true;

                if state.picking_up {
                    info!("Pickup mechanism running");
                    self.phase = PickupPhase::Hold;
                    self.phase_start_s = time_s;
                } else if time_s - self.phase_start_s > params.await_timeout_s {
                    warn!(
                        "Pickup mechanism did not start within {:.1} s, backing off",
                        params.await_timeout_s
                    );
                    self.phase = PickupPhase::Reverse;
                    self.phase_start_s = time_s;
                }
            }
            PickupPhase::Hold => {
                dems.brake = params.brake;

                if !state.picking_up {
                    state.samples_collected += 1;
                    state.collected_index.insert(state.pos_m);
                    info!(
                        "Sample {} of {} collected at [{:.1}, {:.1}] m",
                        state.samples_collected,
                        state.samples_to_find,
                        state.pos_m[0],
                        state.pos_m[1]
                    );
                    self.phase = PickupPhase::Reverse;
                    self.phase_start_s = time_s;
                }
            }
            PickupPhase::Reverse => {
                if time_s - self.phase_start_s < params.reverse_time_s {
                    dems.throttle = params.reverse_throttle;
                } else {
                    state.pickup_requested = false;
                    return StepOutput {
                        dems,
                        next_mode: Some(Mode::Forward),
                    };
                }
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

#[cfg(test)]
mod test {
    use super::*;
    use crate::auto::map::WorldMapParams;
    use comms_if::tm::RoverTm;

    fn pickup_params() -> PickupParams {
        PickupParams {
            await_timeout_s: 2.0,
            reverse_time_s: 1.5,
            reverse_throttle: -0.3,
            brake: 10.0,
        }
    }

    /// State in Pickup mode at vehicle time `20.0 + elapsed_s`.
    fn state_at(elapsed_s: f64, picking_up: bool) -> RoverState {
        let mut state = RoverState::new(&WorldMapParams {
            num_cells: 200,
            cell_size_m: 1.0,
            attitude_tol_deg: 0.5,
        });

        let mut tm = RoverTm::default();
        tm.time_s = 20.0;
        tm.pos_m = [52.0, 50.0];
        tm.samples_remaining = 6;
        state.tick_start(&tm);
        state.set_mode(Mode::Pickup);
        state.pickup_requested = true;

        tm.time_s = 20.0 + elapsed_s;
        tm.picking_up = picking_up;
        state.tick_start(&tm);

        state
    }

    #[test]
    fn test_collection_sequence() {
        let params = pickup_params();
        let mut pickup = Pickup::new();
        pickup.begin(20.0);

        // Await holds the brake and keeps the request up
        let mut state = state_at(0.1, false);
        let out = pickup.step(&params, &mut state);
        assert_eq!(out.dems.brake, params.brake);
        assert!(out.dems.pickup);

        // Mechanism starts, hold
        let mut state = state_at(0.5, true);
        let out = pickup.step(&params, &mut state);
        assert_eq!(out.dems.brake, params.brake);
        assert!(!out.dems.pickup);
        assert_eq!(state.samples_collected, 0);

        // Mechanism finishes, the collection is recorded once
        let mut state = state_at(2.6, false);
        let out = pickup.step(&params, &mut state);
        assert_eq!(state.samples_collected, 1);
        assert_eq!(state.collected_index.len(), 1);
        assert!(state
            .collected_index
            .any_within(&state.pos_m, 0.1));
        assert!(out.next_mode.is_none());

        // Reverse clear
        let mut state = state_at(3.0, false);
        state.samples_collected = 1;
        let out = pickup.step(&params, &mut state);
        assert_eq!(out.dems.throttle, params.reverse_throttle);

        // Done, request latch released
        let mut state = state_at(4.2, false);
        let out = pickup.step(&params, &mut state);
        assert_eq!(out.next_mode, Some(Mode::Forward));
        assert!(!state.pickup_requested);
    }

    #[test]
    fn test_await_timeout_reverses_without_collection() {
        let params = pickup_params();
        let mut pickup = Pickup::new();
        pickup.begin(20.0);

        let mut state = state_at(2.5, false);
        let out = pickup.step(&params, &mut state);
        assert!(out.dems.pickup, "request dropped on the timeout cycle");

        let mut state = state_at(2.7, false);
        let out = pickup.step(&params, &mut state);
        assert_eq!(out.dems.throttle, params.reverse_throttle);
        assert_eq!(state.samples_collected, 0);
    }
}
