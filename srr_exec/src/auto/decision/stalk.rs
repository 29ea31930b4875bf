//! # Stalk mode
//!
//! Sample pursuit. The rover settles and rotates until it faces the rock
//! candidate, creeps towards it steering on the live bearing, and requests
//! a pickup once the proximity flag is up and the wheels have stopped. A
//! candidate lost from view or a pursuit running over its time budget is
//! abandoned with a short reverse so the search does not immediately
//! re-trigger on the same spot.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{info, warn};
use serde::Deserialize;

// Internal
use super::{Mode, StepOutput, STEER_LIMIT_DEG};
use crate::rover_state::RoverState;
use comms_if::dems::RoverDems;
use util::maths;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StalkParams {
    /// Speed below which the rotate phase may begin turning, metres per
    /// second.
    pub rotate_settle_vel_mps: f64,

    /// Bearing error within which the rover counts as facing the sample,
    /// degrees.
    pub aligned_tol_deg: f64,

    /// Throttle applied while approaching.
    pub approach_throttle: f64,

    /// Approach speed at which the throttle is cut, metres per second.
    pub approach_max_vel_mps: f64,

    /// Speed below which a pickup may be requested, metres per second.
    pub pickup_vel_max_mps: f64,

    /// Time without a visible candidate before the pursuit is abandoned,
    /// seconds.
    pub lost_time_s: f64,

    /// Total pursuit time budget, seconds.
    pub pursuit_time_s: f64,

    /// Length of the abandon reverse, seconds.
    pub abandon_reverse_s: f64,

    /// Throttle applied while reversing out of an abandoned pursuit,
    /// negative.
    pub reverse_throttle: f64,

    /// Brake applied while settling.
    pub brake: f64,
}

/// Phase of the pursuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StalkPhase {
    /// Settle and turn to face the candidate.
    Rotate,

    /// Drive at the candidate on its live bearing.
    Approach,

    /// Reverse away from a failed pursuit.
    Abandon,
}

/// Stalk mode of the decision module.
///
/// Possible transitions:
/// - Pickup, when the pickup request is issued
/// - Forward, when the pursuit is abandoned
#[derive(Debug)]
pub struct Stalk {
    phase: StalkPhase,

    /// Vehicle time at which a candidate was last in view.
    last_seen_s: f64,

    /// Vehicle time at which the abandon reverse began.
    abandon_start_s: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Stalk {
    pub fn new() -> Self {
        Self {
            phase: StalkPhase::Rotate,
            last_seen_s: 0.0,
            abandon_start_s: 0.0,
        }
    }

    /// Reset on mode entry.
    pub fn begin(&mut self, time_s: f64) {
        self.phase = StalkPhase::Rotate;
        self.last_seen_s = time_s;
        self.abandon_start_s = 0.0;
    }

    pub fn step(&mut self, params: &StalkParams, state: &mut RoverState) -> StepOutput {
        let time_s = state.time_s;
        let mut dems = RoverDems::neutral();

        // The proximity flag counts as seeing the sample, since a rock
        // right under the camera can drop out of the segmented view
        if state.rock_candidate.is_some() || state.near_sample {
            self.last_seen_s = time_s;
        }

        // Give up on a candidate that has dropped out of view or a pursuit
        // which has overrun its budget
        if self.phase != StalkPhase::Abandon {
            if time_s - self.last_seen_s > params.lost_time_s {
                warn!(
                    "Sample lost from view for {:.1} s, abandoning pursuit",
                    time_s - self.last_seen_s
                );
                self.phase = StalkPhase::Abandon;
                self.abandon_start_s = time_s;
            } else if state.elapsed_in_mode_s() > params.pursuit_time_s {
                warn!(
                    "Pursuit timed out after {:.1} s, abandoning",
                    state.elapsed_in_mode_s()
                );
                self.phase = StalkPhase::Abandon;
                self.abandon_start_s = time_s;
            }
        }

        match self.phase {
            StalkPhase::Rotate => {
                if state.vel_mps.abs() > params.rotate_settle_vel_mps {
                    dems.brake = params.brake;
                } else if let Some(cand) = state.rock_candidate {
                    dems.steer_deg =
                        maths::clamp(cand.bearing_deg, -STEER_LIMIT_DEG, STEER_LIMIT_DEG);

                    if cand.bearing_deg.abs() <= params.aligned_tol_deg {
                        info!(
                            "Facing sample at {:.1} px, starting approach",
                            cand.dist_px
                        );
                        self.phase = StalkPhase::Approach;
                    }
                }
            }
            StalkPhase::Approach => {
                if state.near_sample {
                    // On top of the sample, settle the wheels and ask for
                    // the pickup once stopped
                    dems.brake = params.brake;

                    if state.vel_mps.abs() <= params.pickup_vel_max_mps
                        && !state.pickup_requested
                    {
                        info!("Stopped at sample, requesting pickup");
                        dems.pickup = true;
                        state.pickup_requested = true;
                        return StepOutput {
                            dems,
                            next_mode: Some(Mode::Pickup),
                        };
                    }
                } else if let Some(cand) = state.rock_candidate {
                    dems.steer_deg =
                        maths::clamp(cand.bearing_deg, -STEER_LIMIT_DEG, STEER_LIMIT_DEG);

                    if state.vel_mps < params.approach_max_vel_mps {
                        dems.throttle = params.approach_throttle;
                    }
                }
            }
            StalkPhase::Abandon => {
                if time_s - self.abandon_start_s < params.abandon_reverse_s {
                    dems.throttle = params.reverse_throttle;
                } else {
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
    use crate::rover_state::RockCandidate;
    use comms_if::tm::RoverTm;
    use nalgebra::Vector2;

    fn stalk_params() -> StalkParams {
        StalkParams {
            rotate_settle_vel_mps: 0.2,
            aligned_tol_deg: 5.0,
            approach_throttle: 0.2,
            approach_max_vel_mps: 1.0,
            pickup_vel_max_mps: 0.05,
            lost_time_s: 2.0,
            pursuit_time_s: 25.0,
            abandon_reverse_s: 1.5,
            reverse_throttle: -0.3,
            brake: 10.0,
        }
    }

    fn candidate(bearing_deg: f64) -> RockCandidate {
        RockCandidate {
            pos_m: Vector2::new(52.0, 50.0),
            dist_px: 30.0,
            bearing_deg,
        }
    }

    /// State in Stalk mode `elapsed_s` after entry at vehicle time 10 s.
    fn state_at(elapsed_s: f64, vel_mps: f64) -> RoverState {
        let mut state = RoverState::new(&WorldMapParams {
            num_cells: 200,
            cell_size_m: 1.0,
            attitude_tol_deg: 0.5,
        });

        let mut tm = RoverTm::default();
        tm.time_s = 10.0;
        state.tick_start(&tm);
        state.set_mode(Mode::Stalk);

        tm.time_s = 10.0 + elapsed_s;
        tm.speed_mps = vel_mps;
        state.tick_start(&tm);

        state
    }

    #[test]
    fn test_rotate_settles_then_turns() {
        let params = stalk_params();
        let mut stalk = Stalk::new();
        stalk.begin(10.0);

        // Still rolling, brake regardless of the candidate
        let mut state = state_at(0.1, 1.0);
        state.rock_candidate = Some(candidate(40.0));
        let out = stalk.step(&params, &mut state);
        assert_eq!(out.dems.brake, params.brake);
        assert_eq!(out.dems.steer_deg, 0.0);

        // Settled, point turn clamped to the steer limit
        let mut state = state_at(0.5, 0.05);
        state.rock_candidate = Some(candidate(40.0));
        let out = stalk.step(&params, &mut state);
        assert_eq!(out.dems.steer_deg, STEER_LIMIT_DEG);
        assert_eq!(out.dems.throttle, 0.0);
        assert!(out.next_mode.is_none());
    }

    #[test]
    fn test_aligned_candidate_starts_approach() {
        let params = stalk_params();
        let mut stalk = Stalk::new();
        stalk.begin(10.0);

        let mut state = state_at(1.0, 0.05);
        state.rock_candidate = Some(candidate(2.0));
        stalk.step(&params, &mut state);

        // Next cycle is an approach on the live bearing
        let mut state = state_at(1.1, 0.3);
        state.rock_candidate = Some(candidate(-3.0));
        let out = stalk.step(&params, &mut state);
        assert_eq!(out.dems.throttle, params.approach_throttle);
        assert_eq!(out.dems.steer_deg, -3.0);
    }

    #[test]
    fn test_pickup_requested_once_stopped_at_sample() {
        let params = stalk_params();
        let mut stalk = Stalk::new();
        stalk.begin(10.0);

        // Align
        let mut state = state_at(1.0, 0.0);
        state.rock_candidate = Some(candidate(0.0));
        stalk.step(&params, &mut state);

        // Proximity flag up but still rolling, settle first
        let mut state = state_at(4.0, 0.4);
        state.near_sample = true;
        let out = stalk.step(&params, &mut state);
        assert_eq!(out.dems.brake, params.brake);
        assert!(!out.dems.pickup);

        // Stopped at the sample, request the pickup
        let mut state = state_at(4.5, 0.01);
        state.near_sample = true;
        let out = stalk.step(&params, &mut state);
        assert!(out.dems.pickup);
        assert!(state.pickup_requested);
        assert_eq!(out.next_mode, Some(Mode::Pickup));
    }

    #[test]
    fn test_lost_candidate_abandons_with_reverse() {
        let params = stalk_params();
        let mut stalk = Stalk::new();
        stalk.begin(10.0);

        let mut state = state_at(0.1, 0.0);
        state.rock_candidate = Some(candidate(0.0));
        stalk.step(&params, &mut state);

        // Candidate gone for longer than the lost budget
        let mut state = state_at(2.5, 0.0);
        let out = stalk.step(&params, &mut state);
        assert_eq!(out.dems.throttle, params.reverse_throttle);
        assert!(out.next_mode.is_none());

        // Reverse finished, back to the search
        let mut state = state_at(4.2, -0.3);
        let out = stalk.step(&params, &mut state);
        assert_eq!(out.next_mode, Some(Mode::Forward));
    }

    #[test]
    fn test_pursuit_timeout_abandons() {
        let params = stalk_params();
        let mut stalk = Stalk::new();
        stalk.begin(10.0);

        // Candidate still visible but the budget has run out
        let mut state = state_at(26.0, 0.3);
        state.rock_candidate = Some(candidate(1.0));
        let out = stalk.step(&params, &mut state);
        assert_eq!(out.dems.throttle, params.reverse_throttle);
    }
}
