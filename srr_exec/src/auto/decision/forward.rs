//! # Forward mode
//!
//! Default driving behaviour. Throttle comes from the amount of navigable
//! terrain in the near field, steer tracks the mean navigable bearing with
//! a small wall hugging bias, and when the view closes up the rover brakes
//! out into [`Stop`](super::stop::Stop).

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use serde::Deserialize;

// Internal
use super::{Mode, StepOutput, STEER_LIMIT_DEG};
use crate::rover_state::RoverState;
use comms_if::dems::RoverDems;
use util::maths;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ForwardParams {
    /// Throttle ladder, the rung with the highest matching count wins.
    pub throttle_tiers: Vec<ThrottleTier>,

    /// Navigable count below which the rover brakes while still steering
    /// towards the best bearing.
    pub decel_nav_count: usize,

    /// Navigable count below which the view is considered closed and the
    /// rover hands over to Stop.
    pub stop_nav_count: usize,

    /// Brake applied when decelerating or stopping.
    pub brake: f64,

    /// Speed at which the throttle is cut, metres per second.
    pub max_vel_mps: f64,

    /// Bias added to the steer demand so open ground is followed along one
    /// edge rather than down the middle, degrees, positive left.
    pub wall_hug_bias_deg: f64,

    /// Steer change in one cycle above which the throttle is halved,
    /// degrees.
    pub steer_delta_slow_deg: f64,
}

/// One rung of the throttle ladder.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ThrottleTier {
    /// Minimum navigable count for this rung.
    pub min_nav_count: usize,

    /// Throttle applied at this rung.
    pub throttle: f64,
}

/// Forward mode of the decision module.
///
/// Possible transitions:
/// - Stop, when the navigable count falls below the stop threshold
#[derive(Debug)]
pub struct Forward {
    /// Steer demand of the previous cycle, for the slew slowdown.
    last_steer_deg: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Forward {
    pub fn new() -> Self {
        Self { last_steer_deg: 0.0 }
    }

    pub fn step(&mut self, params: &ForwardParams, state: &mut RoverState) -> StepOutput {
        let nav_count = state.nav_count();
        let mut dems = RoverDems::neutral();

        if nav_count < params.stop_nav_count {
            // Nowhere left to go, brake straight and let Stop spin for a
            // way out
            dems.brake = params.brake;
            self.last_steer_deg = 0.0;
            return StepOutput {
                dems,
                next_mode: Some(Mode::Stop),
            };
        }

        // Steer to the mean navigable bearing with the wall hug bias
        let steer_deg = match state.mean_nav_bearing_deg() {
            Some(bearing_deg) => maths::clamp(
                bearing_deg + params.wall_hug_bias_deg,
                -STEER_LIMIT_DEG,
                STEER_LIMIT_DEG,
            ),
            None => 0.0,
        };
        dems.steer_deg = steer_deg;

        if nav_count < params.decel_nav_count {
            // View is closing, wash off speed while still steering
            dems.brake = params.brake;
        } else if let Some(tier) = highest_tier(&params.throttle_tiers, nav_count) {
            if state.vel_mps < params.max_vel_mps {
                dems.throttle = tier.throttle;

                // A hard steer slew at speed distorts the attitude, soften
                if (steer_deg - self.last_steer_deg).abs() > params.steer_delta_slow_deg {
                    dems.throttle *= 0.5;
                }
            }
        }
        // Between the stop count and the first rung the rover coasts

        self.last_steer_deg = steer_deg;

        StepOutput {
            dems,
            next_mode: None,
        }
    }
}

/// The ladder rung with the highest count not exceeding `nav_count`.
fn highest_tier(tiers: &[ThrottleTier], nav_count: usize) -> Option<&ThrottleTier> {
    tiers
        .iter()
        .filter(|t| nav_count >= t.min_nav_count)
        .max_by_key(|t| t.min_nav_count)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::auto::map::WorldMapParams;
    use comms_if::tm::RoverTm;

    fn forward_params() -> ForwardParams {
        ForwardParams {
            throttle_tiers: vec![
                ThrottleTier {
                    min_nav_count: 500,
                    throttle: 0.2,
                },
                ThrottleTier {
                    min_nav_count: 560,
                    throttle: 0.4,
                },
                ThrottleTier {
                    min_nav_count: 620,
                    throttle: 0.8,
                },
            ],
            decel_nav_count: 200,
            stop_nav_count: 50,
            brake: 10.0,
            max_vel_mps: 2.0,
            wall_hug_bias_deg: 2.0,
            steer_delta_slow_deg: 8.0,
        }
    }

    /// State with `nav_count` navigable samples spread evenly about the
    /// given mean bearing.
    fn state_with_nav(nav_count: usize, mean_bearing_rad: f64, vel_mps: f64) -> RoverState {
        let mut state = RoverState::new(&WorldMapParams {
            num_cells: 200,
            cell_size_m: 1.0,
            attitude_tol_deg: 0.5,
        });

        let mut tm = RoverTm::default();
        tm.time_s = 1.0;
        tm.speed_mps = vel_mps;
        state.tick_start(&tm);
        state.vel_mps = vel_mps;

        for i in 0..nav_count {
            let offset = 0.2 * ((i as f64 / nav_count.max(1) as f64) - 0.5);
            state.nav_angles_rad.push(mean_bearing_rad + offset);
            state.nav_dists_px.push(10.0 + i as f64 * 0.01);
        }

        state
    }

    #[test]
    fn test_open_view_accelerates() {
        let params = forward_params();
        let mut forward = Forward::new();
        let mut state = state_with_nav(600, 0.0, 1.0);

        let out = forward.step(&params, &mut state);

        assert_eq!(out.dems.throttle, 0.4);
        assert_eq!(out.dems.brake, 0.0);
        assert!(out.next_mode.is_none());
        // Mean bearing zero, so only the wall hug bias remains
        assert!((out.dems.steer_deg - params.wall_hug_bias_deg).abs() < 1e-9);
    }

    #[test]
    fn test_closed_view_brakes_into_stop() {
        let params = forward_params();
        let mut forward = Forward::new();
        let mut state = state_with_nav(10, 0.0, 1.5);

        let out = forward.step(&params, &mut state);

        assert_eq!(out.dems.throttle, 0.0);
        assert_eq!(out.dems.brake, params.brake);
        assert_eq!(out.dems.steer_deg, 0.0);
        assert_eq!(out.next_mode, Some(Mode::Stop));
    }

    #[test]
    fn test_closing_view_decelerates_while_steering() {
        let params = forward_params();
        let mut forward = Forward::new();
        // Mean bearing 0.1 rad left of centre
        let mut state = state_with_nav(180, 0.1, 1.5);

        let out = forward.step(&params, &mut state);

        assert_eq!(out.dems.throttle, 0.0);
        assert_eq!(out.dems.brake, params.brake);
        assert!(out.dems.steer_deg > params.wall_hug_bias_deg);
        assert!(out.next_mode.is_none());
    }

    #[test]
    fn test_middling_view_coasts() {
        let params = forward_params();
        let mut forward = Forward::new();
        let mut state = state_with_nav(300, 0.0, 1.0);

        let out = forward.step(&params, &mut state);

        assert_eq!(out.dems.throttle, 0.0);
        assert_eq!(out.dems.brake, 0.0);
        assert!(out.next_mode.is_none());
    }

    #[test]
    fn test_throttle_cut_at_max_velocity() {
        let params = forward_params();
        let mut forward = Forward::new();
        let mut state = state_with_nav(620, 0.0, 2.3);

        let out = forward.step(&params, &mut state);

        assert_eq!(out.dems.throttle, 0.0);
        assert_eq!(out.dems.brake, 0.0);
    }

    #[test]
    fn test_hard_steer_slew_softens_throttle() {
        let params = forward_params();
        let mut forward = Forward::new();

        // First cycle steers hard left and saturates the clamp
        let mut state = state_with_nav(600, 0.4, 1.0);
        let out = forward.step(&params, &mut state);
        assert_eq!(out.dems.steer_deg, STEER_LIMIT_DEG);

        // Second cycle swings right by more than the slew limit
        let mut state = state_with_nav(600, -0.2, 1.0);
        let out = forward.step(&params, &mut state);
        assert_eq!(out.dems.throttle, 0.2);
    }

    #[test]
    fn test_empty_view_is_safe() {
        let params = forward_params();
        let mut forward = Forward::new();
        let mut state = state_with_nav(0, 0.0, 0.5);

        let out = forward.step(&params, &mut state);

        // No bearing available must never produce a non finite steer
        assert!(out.dems.steer_deg.is_finite());
        assert_eq!(out.next_mode, Some(Mode::Stop));
    }
}
