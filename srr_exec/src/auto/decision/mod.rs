//! # Decision module
//!
//! The [`DecisionMgr`] owns the reactive state machine which turns the
//! perception products in [`RoverState`] into locomotion demands. The
//! machine is broken down into a number of modes:
//!
//! - `Forward` - Default driving, throttle and steer from the navigable
//!   view ahead.
//! - `Stop` - Brake to rest and spin for a way out of a closed view.
//! - `Unstuck` - Scripted recovery from the stuck monitor latching.
//! - `LoopRecovery` - Counter steer recovery from the loop monitor
//!   latching.
//! - `Stalk` - Pursuit of a visible sample rock.
//! - `Pickup` - Hold for the pickup mechanism and record the collection.
//! - `Homed` - Terminal parked state once the mission is complete.
//!
//! A set of guards is evaluated before the current mode every cycle, in
//! strict priority order: mission completion, attitude safety, the stuck
//! and loop latches, then sample capture. At most one mode transition
//! happens per cycle, and every steer demand leaving the module is clamped
//! to the vehicle limit.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod forward;
mod loop_recovery;
mod params;
mod pickup;
mod stalk;
mod stop;
mod unstuck;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{info, warn};
use serde::Serialize;
use std::fmt;

// Internal
use crate::auto::monitor::{LoopMonitor, StuckMonitor};
use crate::rover_state::RoverState;
use comms_if::dems::RoverDems;
use util::{maths, params::LoadError};

use self::{
    forward::Forward, loop_recovery::LoopRecovery, pickup::Pickup, stalk::Stalk, stop::Stop,
    unstuck::Unstuck,
};

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use params::DecisionMgrParams;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Hard limit on every steer demand leaving the decision module, degrees.
pub const STEER_LIMIT_DEG: f64 = 15.0;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Mode of the decision state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Mode {
    Forward,
    Stop,
    Unstuck,
    LoopRecovery,
    Stalk,
    Pickup,
    Homed,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Output of one mode step.
pub struct StepOutput {
    /// Demands to send to the vehicle this cycle.
    pub dems: RoverDems,

    /// Mode to enter for the next cycle, `None` to stay put.
    pub next_mode: Option<Mode>,
}

/// Status report produced by the decision module each cycle.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DecisionStatusReport {
    /// Mode in force at the end of the cycle.
    pub mode: Mode,

    pub stuck_latched: bool,

    pub loop_latched: bool,

    pub samples_collected: u32,

    /// Distance to the home position, `None` before the first telemetry
    /// record.
    pub dist_to_home_m: Option<f64>,
}

/// Decision manager.
///
/// Holds the mode structs and behaviour monitors, and steps the machine
/// once per cycle with exclusive access to the [`RoverState`].
pub struct DecisionMgr {
    params: DecisionMgrParams,

    stuck: StuckMonitor,

    loop_mon: LoopMonitor,

    forward: Forward,
    stop: Stop,
    unstuck: Unstuck,
    loop_recovery: LoopRecovery,
    stalk: Stalk,
    pickup: Pickup,

    /// Steer demand issued last cycle, fed to the loop monitor.
    last_steer_deg: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Mode {
    fn default() -> Self {
        Mode::Forward
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Mode::Forward => "FORWARD",
            Mode::Stop => "STOP",
            Mode::Unstuck => "UNSTUCK",
            Mode::LoopRecovery => "LOOP_RECOVERY",
            Mode::Stalk => "STALK",
            Mode::Pickup => "PICKUP",
            Mode::Homed => "HOMED",
        };
        write!(f, "{}", name)
    }
}

impl DecisionMgr {
    /// Initialise the manager from a parameter file.
    pub fn init(params_file: &str) -> Result<Self, LoadError> {
        Ok(Self::from_params(util::params::load(params_file)?))
    }

    /// Build the manager from in memory parameters.
    pub fn from_params(params: DecisionMgrParams) -> Self {
        Self {
            stuck: StuckMonitor::new(params.stuck_monitor.clone()),
            loop_mon: LoopMonitor::new(params.loop_monitor.clone()),
            forward: Forward::new(),
            stop: Stop::new(),
            unstuck: Unstuck::new(),
            loop_recovery: LoopRecovery::new(),
            stalk: Stalk::new(),
            pickup: Pickup::new(),
            last_steer_deg: 0.0,
            params,
        }
    }

    pub fn params(&self) -> &DecisionMgrParams {
        &self.params
    }

    /// Step the state machine once.
    ///
    /// Never fails: every branch resolves to a defined demand set, with
    /// braking as the conservative default.
    pub fn step(&mut self, state: &mut RoverState) -> (RoverDems, DecisionStatusReport) {
        let time_s = state.time_s;

        // Monitors watch every cycle, suppressed while a deliberately slow
        // behaviour is running and once parked
        let suppress = matches!(
            state.mode,
            Mode::Stalk | Mode::Pickup | Mode::Unstuck | Mode::LoopRecovery | Mode::Homed
        );
        self.stuck.update(
            time_s,
            &state.pos_m,
            state.throttle_echo,
            state.vel_mps,
            suppress,
        );
        self.loop_mon.update(time_s, self.last_steer_deg, suppress);

        let output = match self.guarded_redirect(state) {
            Some(output) => output,
            None => self.dispatch(state),
        };

        // At most one mode transition per cycle
        if let Some(next) = output.next_mode {
            self.arm(next, time_s);
            state.set_mode(next);
        }

        let mut dems = output.dems;
        dems.steer_deg = maths::clamp(dems.steer_deg, -STEER_LIMIT_DEG, STEER_LIMIT_DEG);
        self.last_steer_deg = dems.steer_deg;

        let report = DecisionStatusReport {
            mode: state.mode,
            stuck_latched: self.stuck.is_triggered(),
            loop_latched: self.loop_mon.is_triggered(),
            samples_collected: state.samples_collected,
            dist_to_home_m: state.dist_to_home_m(),
        };

        (dems, report)
    }

    /// Evaluate the priority guards, returning the redirected output if one
    /// fires.
    fn guarded_redirect(&mut self, state: &mut RoverState) -> Option<StepOutput> {
        // Terminal mode, park and ignore everything else
        if state.mode == Mode::Homed {
            return Some(self.brake_output(None));
        }

        // Mission complete: all samples aboard and back within the home
        // radius
        if state.samples_to_find > 0 && state.samples_collected >= state.samples_to_find {
            if let Some(dist_m) = state.dist_to_home_m() {
                if dist_m <= self.params.home_radius_m {
                    info!(
                        "All {} sample(s) collected and home is {:.1} m away, mission complete",
                        state.samples_to_find, dist_m
                    );
                    return Some(self.brake_output(Some(Mode::Homed)));
                }
            }
        }

        // An attitude excursion forces a braking stop, except during a
        // pickup where the rover is already holding still
        let tol = self.params.attitude_fallback_tol_deg;
        if state.mode != Mode::Pickup
            && (!maths::near_level_deg(state.roll_deg, tol)
                || !maths::near_level_deg(state.pitch_deg, tol))
        {
            if state.mode != Mode::Stop {
                warn!(
                    "Attitude excursion (roll {:.1} deg, pitch {:.1} deg), forcing a stop",
                    state.roll_deg, state.pitch_deg
                );
                return Some(self.brake_output(Some(Mode::Stop)));
            }
            return Some(self.brake_output(None));
        }

        // Stuck latch owns the vehicle until its recovery completes
        if self.stuck.is_triggered() && state.mode != Mode::Unstuck {
            return Some(self.brake_output(Some(Mode::Unstuck)));
        }

        // Likewise the loop latch
        if self.loop_mon.is_triggered() && state.mode != Mode::LoopRecovery {
            return Some(self.brake_output(Some(Mode::LoopRecovery)));
        }

        // A close, uncollected sample interrupts ordinary driving
        if matches!(state.mode, Mode::Forward | Mode::Stop) {
            if let Some(cand) = state.rock_candidate {
                if cand.dist_px < self.params.capture_radius_px
                    && !state
                        .collected_index
                        .any_within(&cand.pos_m, self.params.collected_radius_m)
                {
                    info!(
                        "Sample spotted {:.0} px away on bearing {:.1} deg, stalking",
                        cand.dist_px, cand.bearing_deg
                    );
                    return Some(self.brake_output(Some(Mode::Stalk)));
                }
            }
        }

        None
    }

    /// Step the current mode.
    fn dispatch(&mut self, state: &mut RoverState) -> StepOutput {
        match state.mode {
            Mode::Forward => self.forward.step(&self.params.forward, state),
            Mode::Stop => self.stop.step(&self.params.stop, state),
            Mode::Unstuck => self.unstuck.step(&self.params.unstuck, state, &mut self.stuck),
            Mode::LoopRecovery => {
                self.loop_recovery
                    .step(&self.params.loop_recovery, state, &mut self.loop_mon)
            }
            Mode::Stalk => self.stalk.step(&self.params.stalk, state),
            Mode::Pickup => self.pickup.step(&self.params.pickup, state),
            Mode::Homed => self.brake_output(None),
        }
    }

    /// Reset the incoming mode's per entry state.
    fn arm(&mut self, next: Mode, time_s: f64) {
        match next {
            Mode::Stop => self.stop.begin(),
            Mode::Unstuck => self.unstuck.begin(),
            Mode::Stalk => self.stalk.begin(time_s),
            Mode::Pickup => self.pickup.begin(time_s),
            _ => {}
        }
    }

    /// Braking output used by the guards and the terminal mode.
    fn brake_output(&self, next_mode: Option<Mode>) -> StepOutput {
        let mut dems = RoverDems::neutral();
        dems.brake = self.params.fallback_brake;
        StepOutput { dems, next_mode }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::forward::{ForwardParams, ThrottleTier};
    use super::loop_recovery::LoopRecoveryParams;
    use super::pickup::PickupParams;
    use super::stalk::StalkParams;
    use super::stop::StopParams;
    use super::unstuck::UnstuckParams;
    use super::*;
    use crate::auto::map::WorldMapParams;
    use crate::auto::monitor::{LoopMonitorParams, StuckMonitorParams};
    use crate::rover_state::RockCandidate;
    use comms_if::tm::RoverTm;
    use nalgebra::Vector2;

    const CYCLE_S: f64 = 0.1;

    fn mgr_params() -> DecisionMgrParams {
        DecisionMgrParams {
            home_radius_m: 3.0,
            attitude_fallback_tol_deg: 4.0,
            capture_radius_px: 50.0,
            collected_radius_m: 3.0,
            fallback_brake: 10.0,
            forward: ForwardParams {
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
            },
            stop: StopParams {
                settle_vel_mps: 0.2,
                brake: 10.0,
                go_nav_count: 500,
                resume_throttle: 0.2,
            },
            unstuck: UnstuckParams {
                brake_end_s: 2.0,
                probe_end_s: 6.0,
                reverse_end_s: 10.0,
                turn_end_s: 13.0,
                probe_throttle: 0.2,
                reverse_throttle: -0.3,
                go_nav_count: 500,
                brake: 10.0,
            },
            loop_recovery: LoopRecoveryParams {
                brake_time_s: 1.5,
                counter_steer_time_s: 3.0,
                brake: 10.0,
            },
            stalk: StalkParams {
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
            },
            pickup: PickupParams {
                await_timeout_s: 2.0,
                reverse_time_s: 1.5,
                reverse_throttle: -0.3,
                brake: 10.0,
            },
            stuck_monitor: StuckMonitorParams {
                window_len: 400,
                min_samples: 350,
                pos_std_dev_max_m: 1.0,
                throttle_min: 0.1,
                stall_vel_max_mps: 0.05,
                stall_time_s: 4.0,
                grace_s: 10.0,
            },
            loop_monitor: LoopMonitorParams {
                window_len: 240,
                steer_deadband_deg: 2.5,
                grace_s: 10.0,
            },
        }
    }

    fn fresh_state() -> RoverState {
        RoverState::new(&WorldMapParams {
            num_cells: 200,
            cell_size_m: 1.0,
            attitude_tol_deg: 0.5,
        })
    }

    /// Fill the near field with `count` navigable samples about the given
    /// bearing.
    fn fill_nav(state: &mut RoverState, count: usize, bearing_rad: f64) {
        for i in 0..count {
            state.nav_angles_rad.push(bearing_rad);
            state.nav_dists_px.push(10.0 + i as f64 * 0.01);
        }
    }

    #[test]
    fn test_stall_redirects_to_unstuck() {
        let mut mgr = DecisionMgr::from_params(mgr_params());
        let mut state = fresh_state();

        // Rover pushing against terrain: throttle echoed, no speed. The
        // stall test fires after its hold off and the guard redirects.
        let mut tm = RoverTm::default();
        tm.pos_m = [50.0, 50.0];
        tm.throttle_echo = 0.4;

        for i in 0..60 {
            tm.time_s = i as f64 * CYCLE_S;
            state.tick_start(&tm);
            fill_nav(&mut state, 600, 0.0);
            let (dems, report) = mgr.step(&mut state);

            if state.mode == Mode::Unstuck {
                assert!(report.stuck_latched);
                assert_eq!(dems.brake, mgr.params().fallback_brake);
                return;
            }
        }

        panic!("stall never redirected to Unstuck");
    }

    #[test]
    fn test_circling_redirects_to_loop_recovery() {
        let mut mgr = DecisionMgr::from_params(mgr_params());
        let mut state = fresh_state();

        // Rover driving a wide circle: moving well, but every steer demand
        // saturates left because the view is always better to that side
        let mut tm = RoverTm::default();
        tm.speed_mps = 1.5;
        tm.throttle_echo = 0.4;

        for i in 0..260 {
            let theta = i as f64 * 0.03;
            tm.time_s = i as f64 * CYCLE_S;
            tm.pos_m = [100.0 + 20.0 * theta.cos(), 100.0 + 20.0 * theta.sin()];
            state.tick_start(&tm);
            fill_nav(&mut state, 600, 0.35);
            let (_, report) = mgr.step(&mut state);

            if state.mode == Mode::LoopRecovery {
                assert!(report.loop_latched);
                assert!(i >= 240, "latched before the window could fill");
                return;
            }
        }

        panic!("circling never redirected to LoopRecovery");
    }

    #[test]
    fn test_mission_complete_parks_at_home() {
        let mut mgr = DecisionMgr::from_params(mgr_params());
        let mut state = fresh_state();

        let mut tm = RoverTm::default();
        tm.time_s = 0.1;
        tm.pos_m = [100.0, 85.0];
        tm.samples_remaining = 2;
        state.tick_start(&tm);

        // All samples aboard, still out of the home radius
        state.samples_collected = 2;
        tm.time_s = 0.2;
        tm.pos_m = [110.0, 85.0];
        state.tick_start(&tm);
        fill_nav(&mut state, 600, 0.0);
        mgr.step(&mut state);
        assert_ne!(state.mode, Mode::Homed);

        // Back within the radius
        tm.time_s = 0.3;
        tm.pos_m = [101.0, 85.0];
        state.tick_start(&tm);
        fill_nav(&mut state, 600, 0.0);
        let (dems, report) = mgr.step(&mut state);

        assert_eq!(state.mode, Mode::Homed);
        assert_eq!(dems.brake, mgr.params().fallback_brake);
        assert_eq!(report.mode, Mode::Homed);

        // Terminal: a later cycle with a wide open view stays parked
        tm.time_s = 0.4;
        state.tick_start(&tm);
        fill_nav(&mut state, 600, 0.0);
        let (dems, _) = mgr.step(&mut state);
        assert_eq!(state.mode, Mode::Homed);
        assert_eq!(dems.brake, mgr.params().fallback_brake);
        assert_eq!(dems.throttle, 0.0);
    }

    #[test]
    fn test_attitude_excursion_forces_stop() {
        let mut mgr = DecisionMgr::from_params(mgr_params());
        let mut state = fresh_state();

        let mut tm = RoverTm::default();
        tm.time_s = 0.1;
        tm.speed_mps = 1.8;
        tm.roll_deg = 6.0;
        state.tick_start(&tm);
        fill_nav(&mut state, 600, 0.0);

        let (dems, _) = mgr.step(&mut state);

        assert_eq!(state.mode, Mode::Stop);
        assert_eq!(dems.brake, mgr.params().fallback_brake);
        assert_eq!(dems.throttle, 0.0);

        // Wrapped angles near 360 are level and must not trip the guard
        let mut state = fresh_state();
        tm.roll_deg = 359.5;
        tm.pitch_deg = 0.5;
        state.tick_start(&tm);
        fill_nav(&mut state, 600, 0.0);
        mgr.step(&mut state);
        assert_ne!(state.mode, Mode::Stop);
    }

    #[test]
    fn test_close_sample_starts_stalk() {
        let mut mgr = DecisionMgr::from_params(mgr_params());
        let mut state = fresh_state();

        let mut tm = RoverTm::default();
        tm.time_s = 0.1;
        tm.pos_m = [50.0, 50.0];
        state.tick_start(&tm);
        fill_nav(&mut state, 600, 0.0);
        state.rock_candidate = Some(RockCandidate {
            pos_m: Vector2::new(53.0, 50.0),
            dist_px: 30.0,
            bearing_deg: 10.0,
        });

        mgr.step(&mut state);
        assert_eq!(state.mode, Mode::Stalk);
    }

    #[test]
    fn test_collected_sample_is_not_restalked() {
        let mut mgr = DecisionMgr::from_params(mgr_params());
        let mut state = fresh_state();

        let mut tm = RoverTm::default();
        tm.time_s = 0.1;
        tm.pos_m = [50.0, 50.0];
        state.tick_start(&tm);
        fill_nav(&mut state, 600, 0.0);

        // A collection already recorded right next to the candidate
        state.collected_index.insert(Vector2::new(53.5, 50.0));
        state.rock_candidate = Some(RockCandidate {
            pos_m: Vector2::new(53.0, 50.0),
            dist_px: 30.0,
            bearing_deg: 10.0,
        });

        mgr.step(&mut state);
        assert_eq!(state.mode, Mode::Forward);
    }

    #[test]
    fn test_distant_sample_does_not_interrupt() {
        let mut mgr = DecisionMgr::from_params(mgr_params());
        let mut state = fresh_state();

        let mut tm = RoverTm::default();
        tm.time_s = 0.1;
        state.tick_start(&tm);
        fill_nav(&mut state, 600, 0.0);
        state.rock_candidate = Some(RockCandidate {
            pos_m: Vector2::new(8.0, 0.0),
            dist_px: 80.0,
            bearing_deg: 0.0,
        });

        mgr.step(&mut state);
        assert_eq!(state.mode, Mode::Forward);
    }

    #[test]
    fn test_steer_always_clamped() {
        let mut mgr = DecisionMgr::from_params(mgr_params());
        let mut state = fresh_state();

        let mut tm = RoverTm::default();
        tm.time_s = 0.1;
        state.tick_start(&tm);
        // Mean bearing far beyond the limit
        fill_nav(&mut state, 600, 1.2);

        let (dems, _) = mgr.step(&mut state);
        assert!(dems.steer_deg <= STEER_LIMIT_DEG);
        assert!(dems.steer_deg >= -STEER_LIMIT_DEG);
    }
}
