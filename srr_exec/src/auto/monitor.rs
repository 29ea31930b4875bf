//! # Behaviour Monitors
//!
//! Watchdogs over the rover's recent history which catch the two classic
//! failure shapes of a reactive explorer: being physically stuck against
//! terrain, and circling the same patch of ground forever. Both monitors
//! latch when they trigger and stay latched until the recovery behaviour
//! declares itself finished, at which point a grace window stops the stale
//! pre-recovery history retriggering them immediately.
//!
//! Monitors only observe, they never command. The decision module reads the
//! latches and owns the response.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::warn;
use nalgebra::Vector2;
use serde::Deserialize;
use std::collections::VecDeque;

// Internal
use util::maths;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for [`StuckMonitor`].
#[derive(Debug, Clone, Deserialize)]
pub struct StuckMonitorParams {
    /// Maximum number of positions kept in the history window.
    pub window_len: usize,

    /// Minimum number of positions before the spread test may trigger.
    pub min_samples: usize,

    /// Spread (2D standard deviation) below which a full window of
    /// positions means the rover is stuck, metres.
    pub pos_std_dev_max_m: f64,

    /// Commanded throttle magnitude above which the stall test is armed.
    pub throttle_min: f64,

    /// Speed magnitude below which the rover counts as not moving, metres
    /// per second.
    pub stall_vel_max_mps: f64,

    /// How long a stall must persist before triggering, seconds.
    pub stall_time_s: f64,

    /// Grace window after a recovery completes, seconds.
    pub grace_s: f64,
}

/// Parameters for [`LoopMonitor`].
#[derive(Debug, Clone, Deserialize)]
pub struct LoopMonitorParams {
    /// Number of steer demands which must share a sign to trigger.
    pub window_len: usize,

    /// Steer magnitudes at or below this are neutral and break the run,
    /// degrees. Sized to sit above the wall hug bias so that straight
    /// driving along a wall never reads as circling.
    pub steer_deadband_deg: f64,

    /// Grace window after a recovery completes, seconds.
    pub grace_s: f64,
}

/// Detects the rover being physically stuck.
///
/// Two independent tests feed one latch: a slow test on the spread of the
/// recent position history, and a fast test on commanded throttle producing
/// no speed.
pub struct StuckMonitor {
    params: StuckMonitorParams,

    /// Recent positions, oldest first.
    positions: VecDeque<Vector2<f64>>,

    /// Vehicle time at which the current stall began, `None` while moving.
    stall_start_s: Option<f64>,

    /// Consecutive cycles of the current stall.
    stall_cycles: u32,

    triggered: bool,

    grace_until_s: f64,
}

/// Detects the rover circling the same ground indefinitely, from a long
/// uninterrupted run of same-signed steer demands.
pub struct LoopMonitor {
    params: LoopMonitorParams,

    /// Recent steer demands, oldest first.
    steers_deg: VecDeque<f64>,

    triggered: bool,

    /// Sign of the steer run which triggered, `+1.0` for left.
    dominant_sign: f64,

    grace_until_s: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl StuckMonitor {
    pub fn new(params: StuckMonitorParams) -> Self {
        Self {
            positions: VecDeque::with_capacity(params.window_len),
            params,
            stall_start_s: None,
            stall_cycles: 0,
            triggered: false,
            grace_until_s: 0.0,
        }
    }

    /// Feed one cycle of observations.
    ///
    /// `suppress` holds the trigger while the decision module is running a
    /// deliberately slow behaviour (stalking, pickup, recoveries). History
    /// still accumulates during suppression.
    pub fn update(
        &mut self,
        time_s: f64,
        pos_m: &Vector2<f64>,
        throttle_cmd: f64,
        vel_mps: f64,
        suppress: bool,
    ) {
        self.positions.push_back(*pos_m);
        while self.positions.len() > self.params.window_len {
            self.positions.pop_front();
        }

        // Stall tracking runs regardless of suppression so that a stall
        // which began during a recovery is seen as soon as suppression lifts
        if throttle_cmd.abs() > self.params.throttle_min
            && vel_mps.abs() < self.params.stall_vel_max_mps
        {
            self.stall_cycles += 1;
            if self.stall_start_s.is_none() {
                self.stall_start_s = Some(time_s);
            }
        } else {
            self.stall_cycles = 0;
            self.stall_start_s = None;
        }

        if self.triggered || suppress || time_s < self.grace_until_s {
            return;
        }

        if let Some(start_s) = self.stall_start_s {
            if time_s - start_s > self.params.stall_time_s {
                warn!(
                    "Stuck: throttle {:.2} held for {:.1} s ({} cycles) with no motion",
                    throttle_cmd,
                    time_s - start_s,
                    self.stall_cycles
                );
                self.triggered = true;
                return;
            }
        }

        if self.positions.len() >= self.params.min_samples {
            if let Some(spread) = self.position_spread_m() {
                if spread < self.params.pos_std_dev_max_m {
                    warn!(
                        "Stuck: position spread {:.2} m over the last {} cycles",
                        spread,
                        self.positions.len()
                    );
                    self.triggered = true;
                }
            }
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered
    }

    /// Drop the latch after a completed recovery, wiping the history and
    /// arming the grace window.
    pub fn clear(&mut self, time_s: f64) {
        self.triggered = false;
        self.positions.clear();
        self.stall_start_s = None;
        self.stall_cycles = 0;
        self.grace_until_s = time_s + self.params.grace_s;
    }

    /// 2D standard deviation of the position window, the root sum square of
    /// the per-axis deviations.
    fn position_spread_m(&self) -> Option<f64> {
        let xs: Vec<f64> = self.positions.iter().map(|p| p[0]).collect();
        let ys: Vec<f64> = self.positions.iter().map(|p| p[1]).collect();

        let sx = maths::std_dev(&xs)?;
        let sy = maths::std_dev(&ys)?;

        Some((sx * sx + sy * sy).sqrt())
    }
}

impl LoopMonitor {
    pub fn new(params: LoopMonitorParams) -> Self {
        Self {
            steers_deg: VecDeque::with_capacity(params.window_len),
            params,
            triggered: false,
            dominant_sign: 0.0,
            grace_until_s: 0.0,
        }
    }

    /// Feed one cycle's steer demand.
    pub fn update(&mut self, time_s: f64, steer_deg: f64, suppress: bool) {
        self.steers_deg.push_back(steer_deg);
        while self.steers_deg.len() > self.params.window_len {
            self.steers_deg.pop_front();
        }

        if self.triggered || suppress || time_s < self.grace_until_s {
            return;
        }

        if self.steers_deg.len() < self.params.window_len {
            return;
        }

        let deadband = self.params.steer_deadband_deg;
        let all_left = self.steers_deg.iter().all(|s| *s > deadband);
        let all_right = self.steers_deg.iter().all(|s| *s < -deadband);

        if all_left || all_right {
            self.dominant_sign = if all_left { 1.0 } else { -1.0 };
            warn!(
                "Perpetual loop: {} cycles of uninterrupted {} steer",
                self.steers_deg.len(),
                if all_left { "left" } else { "right" }
            );
            self.triggered = true;
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered
    }

    /// Sign of the steer run which latched the monitor, `+1.0` for left.
    pub fn dominant_sign(&self) -> f64 {
        self.dominant_sign
    }

    /// Drop the latch after a completed recovery, wiping the history and
    /// arming the grace window.
    pub fn clear(&mut self, time_s: f64) {
        self.triggered = false;
        self.steers_deg.clear();
        self.grace_until_s = time_s + self.params.grace_s;
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
