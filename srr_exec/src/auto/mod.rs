//! # Autonomy module
//!
//! Everything between a telemetry record arriving and the demands leaving
//! lives under this module:
//!
//! - [`per`] - Perception: perspective unwarp, terrain segmentation and the
//!   steering statistics.
//! - [`map`] - The probabilistic world map the detections accumulate into.
//! - [`monitor`] - Stuck and loop watchdogs over the recent history.
//! - [`decision`] - The reactive state machine producing the demands.
//!
//! [`AutoMgr`] is the facade the executive drives: one [`AutoMgr::step`]
//! per telemetry record runs the full perception to decision chain over the
//! shared [`RoverState`].

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod decision;
pub mod map;
pub mod monitor;
pub mod per;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use image::RgbImage;
use serde::Serialize;
use thiserror::Error;

// Internal
use self::decision::{DecisionMgr, DecisionStatusReport};
use self::per::{PerError, PerMgr, PerStatusReport};
use crate::rover_state::RoverState;
use comms_if::{
    dems::RoverDems,
    tm::{RoverTm, TmError},
};
use util::params::LoadError;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Autonomy manager, the facade over the perception to decision chain.
pub struct AutoMgr {
    per: PerMgr,

    decision: DecisionMgr,

    /// Shared rover state, exclusively owned by the cycle.
    state: RoverState,

    /// Time of the last accepted telemetry record, for the monotonicity
    /// check.
    last_tm_time_s: Option<f64>,
}

/// Status of one autonomy cycle.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AutoStatusReport {
    pub per: PerStatusReport,

    pub decision: DecisionStatusReport,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur in the autonomy chain.
#[derive(Debug, Error)]
pub enum AutoMgrError {
    #[error("Perception error: {0}")]
    PerError(#[from] PerError),

    #[error("Could not load parameters: {0}")]
    ParamLoadError(#[from] LoadError),

    #[error("Telemetry rejected: {0}")]
    InvalidTm(#[from] TmError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl AutoMgr {
    /// Initialise the full autonomy chain from parameter files.
    pub fn init(
        per_params_file: &str,
        decision_params_file: &str,
    ) -> Result<Self, AutoMgrError> {
        let per = PerMgr::init(per_params_file)?;
        let decision = DecisionMgr::init(decision_params_file)?;
        Ok(Self::assemble(per, decision))
    }

    /// Build the chain from in memory parameters.
    pub fn from_params(
        per_params: per::PerMgrParams,
        decision_params: decision::DecisionMgrParams,
    ) -> Result<Self, AutoMgrError> {
        let per = PerMgr::from_params(per_params)?;
        let decision = DecisionMgr::from_params(decision_params);
        Ok(Self::assemble(per, decision))
    }

    fn assemble(per: PerMgr, decision: DecisionMgr) -> Self {
        let state = RoverState::new(&per.params().world_map);
        Self {
            per,
            decision,
            state,
            last_tm_time_s: None,
        }
    }

    /// The shared rover state, for end of session reporting.
    pub fn state(&self) -> &RoverState {
        &self.state
    }

    /// Run one full autonomy cycle.
    ///
    /// The telemetry record is checked before any state is touched, so a
    /// rejected record leaves the state exactly as the previous cycle left
    /// it. The caller must answer an error with neutral demands.
    pub fn step(
        &mut self,
        tm: &RoverTm,
        frame: &RgbImage,
    ) -> Result<(RoverDems, AutoStatusReport), AutoMgrError> {
        tm.validate()?;
        if let Some(prev_time_s) = self.last_tm_time_s {
            if tm.time_s <= prev_time_s {
                return Err(TmError::NonMonotonicTime {
                    time_s: tm.time_s,
                    prev_time_s,
                }
                .into());
            }
        }
        self.last_tm_time_s = Some(tm.time_s);

        self.state.tick_start(tm);
        let per = self.per.step(frame, &mut self.state)?;
        let (dems, decision) = self.decision.step(&mut self.state);

        Ok((dems, AutoStatusReport { per, decision }))
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use image::Rgb;

    /// Loads the flight parameter files, which doubles as a check that they
    /// stay in step with the structs.
    fn flight_mgr() -> AutoMgr {
        AutoMgr::init("per_mgr.toml", "decision_mgr.toml")
            .expect("flight parameter files failed to load")
    }

    fn level_tm(time_s: f64) -> RoverTm {
        let mut tm = RoverTm::default();
        tm.time_s = time_s;
        tm.pos_m = [100.0, 85.0];
        tm.samples_remaining = 6;
        tm
    }

    fn bright_frame() -> RgbImage {
        RgbImage::from_pixel(320, 160, Rgb([200u8, 200u8, 200u8]))
    }

    #[test]
    fn test_nominal_cycle() {
        let mut mgr = flight_mgr();

        let (dems, report) = mgr
            .step(&level_tm(0.1), &bright_frame())
            .expect("nominal cycle failed");

        assert!(dems.steer_deg.abs() <= decision::STEER_LIMIT_DEG);
        assert!(dems.throttle.is_finite());
        assert!(report.per.nav_count > 0);
        assert!(report.per.map_updated);
        assert_eq!(mgr.state().world_map.num_updates(), 1);
    }

    #[test]
    fn test_invalid_tm_leaves_state_untouched() {
        let mut mgr = flight_mgr();
        mgr.step(&level_tm(0.1), &bright_frame()).unwrap();
        let time_before = mgr.state().time_s;

        let mut tm = level_tm(0.2);
        tm.speed_mps = f64::NAN;
        let result = mgr.step(&tm, &bright_frame());

        assert!(matches!(result, Err(AutoMgrError::InvalidTm(_))));
        assert_eq!(mgr.state().time_s, time_before);
    }

    #[test]
    fn test_non_monotonic_time_rejected() {
        let mut mgr = flight_mgr();
        mgr.step(&level_tm(1.0), &bright_frame()).unwrap();

        let result = mgr.step(&level_tm(0.9), &bright_frame());
        assert!(matches!(
            result,
            Err(AutoMgrError::InvalidTm(TmError::NonMonotonicTime { .. }))
        ));

        // And the next good record is accepted
        assert!(mgr.step(&level_tm(1.1), &bright_frame()).is_ok());
    }

    #[test]
    fn test_wrong_frame_size_is_an_error() {
        let mut mgr = flight_mgr();
        let frame = RgbImage::from_pixel(100, 100, Rgb([200u8, 200u8, 200u8]));

        let result = mgr.step(&level_tm(0.1), &frame);
        assert!(matches!(
            result,
            Err(AutoMgrError::PerError(PerError::UnexpectedFrameSize { .. }))
        ));
    }
}
