//! # Decision Module Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use super::{
    forward::ForwardParams, loop_recovery::LoopRecoveryParams, pickup::PickupParams,
    stalk::StalkParams, stop::StopParams, unstuck::UnstuckParams,
};
use crate::auto::monitor::{LoopMonitorParams, StuckMonitorParams};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct DecisionMgrParams {
    /// Radius about the home position inside which the mission may
    /// complete, metres.
    pub home_radius_m: f64,

    /// Attitude excursion beyond which the safety stop preempts the current
    /// mode, degrees.
    pub attitude_fallback_tol_deg: f64,

    /// Rock centroid distance below which a pursuit may begin, warped
    /// pixels.
    pub capture_radius_px: f64,

    /// Radius about a recorded collection inside which rock detections are
    /// treated as already collected, metres.
    pub collected_radius_m: f64,

    /// Brake applied on guard redirects and in the terminal mode.
    pub fallback_brake: f64,

    pub forward: ForwardParams,

    pub stop: StopParams,

    pub unstuck: UnstuckParams,

    pub loop_recovery: LoopRecoveryParams,

    pub stalk: StalkParams,

    pub pickup: PickupParams,

    pub stuck_monitor: StuckMonitorParams,

    pub loop_monitor: LoopMonitorParams,
}
