//! # Communications interface crate.
//!
//! Provides the types exchanged between the rover executive and the outside
//! world: telemetry coming in, demands going out, and camera frames in both
//! their wire and decoded forms. The executive core never parses wire data
//! itself, it consumes and produces these types only.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Demands sent from the executive to the vehicle
pub mod dems;

/// Camera frame formats and conversions
pub mod frame;

/// Telemetry sent from the vehicle to the executive
pub mod tm;
