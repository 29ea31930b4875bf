//! # Rover library.
//!
//! This library allows other crates in the workspace (and the integration
//! test binaries) to access items defined inside the rover executive crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Autonomy module - perception, mapping, monitoring and the decision state machine
pub mod auto;

/// Rover state - the single mutable aggregate threaded through the autonomy chain
pub mod rover_state;

/// Simulation module - noise-generated world, camera model and rover kinematics
pub mod sim;
