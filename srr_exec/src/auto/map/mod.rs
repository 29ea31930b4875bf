//! # Map Module
//!
//! Provides the generic layered grid map and the world map accumulator
//! built on top of it.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Generic layered map over uniform square cells
pub mod grid_map;

/// Accumulated evidence map of the world
pub mod world_map;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use grid_map::{GridMap, GridMapError};
pub use world_map::{WorldMap, WorldMapLayer, WorldMapParams, WorldMapStats};
