//! Utility library for the Sample Return Rover software.
//!
//! Everything in here is generic support code with no knowledge of the rover
//! itself: session management, logging, parameter loading, maths helpers, CSV
//! archiving, the cyclic module trait and a quadtree spatial index.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod archive;
pub mod host;
pub mod logger;
pub mod maths;
pub mod module;
pub mod params;
pub mod quadtree;
pub mod session;
pub mod time;
