//! Host environment utility functions

use std::path::PathBuf;

/// Environment variable naming the root of the software tree. Parameter
/// files and session directories are resolved relative to this root when it
/// is set.
pub const SW_ROOT_ENV_VAR: &str = "SRR_SW_ROOT";

/// Retrieve the software root directory from the environment, or `None` if
/// the variable is not set. Callers are expected to fall back to the current
/// working directory.
pub fn get_sw_root() -> Option<PathBuf> {
    std::env::var(SW_ROOT_ENV_VAR).ok().map(PathBuf::from)
}
