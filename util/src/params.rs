//! Generic parameter loading
//!
//! All tunable values live in TOML files under the `params` directory, one
//! file per module, deserialised into that module's `Params` struct at
//! initialisation. Keeping numbers out of the source makes retuning a matter
//! of editing a text file rather than recompiling.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::de::DeserializeOwned;
use std::fs::read_to_string;
use std::path::PathBuf;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(
        "Could not find \"{0}\" in ./params, ../params or ${}/params",
        crate::host::SW_ROOT_ENV_VAR
    )]
    FileNotFound(String),

    #[error("Cannot load the parameter file: {0}")]
    FileLoadError(#[from] std::io::Error),

    #[error("Cannot parse the parameter file: {0}")]
    DeserialiseError(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Load a parameter file into a deserialisable parameter struct.
///
/// Relative paths are resolved against `./params` first, then `../params`
/// (for runs from inside a workspace member), then against the `params`
/// directory under the software root (see [`crate::host`]), so that the
/// executive can be run both from the repo root and from an installed
/// location. Absolute paths are used as given.
pub fn load<P>(param_file_path: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned,
{
    let path = resolve(param_file_path).ok_or_else(|| {
        LoadError::FileNotFound(param_file_path.to_string())
    })?;

    let params_str = read_to_string(path)?;

    Ok(toml::from_str(params_str.as_str())?)
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Resolve a parameter file path against the search locations, returning
/// `None` if the file exists in none of them.
fn resolve(param_file_path: &str) -> Option<PathBuf> {
    let given = PathBuf::from(param_file_path);

    if given.is_absolute() {
        return if given.exists() { Some(given) } else { None };
    }

    for base in &["params", "../params"] {
        let mut local = PathBuf::from(base);
        local.push(&given);
        if local.exists() {
            return Some(local);
        }
    }

    if let Some(mut root) = crate::host::get_sw_root() {
        root.push("params");
        root.push(&given);
        if root.exists() {
            return Some(root);
        }
    }

    None
}
