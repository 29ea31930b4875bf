//! Struct archiving functionality
//!
//! To add archiving functionality to a struct implement the `Archived` trait.
//! Archives are CSV files under the session's `arch` directory, one row per
//! cycle, which keeps post-run analysis a matter of loading a CSV rather than
//! scraping logs.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
pub use csv::Writer;
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::path::Path;
use thiserror::Error;

// Internal imports
use crate::session::Session;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An object used to write CSV archive files.
#[derive(Default)]
pub struct Archiver {
    writer: Option<Writer<File>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error which can occur while writing an archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Cannot create the archive file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Cannot serialise the record: {0}")]
    SerialiseError(#[from] csv::Error),

    #[error("The archiver has not been initialised with a file")]
    NotInitialised,
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A trait which enables a struct to be archived as a timestamped csv.
///
/// To implement this trait, the struct shall have an `Archiver` member which
/// shall be ignored by Serde using `#[serde(skip_serializing)]`. The archiver
/// member shall be setup in the struct's `init` or `new` functions.
pub trait Archived {
    /// Write the archives for this struct
    fn write(&mut self) -> Result<(), ArchiveError>;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Archiver {
    /// Create a new archiver from a particular path relative to the session's
    /// archive root.
    pub fn from_path<P: AsRef<Path>>(
        session: &Session,
        path: P,
    ) -> Result<Self, ArchiveError> {
        let mut session_path = session.arch_root.clone();
        session_path.push(path);

        // Create the file if it does not exist
        File::create(&session_path)?;

        // Open the file in append mode
        let file = OpenOptions::new().append(true).open(session_path)?;

        let writer = WriterBuilder::new().has_headers(true).from_writer(file);

        Ok(Self {
            writer: Some(writer),
        })
    }

    /// Serialise a record into the archive.
    ///
    /// The writer is flushed after every record so that archives are complete
    /// up to the last full cycle even if the executive aborts.
    pub fn serialise<T: Serialize>(&mut self, record: T) -> Result<(), ArchiveError> {
        match self.writer {
            Some(ref mut w) => {
                w.serialize(record)?;
                w.flush()?;
                Ok(())
            }
            None => Err(ArchiveError::NotInitialised),
        }
    }
}
