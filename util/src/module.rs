//! Module interfaces
//!
//! Each cyclic module in `srr_exec` implements [`State`], which splits the
//! module's life into a one-shot initialisation and a per-cycle processing
//! step. Keeping the same shape for every module makes the executive's main
//! loop uniform and keeps module boundaries explicit.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal imports
use crate::session::Session;

// ---------------------------------------------------------------------------
// MODULE STATE
// ---------------------------------------------------------------------------

/// The module's internal state.
pub trait State {
    /// Data required during initialisation, typically a path to the module's
    /// parameter file.
    type InitData;
    /// An error which can occur during initialisation.
    type InitError;

    /// Data required for cyclic processing.
    type InputData;
    /// Data produced by cyclic processing.
    type OutputData;
    /// A report on the status of the cyclic processing.
    type StatusReport;
    /// An error which can occur during cyclic processing.
    type ProcError;

    /// Initialise the module.
    ///
    /// Called once before the first call to [`State::proc`]. The session is
    /// available so that modules may register archives or resolve paths
    /// relative to the session directory.
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::InitError>;

    /// Main module processing function, called once per cycle.
    ///
    /// On success returns a tuple of the output data and a status report.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>;
}
