//! Errors raised by the submission wizard and edit paths.

use thiserror::Error;
use wayfare_core::{AppKey, StoreError};

use crate::StepPayloadError;

/// Errors raised by [`SubmissionWizard`](crate::SubmissionWizard).
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// The token is unknown, malformed, forged or expired. No further detail
    /// is given.
    #[error("submission not found")]
    NotFound,
    /// A step needed for finalization was never saved.
    #[error("submission is missing its {step} step")]
    InvalidState {
        /// Missing step.
        step: &'static str,
    },
    /// A saved step could not be read back.
    #[error("submission {step} step is unreadable")]
    Payload {
        /// Step being read or written.
        step: &'static str,
        /// Envelope failure.
        #[source]
        source: StepPayloadError,
    },
    /// Specific agency support was chosen without any agencies.
    #[error("at least one agency must be selected")]
    EmptyAgencySelection,
    /// An edit named an app that does not exist.
    #[error("app {key} does not exist")]
    AppNotFound {
        /// Requested app.
        key: AppKey,
    },
    /// Storage failed, after any retry.
    #[error(transparent)]
    Store(#[from] StoreError),
}
