//! Submission and editing of apps in the Wayfare directory.
//!
//! New apps arrive through a three-step wizard: general information, agency
//! support, then locations. The first two steps are saved as versioned
//! envelopes in a progress record addressed by a [`ProgressToken`]; the
//! location step publishes the app. Published apps are changed through the
//! edit operations on [`SubmissionWizard`], which also reports and repairs
//! drift between declared cities and stored location rows.

#![forbid(unsafe_code)]

mod clock;
mod edit;
mod error;
mod payload;
mod screenshot;
mod token;
mod wizard;

pub use clock::{Clock, ManualClock, SystemClock};
pub use edit::LocationConsistency;
pub use error::SubmissionError;
pub use payload::{
    AgencyStep, AgencySupport, InfoStep, LocationStep, MAX_STEP_BYTES, STEP_MAGIC, STEP_VERSION,
    StepPayload, StepPayloadError,
};
pub use screenshot::{ContentHashFamilies, ScreenshotProcessor};
pub use token::{
    MemorySession, ProgressSession, ProgressToken, RequestMethod, StepRequest, TOKEN_LEN,
};
pub use wizard::{FinalizeOrder, SubmissionState, SubmissionWizard, WizardSettings};
