//! Error types emitted by the Wayfare CLI.
//!
//! Keep this error type reasonably small; every command helper returns
//! `Result<_, CliError>`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;
use wayfare_core::{AgencyKey, NearbyQueryError, SqliteDirectoryStoreError, StoreError};
use wayfare_submission::SubmissionError;

/// Errors emitted by the Wayfare CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// The database path does not exist.
    #[error("{field} path {path:?} does not exist")]
    MissingDatabase {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// The database path exists but is not a file.
    #[error("{field} path {path:?} exists but is not a file")]
    DatabaseNotFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// The database path could not be inspected.
    #[error("failed to inspect {field} path {path:?}: {source}")]
    InspectDatabase {
        field: &'static str,
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Opening the SQLite directory failed.
    #[error(transparent)]
    OpenDatabase(#[from] Box<SqliteDirectoryStoreError>),
    /// The search coordinates or country code were rejected.
    #[error(transparent)]
    InvalidQuery(#[from] NearbyQueryError),
    /// No agency has the requested key.
    #[error("agency {key} does not exist")]
    AgencyNotFound { key: AgencyKey },
    /// No visible app has the requested slug.
    #[error("no app with slug {slug:?}")]
    AppNotFound { slug: String },
    /// Reading the directory failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Maintenance through the submission paths failed.
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    /// Serializing a result line failed.
    #[error("failed to serialize output: {0}")]
    SerializeOutput(#[source] serde_json::Error),
    /// Writing to the output failed.
    #[error("failed to write output: {0}")]
    WriteOutput(#[source] std::io::Error),
}
