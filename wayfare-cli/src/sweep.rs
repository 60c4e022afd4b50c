//! Maintenance command: expire abandoned submissions and collect orphan rows.

use std::io::Write;

use camino::Utf8PathBuf;
use chrono::TimeDelta;
use clap::Parser;
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use wayfare_core::DirectoryStore;
use wayfare_submission::{SubmissionWizard, WizardSettings};

use crate::{
    ARG_DATABASE, ARG_TTL_HOURS, CliError, ENV_SWEEP_DATABASE, open_database, write_json_line,
};

const DEFAULT_TTL_HOURS: u32 = 7 * 24;

/// CLI arguments for the `sweep-progress` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Delete submissions untouched for longer than the TTL, then \
                 delete location rows whose app is missing or no longer \
                 declares the row's city. Prints a JSON summary.",
    about = "Expire abandoned submissions and collect orphan location rows"
)]
#[ortho_config(prefix = "WAYFARE")]
pub(crate) struct SweepArgs {
    /// Path to the SQLite directory.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Age in hours after which a submission expires (default 168).
    #[arg(long = ARG_TTL_HOURS, value_name = "hours")]
    #[serde(default)]
    pub(crate) ttl_hours: Option<u32>,
}

/// Resolved `sweep-progress` configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SweepConfig {
    pub(crate) database: Utf8PathBuf,
    pub(crate) progress_ttl: TimeDelta,
}

impl TryFrom<SweepArgs> for SweepConfig {
    type Error = CliError;

    fn try_from(args: SweepArgs) -> Result<Self, Self::Error> {
        let database = args.database.ok_or(CliError::MissingArgument {
            field: ARG_DATABASE,
            env: ENV_SWEEP_DATABASE,
        })?;
        let hours = args.ttl_hours.unwrap_or(DEFAULT_TTL_HOURS);
        Ok(Self {
            database,
            progress_ttl: TimeDelta::hours(i64::from(hours)),
        })
    }
}

/// What a sweep removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SweepSummary {
    pub(crate) expired_submissions: usize,
    pub(crate) orphan_locations: usize,
}

pub(crate) fn run_sweep(args: SweepArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let merged = args.load_and_merge().map_err(CliError::Configuration)?;
    let config = SweepConfig::try_from(merged)?;
    let store = open_database(&config.database, ARG_DATABASE)?;
    let summary = sweep(store, config.progress_ttl)?;
    write_json_line(writer, &summary)
}

pub(crate) fn sweep<S: DirectoryStore>(
    store: S,
    progress_ttl: TimeDelta,
) -> Result<SweepSummary, CliError> {
    let mut wizard = SubmissionWizard::new(store).with_settings(WizardSettings {
        progress_ttl,
        ..WizardSettings::default()
    });
    let summary = SweepSummary {
        expired_submissions: wizard.sweep_expired_progress()?,
        orphan_locations: wizard.collect_orphan_locations()?,
    };
    info!(
        "sweep removed {} submissions and {} location rows",
        summary.expired_submissions, summary.orphan_locations
    );
    Ok(summary)
}
