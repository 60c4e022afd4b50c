//! Command-line interface for querying and maintaining a Wayfare directory.
#![forbid(unsafe_code)]

use std::io::Write;

use camino::Utf8Path;
use clap::{Parser, Subcommand};
use serde::Serialize;
use wayfare_core::SqliteDirectoryStore;
use wayfare_fs::EntryKind;

mod error;
mod query;
mod sweep;

pub use error::CliError;

use query::{AgenciesForAppArgs, AppsForAgencyArgs, NearArgs};
use sweep::SweepArgs;

pub(crate) const ARG_DATABASE: &str = "database";
pub(crate) const ARG_LATITUDE: &str = "lat";
pub(crate) const ARG_LONGITUDE: &str = "lon";
pub(crate) const ARG_COUNTRY: &str = "country";
pub(crate) const ARG_BBOX_SIDE_MILES: &str = "bbox-side-miles";
pub(crate) const ARG_AGENCY: &str = "agency";
pub(crate) const ARG_SLUG: &str = "slug";
pub(crate) const ARG_TTL_HOURS: &str = "ttl-hours";
pub(crate) const ENV_NEAR_DATABASE: &str = "WAYFARE_CMDS_NEAR_DATABASE";
pub(crate) const ENV_NEAR_LATITUDE: &str = "WAYFARE_CMDS_NEAR_LAT";
pub(crate) const ENV_NEAR_LONGITUDE: &str = "WAYFARE_CMDS_NEAR_LON";
pub(crate) const ENV_NEAR_COUNTRY: &str = "WAYFARE_CMDS_NEAR_COUNTRY";
pub(crate) const ENV_APPS_FOR_AGENCY_DATABASE: &str = "WAYFARE_CMDS_APPS_FOR_AGENCY_DATABASE";
pub(crate) const ENV_APPS_FOR_AGENCY_AGENCY: &str = "WAYFARE_CMDS_APPS_FOR_AGENCY_AGENCY";
pub(crate) const ENV_AGENCIES_FOR_APP_DATABASE: &str = "WAYFARE_CMDS_AGENCIES_FOR_APP_DATABASE";
pub(crate) const ENV_AGENCIES_FOR_APP_SLUG: &str = "WAYFARE_CMDS_AGENCIES_FOR_APP_SLUG";
pub(crate) const ENV_SWEEP_DATABASE: &str = "WAYFARE_CMDS_SWEEP_PROGRESS_DATABASE";

/// Run the Wayfare CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    let mut stdout = std::io::stdout().lock();
    run_with(cli, &mut stdout)
}

fn run_with(cli: Cli, writer: &mut dyn Write) -> Result<(), CliError> {
    match cli.command {
        Command::Near(args) => query::run_near(args, writer),
        Command::AppsForAgency(args) => query::run_apps_for_agency(args, writer),
        Command::AgenciesForApp(args) => query::run_agencies_for_app(args, writer),
        Command::SweepProgress(args) => sweep::run_sweep(args, writer),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "wayfare",
    about = "Query and maintain a Wayfare transit app directory",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List apps relevant to a point, most specific first.
    Near(NearArgs),
    /// List apps that support an agency.
    AppsForAgency(AppsForAgencyArgs),
    /// List agencies an app supports.
    AgenciesForApp(AgenciesForAppArgs),
    /// Delete expired submissions and orphan location rows.
    SweepProgress(SweepArgs),
}

/// Open the directory at `path` after checking that it is an existing file.
/// Commands never create a database.
pub(crate) fn open_database(
    path: &Utf8Path,
    field: &'static str,
) -> Result<SqliteDirectoryStore, CliError> {
    match wayfare_fs::entry_kind(path) {
        Ok(EntryKind::File) => {}
        Ok(EntryKind::Directory | EntryKind::Other) => {
            return Err(CliError::DatabaseNotFile {
                field,
                path: path.to_path_buf(),
            });
        }
        Ok(EntryKind::Missing) => {
            return Err(CliError::MissingDatabase {
                field,
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(CliError::InspectDatabase {
                field,
                path: path.to_path_buf(),
                source,
            });
        }
    }
    log::debug!("opening directory at {path}");
    SqliteDirectoryStore::open(path).map_err(|error| CliError::OpenDatabase(Box::new(error)))
}

/// Write `value` as one line of JSON.
pub(crate) fn write_json_line<T: Serialize>(
    writer: &mut dyn Write,
    value: &T,
) -> Result<(), CliError> {
    let line = serde_json::to_string(value).map_err(CliError::SerializeOutput)?;
    writer
        .write_all(line.as_bytes())
        .map_err(CliError::WriteOutput)?;
    writer.write_all(b"\n").map_err(CliError::WriteOutput)
}

#[cfg(test)]
mod tests;
