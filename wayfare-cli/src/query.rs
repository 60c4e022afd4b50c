//! Read-side query commands.

use std::io::Write;

use camino::Utf8PathBuf;
use clap::Parser;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use wayfare_core::{
    AgencyKey, Dedup, DirectoryStore, LocationResolver, MembershipResolver, NearbyQuery,
    SearchSettings, Visibility,
};

use crate::{
    ARG_AGENCY, ARG_BBOX_SIDE_MILES, ARG_COUNTRY, ARG_DATABASE, ARG_LATITUDE, ARG_LONGITUDE,
    ARG_SLUG, CliError, ENV_AGENCIES_FOR_APP_DATABASE, ENV_AGENCIES_FOR_APP_SLUG,
    ENV_APPS_FOR_AGENCY_AGENCY, ENV_APPS_FOR_AGENCY_DATABASE, ENV_NEAR_COUNTRY, ENV_NEAR_DATABASE,
    ENV_NEAR_LATITUDE, ENV_NEAR_LONGITUDE, open_database, write_json_line,
};

/// CLI arguments for the `near` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "List apps relevant to a point as JSON lines: apps for nearby \
                 agencies, apps with a declared city nearby, apps for the \
                 country, then apps for the entire world.",
    about = "List apps near a point"
)]
#[ortho_config(prefix = "WAYFARE")]
pub(crate) struct NearArgs {
    /// Path to the SQLite directory.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Latitude in degrees.
    #[arg(long = ARG_LATITUDE, allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) lat: Option<f64>,
    /// Longitude in degrees.
    #[arg(long = ARG_LONGITUDE, allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) lon: Option<f64>,
    /// Two-letter country code of the point.
    #[arg(long = ARG_COUNTRY, value_name = "code")]
    #[serde(default)]
    pub(crate) country: Option<String>,
    /// Side of the square search box in miles.
    #[arg(long = ARG_BBOX_SIDE_MILES, value_name = "miles")]
    #[serde(default)]
    pub(crate) bbox_side_miles: Option<f64>,
}

impl NearArgs {
    fn into_config(self) -> Result<NearConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        NearConfig::try_from(merged)
    }
}

/// Resolved `near` command configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NearConfig {
    pub(crate) database: Utf8PathBuf,
    pub(crate) query: NearbyQuery,
    pub(crate) settings: SearchSettings,
}

impl TryFrom<NearArgs> for NearConfig {
    type Error = CliError;

    fn try_from(args: NearArgs) -> Result<Self, Self::Error> {
        let database = args.database.ok_or(CliError::MissingArgument {
            field: ARG_DATABASE,
            env: ENV_NEAR_DATABASE,
        })?;
        let lat = args.lat.ok_or(CliError::MissingArgument {
            field: ARG_LATITUDE,
            env: ENV_NEAR_LATITUDE,
        })?;
        let lon = args.lon.ok_or(CliError::MissingArgument {
            field: ARG_LONGITUDE,
            env: ENV_NEAR_LONGITUDE,
        })?;
        let country = args.country.ok_or(CliError::MissingArgument {
            field: ARG_COUNTRY,
            env: ENV_NEAR_COUNTRY,
        })?;
        let query = NearbyQuery::new(lat, lon, &country)?;
        let defaults = SearchSettings::default();
        let settings = SearchSettings {
            bbox_side_miles: args.bbox_side_miles.unwrap_or(defaults.bbox_side_miles),
            ..defaults
        };
        Ok(Self {
            database,
            query,
            settings,
        })
    }
}

pub(crate) fn run_near(args: NearArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = args.into_config()?;
    let store = open_database(&config.database, ARG_DATABASE)?;
    write_near(&store, &config, writer)
}

pub(crate) fn write_near<S: DirectoryStore>(
    store: &S,
    config: &NearConfig,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let resolver = LocationResolver::new(store).with_settings(config.settings);
    for app in resolver.apps_near(&config.query, Dedup::Unique) {
        write_json_line(writer, &app?)?;
    }
    Ok(())
}

/// CLI arguments for the `apps-for-agency` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(about = "List apps supporting an agency, explicit support first")]
#[ortho_config(prefix = "WAYFARE")]
pub(crate) struct AppsForAgencyArgs {
    /// Path to the SQLite directory.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Agency key.
    #[arg(long = ARG_AGENCY, value_name = "key")]
    #[serde(default)]
    pub(crate) agency: Option<u64>,
}

pub(crate) fn run_apps_for_agency(
    args: AppsForAgencyArgs,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let merged = args.load_and_merge().map_err(CliError::Configuration)?;
    let database = merged.database.ok_or(CliError::MissingArgument {
        field: ARG_DATABASE,
        env: ENV_APPS_FOR_AGENCY_DATABASE,
    })?;
    let key = merged.agency.map(AgencyKey).ok_or(CliError::MissingArgument {
        field: ARG_AGENCY,
        env: ENV_APPS_FOR_AGENCY_AGENCY,
    })?;
    let store = open_database(&database, ARG_DATABASE)?;
    write_apps_for_agency(&store, key, writer)
}

pub(crate) fn write_apps_for_agency<S: DirectoryStore>(
    store: &S,
    key: AgencyKey,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let agency = store.agency(key)?.ok_or(CliError::AgencyNotFound { key })?;
    for app in MembershipResolver::new(store).apps_for_agency(&agency, Dedup::Unique) {
        write_json_line(writer, &app?)?;
    }
    Ok(())
}

/// CLI arguments for the `agencies-for-app` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(about = "List agencies an app supports, explicit support first")]
#[ortho_config(prefix = "WAYFARE")]
pub(crate) struct AgenciesForAppArgs {
    /// Path to the SQLite directory.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// App slug.
    #[arg(long = ARG_SLUG, value_name = "slug")]
    #[serde(default)]
    pub(crate) slug: Option<String>,
}

pub(crate) fn run_agencies_for_app(
    args: AgenciesForAppArgs,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let merged = args.load_and_merge().map_err(CliError::Configuration)?;
    let database = merged.database.ok_or(CliError::MissingArgument {
        field: ARG_DATABASE,
        env: ENV_AGENCIES_FOR_APP_DATABASE,
    })?;
    let slug = merged.slug.ok_or(CliError::MissingArgument {
        field: ARG_SLUG,
        env: ENV_AGENCIES_FOR_APP_SLUG,
    })?;
    let store = open_database(&database, ARG_DATABASE)?;
    write_agencies_for_app(&store, &slug, writer)
}

pub(crate) fn write_agencies_for_app<S: DirectoryStore>(
    store: &S,
    slug: &str,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let app = store
        .app_for_slug(slug, Visibility::VisibleOnly)?
        .ok_or_else(|| CliError::AppNotFound {
            slug: slug.to_owned(),
        })?;
    for agency in MembershipResolver::new(store).agencies_for_app(&app, Dedup::Unique) {
        write_json_line(writer, &agency?)?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn near_config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<NearConfig, CliError> {
    let merged = NearArgs::merge_from_layers(layers).map_err(CliError::from)?;
    NearConfig::try_from(merged)
}
