//! Core model and resolvers for the Wayfare transit app directory.
//!
//! Agencies publish transit data; apps consume it. This crate decides which
//! apps relate to an agency, which agencies relate to an app, and which apps
//! are relevant to a place. Results are lazy [`EntityStream`]s merged from
//! several store queries and deduplicated first-seen-wins.
//!
//! Persistence sits behind [`DirectoryStore`]. An in-memory store is always
//! available; a SQLite store is enabled by the `store-sqlite` feature.

#![forbid(unsafe_code)]

mod agency;
mod cache;
mod choices;
mod dedup;
mod geo_math;
mod key;
mod membership;
mod nearby;
mod places;
mod retry;
mod slug;
mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
mod transit_app;

pub use agency::Agency;
pub use cache::{CacheInvalidator, CacheScope, NoopCache};
pub use choices::{Category, Platform, UnknownChoice};
pub use dedup::{Dedup, Uniquify, lazily, uniquify};
pub use geo_math::{
    BoundingBox, EARTH_RADIUS_METERS, LATITUDINAL_DEGREE_METERS, METERS_PER_MILE,
    is_valid_lat_lon, longitudinal_degree_meters, meters_to_miles, miles_to_meters,
    square_bounding_box_centered_at,
};
pub use key::{AgencyKey, AppKey, Keyed, LocationKey};
pub use membership::MembershipResolver;
pub use nearby::{LocationResolver, NearbyQuery, NearbyQueryError, SearchSettings};
pub use places::{COUNTRY_NAMES, CitiesAndCountries, CityInfo, country_name};
pub use retry::retry_once;
pub use slug::slugify;
pub use store::{
    AppFilter, DirectoryStore, EntityStream, MemoryDirectoryStore, ProgressRecord, StoreError,
    Visibility, deferred_rows,
};
#[cfg(feature = "store-sqlite")]
pub use store::{SqliteDirectoryStore, SqliteDirectoryStoreError};
pub use transit_app::{PendingLocation, TransitApp, TransitAppLocation};
