//! Entity storage for agencies, apps, location rows and submission progress.
//!
//! [`DirectoryStore`] is the only seam between the resolvers and persistence.
//! Every read returns an [`EntityStream`], which does no work until it is
//! first polled, so resolvers can chain several queries and stop early
//! without touching the later ones. Keys that no longer resolve are skipped
//! rather than reported.
//!
//! Writes are atomic per entity only. Callers that need several writes to
//! land together must order them so that a partial failure is harmless.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    Agency, AgencyKey, AppKey, BoundingBox, LocationKey, TransitApp, TransitAppLocation,
};

mod memory;
#[cfg(feature = "store-sqlite")]
mod sqlite;

pub use memory::MemoryDirectoryStore;
#[cfg(feature = "store-sqlite")]
pub use sqlite::{SqliteDirectoryStore, SqliteDirectoryStoreError};

/// Lazily evaluated sequence of stored entities.
pub type EntityStream<'a, T> = Box<dyn Iterator<Item = Result<T, StoreError>> + 'a>;

/// Errors raised by a [`DirectoryStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend did not answer in time; the operation may succeed if
    /// repeated.
    #[error("storage timed out during {operation}")]
    Timeout {
        /// Operation that timed out.
        operation: &'static str,
    },
    /// The backend refused the operation.
    #[error("storage unavailable during {operation}")]
    Unavailable {
        /// Operation that failed.
        operation: &'static str,
    },
    /// A stored record could not be decoded.
    #[error("stored {entity} {key} is corrupt: {source}")]
    Corrupt {
        /// Kind of record.
        entity: &'static str,
        /// Identity of the record.
        key: String,
        /// Decoding failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Any other SQLite failure.
    #[cfg(feature = "store-sqlite")]
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// Whether repeating the operation could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Whether hidden apps take part in a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    /// Exclude apps flagged hidden.
    #[default]
    VisibleOnly,
    /// Include every app.
    IncludeHidden,
}

impl Visibility {
    /// Whether `app` passes this visibility rule.
    pub fn admits(self, app: &TransitApp) -> bool {
        match self {
            Self::VisibleOnly => !app.is_hidden,
            Self::IncludeHidden => true,
        }
    }
}

/// Indexed predicates over apps.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AppFilter {
    /// Every app.
    All,
    /// Apps listing the agency among their explicit agencies.
    ExplicitAgency(AgencyKey),
    /// Apps with implicit membership for all public agencies.
    SupportsAllPublicAgencies,
    /// Apps declaring the two-letter country code.
    Country(String),
    /// Apps declaring a city with the slug.
    CitySlug(String),
    /// Apps relevant everywhere.
    EntireWorld,
}

impl AppFilter {
    /// Evaluate the predicate against an in-memory app.
    pub fn matches(&self, app: &TransitApp) -> bool {
        match self {
            Self::All => true,
            Self::ExplicitAgency(key) => app.explicitly_supported_agency_keys.contains(key),
            Self::SupportsAllPublicAgencies => app.supports_all_public_agencies,
            Self::Country(code) => app.explicitly_supported_countries.contains(code),
            Self::CitySlug(slug) => app.explicitly_supported_city_slugs.contains(slug),
            Self::EntireWorld => app.explicitly_supports_the_entire_world,
        }
    }
}

/// Partial state of an in-flight app submission.
///
/// The step blobs are opaque to storage; the submission crate owns their
/// encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    /// 32-character continuation token.
    pub token: String,
    /// Encoded general-information step.
    pub info: Option<Vec<u8>>,
    /// Encoded agency step.
    pub agencies: Option<Vec<u8>>,
    /// Screenshot families created while the submission was in progress.
    pub screen_shot_families: Vec<String>,
    /// Time of the last write.
    pub last_updated: DateTime<Utc>,
}

impl ProgressRecord {
    /// A record with no saved steps.
    pub fn new(token: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            info: None,
            agencies: None,
            screen_shot_families: Vec::new(),
            last_updated: now,
        }
    }
}

/// Keyed storage plus the indexed queries the resolvers rely on.
///
/// Streams yield entities ordered by key unless stated otherwise. Bounding
/// boxes include their edges and do not wrap the antimeridian.
pub trait DirectoryStore {
    /// Fetch one agency.
    fn agency(&self, key: AgencyKey) -> Result<Option<Agency>, StoreError>;

    /// Fetch agencies in the order given, skipping keys that do not resolve.
    /// Repeated keys yield repeated agencies.
    fn agencies(&self, keys: Vec<AgencyKey>) -> EntityStream<'_, Agency>;

    /// Every agency.
    fn all_agencies(&self) -> EntityStream<'_, Agency>;

    /// Agencies whose data has been opened.
    fn public_agencies(&self) -> EntityStream<'_, Agency>;

    /// At most `max_results` agencies inside `bbox`.
    fn agencies_in_box(&self, bbox: &BoundingBox, max_results: usize) -> EntityStream<'_, Agency>;

    /// Fetch one app regardless of visibility.
    fn app(&self, key: AppKey) -> Result<Option<TransitApp>, StoreError>;

    /// Fetch the app with the given slug.
    fn app_for_slug(
        &self,
        slug: &str,
        visibility: Visibility,
    ) -> Result<Option<TransitApp>, StoreError>;

    /// Apps matching `filter`.
    fn apps(&self, filter: AppFilter, visibility: Visibility) -> EntityStream<'_, TransitApp>;

    /// At most `max_results` location rows inside `bbox`.
    fn locations_in_box(
        &self,
        bbox: &BoundingBox,
        max_results: usize,
    ) -> EntityStream<'_, TransitAppLocation>;

    /// Location rows owned by `app`.
    fn locations_for_app(&self, app: AppKey) -> EntityStream<'_, TransitAppLocation>;

    /// Every location row.
    fn all_locations(&self) -> EntityStream<'_, TransitAppLocation>;

    /// Allocate an unused agency key.
    fn reserve_agency_key(&mut self) -> Result<AgencyKey, StoreError>;

    /// Allocate an unused app key.
    fn reserve_app_key(&mut self) -> Result<AppKey, StoreError>;

    /// Allocate an unused location key.
    fn reserve_location_key(&mut self) -> Result<LocationKey, StoreError>;

    /// Insert or replace an agency.
    fn put_agency(&mut self, agency: &Agency) -> Result<(), StoreError>;

    /// Insert or replace an app.
    fn put_app(&mut self, app: &TransitApp) -> Result<(), StoreError>;

    /// Delete an app. Its location rows are left alone.
    fn delete_app(&mut self, key: AppKey) -> Result<(), StoreError>;

    /// Insert or replace a location row.
    fn put_location(&mut self, location: &TransitAppLocation) -> Result<(), StoreError>;

    /// Delete a location row.
    fn delete_location(&mut self, key: LocationKey) -> Result<(), StoreError>;

    /// Fetch submission progress by token.
    fn progress(&self, token: &str) -> Result<Option<ProgressRecord>, StoreError>;

    /// Insert or replace submission progress.
    fn put_progress(&mut self, record: &ProgressRecord) -> Result<(), StoreError>;

    /// Delete submission progress.
    fn delete_progress(&mut self, token: &str) -> Result<(), StoreError>;

    /// Progress records last written strictly before `cutoff`, oldest first.
    fn progress_updated_before(&self, cutoff: DateTime<Utc>) -> EntityStream<'_, ProgressRecord>;
}

/// Wrap a row-producing query so that it runs on first poll.
pub fn deferred_rows<'a, T, F>(query: F) -> EntityStream<'a, T>
where
    T: 'a,
    F: FnOnce() -> Result<Vec<T>, StoreError> + 'a,
{
    Box::new(std::iter::once_with(query).flat_map(|result| {
        let (rows, error) = match result {
            Ok(rows) => (rows, None),
            Err(error) => (Vec::new(), Some(error)),
        };
        rows.into_iter().map(Ok).chain(error.map(Err))
    }))
}
