//! Fixture builders and store wrappers shared by unit, behaviour and
//! downstream crate tests.
//!
//! [`SampleDirectory`] seeds a store with six agencies (three public, three
//! private) and eleven apps covering every kind of support, so resolver
//! tests can name fixtures instead of rebuilding them.

use std::cell::RefCell;
use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

use crate::dedup::failed;
use crate::{
    Agency, AgencyKey, AppFilter, AppKey, BoundingBox, CacheInvalidator, CacheScope, CityInfo,
    DirectoryStore, EntityStream, LocationKey, MemoryDirectoryStore, PendingLocation,
    ProgressRecord, StoreError, TransitApp, TransitAppLocation, Visibility,
};

/// Fixed timestamp used for every fixture.
pub fn fixture_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_262_304_000, 0)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Private agency in the United States.
pub fn agency(key: u64, name: &str, latitude: f64, longitude: f64) -> Agency {
    Agency::new(AgencyKey(key), name, "", "", "us", latitude, longitude)
}

/// Mark `agency` public.
pub fn opened(agency: Agency) -> Agency {
    agency.with_date_opened(fixture_time())
}

/// App with no relationships.
pub fn app(key: u64, title: &str) -> TransitApp {
    TransitApp::new(AppKey(key), title, fixture_time())
}

/// Location row for `app` at a city.
pub fn location(
    key: u64,
    app: u64,
    city: &str,
    latitude: f64,
    longitude: f64,
) -> TransitAppLocation {
    let info = CityInfo::new(latitude, longitude, city, "", "US");
    PendingLocation::from(&info).into_location(LocationKey(key), AppKey(app))
}

/// Titles of every app in `stream`, in stream order.
///
/// # Panics
/// Panics if the stream yields an error.
pub fn titles(stream: EntityStream<'_, TransitApp>) -> Vec<String> {
    stream
        .map(|app| app.expect("app stream yielded an error").title)
        .collect()
}

/// Lookup failures in a [`SampleDirectory`].
#[derive(Debug, Error)]
pub enum SampleError {
    /// The name is not one of the fixtures.
    #[error("no sample fixture named '{0}'")]
    UnknownName(String),
    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A store seeded with the shared fixtures.
#[derive(Debug)]
pub struct SampleDirectory<S = MemoryDirectoryStore> {
    /// Seeded store.
    pub store: S,
    agencies: BTreeMap<String, AgencyKey>,
    apps: BTreeMap<String, AppKey>,
    cities: BTreeMap<String, CityInfo>,
}

impl SampleDirectory {
    /// Seed a fresh in-memory store.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::populate(MemoryDirectoryStore::default())
    }
}

impl<S: DirectoryStore> SampleDirectory<S> {
    /// Seed `store`.
    pub fn populate(mut store: S) -> Result<Self, StoreError> {
        let cities: BTreeMap<String, CityInfo> = sample_cities()
            .into_iter()
            .map(|city| (city.name.clone(), city))
            .collect();

        let mut agencies = BTreeMap::new();
        let mut keys = [AgencyKey(0); 6];
        for (slot, (name, city, state, latitude, longitude, public)) in
            keys.iter_mut().zip(SAMPLE_AGENCIES)
        {
            let key = store.reserve_agency_key()?;
            let mut row = Agency::new(key, name, city, state, "us", latitude, longitude);
            if public {
                row = opened(row);
            }
            store.put_agency(&row)?;
            agencies.insert(name.to_owned(), key);
            *slot = key;
        }
        let [_, pub_2, pub_3, p_1, p_2, p_3] = keys;

        let mut sample = Self {
            store,
            agencies,
            apps: BTreeMap::new(),
            cities,
        };
        sample.add_app("app_pub", |app| app.supports_all_public_agencies = true)?;
        sample.add_app("app_p1", |app| app.add_explicit_agency(p_1))?;
        sample.add_app("app_p2_p3", |app| app.add_explicit_agencies([p_2, p_3]))?;
        sample.add_app("app_pub_p1_p3", |app| {
            app.supports_all_public_agencies = true;
            app.add_explicit_agencies([p_1, p_3]);
        })?;
        sample.add_app("app_pub_pub2_pub3_p1_p2", |app| {
            app.supports_all_public_agencies = true;
            app.add_explicit_agencies([pub_2, pub_3, p_1, p_2]);
        })?;
        for city in ["Philadelphia", "Narberth", "Portland"] {
            let title = format!("app_for_{}", city.to_lowercase());
            sample.add_city_app(&title, city)?;
        }
        sample.add_app("app_for_entire_world", |app| {
            app.explicitly_supports_the_entire_world = true;
        })?;
        sample.add_app("app_for_us", |app| app.add_countries(["US"]))?;
        sample.add_app("app_for_de", |app| app.add_countries(["DE"]))?;
        Ok(sample)
    }

    fn add_app(
        &mut self,
        title: &str,
        configure: impl FnOnce(&mut TransitApp),
    ) -> Result<AppKey, StoreError> {
        let key = self.store.reserve_app_key()?;
        let mut row = TransitApp::new(key, title, fixture_time());
        configure(&mut row);
        self.store.put_app(&row)?;
        self.apps.insert(title.to_owned(), key);
        Ok(key)
    }

    fn add_city_app(&mut self, title: &str, city: &str) -> Result<(), StoreError> {
        let Some(info) = self.cities.get(city).cloned() else {
            return Ok(());
        };
        let mut pending = None;
        let key = self.add_app(title, |app| pending = Some(app.add_city(&info)))?;
        if let Some(pending) = pending {
            let location_key = self.store.reserve_location_key()?;
            self.store
                .put_location(&pending.into_location(location_key, key))?;
        }
        Ok(())
    }

    /// Stored agency named `name`.
    pub fn agency(&self, name: &str) -> Result<Agency, SampleError> {
        let key = self
            .agencies
            .get(name)
            .ok_or_else(|| SampleError::UnknownName(name.to_owned()))?;
        self.store
            .agency(*key)?
            .ok_or_else(|| SampleError::UnknownName(name.to_owned()))
    }

    /// Stored app titled `title`, hidden or not.
    pub fn app(&self, title: &str) -> Result<TransitApp, SampleError> {
        let key = self
            .apps
            .get(title)
            .ok_or_else(|| SampleError::UnknownName(title.to_owned()))?;
        self.store
            .app(*key)?
            .ok_or_else(|| SampleError::UnknownName(title.to_owned()))
    }

    /// A named sample city: Philadelphia, Narberth, Portland, Berlin or
    /// Grants Pass.
    pub fn city(&self, name: &str) -> Option<&CityInfo> {
        self.cities.get(name)
    }
}

const SAMPLE_AGENCIES: [(&str, &str, &str, f64, f64, bool); 6] = [
    ("Public 1", "San Francisco", "CA", 37.774_929_5, -122.419_415_5, true),
    ("Public 2", "Seattle", "WA", 47.606_209_5, -122.332_070_8, true),
    ("Public 3", "Kokomo", "IN", 40.486_427, -86.133_603_3, true),
    ("Private 1", "Washington", "DC", 38.895_111_8, -77.036_365_8, false),
    ("Private 2", "Philadelphia", "PA", 39.952_335, -75.163_789, false),
    ("Private 3", "Mars", "PA", 40.695_899_6, -80.011_725_4, false),
];

fn sample_cities() -> Vec<CityInfo> {
    vec![
        CityInfo::new(39.952_335, -75.163_789, "Philadelphia", "PA", "US"),
        CityInfo::new(40.008_445_6, -75.260_46, "Narberth", "PA", "US"),
        CityInfo::new(45.523_451_5, -122.676_207_1, "Portland", "OR", "US"),
        CityInfo::new(52.523_405_1, 13.411_399_9, "Berlin", "Berlin", "DE"),
        CityInfo::new(42.439_006_9, -123.328_392_5, "Grants Pass", "OR", "US"),
    ]
}

/// Store writes a [`FaultyStore`] can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WriteKind {
    /// [`DirectoryStore::put_agency`].
    PutAgency,
    /// [`DirectoryStore::put_app`].
    PutApp,
    /// [`DirectoryStore::delete_app`].
    DeleteApp,
    /// [`DirectoryStore::put_location`].
    PutLocation,
    /// [`DirectoryStore::delete_location`].
    DeleteLocation,
    /// [`DirectoryStore::put_progress`].
    PutProgress,
    /// [`DirectoryStore::delete_progress`].
    DeleteProgress,
}

/// A scheduled write failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault {
    kind: WriteKind,
    after: usize,
    failures: usize,
    transient: bool,
}

impl Fault {
    /// Time out once, then succeed.
    pub fn timeout(kind: WriteKind) -> Self {
        Self {
            kind,
            after: 0,
            failures: 1,
            transient: true,
        }
    }

    /// Time out on every attempt.
    pub fn persistent_timeout(kind: WriteKind) -> Self {
        Self {
            failures: usize::MAX,
            ..Self::timeout(kind)
        }
    }

    /// Fail fatally on every attempt.
    pub fn unavailable(kind: WriteKind) -> Self {
        Self {
            transient: false,
            ..Self::persistent_timeout(kind)
        }
    }

    /// Let the first `attempts` writes of this kind through.
    #[must_use]
    pub fn after(mut self, attempts: usize) -> Self {
        self.after = attempts;
        self
    }

    fn fires_on(&self, attempt: usize) -> bool {
        attempt >= self.after && attempt - self.after < self.failures
    }

    fn error(&self) -> StoreError {
        let operation = "injected write";
        if self.transient {
            StoreError::Timeout { operation }
        } else {
            StoreError::Unavailable { operation }
        }
    }
}

/// Wraps a store and fails scheduled writes.
///
/// Reads pass through unless [`FaultyStore::fail_reads`] was called.
#[derive(Debug)]
pub struct FaultyStore<S> {
    inner: S,
    faults: Vec<Fault>,
    attempts: BTreeMap<WriteKind, usize>,
    fail_reads: bool,
}

impl<S> FaultyStore<S> {
    /// Wrap `inner` with no faults scheduled.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            faults: Vec::new(),
            attempts: BTreeMap::new(),
            fail_reads: false,
        }
    }

    /// Schedule a fault.
    #[must_use]
    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.faults.push(fault);
        self
    }

    /// Schedule a fault on an existing wrapper.
    pub fn inject(&mut self, fault: Fault) {
        self.faults.push(fault);
    }

    /// Make every read fail as unavailable.
    pub fn fail_reads(&mut self) {
        self.fail_reads = true;
    }

    /// Number of attempted writes of `kind`, failed ones included.
    pub fn attempts(&self, kind: WriteKind) -> usize {
        self.attempts.get(&kind).copied().unwrap_or(0)
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Unwrap the store.
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn attempt(&mut self, kind: WriteKind) -> Result<(), StoreError> {
        let counter = self.attempts.entry(kind).or_insert(0);
        let attempt = *counter;
        *counter += 1;
        match self
            .faults
            .iter()
            .find(|fault| fault.kind == kind && fault.fires_on(attempt))
        {
            Some(fault) => Err(fault.error()),
            None => Ok(()),
        }
    }

    fn read(&self) -> Result<(), StoreError> {
        if self.fail_reads {
            Err(StoreError::Unavailable {
                operation: "injected read",
            })
        } else {
            Ok(())
        }
    }

    fn stream<'a, T: 'a>(
        &'a self,
        query: impl FnOnce() -> EntityStream<'a, T>,
    ) -> EntityStream<'a, T> {
        match self.read() {
            Ok(()) => query(),
            Err(error) => failed(error),
        }
    }
}

impl<S: DirectoryStore> DirectoryStore for FaultyStore<S> {
    fn agency(&self, key: AgencyKey) -> Result<Option<Agency>, StoreError> {
        self.read()?;
        self.inner.agency(key)
    }

    fn agencies(&self, keys: Vec<AgencyKey>) -> EntityStream<'_, Agency> {
        self.stream(|| self.inner.agencies(keys))
    }

    fn all_agencies(&self) -> EntityStream<'_, Agency> {
        self.stream(|| self.inner.all_agencies())
    }

    fn public_agencies(&self) -> EntityStream<'_, Agency> {
        self.stream(|| self.inner.public_agencies())
    }

    fn agencies_in_box(&self, bbox: &BoundingBox, max_results: usize) -> EntityStream<'_, Agency> {
        self.stream(|| self.inner.agencies_in_box(bbox, max_results))
    }

    fn app(&self, key: AppKey) -> Result<Option<TransitApp>, StoreError> {
        self.read()?;
        self.inner.app(key)
    }

    fn app_for_slug(
        &self,
        slug: &str,
        visibility: Visibility,
    ) -> Result<Option<TransitApp>, StoreError> {
        self.read()?;
        self.inner.app_for_slug(slug, visibility)
    }

    fn apps(&self, filter: AppFilter, visibility: Visibility) -> EntityStream<'_, TransitApp> {
        self.stream(|| self.inner.apps(filter, visibility))
    }

    fn locations_in_box(
        &self,
        bbox: &BoundingBox,
        max_results: usize,
    ) -> EntityStream<'_, TransitAppLocation> {
        self.stream(|| self.inner.locations_in_box(bbox, max_results))
    }

    fn locations_for_app(&self, app: AppKey) -> EntityStream<'_, TransitAppLocation> {
        self.stream(|| self.inner.locations_for_app(app))
    }

    fn all_locations(&self) -> EntityStream<'_, TransitAppLocation> {
        self.stream(|| self.inner.all_locations())
    }

    fn reserve_agency_key(&mut self) -> Result<AgencyKey, StoreError> {
        self.inner.reserve_agency_key()
    }

    fn reserve_app_key(&mut self) -> Result<AppKey, StoreError> {
        self.inner.reserve_app_key()
    }

    fn reserve_location_key(&mut self) -> Result<LocationKey, StoreError> {
        self.inner.reserve_location_key()
    }

    fn put_agency(&mut self, agency: &Agency) -> Result<(), StoreError> {
        self.attempt(WriteKind::PutAgency)?;
        self.inner.put_agency(agency)
    }

    fn put_app(&mut self, app: &TransitApp) -> Result<(), StoreError> {
        self.attempt(WriteKind::PutApp)?;
        self.inner.put_app(app)
    }

    fn delete_app(&mut self, key: AppKey) -> Result<(), StoreError> {
        self.attempt(WriteKind::DeleteApp)?;
        self.inner.delete_app(key)
    }

    fn put_location(&mut self, location: &TransitAppLocation) -> Result<(), StoreError> {
        self.attempt(WriteKind::PutLocation)?;
        self.inner.put_location(location)
    }

    fn delete_location(&mut self, key: LocationKey) -> Result<(), StoreError> {
        self.attempt(WriteKind::DeleteLocation)?;
        self.inner.delete_location(key)
    }

    fn progress(&self, token: &str) -> Result<Option<ProgressRecord>, StoreError> {
        self.read()?;
        self.inner.progress(token)
    }

    fn put_progress(&mut self, record: &ProgressRecord) -> Result<(), StoreError> {
        self.attempt(WriteKind::PutProgress)?;
        self.inner.put_progress(record)
    }

    fn delete_progress(&mut self, token: &str) -> Result<(), StoreError> {
        self.attempt(WriteKind::DeleteProgress)?;
        self.inner.delete_progress(token)
    }

    fn progress_updated_before(&self, cutoff: DateTime<Utc>) -> EntityStream<'_, ProgressRecord> {
        self.stream(|| self.inner.progress_updated_before(cutoff))
    }
}

/// Cache hook that records every invalidation.
#[derive(Debug, Default)]
pub struct RecordingCache {
    scopes: RefCell<Vec<CacheScope>>,
}

impl RecordingCache {
    /// Scopes invalidated so far, oldest first.
    pub fn invalidations(&self) -> Vec<CacheScope> {
        self.scopes.borrow().clone()
    }

    /// Number of invalidations so far.
    pub fn count(&self) -> usize {
        self.scopes.borrow().len()
    }
}

impl CacheInvalidator for RecordingCache {
    fn invalidate(&self, scope: CacheScope) {
        self.scopes.borrow_mut().push(scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn sample_directory_holds_every_fixture() {
        let sample = SampleDirectory::in_memory().expect("sample");
        assert_eq!(sample.store.all_agencies().count(), 6);
        assert_eq!(sample.store.public_agencies().count(), 3);
        assert_eq!(
            sample
                .store
                .apps(AppFilter::All, Visibility::VisibleOnly)
                .count(),
            11
        );
        assert_eq!(sample.store.location_count(), 3);
        assert!(matches!(
            sample.agency("Nowhere"),
            Err(SampleError::UnknownName(_))
        ));
    }

    #[rstest]
    fn faults_fire_on_scheduled_attempts() {
        let mut store = FaultyStore::new(MemoryDirectoryStore::default())
            .with_fault(Fault::timeout(WriteKind::PutApp).after(1));
        assert!(store.put_app(&app(1, "First")).is_ok());
        assert!(matches!(
            store.put_app(&app(2, "Second")),
            Err(StoreError::Timeout { .. })
        ));
        assert!(store.put_app(&app(2, "Second")).is_ok());
        assert_eq!(store.attempts(WriteKind::PutApp), 3);
        assert_eq!(store.attempts(WriteKind::PutLocation), 0);
    }
}
