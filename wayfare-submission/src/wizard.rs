//! The three-step add-app wizard.
//!
//! A submission moves `Created → InfoSaved → AgenciesSaved → Finalized`.
//! Partial state lives in a progress record addressed by a
//! [`ProgressToken`]; nothing is held in a multi-step transaction. The
//! location step triggers finalization, which writes the app, its location
//! rows and deletes the progress record as separate, individually retried
//! writes.

use chrono::TimeDelta;
use log::{debug, info, warn};
use wayfare_core::{
    CacheInvalidator, CacheScope, DirectoryStore, NoopCache, PendingLocation, ProgressRecord,
    StoreError, TransitApp, retry_once,
};

use crate::{
    AgencyStep, AgencySupport, Clock, ContentHashFamilies, InfoStep, LocationStep, ProgressSession,
    ProgressToken, ScreenshotProcessor, StepPayload, StepRequest, SubmissionError, SystemClock,
};

/// Order of the writes that publish an app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FinalizeOrder {
    /// Location rows, then the app, then the progress record. A failure
    /// leaves orphan rows that
    /// [`collect_orphan_locations`](SubmissionWizard::collect_orphan_locations)
    /// removes.
    #[default]
    LocationsFirst,
    /// The app, then its location rows, then the progress record. A failure
    /// leaves an app declaring cities it has no rows for.
    AppFirst,
}

/// Wizard tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WizardSettings {
    /// Age after which untouched progress records are swept.
    pub progress_ttl: TimeDelta,
    /// Write order for finalization and location edits.
    pub finalize_order: FinalizeOrder,
}

impl Default for WizardSettings {
    fn default() -> Self {
        Self {
            progress_ttl: TimeDelta::days(7),
            finalize_order: FinalizeOrder::default(),
        }
    }
}

/// Where a submission stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    /// Token minted, nothing saved.
    Created,
    /// General information saved.
    InfoSaved,
    /// Agency selection saved; the location step can finalize.
    AgenciesSaved,
}

/// Drives submissions and edits against a store.
///
/// # Examples
/// ```
/// use wayfare_core::{CityInfo, MemoryDirectoryStore};
/// use wayfare_submission::{
///     AgencyStep, InfoStep, LocationStep, MemorySession, StepRequest, SubmissionWizard,
/// };
///
/// # fn main() -> Result<(), wayfare_submission::SubmissionError> {
/// let mut wizard = SubmissionWizard::new(MemoryDirectoryStore::default());
/// let mut session = MemorySession::default();
/// let token = wizard.create(&mut session)?;
/// let request = StepRequest::post(token.as_str());
///
/// let info = InfoStep { title: "Bus Buddy".into(), ..InfoStep::default() };
/// wizard.save_info(&request, &session, &info, &[])?;
/// wizard.save_agencies(&request, &session, &AgencyStep::default())?;
///
/// let mut locations = LocationStep::default();
/// locations.places.cities.push(CityInfo::new(45.52, -122.68, "Portland", "OR", "US"));
/// let app = wizard.finalize(&request, &mut session, &locations)?;
///
/// assert_eq!(app.slug, "bus-buddy");
/// assert!(!wizard.is_valid_token(&request, &session));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SubmissionWizard<S, C = NoopCache, P = ContentHashFamilies, K = SystemClock> {
    pub(crate) store: S,
    pub(crate) cache: C,
    screenshots: P,
    pub(crate) clock: K,
    pub(crate) settings: WizardSettings,
}

impl<S: DirectoryStore> SubmissionWizard<S> {
    /// Wizard with default settings, no cache and content-hash screenshot
    /// families.
    pub fn new(store: S) -> Self {
        Self {
            store,
            cache: NoopCache,
            screenshots: ContentHashFamilies,
            clock: SystemClock,
            settings: WizardSettings::default(),
        }
    }
}

impl<S, C, P, K> SubmissionWizard<S, C, P, K>
where
    S: DirectoryStore,
    C: CacheInvalidator,
    P: ScreenshotProcessor,
    K: Clock,
{
    /// Replace the cache hook.
    pub fn with_cache<C2: CacheInvalidator>(self, cache: C2) -> SubmissionWizard<S, C2, P, K> {
        SubmissionWizard {
            store: self.store,
            cache,
            screenshots: self.screenshots,
            clock: self.clock,
            settings: self.settings,
        }
    }

    /// Replace the screenshot processor.
    pub fn with_screenshots<P2: ScreenshotProcessor>(
        self,
        screenshots: P2,
    ) -> SubmissionWizard<S, C, P2, K> {
        SubmissionWizard {
            store: self.store,
            cache: self.cache,
            screenshots,
            clock: self.clock,
            settings: self.settings,
        }
    }

    /// Replace the clock.
    pub fn with_clock<K2: Clock>(self, clock: K2) -> SubmissionWizard<S, C, P, K2> {
        SubmissionWizard {
            store: self.store,
            cache: self.cache,
            screenshots: self.screenshots,
            clock,
            settings: self.settings,
        }
    }

    /// Replace the settings.
    #[must_use]
    pub fn with_settings(mut self, settings: WizardSettings) -> Self {
        self.settings = settings;
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The underlying store, mutably.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Unwrap the store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// The cache hook.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Start a submission and remember its token in `session`.
    pub fn create(
        &mut self,
        session: &mut impl ProgressSession,
    ) -> Result<ProgressToken, SubmissionError> {
        let token = ProgressToken::mint();
        let record = ProgressRecord::new(token.as_str(), self.clock.now());
        self.write("create progress", false, |store| store.put_progress(&record))?;
        session.remember(&token);
        debug!("created submission {token}");
        Ok(token)
    }

    /// Whether `request` addresses a live submission belonging to `session`.
    pub fn is_valid_token(
        &self,
        request: &StepRequest<'_>,
        session: &impl ProgressSession,
    ) -> bool {
        self.validated(request, session).is_ok()
    }

    /// Progress of the submission `request` addresses.
    pub fn state(
        &self,
        request: &StepRequest<'_>,
        session: &impl ProgressSession,
    ) -> Result<SubmissionState, SubmissionError> {
        let record = self.validated(request, session)?;
        Ok(match (&record.info, &record.agencies) {
            (_, Some(_)) => SubmissionState::AgenciesSaved,
            (Some(_), None) => SubmissionState::InfoSaved,
            (None, None) => SubmissionState::Created,
        })
    }

    /// Save the general information step.
    ///
    /// Each non-empty upload becomes a screenshot family straight away, so
    /// the families exist even if the submission is abandoned.
    pub fn save_info(
        &mut self,
        request: &StepRequest<'_>,
        session: &impl ProgressSession,
        info: &InfoStep,
        screenshots: &[Vec<u8>],
    ) -> Result<(), SubmissionError> {
        let mut record = self.validated(request, session)?;
        record.info = Some(encode(info)?);
        for image in screenshots {
            if let Some(family) = self.screenshots.family_for(image) {
                record.screen_shot_families.push(family);
            }
        }
        record.last_updated = self.clock.now();
        self.write("save info", false, |store| store.put_progress(&record))?;
        Ok(())
    }

    /// Save the agency selection step.
    pub fn save_agencies(
        &mut self,
        request: &StepRequest<'_>,
        session: &impl ProgressSession,
        agencies: &AgencyStep,
    ) -> Result<(), SubmissionError> {
        let mut record = self.validated(request, session)?;
        if matches!(&agencies.support, AgencySupport::Specific(keys) if keys.is_empty()) {
            return Err(SubmissionError::EmptyAgencySelection);
        }
        record.agencies = Some(encode(agencies)?);
        record.last_updated = self.clock.now();
        self.write("save agencies", false, |store| store.put_progress(&record))?;
        Ok(())
    }

    /// Publish the app from the saved steps and `locations`.
    ///
    /// Writes are not atomic. See [`FinalizeOrder`] for what a failure part
    /// way through leaves behind.
    pub fn finalize(
        &mut self,
        request: &StepRequest<'_>,
        session: &mut impl ProgressSession,
        locations: &LocationStep,
    ) -> Result<TransitApp, SubmissionError> {
        let record = self.validated(request, session)?;
        let info: InfoStep = decode(record.info.as_deref())?;
        let agencies: AgencyStep = decode(record.agencies.as_deref())?;

        let key = self.store.reserve_app_key()?;
        let mut app = TransitApp::new(key, info.title.as_str(), self.clock.now());
        apply_info(&mut app, &info);
        app.screen_shot_families = record.screen_shot_families.clone();
        apply_agency_support(&mut app, &agencies.support);
        let pending = apply_locations(&mut app, locations);

        self.publish(&app, pending)?;
        self.write("delete progress", false, |store| {
            store.delete_progress(&record.token)
        })?;
        session.forget(&record.token);
        info!("published app {} ({}) from submission", app.slug, app.key);
        Ok(app)
    }

    /// Delete progress records untouched for longer than the configured TTL.
    ///
    /// Returns the number of records deleted.
    pub fn sweep_expired_progress(&mut self) -> Result<usize, SubmissionError> {
        let cutoff = self.clock.now() - self.settings.progress_ttl;
        let expired = self
            .store
            .progress_updated_before(cutoff)
            .map(|record| record.map(|record| record.token))
            .collect::<Result<Vec<_>, _>>()?;
        for token in &expired {
            self.write("sweep progress", false, |store| store.delete_progress(token))?;
            warn!("swept expired submission {token}");
        }
        Ok(expired.len())
    }

    /// Write `app` and `pending` rows in the configured order.
    pub(crate) fn publish(
        &mut self,
        app: &TransitApp,
        pending: Vec<PendingLocation>,
    ) -> Result<(), SubmissionError> {
        match self.settings.finalize_order {
            FinalizeOrder::LocationsFirst => {
                self.put_locations(app, pending)?;
                self.put_app(app)?;
            }
            FinalizeOrder::AppFirst => {
                self.put_app(app)?;
                self.put_locations(app, pending)?;
            }
        }
        Ok(())
    }

    pub(crate) fn put_app(&mut self, app: &TransitApp) -> Result<(), SubmissionError> {
        self.write("put app", true, |store| store.put_app(app))
    }

    fn put_locations(
        &mut self,
        app: &TransitApp,
        pending: Vec<PendingLocation>,
    ) -> Result<(), SubmissionError> {
        for location in pending {
            let row = location.into_location(self.store.reserve_location_key()?, app.key);
            self.write("put location", true, |store| store.put_location(&row))?;
        }
        Ok(())
    }

    /// Run one write with a single retry on timeout, then invalidate the
    /// cache if the write is visible to resolvers.
    pub(crate) fn write(
        &mut self,
        operation: &'static str,
        visible: bool,
        mut write: impl FnMut(&mut S) -> Result<(), StoreError>,
    ) -> Result<(), SubmissionError> {
        let store = &mut self.store;
        retry_once(operation, || write(&mut *store))?;
        if visible {
            self.cache.invalidate(CacheScope::AppListings);
        }
        Ok(())
    }

    fn validated(
        &self,
        request: &StepRequest<'_>,
        session: &impl ProgressSession,
    ) -> Result<ProgressRecord, SubmissionError> {
        let Some(token) = request.url_token.and_then(ProgressToken::parse) else {
            debug!("rejected submission request: malformed token");
            return Err(SubmissionError::NotFound);
        };
        if request.consistent_token().is_none() {
            debug!("rejected submission request: posted token mismatch");
            return Err(SubmissionError::NotFound);
        }
        if !session.contains(token.as_str()) {
            debug!("rejected submission request: token not in session");
            return Err(SubmissionError::NotFound);
        }
        self.store.progress(token.as_str())?.ok_or_else(|| {
            debug!("rejected submission request: no progress record");
            SubmissionError::NotFound
        })
    }
}

fn encode<T: StepPayload>(step: &T) -> Result<Vec<u8>, SubmissionError> {
    step.encode().map_err(|source| SubmissionError::Payload {
        step: T::STEP,
        source,
    })
}

fn decode<T: StepPayload>(bytes: Option<&[u8]>) -> Result<T, SubmissionError> {
    let bytes = bytes.ok_or(SubmissionError::InvalidState { step: T::STEP })?;
    T::decode(bytes).map_err(|source| SubmissionError::Payload {
        step: T::STEP,
        source,
    })
}

fn apply_info(app: &mut TransitApp, info: &InfoStep) {
    app.description.clone_from(&info.description);
    app.url.clone_from(&info.url);
    app.price_cents = info.price_cents;
    app.author_name.clone_from(&info.author_name);
    app.author_email.clone_from(&info.author_email);
    app.long_description.clone_from(&info.long_description);
    app.platforms.clone_from(&info.platforms);
    app.categories.clone_from(&info.categories);
    app.tags = info.tags();
}

pub(crate) fn apply_agency_support(app: &mut TransitApp, support: &AgencySupport) {
    app.explicitly_supported_agency_keys.clear();
    app.supports_all_public_agencies = false;
    app.supports_any_gtfs = !matches!(support, AgencySupport::Nothing);
    match support {
        AgencySupport::Nothing => {}
        AgencySupport::Specific(keys) => app.add_explicit_agencies(keys.iter().copied()),
        AgencySupport::AllPublicAgencies => app.supports_all_public_agencies = true,
    }
}

pub(crate) fn apply_locations(
    app: &mut TransitApp,
    locations: &LocationStep,
) -> Vec<PendingLocation> {
    app.explicitly_supports_the_entire_world = locations.available_globally;
    let pending = app.add_cities(locations.places.unique_cities());
    let mut countries: Vec<String> = Vec::new();
    for code in locations.places.unique_countries().map(str::to_ascii_uppercase) {
        if !countries.contains(&code) {
            countries.push(code);
        }
    }
    app.add_countries(countries);
    pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ManualClock, MemorySession};
    use rstest::{fixture, rstest};
    use wayfare_core::{
        AgencyKey, AppFilter, CityInfo, MemoryDirectoryStore, Visibility,
        test_support::{Fault, FaultyStore, RecordingCache, WriteKind, fixture_time},
    };

    type TestWizard<'c> = SubmissionWizard<
        FaultyStore<MemoryDirectoryStore>,
        &'c RecordingCache,
        ContentHashFamilies,
        &'c ManualClock,
    >;

    struct Harness {
        cache: RecordingCache,
        clock: ManualClock,
    }

    impl Harness {
        fn wizard(&self, settings: WizardSettings, faults: &[Fault]) -> TestWizard<'_> {
            let mut store = FaultyStore::new(MemoryDirectoryStore::default());
            for fault in faults {
                store.inject(*fault);
            }
            SubmissionWizard::new(store)
                .with_cache(&self.cache)
                .with_clock(&self.clock)
                .with_settings(settings)
        }
    }

    #[fixture]
    fn harness() -> Harness {
        Harness {
            cache: RecordingCache::default(),
            clock: ManualClock::new(fixture_time()),
        }
    }

    fn info() -> InfoStep {
        InfoStep {
            title: "Bus Buddy".into(),
            description: "Arrivals".into(),
            ..InfoStep::default()
        }
    }

    fn portland_and_us() -> LocationStep {
        let mut step = LocationStep::default();
        step.places
            .cities
            .push(CityInfo::new(45.523_451_5, -122.676_207_1, "Portland", "OR", "US"));
        step.places.countries.push("US".into());
        step
    }

    fn prepared(
        wizard: &mut TestWizard<'_>,
        session: &mut MemorySession,
        support: AgencySupport,
    ) -> ProgressToken {
        let token = wizard.create(session).expect("create");
        let request = StepRequest::post(token.as_str());
        wizard
            .save_info(&request, session, &info(), &[b"shot".to_vec(), Vec::new()])
            .expect("save info");
        wizard
            .save_agencies(&request, session, &AgencyStep { support })
            .expect("save agencies");
        token
    }

    #[rstest]
    fn token_is_valid_until_finalized(harness: Harness) {
        let mut wizard = harness.wizard(WizardSettings::default(), &[]);
        let mut session = MemorySession::default();
        let token = prepared(&mut wizard, &mut session, AgencySupport::Nothing);
        let request = StepRequest::post(token.as_str());
        assert!(wizard.is_valid_token(&request, &session));
        assert_eq!(
            wizard.state(&request, &session).expect("state"),
            SubmissionState::AgenciesSaved
        );

        let app = wizard
            .finalize(&request, &mut session, &portland_and_us())
            .expect("finalize");
        assert!(!wizard.is_valid_token(&request, &session));
        assert!(session.tokens().is_empty());
        assert_eq!(app.screen_shot_families.len(), 1);
        assert_eq!(app.explicitly_supported_countries, ["US"]);
        assert_eq!(wizard.store().inner().location_count(), 1);
        assert_eq!(wizard.store().inner().progress_count(), 0);
    }

    #[rstest]
    fn every_validity_condition_is_required(harness: Harness) {
        let mut wizard = harness.wizard(WizardSettings::default(), &[]);
        let mut session = MemorySession::default();
        let token = wizard.create(&mut session).expect("create");
        let stranger = MemorySession::default();
        let other = ProgressToken::mint();

        assert!(wizard.is_valid_token(&StepRequest::get(token.as_str()), &session));
        assert!(!wizard.is_valid_token(&StepRequest::get("short"), &session));
        assert!(!wizard.is_valid_token(&StepRequest::get(token.as_str()), &stranger));
        assert!(!wizard.is_valid_token(
            &StepRequest::post(token.as_str()).with_posted_token(Some(other.as_str())),
            &session
        ));
        let mut forged = session.clone();
        forged.remember(&other);
        assert!(!wizard.is_valid_token(&StepRequest::get(other.as_str()), &forged));
        assert!(matches!(
            wizard.state(&StepRequest::get(other.as_str()), &forged),
            Err(SubmissionError::NotFound)
        ));
    }

    #[rstest]
    fn finalize_without_saved_steps_is_an_invalid_state(harness: Harness) {
        let mut wizard = harness.wizard(WizardSettings::default(), &[]);
        let mut session = MemorySession::default();
        let token = wizard.create(&mut session).expect("create");
        let request = StepRequest::post(token.as_str());
        wizard
            .save_info(&request, &session, &info(), &[])
            .expect("save info");
        assert!(matches!(
            wizard.finalize(&request, &mut session, &LocationStep::default()),
            Err(SubmissionError::InvalidState { step: "agencies" })
        ));
        assert!(wizard.is_valid_token(&request, &session));
    }

    #[rstest]
    fn corrupt_blobs_are_fatal(harness: Harness) {
        let mut wizard = harness.wizard(WizardSettings::default(), &[]);
        let mut session = MemorySession::default();
        let token = prepared(&mut wizard, &mut session, AgencySupport::Nothing);
        let mut record = wizard
            .store()
            .progress(token.as_str())
            .expect("read")
            .expect("record");
        record.info = Some(b"(dp0\n".to_vec());
        wizard.store_mut().put_progress(&record).expect("corrupt");

        let request = StepRequest::post(token.as_str());
        assert!(matches!(
            wizard.finalize(&request, &mut session, &LocationStep::default()),
            Err(SubmissionError::Payload { step: "info", .. })
        ));
    }

    #[rstest]
    fn empty_specific_selection_is_rejected(harness: Harness) {
        let mut wizard = harness.wizard(WizardSettings::default(), &[]);
        let mut session = MemorySession::default();
        let token = wizard.create(&mut session).expect("create");
        let step = AgencyStep {
            support: AgencySupport::Specific(Vec::new()),
        };
        assert!(matches!(
            wizard.save_agencies(&StepRequest::post(token.as_str()), &session, &step),
            Err(SubmissionError::EmptyAgencySelection)
        ));
    }

    #[rstest]
    #[case(AgencySupport::Nothing, false, false, &[])]
    #[case(AgencySupport::AllPublicAgencies, true, true, &[])]
    #[case(
        AgencySupport::Specific(vec![AgencyKey(3), AgencyKey(1)]),
        false,
        true,
        &[AgencyKey(3), AgencyKey(1)]
    )]
    fn agency_choice_sets_relationships(
        harness: Harness,
        #[case] support: AgencySupport,
        #[case] all_public: bool,
        #[case] any_gtfs: bool,
        #[case] explicit: &[AgencyKey],
    ) {
        let mut wizard = harness.wizard(WizardSettings::default(), &[]);
        let mut session = MemorySession::default();
        let token = prepared(&mut wizard, &mut session, support);
        let app = wizard
            .finalize(&StepRequest::post(token.as_str()), &mut session, &LocationStep::default())
            .expect("finalize");
        assert_eq!(app.supports_all_public_agencies, all_public);
        assert_eq!(app.supports_any_gtfs, any_gtfs);
        assert_eq!(app.explicitly_supported_agency_keys, explicit);
    }

    #[rstest]
    fn country_codes_are_stored_upper_case(harness: Harness) {
        let mut wizard = harness.wizard(WizardSettings::default(), &[]);
        let mut session = MemorySession::default();
        let token = prepared(&mut wizard, &mut session, AgencySupport::Nothing);
        let mut step = LocationStep::default();
        step.places
            .countries
            .extend(["us".to_owned(), "De".to_owned(), "US".to_owned()]);
        let app = wizard
            .finalize(&StepRequest::post(token.as_str()), &mut session, &step)
            .expect("finalize");
        assert_eq!(app.explicitly_supported_countries, ["US", "DE"]);
        let listed: Vec<_> = wizard
            .store()
            .apps(AppFilter::Country("US".into()), Visibility::VisibleOnly)
            .collect::<Result<_, _>>()
            .expect("country apps");
        assert_eq!(listed.len(), 1);
    }

    #[rstest]
    fn app_first_failure_leaves_undeclared_rows_missing(harness: Harness) {
        let settings = WizardSettings {
            finalize_order: FinalizeOrder::AppFirst,
            ..WizardSettings::default()
        };
        let mut wizard = harness.wizard(settings, &[Fault::unavailable(WriteKind::PutLocation)]);
        let mut session = MemorySession::default();
        let token = prepared(&mut wizard, &mut session, AgencySupport::Nothing);
        let result = wizard.finalize(&StepRequest::post(token.as_str()), &mut session, &portland_and_us());
        assert!(matches!(result, Err(SubmissionError::Store(StoreError::Unavailable { .. }))));

        let stored: Vec<_> = wizard
            .store()
            .apps(AppFilter::All, Visibility::IncludeHidden)
            .collect::<Result<_, _>>()
            .expect("apps");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].explicitly_supported_city_slugs.len(), 1);
        assert_eq!(wizard.store().inner().location_count(), 0);
        assert!(wizard.is_valid_token(&StepRequest::post(token.as_str()), &session));
    }

    #[rstest]
    fn locations_first_failure_leaves_only_orphan_rows(harness: Harness) {
        let mut wizard = harness.wizard(WizardSettings::default(), &[Fault::unavailable(WriteKind::PutApp)]);
        let mut session = MemorySession::default();
        let token = prepared(&mut wizard, &mut session, AgencySupport::Nothing);
        assert!(
            wizard
                .finalize(&StepRequest::post(token.as_str()), &mut session, &portland_and_us())
                .is_err()
        );
        assert_eq!(
            wizard
                .store()
                .apps(AppFilter::All, Visibility::IncludeHidden)
                .count(),
            0
        );
        assert_eq!(wizard.store().inner().location_count(), 1);
        assert_eq!(wizard.collect_orphan_locations().expect("collect"), 1);
        assert_eq!(wizard.store().inner().location_count(), 0);
    }

    #[rstest]
    fn a_single_timeout_is_retried(harness: Harness) {
        let mut wizard = harness.wizard(WizardSettings::default(), &[Fault::timeout(WriteKind::PutApp)]);
        let mut session = MemorySession::default();
        let token = prepared(&mut wizard, &mut session, AgencySupport::Nothing);
        wizard
            .finalize(&StepRequest::post(token.as_str()), &mut session, &portland_and_us())
            .expect("finalize after retry");
        assert_eq!(wizard.store().attempts(WriteKind::PutApp), 2);
        assert_eq!(harness.cache.count(), 2);
    }

    #[rstest]
    fn a_second_timeout_is_fatal(harness: Harness) {
        let mut wizard = harness.wizard(
            WizardSettings::default(),
            &[Fault::persistent_timeout(WriteKind::PutProgress).after(1)],
        );
        let mut session = MemorySession::default();
        let token = wizard.create(&mut session).expect("create");
        let result = wizard.save_info(&StepRequest::post(token.as_str()), &session, &info(), &[]);
        assert!(matches!(result, Err(SubmissionError::Store(StoreError::Timeout { .. }))));
        assert_eq!(wizard.store().attempts(WriteKind::PutProgress), 3);
    }

    #[rstest]
    fn sweep_deletes_only_expired_progress(harness: Harness) {
        let mut wizard = harness.wizard(WizardSettings::default(), &[]);
        let mut session = MemorySession::default();
        let stale = wizard.create(&mut session).expect("create");
        harness.clock.advance(TimeDelta::days(6));
        let fresh = wizard.create(&mut session).expect("create");
        harness.clock.advance(TimeDelta::days(2));

        assert_eq!(wizard.sweep_expired_progress().expect("sweep"), 1);
        assert!(!wizard.is_valid_token(&StepRequest::get(stale.as_str()), &session));
        assert!(wizard.is_valid_token(&StepRequest::get(fresh.as_str()), &session));
    }
}
