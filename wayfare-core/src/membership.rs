//! Agency ↔ app membership.
//!
//! An app supports an agency when it lists the agency explicitly, or when it
//! supports all public agencies and the agency is public. Explicit matches
//! are always reported before implicit ones. With [`Dedup::Unique`] an app
//! (or agency) that qualifies on both grounds is reported once, at its
//! explicit position; with [`Dedup::KeepDuplicates`] it is reported once per
//! ground.
//!
//! Batch forms concatenate the per-item streams without deduplication and
//! apply one seen-set across the whole batch, so an app reached through two
//! agencies is still reported once.
//!
//! # Examples
//! ```
//! use chrono::Utc;
//! use wayfare_core::{
//!     Agency, AgencyKey, AppKey, Dedup, DirectoryStore, MembershipResolver,
//!     MemoryDirectoryStore, TransitApp,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = MemoryDirectoryStore::default();
//! let trimet = Agency::new(AgencyKey(1), "TriMet", "Portland", "OR", "us", 45.52, -122.68)
//!     .with_date_opened(Utc::now());
//! store.put_agency(&trimet)?;
//! let mut any_transit = TransitApp::new(AppKey(1), "Any Transit", Utc::now());
//! any_transit.supports_all_public_agencies = true;
//! let mut bus_buddy = TransitApp::new(AppKey(2), "Bus Buddy", Utc::now());
//! bus_buddy.add_explicit_agencies([trimet.key]);
//! bus_buddy.supports_all_public_agencies = true;
//! store.put_app(&any_transit)?;
//! store.put_app(&bus_buddy)?;
//!
//! let titles: Vec<String> = MembershipResolver::new(&store)
//!     .apps_for_agency(&trimet, Dedup::Unique)
//!     .map(|app| app.map(|app| app.title))
//!     .collect::<Result<_, _>>()?;
//! assert_eq!(titles, ["Bus Buddy", "Any Transit"]);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;

use log::debug;

use crate::dedup::{empty, failed, lazily, uniquify};
use crate::{
    Agency, AgencyKey, AppFilter, Dedup, DirectoryStore, EntityStream, StoreError, TransitApp,
    Visibility,
};

/// Resolves membership between agencies and apps against a store.
///
/// The resolver only borrows the store; streams it returns live as long as
/// that borrow, not as long as the resolver.
pub struct MembershipResolver<'s, S: ?Sized> {
    store: &'s S,
    visibility: Visibility,
}

impl<S: ?Sized> Clone for MembershipResolver<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: ?Sized> Copy for MembershipResolver<'_, S> {}

impl<S: ?Sized> std::fmt::Debug for MembershipResolver<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MembershipResolver")
            .field("visibility", &self.visibility)
            .finish_non_exhaustive()
    }
}

impl<'s, S> MembershipResolver<'s, S>
where
    S: DirectoryStore + ?Sized,
{
    /// Resolve against `store`, excluding hidden apps.
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            visibility: Visibility::default(),
        }
    }

    /// Change whether hidden apps are reported.
    #[must_use]
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Visibility applied to app queries.
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Apps listing `agency` explicitly.
    pub fn explicit_apps_for_agency(&self, agency: AgencyKey) -> EntityStream<'s, TransitApp> {
        self.store
            .apps(AppFilter::ExplicitAgency(agency), self.visibility)
    }

    /// Apps supporting `agency`: explicit support first, then implicit
    /// support if the agency is public.
    pub fn apps_for_agency(&self, agency: &Agency, dedup: Dedup) -> EntityStream<'s, TransitApp> {
        let explicit = self.explicit_apps_for_agency(agency.key);
        let stream: EntityStream<'s, TransitApp> = if agency.is_public() {
            let store = self.store;
            let visibility = self.visibility;
            Box::new(explicit.chain(lazily(move || {
                store.apps(AppFilter::SupportsAllPublicAgencies, visibility)
            })))
        } else {
            explicit
        };
        uniquify(stream, dedup)
    }

    /// Apps supporting the agency with `key`; a key that does not resolve
    /// yields nothing.
    pub fn apps_for_agency_key(
        &self,
        key: AgencyKey,
        dedup: Dedup,
    ) -> EntityStream<'s, TransitApp> {
        let resolver = *self;
        lazily(move || match resolver.store.agency(key) {
            Ok(Some(agency)) => resolver.apps_for_agency(&agency, dedup),
            Ok(None) => {
                debug!("agency {key} does not resolve; no apps");
                empty()
            }
            Err(error) => failed(error),
        })
    }

    /// Apps supporting at least one of `agencies`, deduplicated across the
    /// whole batch.
    pub fn apps_for_agencies<I>(&self, agencies: I, dedup: Dedup) -> EntityStream<'s, TransitApp>
    where
        I: IntoIterator<Item = Agency>,
        I::IntoIter: 's,
    {
        self.apps_for_agency_stream(Box::new(agencies.into_iter().map(Ok)), dedup)
    }

    /// Batch form over a stream of agencies, such as a bounding-box fetch.
    pub fn apps_for_agency_stream(
        &self,
        agencies: EntityStream<'s, Agency>,
        dedup: Dedup,
    ) -> EntityStream<'s, TransitApp> {
        let resolver = *self;
        let apps = agencies.flat_map(move |agency| match agency {
            Ok(agency) => resolver.apps_for_agency(&agency, Dedup::KeepDuplicates),
            Err(error) => failed(error),
        });
        uniquify(Box::new(apps), dedup)
    }

    /// Agencies `app` lists explicitly, in list order; keys that do not
    /// resolve are skipped.
    pub fn explicit_agencies_for_app(&self, app: &TransitApp) -> EntityStream<'s, Agency> {
        self.store
            .agencies(app.explicitly_supported_agency_keys.clone())
    }

    /// Agencies `app` supports: its explicit list, then every public agency
    /// if it supports all public agencies.
    pub fn agencies_for_app(&self, app: &TransitApp, dedup: Dedup) -> EntityStream<'s, Agency> {
        let explicit = self.explicit_agencies_for_app(app);
        let stream: EntityStream<'s, Agency> = if app.supports_all_public_agencies {
            let store = self.store;
            Box::new(explicit.chain(lazily(move || store.public_agencies())))
        } else {
            explicit
        };
        uniquify(stream, dedup)
    }

    /// Agencies supported by at least one of `apps`, deduplicated across the
    /// whole batch.
    pub fn agencies_for_apps<I>(&self, apps: I, dedup: Dedup) -> EntityStream<'s, Agency>
    where
        I: IntoIterator<Item = TransitApp>,
        I::IntoIter: 's,
    {
        let resolver = *self;
        let agencies = apps
            .into_iter()
            .flat_map(move |app| resolver.agencies_for_app(&app, Dedup::KeepDuplicates));
        uniquify(Box::new(agencies), dedup)
    }

    /// Number of unique supporting apps for every agency.
    ///
    /// This walks every agency and runs its membership query, so it is meant
    /// for offline reporting rather than request paths.
    pub fn agency_app_counts(&self) -> Result<BTreeMap<AgencyKey, usize>, StoreError> {
        let mut counts = BTreeMap::new();
        for agency in self.store.all_agencies() {
            let agency = agency?;
            let count = self
                .apps_for_agency(&agency, Dedup::Unique)
                .try_fold(0_usize, |count, app| app.map(|_| count + 1))?;
            counts.insert(agency.key, count);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FaultyStore, SampleDirectory, titles};
    use rstest::{fixture, rstest};

    #[fixture]
    fn sample() -> SampleDirectory {
        SampleDirectory::in_memory().expect("build sample directory")
    }

    fn sorted(mut names: Vec<String>) -> Vec<String> {
        names.sort();
        names
    }

    #[rstest]
    #[case("Public 1", &["app_pub", "app_pub_p1_p3", "app_pub_pub2_pub3_p1_p2"])]
    #[case("Public 2", &["app_pub_pub2_pub3_p1_p2", "app_pub", "app_pub_p1_p3"])]
    #[case("Private 1", &["app_p1", "app_pub_p1_p3", "app_pub_pub2_pub3_p1_p2"])]
    #[case("Private 2", &["app_p2_p3", "app_pub_pub2_pub3_p1_p2"])]
    #[case("Private 3", &["app_p2_p3", "app_pub_p1_p3"])]
    fn apps_for_agency_orders_explicit_first(
        sample: SampleDirectory,
        #[case] agency: &str,
        #[case] expected: &[&str],
    ) {
        let resolver = MembershipResolver::new(&sample.store);
        let agency = sample.agency(agency).expect("agency");
        assert_eq!(titles(resolver.apps_for_agency(&agency, Dedup::Unique)), expected);
    }

    #[rstest]
    fn keeping_duplicates_reports_both_grounds(sample: SampleDirectory) {
        let resolver = MembershipResolver::new(&sample.store);
        let agency = sample.agency("Public 2").expect("agency");
        assert_eq!(
            titles(resolver.apps_for_agency(&agency, Dedup::KeepDuplicates)),
            [
                "app_pub_pub2_pub3_p1_p2",
                "app_pub",
                "app_pub_p1_p3",
                "app_pub_pub2_pub3_p1_p2"
            ]
        );
    }

    #[rstest]
    fn batch_dedup_spans_every_agency(sample: SampleDirectory) {
        let resolver = MembershipResolver::new(&sample.store);
        let agencies = vec![
            sample.agency("Public 1").expect("agency"),
            sample.agency("Private 3").expect("agency"),
        ];
        assert_eq!(
            sorted(titles(resolver.apps_for_agencies(agencies.clone(), Dedup::Unique))),
            ["app_p2_p3", "app_pub", "app_pub_p1_p3", "app_pub_pub2_pub3_p1_p2"]
        );
        assert_eq!(
            sorted(titles(resolver.apps_for_agencies(agencies.clone(), Dedup::KeepDuplicates))),
            [
                "app_p2_p3",
                "app_pub",
                "app_pub_p1_p3",
                "app_pub_p1_p3",
                "app_pub_pub2_pub3_p1_p2"
            ]
        );

        let concatenated: usize = agencies
            .iter()
            .map(|agency| resolver.apps_for_agency(agency, Dedup::Unique).count())
            .sum();
        assert_eq!(concatenated, 5);
    }

    #[rstest]
    #[case("app_pub", &["Public 1", "Public 2", "Public 3"])]
    #[case("app_p2_p3", &["Private 2", "Private 3"])]
    #[case("app_pub_p1_p3", &["Private 1", "Private 3", "Public 1", "Public 2", "Public 3"])]
    #[case(
        "app_pub_pub2_pub3_p1_p2",
        &["Public 2", "Public 3", "Private 1", "Private 2", "Public 1"]
    )]
    fn agencies_for_app_orders_explicit_first(
        sample: SampleDirectory,
        #[case] app: &str,
        #[case] expected: &[&str],
    ) {
        let resolver = MembershipResolver::new(&sample.store);
        let app = sample.app(app).expect("app");
        let names: Vec<_> = resolver
            .agencies_for_app(&app, Dedup::Unique)
            .map(|agency| agency.expect("agency").name)
            .collect();
        assert_eq!(names, expected);
    }

    #[rstest]
    fn agencies_for_apps_with_duplicates(sample: SampleDirectory) {
        let resolver = MembershipResolver::new(&sample.store);
        let apps = vec![
            sample.app("app_pub_pub2_pub3_p1_p2").expect("app"),
            sample.app("app_p2_p3").expect("app"),
        ];
        let mut names: Vec<_> = resolver
            .agencies_for_apps(apps, Dedup::KeepDuplicates)
            .map(|agency| agency.expect("agency").name)
            .collect();
        names.sort();
        assert_eq!(
            names,
            [
                "Private 1",
                "Private 2",
                "Private 2",
                "Private 3",
                "Public 1",
                "Public 2",
                "Public 2",
                "Public 3",
                "Public 3"
            ]
        );
    }

    #[rstest]
    fn dangling_agency_keys_resolve_to_nothing(sample: SampleDirectory) {
        let resolver = MembershipResolver::new(&sample.store);
        assert_eq!(
            resolver
                .apps_for_agency_key(AgencyKey(9_999), Dedup::Unique)
                .count(),
            0
        );
        let mut app = sample.app("app_p1").expect("app");
        app.add_explicit_agency(AgencyKey(9_999));
        assert_eq!(resolver.explicit_agencies_for_app(&app).count(), 1);
    }

    #[rstest]
    fn hidden_apps_are_excluded_by_default(mut sample: SampleDirectory) {
        let mut hidden = sample.app("app_p1").expect("app");
        hidden.is_hidden = true;
        sample.store.put_app(&hidden).expect("hide app");
        let agency = sample.agency("Private 1").expect("agency");

        let visible = MembershipResolver::new(&sample.store);
        assert_eq!(
            titles(visible.apps_for_agency(&agency, Dedup::Unique)),
            ["app_pub_p1_p3", "app_pub_pub2_pub3_p1_p2"]
        );
        let admin = visible.with_visibility(Visibility::IncludeHidden);
        assert_eq!(admin.apps_for_agency(&agency, Dedup::Unique).count(), 3);
    }

    #[rstest]
    fn counts_unique_apps_per_agency(sample: SampleDirectory) {
        let resolver = MembershipResolver::new(&sample.store);
        let counts = resolver.agency_app_counts().expect("counts");
        let public_2 = sample.agency("Public 2").expect("agency").key;
        let private_2 = sample.agency("Private 2").expect("agency").key;
        assert_eq!(counts.get(&public_2), Some(&3));
        assert_eq!(counts.get(&private_2), Some(&2));
        assert_eq!(counts.len(), 6);
    }

    #[rstest]
    fn read_failures_surface_as_errors(sample: SampleDirectory) {
        let mut store = FaultyStore::new(sample.store);
        store.fail_reads();
        let resolver = MembershipResolver::new(&store);
        let results: Vec<_> = resolver
            .apps_for_agency_key(AgencyKey(1), Dedup::Unique)
            .collect();
        assert!(matches!(results.as_slice(), [Err(StoreError::Unavailable { .. })]));
    }
}
