//! Location-driven app discovery.
//!
//! [`LocationResolver::apps_near`] merges four independent sources, in this
//! order, behind one seen-set:
//!
//! 1. apps supporting an agency inside the search box;
//! 2. apps declaring a city inside the search box;
//! 3. apps declaring the query's country;
//! 4. apps declaring support for the entire world.
//!
//! Every source is a legitimate match. Order only decides which stage is
//! credited with an app reachable through several of them. Later stages are
//! not queried until the earlier ones are exhausted.

use std::collections::HashSet;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dedup::{failed, lazily, uniquify};
use crate::{
    AppFilter, BoundingBox, Dedup, DirectoryStore, EntityStream, MembershipResolver, TransitApp,
    Visibility, is_valid_lat_lon, slugify, square_bounding_box_centered_at,
};

/// Tunables for nearby searches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Side of the square search box in miles; 50 behaves like a 25-mile
    /// radius.
    pub bbox_side_miles: f64,
    /// Cap on agencies fetched from the search box.
    pub max_agencies: usize,
    /// Cap on location rows fetched from the search box.
    pub max_locations: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            bbox_side_miles: 50.0,
            max_agencies: 50,
            max_locations: 500,
        }
    }
}

/// Errors raised while validating a [`NearbyQuery`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NearbyQueryError {
    /// Latitude or longitude is outside its range, or not a number.
    #[error("invalid coordinates ({latitude}, {longitude})")]
    InvalidCoordinates {
        /// Rejected latitude.
        latitude: f64,
        /// Rejected longitude.
        longitude: f64,
    },
    /// The country code is not two ASCII letters.
    #[error("invalid country code '{code}'")]
    InvalidCountryCode {
        /// Rejected code.
        code: String,
    },
}

/// A validated point and country.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyQuery {
    latitude: f64,
    longitude: f64,
    country_code: String,
}

impl NearbyQuery {
    /// Validate a search point and a two-letter country code.
    ///
    /// The code is upper-cased.
    ///
    /// # Examples
    /// ```
    /// use wayfare_core::NearbyQuery;
    ///
    /// let query = NearbyQuery::new(39.95, -75.16, "us").expect("valid query");
    /// assert_eq!(query.country_code(), "US");
    /// assert!(NearbyQuery::new(91.0, 0.0, "US").is_err());
    /// ```
    pub fn new(
        latitude: f64,
        longitude: f64,
        country_code: &str,
    ) -> Result<Self, NearbyQueryError> {
        if !is_valid_lat_lon(latitude, longitude) {
            return Err(NearbyQueryError::InvalidCoordinates {
                latitude,
                longitude,
            });
        }
        if country_code.len() != 2 || !country_code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(NearbyQueryError::InvalidCountryCode {
                code: country_code.to_owned(),
            });
        }
        Ok(Self {
            latitude,
            longitude,
            country_code: country_code.to_ascii_uppercase(),
        })
    }

    /// Latitude in degrees.
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees.
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Upper-case ISO country code.
    pub fn country_code(&self) -> &str {
        &self.country_code
    }
}

/// Finds apps relevant to a place.
pub struct LocationResolver<'s, S: ?Sized> {
    store: &'s S,
    visibility: Visibility,
    settings: SearchSettings,
}

impl<S: ?Sized> Clone for LocationResolver<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: ?Sized> Copy for LocationResolver<'_, S> {}

impl<S: ?Sized> std::fmt::Debug for LocationResolver<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationResolver")
            .field("visibility", &self.visibility)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<'s, S> LocationResolver<'s, S>
where
    S: DirectoryStore + ?Sized,
{
    /// Resolve against `store` with default settings, excluding hidden apps.
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            visibility: Visibility::default(),
            settings: SearchSettings::default(),
        }
    }

    /// Replace the search settings.
    #[must_use]
    pub fn with_settings(mut self, settings: SearchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Change whether hidden apps are reported.
    #[must_use]
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Settings in force.
    pub fn settings(&self) -> SearchSettings {
        self.settings
    }

    fn membership(&self) -> MembershipResolver<'s, S> {
        MembershipResolver::new(self.store).with_visibility(self.visibility)
    }

    fn search_box(&self, query: &NearbyQuery) -> BoundingBox {
        square_bounding_box_centered_at(
            query.latitude,
            query.longitude,
            self.settings.bbox_side_miles,
        )
    }

    /// Apps relevant to `query`, from all four sources.
    ///
    /// # Examples
    /// ```
    /// use chrono::Utc;
    /// use wayfare_core::{
    ///     AppKey, Dedup, DirectoryStore, LocationResolver, MemoryDirectoryStore, NearbyQuery,
    ///     TransitApp,
    /// };
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut store = MemoryDirectoryStore::default();
    /// let mut everywhere = TransitApp::new(AppKey(1), "Everywhere", Utc::now());
    /// everywhere.explicitly_supports_the_entire_world = true;
    /// let mut fahrplan = TransitApp::new(AppKey(2), "Fahrplan", Utc::now());
    /// fahrplan.add_countries(["DE"]);
    /// store.put_app(&everywhere)?;
    /// store.put_app(&fahrplan)?;
    ///
    /// let berlin = NearbyQuery::new(52.5234051, 13.4113999, "DE")?;
    /// let titles: Vec<String> = LocationResolver::new(&store)
    ///     .apps_near(&berlin, Dedup::Unique)
    ///     .map(|app| app.map(|app| app.title))
    ///     .collect::<Result<_, _>>()?;
    /// assert_eq!(titles, ["Fahrplan", "Everywhere"]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn apps_near(&self, query: &NearbyQuery, dedup: Dedup) -> EntityStream<'s, TransitApp> {
        let resolver = *self;
        let bbox = self.search_box(query);
        let country = query.country_code.clone();
        debug!(
            "nearby search at ({}, {}) in {country}, box side {} miles",
            query.latitude, query.longitude, self.settings.bbox_side_miles
        );

        let by_agency = lazily(move || {
            debug!("nearby stage 1: apps for agencies in box");
            resolver.apps_for_agencies_in(bbox)
        });
        let by_location = lazily(move || {
            debug!("nearby stage 2: apps located in box");
            resolver.apps_located_in(bbox)
        });
        let by_country = lazily(move || {
            debug!("nearby stage 3: apps for country {country}");
            resolver
                .store
                .apps(AppFilter::Country(country), resolver.visibility)
        });
        let by_world = lazily(move || {
            debug!("nearby stage 4: apps for the entire world");
            resolver
                .store
                .apps(AppFilter::EntireWorld, resolver.visibility)
        });

        let stages = by_agency.chain(by_location).chain(by_country).chain(by_world);
        uniquify(Box::new(stages), dedup)
    }

    /// Apps declaring a city inside the search box around `query`.
    pub fn apps_explicitly_near(
        &self,
        query: &NearbyQuery,
        dedup: Dedup,
    ) -> EntityStream<'s, TransitApp> {
        uniquify(self.apps_located_in(self.search_box(query)), dedup)
    }

    /// Apps declaring a city with the same slug as `city_name`.
    pub fn apps_for_city(&self, city_name: &str) -> EntityStream<'s, TransitApp> {
        self.store
            .apps(AppFilter::CitySlug(slugify(city_name)), self.visibility)
    }

    /// Apps declaring `country_code`.
    pub fn apps_for_country(&self, country_code: &str) -> EntityStream<'s, TransitApp> {
        self.store.apps(
            AppFilter::Country(country_code.to_ascii_uppercase()),
            self.visibility,
        )
    }

    /// Apps declaring the city or the country: city matches first.
    pub fn apps_for_country_or_city(
        &self,
        country_code: &str,
        city_name: &str,
        dedup: Dedup,
    ) -> EntityStream<'s, TransitApp> {
        let resolver = *self;
        let country = country_code.to_owned();
        let merged = self
            .apps_for_city(city_name)
            .chain(lazily(move || resolver.apps_for_country(&country)));
        uniquify(Box::new(merged), dedup)
    }

    /// Apps declaring both the country and the city, in country order.
    pub fn apps_for_country_and_city(
        &self,
        country_code: &str,
        city_name: &str,
    ) -> EntityStream<'s, TransitApp> {
        let resolver = *self;
        let country = country_code.to_owned();
        let city = city_name.to_owned();
        lazily(move || {
            let in_city = match resolver
                .apps_for_city(&city)
                .map(|app| app.map(|app| app.key))
                .collect::<Result<HashSet<_>, _>>()
            {
                Ok(keys) => keys,
                Err(error) => return failed(error),
            };
            Box::new(
                resolver
                    .apps_for_country(&country)
                    .filter(move |app| app.as_ref().map_or(true, |app| in_city.contains(&app.key))),
            )
        })
    }

    fn apps_for_agencies_in(self, bbox: BoundingBox) -> EntityStream<'s, TransitApp> {
        let agencies = self.store.agencies_in_box(&bbox, self.settings.max_agencies);
        self.membership()
            .apps_for_agency_stream(agencies, Dedup::KeepDuplicates)
    }

    fn apps_located_in(self, bbox: BoundingBox) -> EntityStream<'s, TransitApp> {
        let store = self.store;
        let visibility = self.visibility;
        let rows = store.locations_in_box(&bbox, self.settings.max_locations);
        Box::new(rows.filter_map(move |row| {
            let app = row.and_then(|row| store.app(row.app));
            match app {
                Ok(Some(app)) if visibility.admits(&app) => Some(Ok(app)),
                Ok(_) => None,
                Err(error) => Some(Err(error)),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{SampleDirectory, titles};
    use rstest::{fixture, rstest};

    const CITY_SCALE_MILES: f64 = 8.0;

    #[fixture]
    fn sample() -> SampleDirectory {
        SampleDirectory::in_memory().expect("build sample directory")
    }

    fn search(sample: &SampleDirectory, city: &str, side_miles: f64) -> Vec<String> {
        let city = sample.city(city).expect("sample city");
        let query = NearbyQuery::new(city.latitude, city.longitude, &city.country_code)
            .expect("valid query");
        let settings = SearchSettings {
            bbox_side_miles: side_miles,
            ..SearchSettings::default()
        };
        let mut found = titles(
            LocationResolver::new(&sample.store)
                .with_settings(settings)
                .apps_near(&query, Dedup::Unique),
        );
        found.sort();
        found
    }

    #[rstest]
    #[case("Philadelphia", CITY_SCALE_MILES, &[
        "app_for_entire_world",
        "app_for_philadelphia",
        "app_for_us",
        "app_p2_p3",
        "app_pub_pub2_pub3_p1_p2",
    ])]
    #[case("Narberth", CITY_SCALE_MILES, &["app_for_entire_world", "app_for_narberth", "app_for_us"])]
    #[case("Narberth", 50.0, &[
        "app_for_entire_world",
        "app_for_narberth",
        "app_for_philadelphia",
        "app_for_us",
        "app_p2_p3",
        "app_pub_pub2_pub3_p1_p2",
    ])]
    #[case("Berlin", 50.0, &["app_for_de", "app_for_entire_world"])]
    #[case("Grants Pass", 1000.0, &[
        "app_for_entire_world",
        "app_for_portland",
        "app_for_us",
        "app_pub",
        "app_pub_p1_p3",
        "app_pub_pub2_pub3_p1_p2",
    ])]
    fn finds_apps_from_every_source(
        sample: SampleDirectory,
        #[case] city: &str,
        #[case] side_miles: f64,
        #[case] expected: &[&str],
    ) {
        assert_eq!(search(&sample, city, side_miles), expected);
    }

    #[rstest]
    fn earlier_stages_take_credit(sample: SampleDirectory) {
        let seattle = sample.agency("Public 2").expect("agency");
        let query = NearbyQuery::new(seattle.latitude, seattle.longitude, "US").expect("query");
        let found = titles(LocationResolver::new(&sample.store).apps_near(&query, Dedup::Unique));
        assert_eq!(
            found,
            [
                "app_pub_pub2_pub3_p1_p2",
                "app_pub",
                "app_pub_p1_p3",
                "app_for_us",
                "app_for_entire_world"
            ]
        );
    }

    #[rstest]
    fn keeping_duplicates_counts_every_source(sample: SampleDirectory) {
        let seattle = sample.agency("Public 2").expect("agency");
        let query = NearbyQuery::new(seattle.latitude, seattle.longitude, "US").expect("query");
        let resolver = LocationResolver::new(&sample.store);
        let all = resolver.apps_near(&query, Dedup::KeepDuplicates).count();
        let unique = resolver.apps_near(&query, Dedup::Unique).count();
        assert_eq!(all, 6);
        assert_eq!(unique, 5);
    }

    #[rstest]
    fn hidden_location_owners_are_skipped(mut sample: SampleDirectory) {
        let mut hidden = sample.app("app_for_narberth").expect("app");
        hidden.is_hidden = true;
        sample.store.put_app(&hidden).expect("hide app");
        let narberth = sample.city("Narberth").expect("sample city");
        let query = NearbyQuery::new(narberth.latitude, narberth.longitude, "US").expect("query");
        let resolver = LocationResolver::new(&sample.store).with_settings(SearchSettings {
            bbox_side_miles: CITY_SCALE_MILES,
            ..SearchSettings::default()
        });
        assert_eq!(resolver.apps_explicitly_near(&query, Dedup::Unique).count(), 0);
        let admin = resolver.with_visibility(Visibility::IncludeHidden);
        assert_eq!(
            titles(admin.apps_explicitly_near(&query, Dedup::Unique)),
            ["app_for_narberth"]
        );
    }

    #[rstest]
    fn city_and_country_queries(sample: SampleDirectory) {
        let resolver = LocationResolver::new(&sample.store);
        assert_eq!(titles(resolver.apps_for_city("Portland")), ["app_for_portland"]);
        assert_eq!(titles(resolver.apps_for_country("de")), ["app_for_de"]);
        assert_eq!(
            titles(resolver.apps_for_country_and_city("US", "Narberth")),
            Vec::<String>::new()
        );
        assert_eq!(
            titles(resolver.apps_for_country_or_city("DE", "Narberth", Dedup::Unique)),
            ["app_for_narberth", "app_for_de"]
        );
    }

    #[rstest]
    fn country_and_city_keeps_country_order(mut sample: SampleDirectory) {
        let mut both = sample.app("app_for_portland").expect("app");
        both.add_countries(["US"]);
        sample.store.put_app(&both).expect("put app");
        let resolver = LocationResolver::new(&sample.store);
        assert_eq!(
            titles(resolver.apps_for_country_and_city("us", "portland")),
            ["app_for_portland"]
        );
    }

    #[rstest]
    #[case(f64::NAN, 0.0, "US")]
    #[case(90.5, 0.0, "US")]
    #[case(0.0, -180.5, "US")]
    #[case(0.0, 0.0, "USA")]
    #[case(0.0, 0.0, "u1")]
    #[case(0.0, 0.0, "")]
    fn rejects_malformed_queries(
        #[case] latitude: f64,
        #[case] longitude: f64,
        #[case] country: &str,
    ) {
        assert!(NearbyQuery::new(latitude, longitude, country).is_err());
    }
}
