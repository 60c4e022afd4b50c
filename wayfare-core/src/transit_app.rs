//! Transit apps and their explicit location rows.
//!
//! An app relates to agencies in two ways: a short explicit list of agency
//! keys, and the `supports_all_public_agencies` flag, which grants membership
//! in an open-ended set that grows as agencies publish data. Apps that are not
//! agency-driven (a cycling app, say) instead declare cities, countries or the
//! whole world. Each declared city also has a [`TransitAppLocation`] row so
//! that bounding-box searches can find the app.
//!
//! The relationship helpers only mutate the in-memory value; callers persist
//! it through a [`DirectoryStore`](crate::DirectoryStore) afterwards.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use geo::Coord;
use serde::{Deserialize, Serialize};

use crate::{AgencyKey, AppKey, Category, CityInfo, Keyed, LocationKey, Platform, slugify};

/// A third-party application listed in the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitApp {
    /// Identity.
    pub key: AppKey,
    /// Unique URL slug derived from the title.
    pub slug: String,
    /// Display title.
    pub title: String,
    /// One-line description.
    pub description: String,
    /// Where to get the app.
    pub url: Option<String>,
    /// Price in cents.
    pub price_cents: u64,
    /// Author or company name.
    pub author_name: Option<String>,
    /// Private contact address; never published.
    pub author_email: Option<String>,
    /// Free-form long description.
    pub long_description: String,
    /// Search tags, including platform and category labels.
    pub tags: Vec<String>,
    /// Platforms the app runs on.
    pub platforms: Vec<Platform>,
    /// Kinds of travel the app helps with.
    pub categories: Vec<Category>,
    /// Ordered screenshot family identifiers.
    pub screen_shot_families: Vec<String>,
    /// Shown on the front page.
    pub is_featured: bool,
    /// Excluded from public listings.
    pub is_hidden: bool,
    /// The app consumes any GTFS data at all.
    pub supports_any_gtfs: bool,
    /// Implicit membership for every public agency.
    pub supports_all_public_agencies: bool,
    /// Explicitly supported agencies, in insertion order.
    pub explicitly_supported_agency_keys: Vec<AgencyKey>,
    /// Slugs of explicitly supported cities.
    pub explicitly_supported_city_slugs: Vec<String>,
    /// `"Name, Area, CC"` details, index-aligned with the city slugs.
    pub explicitly_supported_city_details: Vec<String>,
    /// Two-letter codes of explicitly supported countries.
    pub explicitly_supported_countries: Vec<String>,
    /// Relevant everywhere.
    pub explicitly_supports_the_entire_world: bool,
    /// Creation time.
    pub date_added: DateTime<Utc>,
    /// Time of the last write.
    pub date_last_updated: DateTime<Utc>,
}

impl TransitApp {
    /// Construct an app with no relationships.
    ///
    /// # Examples
    /// ```
    /// use chrono::Utc;
    /// use wayfare_core::{AppKey, TransitApp};
    ///
    /// let app = TransitApp::new(AppKey(1), "OneBusAway", Utc::now());
    /// assert_eq!(app.slug, "onebusaway");
    /// assert!(app.is_free());
    /// ```
    pub fn new(key: AppKey, title: impl Into<String>, created: DateTime<Utc>) -> Self {
        let title = title.into();
        Self {
            key,
            slug: slugify(&title),
            title,
            description: String::new(),
            url: None,
            price_cents: 0,
            author_name: None,
            author_email: None,
            long_description: String::new(),
            tags: Vec::new(),
            platforms: Vec::new(),
            categories: Vec::new(),
            screen_shot_families: Vec::new(),
            is_featured: false,
            is_hidden: false,
            supports_any_gtfs: false,
            supports_all_public_agencies: false,
            explicitly_supported_agency_keys: Vec::new(),
            explicitly_supported_city_slugs: Vec::new(),
            explicitly_supported_city_details: Vec::new(),
            explicitly_supported_countries: Vec::new(),
            explicitly_supports_the_entire_world: false,
            date_added: created,
            date_last_updated: created,
        }
    }

    /// Rename the app, re-deriving its slug.
    ///
    /// Slug uniqueness is the caller's concern.
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.slug = slugify(&self.title);
    }

    /// Whether the app costs nothing.
    pub fn is_free(&self) -> bool {
        self.price_cents == 0
    }

    /// Tags that are not platform or category labels.
    pub fn extra_tags(&self) -> impl Iterator<Item = &str> + '_ {
        let generated: HashSet<&str> = Platform::CHOICES
            .iter()
            .chain(Category::CHOICES)
            .map(|(_, label)| *label)
            .collect();
        self.tags
            .iter()
            .map(String::as_str)
            .filter(move |tag| !generated.contains(tag))
    }

    /// Append agencies to the explicit support list.
    pub fn add_explicit_agencies<I>(&mut self, agencies: I)
    where
        I: IntoIterator<Item = AgencyKey>,
    {
        self.explicitly_supported_agency_keys.extend(agencies);
    }

    /// Append one agency to the explicit support list.
    pub fn add_explicit_agency(&mut self, agency: AgencyKey) {
        self.explicitly_supported_agency_keys.push(agency);
    }

    /// Remove the first occurrence of `agency`, returning whether it was present.
    pub fn remove_explicit_agency(&mut self, agency: AgencyKey) -> bool {
        let Some(index) = self
            .explicitly_supported_agency_keys
            .iter()
            .position(|key| *key == agency)
        else {
            return false;
        };
        self.explicitly_supported_agency_keys.remove(index);
        true
    }

    /// Declare support for a city.
    ///
    /// The slug and details lists grow in lockstep. The returned
    /// [`PendingLocation`] must be turned into a stored row for searches to
    /// find the app near the city.
    pub fn add_city(&mut self, city: &CityInfo) -> PendingLocation {
        let pending = PendingLocation::from(city);
        self.explicitly_supported_city_slugs
            .push(pending.city_slug.clone());
        self.explicitly_supported_city_details
            .push(pending.city_details.clone());
        pending
    }

    /// Declare support for several cities.
    pub fn add_cities<'c, I>(&mut self, cities: I) -> Vec<PendingLocation>
    where
        I: IntoIterator<Item = &'c CityInfo>,
    {
        cities.into_iter().map(|city| self.add_city(city)).collect()
    }

    /// Declare support for countries by two-letter code.
    pub fn add_countries<I, S>(&mut self, codes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.explicitly_supported_countries
            .extend(codes.into_iter().map(Into::into));
    }

    /// City details followed by country codes.
    pub fn supported_location_list(&self) -> Vec<String> {
        self.explicitly_supported_city_details
            .iter()
            .chain(&self.explicitly_supported_countries)
            .cloned()
            .collect()
    }

    /// Drop every declared city and country.
    ///
    /// Stored location rows are untouched; edit paths delete them separately.
    pub fn clear_explicit_locations(&mut self) {
        self.explicitly_supported_city_slugs.clear();
        self.explicitly_supported_city_details.clear();
        self.explicitly_supported_countries.clear();
    }
}

impl Keyed for TransitApp {
    type Key = AppKey;

    fn key(&self) -> AppKey {
        self.key
    }
}

/// A city declaration waiting for its row keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingLocation {
    /// Slug of the city name.
    pub city_slug: String,
    /// `"Name, Area, CC"` details.
    pub city_details: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl PendingLocation {
    /// Bind the declaration to a row key and owning app.
    pub fn into_location(self, key: LocationKey, app: AppKey) -> TransitAppLocation {
        TransitAppLocation {
            key,
            app,
            city_slug: self.city_slug,
            city_details: self.city_details,
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

impl From<&CityInfo> for PendingLocation {
    fn from(city: &CityInfo) -> Self {
        Self {
            city_slug: city.name_slug(),
            city_details: city.important_details(),
            latitude: city.latitude,
            longitude: city.longitude,
        }
    }
}

/// Join row placing an app at one explicitly supported city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitAppLocation {
    /// Identity.
    pub key: LocationKey,
    /// Owning app.
    pub app: AppKey,
    /// Slug of the city name.
    pub city_slug: String,
    /// `"Name, Area, CC"` details.
    pub city_details: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl TransitAppLocation {
    /// Row location (`x = longitude`, `y = latitude`).
    pub fn point(&self) -> Coord<f64> {
        Coord {
            x: self.longitude,
            y: self.latitude,
        }
    }
}

impl Keyed for TransitAppLocation {
    type Key = LocationKey;

    fn key(&self) -> LocationKey {
        self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn app() -> TransitApp {
        TransitApp::new(AppKey(1), "Bike Portland", DateTime::<Utc>::UNIX_EPOCH)
    }

    #[rstest]
    fn city_lists_stay_aligned(mut app: TransitApp) {
        let portland = CityInfo::new(45.5234515, -122.6762071, "Portland", "OR", "US");
        let grants_pass = CityInfo::new(42.4390069, -123.3283925, "Grants Pass", "OR", "US");
        let pending = app.add_cities([&portland, &grants_pass]);

        assert_eq!(app.explicitly_supported_city_slugs, ["portland", "grants-pass"]);
        assert_eq!(
            app.explicitly_supported_city_details,
            ["Portland, OR, US", "Grants Pass, OR, US"]
        );
        assert_eq!(pending.len(), 2);
        let row = pending[1].clone().into_location(LocationKey(4), app.key);
        assert_eq!(row.city_slug, "grants-pass");
        assert_eq!(row.app, AppKey(1));
    }

    #[rstest]
    fn location_list_puts_cities_before_countries(mut app: TransitApp) {
        app.add_countries(["DE"]);
        let _ = app.add_city(&CityInfo::new(0.0, 0.0, "Berlin", "Berlin", "DE"));
        assert_eq!(app.supported_location_list(), ["Berlin, Berlin, DE", "DE"]);

        app.clear_explicit_locations();
        assert!(app.supported_location_list().is_empty());
        assert!(app.explicitly_supported_city_slugs.is_empty());
    }

    #[rstest]
    fn removing_an_agency_drops_one_occurrence(mut app: TransitApp) {
        app.add_explicit_agencies([AgencyKey(1), AgencyKey(2), AgencyKey(1)]);
        assert!(app.remove_explicit_agency(AgencyKey(1)));
        assert_eq!(app.explicitly_supported_agency_keys, [AgencyKey(2), AgencyKey(1)]);
        assert!(!app.remove_explicit_agency(AgencyKey(7)));
    }

    #[rstest]
    fn extra_tags_skip_generated_labels(mut app: TransitApp) {
        app.tags = vec!["bikes".into(), "Biking".into(), "iPhone App".into()];
        assert_eq!(app.extra_tags().collect::<Vec<_>>(), ["bikes"]);
    }

    #[rstest]
    fn renaming_updates_the_slug(mut app: TransitApp) {
        app.set_title("Bike Portland Pro");
        assert_eq!(app.slug, "bike-portland-pro");
    }
}
