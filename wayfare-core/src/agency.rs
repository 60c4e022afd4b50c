//! Transit agencies: the data providers apps are matched against.

use chrono::{DateTime, Utc};
use geo::Coord;
use serde::{Deserialize, Serialize};

use crate::{AgencyKey, Keyed, slugify};

/// A transit data provider with a location and a public/private status.
///
/// An agency is public once its feed has been opened, which an external
/// feed-sync process records in [`Agency::date_opened`].
///
/// # Examples
/// ```
/// use chrono::{TimeZone, Utc};
/// use wayfare_core::{Agency, AgencyKey};
///
/// let agency = Agency::new(AgencyKey(1), "King County Metro", "Seattle", "WA", "us", 47.6062, -122.3321);
/// assert!(!agency.is_public());
/// assert_eq!(agency.url_slug(), "us/wa/seattle/king-county-metro");
///
/// let opened = agency.with_date_opened(Utc.with_ymd_and_hms(2009, 6, 1, 0, 0, 0).unwrap());
/// assert!(opened.is_public());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agency {
    /// Identity.
    pub key: AgencyKey,
    /// Display name.
    pub name: String,
    /// Abbreviated name, if any.
    pub short_name: Option<String>,
    /// City the agency is based in.
    pub city: String,
    /// State or province.
    pub state: String,
    /// Country, as imported (lowercase codes are common).
    pub country: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Agency home page.
    pub agency_url: Option<String>,
    /// Link to a real-time arrival feed.
    pub arrival_data: Option<String>,
    /// Link to a real-time vehicle position feed.
    pub position_data: Option<String>,
    /// When the agency's schedule data became public.
    pub date_opened: Option<DateTime<Utc>>,
}

impl Agency {
    /// Construct a private agency at the given point.
    pub fn new(
        key: AgencyKey,
        name: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
        country: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            key,
            name: name.into(),
            short_name: None,
            city: city.into(),
            state: state.into(),
            country: country.into(),
            latitude,
            longitude,
            agency_url: None,
            arrival_data: None,
            position_data: None,
            date_opened: None,
        }
    }

    /// Mark the agency's data as opened at `opened`.
    #[must_use]
    pub fn with_date_opened(mut self, opened: DateTime<Utc>) -> Self {
        self.date_opened = Some(opened);
        self
    }

    /// Whether the agency publishes open schedule data.
    pub fn is_public(&self) -> bool {
        self.date_opened.is_some()
    }

    /// Whether any real-time feed is linked.
    pub fn has_real_time_data(&self) -> bool {
        self.arrival_data.is_some() || self.position_data.is_some()
    }

    /// Agency location (`x = longitude`, `y = latitude`).
    pub fn point(&self) -> Coord<f64> {
        Coord {
            x: self.longitude,
            y: self.latitude,
        }
    }

    /// Slug of the agency name.
    pub fn name_slug(&self) -> String {
        slugify(&self.name)
    }

    /// Slug of the city.
    pub fn city_slug(&self) -> String {
        slugify(&self.city)
    }

    /// Slug of the state.
    pub fn state_slug(&self) -> String {
        slugify(&self.state)
    }

    /// Slug of the country.
    pub fn country_slug(&self) -> String {
        slugify(&self.country)
    }

    /// `country/state/city/name` path used for agency detail pages.
    pub fn url_slug(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.country_slug(),
            self.state_slug(),
            self.city_slug(),
            self.name_slug()
        )
    }
}

impl Keyed for Agency {
    type Key = AgencyKey;

    fn key(&self) -> AgencyKey {
        self.key
    }
}

impl std::fmt::Display for Agency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} in {}, {} ({})",
            self.name, self.city, self.state, self.country
        )
    }
}
