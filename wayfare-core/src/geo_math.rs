//! Flat-earth bounding boxes for city-scale proximity queries.
//!
//! A query point and a box side length in miles become an axis-aligned
//! latitude/longitude rectangle. Latitudinal degrees use a fixed sea-level
//! width; longitudinal degrees narrow with `cos(latitude)` on a spherical
//! earth. The approximation is only meant for radii of tens of miles.

use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};

/// Metres in one statute mile.
pub const METERS_PER_MILE: f64 = 1609.344;
/// Width of one latitudinal degree at sea level, in metres.
pub const LATITUDINAL_DEGREE_METERS: f64 = 110_900.0;
/// Equatorial earth radius used for longitudinal degree widths, in metres.
pub const EARTH_RADIUS_METERS: f64 = 6_378_137.0;

/// Convert miles to metres.
pub fn miles_to_meters(miles: f64) -> f64 {
    miles * METERS_PER_MILE
}

/// Convert metres to miles.
pub fn meters_to_miles(meters: f64) -> f64 {
    meters / METERS_PER_MILE
}

/// Width of one longitudinal degree at `latitude`, in metres.
pub fn longitudinal_degree_meters(latitude: f64) -> f64 {
    latitude.to_radians().cos() * std::f64::consts::PI / 180.0 * EARTH_RADIUS_METERS
}

/// Axis-aligned box in degrees, with `north >= south` and `east >= west`
/// for boxes built by [`square_bounding_box_centered_at`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Northern latitude bound.
    pub north: f64,
    /// Southern latitude bound.
    pub south: f64,
    /// Eastern longitude bound.
    pub east: f64,
    /// Western longitude bound.
    pub west: f64,
}

impl BoundingBox {
    /// Whether the point lies inside the box, boundaries included.
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.south..=self.north).contains(&latitude)
            && (self.west..=self.east).contains(&longitude)
    }

    /// Convert to a `geo` rectangle (`x = longitude`, `y = latitude`).
    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.west,
                y: self.south,
            },
            Coord {
                x: self.east,
                y: self.north,
            },
        )
    }

    /// Latitude span in degrees.
    pub fn height_degrees(&self) -> f64 {
        self.north - self.south
    }
}

/// Build a square box of `side_miles` centred on the point.
///
/// Boxes that cross a pole or the antimeridian are not wrapped; callers
/// searching near those regions see clipped results.
///
/// # Examples
/// ```
/// use wayfare_core::{square_bounding_box_centered_at, LATITUDINAL_DEGREE_METERS, METERS_PER_MILE};
///
/// let bbox = square_bounding_box_centered_at(39.952335, -75.163789, 50.0);
/// assert!(bbox.contains(39.952335, -75.163789));
/// let expected = 50.0 * METERS_PER_MILE / LATITUDINAL_DEGREE_METERS;
/// assert!((bbox.height_degrees() - expected).abs() < 1e-9);
/// ```
pub fn square_bounding_box_centered_at(
    latitude: f64,
    longitude: f64,
    side_miles: f64,
) -> BoundingBox {
    let side_meters = miles_to_meters(side_miles);
    let lat_half = side_meters / LATITUDINAL_DEGREE_METERS / 2.0;
    let lon_half = side_meters / longitudinal_degree_meters(latitude) / 2.0;
    BoundingBox {
        north: latitude + lat_half,
        south: latitude - lat_half,
        east: longitude + lon_half,
        west: longitude - lon_half,
    }
}

/// Whether a coordinate pair is within the valid degree ranges.
///
/// `NaN` in either component is invalid.
pub fn is_valid_lat_lon(latitude: f64, longitude: f64) -> bool {
    latitude.abs() <= 90.0 && longitude.abs() <= 180.0
}
