use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS: f64 = 6378137.0;

/// Half the width of the Web Mercator plane, in meters.
pub const MERCATOR_HALF_EXTENT: f64 = PI * EARTH_RADIUS;

/// Web Mercator stops being defined at the poles; Leaflet and the tile
/// providers clip here.
pub const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatLon {
    pub latitude: f64,
    pub longitude: f64,
}

impl LatLon {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Both components finite and inside the WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WebMercator {
    pub x: f64,
    pub y: f64,
}

/// Convert Lat/Lon (WGS84) to Web Mercator (EPSG:3857)
/// Latitude is clamped to the Mercator limit so the poles stay finite.
pub fn latlon_to_webmercator(coord: LatLon) -> WebMercator {
    let latitude = coord.latitude.clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT);
    let x = coord.longitude * (PI / 180.0) * EARTH_RADIUS;
    let y = ((latitude * PI / 360.0 + PI / 4.0).tan()).ln() * EARTH_RADIUS;
    WebMercator { x, y }
}

/// Convert Web Mercator (EPSG:3857) to Lat/Lon (WGS84)
pub fn webmercator_to_latlon(coord: WebMercator) -> LatLon {
    let longitude = (coord.x / EARTH_RADIUS) * (180.0 / PI);
    let latitude = (2.0 * (coord.y / EARTH_RADIUS).exp().atan() - PI / 2.0) * (180.0 / PI);
    LatLon { latitude, longitude }
}

/// Initial compass bearing from `origin` to `destination`, in degrees within
/// `[0, 360)`.
///
/// Coincident points have no defined bearing; they yield `0.0` instead of
/// NaN, as does any non-finite input.
pub fn initial_bearing(origin: LatLon, destination: LatLon) -> f64 {
    if origin == destination {
        return 0.0;
    }

    let lat1 = origin.latitude.to_radians();
    let lat2 = destination.latitude.to_radians();
    let dlon = (destination.longitude - origin.longitude).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    let degrees = y.atan2(x).to_degrees();
    if !degrees.is_finite() {
        return 0.0;
    }

    ((degrees % 360.0) + 360.0) % 360.0
}

/// Great-circle distance in meters (haversine).
pub fn haversine_distance(p1: LatLon, p2: LatLon) -> f64 {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let dlat = (p2.latitude - p1.latitude).to_radians();
    let dlon = (p2.longitude - p1.longitude).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS * c
}
