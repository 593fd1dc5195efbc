use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use bevy::prelude::Resource;
use reqwest::blocking::Client;

use crate::geo::LatLon;

pub const BACKEND_URL_VAR: &str = "RF_COVERAGE_BACKEND_URL";
pub const SITES_URL_VAR: &str = "RF_COVERAGE_SITES_URL";
pub const REGIONS_VAR: &str = "RF_COVERAGE_REGIONS";
pub const RESOLUTION_VAR: &str = "RF_COVERAGE_RESOLUTION";
pub const RADIUS_VAR: &str = "RF_COVERAGE_RADIUS_KM";
pub const TIMEOUT_VAR: &str = "RF_COVERAGE_TIMEOUT_SECS";
pub const MAP_LAT_VAR: &str = "RF_COVERAGE_MAP_LAT";
pub const MAP_LON_VAR: &str = "RF_COVERAGE_MAP_LON";
pub const MAP_ZOOM_VAR: &str = "RF_COVERAGE_MAP_ZOOM";

/// Prediction radius bounds, shared with the panel's radius field.
pub const MIN_RADIUS_KM: f64 = 0.1;
pub const MAX_RADIUS_KM: f64 = 100.0;
pub const TILE_TIMEOUT: Duration = Duration::from_secs(15);

const DEFAULT_REGIONS: [&str; 5] = ["Central", "North East", "North West", "South East", "South West"];

/// Start-up settings. Every value can be overridden through an environment
/// variable; see the `*_VAR` constants.
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub backend_url: String,
    /// `http(s)://` base URL or local directory holding `sites_<REGION>.csv`.
    pub sites_base: String,
    pub regions: Vec<String>,
    pub resolution: u32,
    pub radius_km: f64,
    pub timeout: Option<Duration>,
    pub map_center: LatLon,
    pub map_zoom: u8,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8000".to_string(),
            sites_base: "sites".to_string(),
            regions: DEFAULT_REGIONS.iter().map(|r| r.to_string()).collect(),
            resolution: 50,
            radius_km: 5.0,
            timeout: None,
            map_center: LatLon::new(53.5, -1.5),
            map_zoom: 7,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let regions = match get(REGIONS_VAR) {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect(),
            None => defaults.regions,
        };

        let resolution: u32 = parse_or(get(RESOLUTION_VAR), RESOLUTION_VAR, defaults.resolution)?;
        anyhow::ensure!(resolution > 0, "{RESOLUTION_VAR} must be greater than zero");

        let radius_km: f64 = parse_or(get(RADIUS_VAR), RADIUS_VAR, defaults.radius_km)?;
        anyhow::ensure!(
            (MIN_RADIUS_KM..=MAX_RADIUS_KM).contains(&radius_km),
            "{RADIUS_VAR} must be between {MIN_RADIUS_KM} and {MAX_RADIUS_KM} kilometers"
        );

        let timeout = get(TIMEOUT_VAR)
            .map(|v| parse_or(Some(v), TIMEOUT_VAR, 0u64))
            .transpose()?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let map_center = LatLon::new(
            parse_or(get(MAP_LAT_VAR), MAP_LAT_VAR, defaults.map_center.latitude)?,
            parse_or(get(MAP_LON_VAR), MAP_LON_VAR, defaults.map_center.longitude)?,
        );
        anyhow::ensure!(map_center.is_valid(), "initial map center {map_center:?} is out of range");

        Ok(Self {
            backend_url: get(BACKEND_URL_VAR).unwrap_or(defaults.backend_url),
            sites_base: get(SITES_URL_VAR).unwrap_or(defaults.sites_base),
            regions,
            resolution,
            radius_km,
            timeout,
            map_center,
            map_zoom: parse_or(get(MAP_ZOOM_VAR), MAP_ZOOM_VAR, defaults.map_zoom)?,
        })
    }

    /// Blocking client shared by the backend and the catalog.
    pub fn http_client(&self) -> Result<Client> {
        // `None` also lifts reqwest's 30s blocking default.
        Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(self.timeout)
            .build()
            .context("failed to build HTTP client")
    }

    /// Client for basemap tiles. Always bounded, whatever the backend timeout.
    pub fn tile_client(&self) -> Result<Client> {
        Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(TILE_TIMEOUT)
            .build()
            .context("failed to build tile HTTP client")
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => v
            .parse()
            .with_context(|| format!("{key}={v:?} is not a valid value")),
        None => Ok(default),
    }
}
