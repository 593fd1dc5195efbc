//! Interaction state. Every user action is one transition method on
//! [`Controller`]; transitions that need the network return an [`Effect`]
//! for [`tasks`] to run, and the outcome comes back as a [`Completion`].

pub mod tasks;

use std::sync::Arc;

use bevy::prelude::{info, warn, Resource};
use thiserror::Error;

use crate::catalog::{Catalog, CatalogError, CatalogSource};
use crate::coverage::{AntennaParams, CoverageBackend, CoverageError, CoverageRequest, CoverageSample};
use crate::geo::{initial_bearing, LatLon};

/// Problems reported to the user in a blocking alert.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Please enter the site latitude and longitude.")]
    MissingCoordinates,
    #[error("Latitude must be a number between -90 and 90, got {0:?}.")]
    InvalidLatitude(String),
    #[error("Longitude must be a number between -180 and 180, got {0:?}.")]
    InvalidLongitude(String),
    #[error("Set the site location before picking a target on the map.")]
    SiteNotSet,
    #[error("Site ID {0:?} was not found in the loaded catalog.")]
    SiteNotFound(String),
    #[error("Site {0:?} has no usable coordinates in the catalog.")]
    SiteWithoutCoordinates(String),
}

/// Site fields as typed by the user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteForm {
    pub site_id: String,
    pub latitude: String,
    pub longitude: String,
}

impl SiteForm {
    pub fn location(&self) -> Result<LatLon, ValidationError> {
        let lat = self.latitude.trim();
        let lon = self.longitude.trim();
        if lat.is_empty() || lon.is_empty() {
            return Err(ValidationError::MissingCoordinates);
        }

        let latitude = lat
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && (-90.0..=90.0).contains(v))
            .ok_or_else(|| ValidationError::InvalidLatitude(lat.to_string()))?;
        let longitude = lon
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && (-180.0..=180.0).contains(v))
            .ok_or_else(|| ValidationError::InvalidLongitude(lon.to_string()))?;

        Ok(LatLon::new(latitude, longitude))
    }

    pub fn set_location(&mut self, loc: LatLon) {
        self.latitude = loc.latitude.to_string();
        self.longitude = loc.longitude.to_string();
    }
}

/// Monotonic tokens; only the latest issued one is current.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestSequence {
    latest: u64,
}

impl RequestSequence {
    pub fn issue(&mut self) -> u64 {
        self.latest += 1;
        self.latest
    }

    pub fn is_current(&self, token: u64) -> bool {
        self.latest != 0 && token == self.latest
    }
}

/// Network work requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    ProbeBackend,
    FetchCatalog { token: u64, region: String },
    RequestCoverage { token: u64, request: CoverageRequest },
}

#[derive(Debug)]
pub enum Completion {
    BackendStatus(Result<String, CoverageError>),
    CatalogLoaded {
        token: u64,
        region: String,
        result: Result<Catalog, CatalogError>,
    },
    CoverageLoaded {
        token: u64,
        result: Result<Vec<CoverageSample>, CoverageError>,
    },
}

/// The network seams effects run against.
#[derive(Resource, Clone)]
pub struct Services {
    pub catalog: Arc<dyn CatalogSource>,
    pub backend: Arc<dyn CoverageBackend>,
}

impl Services {
    pub fn new(catalog: Arc<dyn CatalogSource>, backend: Arc<dyn CoverageBackend>) -> Self {
        Self { catalog, backend }
    }
}

/// Run an effect to completion. Blocking; called from a task pool.
pub fn execute(effect: Effect, services: &Services) -> Completion {
    match effect {
        Effect::ProbeBackend => Completion::BackendStatus(services.backend.status()),
        Effect::FetchCatalog { token, region } => {
            let result = services.catalog.load(&region);
            Completion::CatalogLoaded { token, region, result }
        }
        Effect::RequestCoverage { token, request } => Completion::CoverageLoaded {
            token,
            result: services.backend.predict(&request),
        },
    }
}

/// Result of a map click before any request goes out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickOutcome {
    pub azimuth: f64,
    pub clicked: LatLon,
}

#[derive(Resource, Debug)]
pub struct Controller {
    // Edited directly by the form.
    pub site: SiteForm,
    pub antenna: AntennaParams,
    pub radius_km: f64,

    regions: Vec<String>,
    region: Option<String>,
    resolution: u32,
    catalog: Catalog,
    catalog_loading: bool,
    coverage: Vec<CoverageSample>,
    coverage_loading: bool,
    clicked: Option<LatLon>,
    alert: Option<ValidationError>,
    backend_status: Option<Result<String, String>>,
    catalog_seq: RequestSequence,
    coverage_seq: RequestSequence,
}

impl Controller {
    pub fn new(regions: Vec<String>, resolution: u32, radius_km: f64) -> Self {
        Self {
            site: SiteForm::default(),
            antenna: AntennaParams::default(),
            radius_km,
            regions,
            region: None,
            resolution,
            catalog: Catalog::default(),
            catalog_loading: false,
            coverage: Vec::new(),
            coverage_loading: false,
            clicked: None,
            alert: None,
            backend_status: None,
            catalog_seq: RequestSequence::default(),
            coverage_seq: RequestSequence::default(),
        }
    }

    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn catalog_loading(&self) -> bool {
        self.catalog_loading
    }

    pub fn coverage(&self) -> &[CoverageSample] {
        &self.coverage
    }

    pub fn coverage_loading(&self) -> bool {
        self.coverage_loading
    }

    pub fn clicked(&self) -> Option<LatLon> {
        self.clicked
    }

    pub fn alert(&self) -> Option<&ValidationError> {
        self.alert.as_ref()
    }

    /// `Ok(message)` from the backend root, or the error text.
    pub fn backend_status(&self) -> Option<&Result<String, String>> {
        self.backend_status.as_ref()
    }

    /// Site location if the form currently holds valid coordinates.
    pub fn site_location(&self) -> Option<LatLon> {
        self.site.location().ok()
    }

    fn raise(&mut self, err: ValidationError) -> ValidationError {
        warn!("{err}");
        self.alert = Some(err.clone());
        err
    }

    pub fn dismiss_alert(&mut self) {
        self.alert = None;
    }

    pub fn probe_backend(&self) -> Effect {
        Effect::ProbeBackend
    }

    /// Switch region: drop the old catalog right away and fetch the new one.
    pub fn select_region(&mut self, region: &str) -> Effect {
        self.region = Some(region.to_string());
        self.catalog.clear();
        self.catalog_loading = true;
        let token = self.catalog_seq.issue();
        info!("Loading site catalog for region {region:?}");
        Effect::FetchCatalog {
            token,
            region: region.to_string(),
        }
    }

    /// Look up the typed site ID and move the site there.
    pub fn confirm_site_id(&mut self) -> Result<LatLon, ValidationError> {
        let site_id = self.site.site_id.trim().to_string();
        match self.catalog.find(&site_id).map(|record| record.location) {
            Some(Some(loc)) => {
                self.site.set_location(loc);
                Ok(loc)
            }
            Some(None) => Err(self.raise(ValidationError::SiteWithoutCoordinates(site_id))),
            None => Err(self.raise(ValidationError::SiteNotFound(site_id))),
        }
    }

    /// Aim the antenna at `point`. Only beamwidth and tilt stay as they were.
    pub fn map_click(&mut self, point: LatLon) -> Result<ClickOutcome, ValidationError> {
        let Some(site) = self.site_location() else {
            return Err(self.raise(ValidationError::SiteNotSet));
        };
        let azimuth = initial_bearing(site, point);
        self.clicked = Some(point);
        self.antenna.azimuth = azimuth;
        Ok(ClickOutcome {
            azimuth,
            clicked: point,
        })
    }

    /// Build a prediction request from the current form. Invalid site
    /// coordinates raise an alert and produce no effect.
    pub fn request_coverage(&mut self) -> Option<Effect> {
        let site = match self.site.location() {
            Ok(site) => site,
            Err(err) => {
                self.raise(err);
                return None;
            }
        };

        let request = CoverageRequest::new(site, self.antenna.clone(), self.resolution, self.radius_km);
        self.coverage.clear();
        self.coverage_loading = true;
        let token = self.coverage_seq.issue();
        info!(
            "Requesting coverage at ({:.5}, {:.5}), azimuth {:.1}, radius {} km",
            site.latitude, site.longitude, request.model.azimuth, request.radius
        );
        Some(Effect::RequestCoverage { token, request })
    }

    /// Map click followed by a request carrying the new azimuth.
    pub fn on_map_click(&mut self, point: LatLon) -> Option<Effect> {
        self.map_click(point).ok()?;
        self.request_coverage()
    }

    /// "Calculate" button: request with the form as it is.
    pub fn calculate(&mut self) -> Option<Effect> {
        self.request_coverage()
    }

    /// Apply a finished effect. Returns `false` when it was stale and dropped.
    pub fn complete(&mut self, completion: Completion) -> bool {
        match completion {
            Completion::BackendStatus(result) => {
                match &result {
                    Ok(message) => info!("Backend says: {message}"),
                    Err(err) => warn!("Backend unreachable: {err}"),
                }
                self.backend_status = Some(result.map_err(|e| e.to_string()));
                true
            }
            Completion::CatalogLoaded { token, region, result } => {
                if !self.catalog_seq.is_current(token) {
                    info!("Dropping stale catalog for {region:?}");
                    return false;
                }
                self.catalog_loading = false;
                match result {
                    Ok(catalog) => {
                        info!("Loaded {} sites for {region:?}", catalog.len());
                        self.catalog = catalog;
                    }
                    Err(err) => {
                        warn!("Site catalog for {region:?} unavailable: {err}");
                        self.catalog.clear();
                    }
                }
                true
            }
            Completion::CoverageLoaded { token, result } => {
                if !self.coverage_seq.is_current(token) {
                    info!("Dropping stale coverage response #{token}");
                    return false;
                }
                self.coverage_loading = false;
                match result {
                    Ok(samples) => {
                        info!("Received {} coverage samples", samples.len());
                        self.coverage = samples;
                    }
                    Err(err) => {
                        warn!("Coverage prediction failed: {err}");
                        self.coverage.clear();
                    }
                }
                true
            }
        }
    }
}
