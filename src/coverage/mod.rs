use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::LatLon;

#[derive(Debug, Error)]
pub enum CoverageError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} responded with {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("unexpected response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Urban,
    Suburban,
    Rural,
}

impl Environment {
    pub const ALL: [Environment; 3] = [Environment::Urban, Environment::Suburban, Environment::Rural];

    pub fn label(&self) -> &'static str {
        match self {
            Environment::Urban => "Urban",
            Environment::Suburban => "Suburban",
            Environment::Rural => "Rural",
        }
    }
}

/// Antenna model sent to the prediction service. Serialized as the `model`
/// object of the request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntennaParams {
    pub azimuth: f64,        // degrees, 0 = north
    pub beamwidth: f64,      // degrees
    pub downtilt: f64,       // degrees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mechanical_tilt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub electrical_tilt: Option<f64>,
    pub antenna_height: f64, // meters AGL
    pub frequency: f64,      // MHz
    pub environment: Environment,
}

impl Default for AntennaParams {
    fn default() -> Self {
        Self {
            azimuth: 0.0,
            beamwidth: 65.0,
            downtilt: 6.0,
            mechanical_tilt: None,
            electrical_tilt: None,
            antenna_height: 30.0,
            frequency: 1800.0,
            environment: Environment::Urban,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SitePosition {
    pub lat: f64,
    pub lng: f64,
}

impl From<LatLon> for SitePosition {
    fn from(loc: LatLon) -> Self {
        Self {
            lat: loc.latitude,
            lng: loc.longitude,
        }
    }
}

/// Body of `POST /propagation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageRequest {
    pub site: SitePosition,
    pub model: AntennaParams,
    pub resolution: u32,
    pub radius: f64, // km
}

impl CoverageRequest {
    /// Requests can only be built from an already validated site location.
    pub fn new(site: LatLon, model: AntennaParams, resolution: u32, radius_km: f64) -> Self {
        Self {
            site: site.into(),
            model,
            resolution,
            radius: radius_km,
        }
    }
}

/// One predicted point; `rsrp` in dBm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageSample {
    pub lat: f64,
    pub lng: f64,
    pub rsrp: f64,
}

impl CoverageSample {
    pub fn location(&self) -> LatLon {
        LatLon::new(self.lat, self.lng)
    }
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    message: String,
}

/// The remote prediction service.
pub trait CoverageBackend: Send + Sync {
    fn predict(&self, request: &CoverageRequest) -> Result<Vec<CoverageSample>, CoverageError>;

    /// Greeting of the service root, used as a liveness probe.
    fn status(&self) -> Result<String, CoverageError>;
}

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Body of a successful response, decoded as `T`.
    fn read_json<T: DeserializeOwned>(
        url: &str,
        sent: reqwest::Result<reqwest::blocking::Response>,
    ) -> Result<T, CoverageError> {
        let transport = |source| CoverageError::Transport {
            url: url.to_string(),
            source,
        };
        let response = sent.map_err(transport)?;
        if !response.status().is_success() {
            return Err(CoverageError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }
        let body = response.bytes().map_err(transport)?;
        serde_json::from_slice(&body).map_err(|source| CoverageError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

impl CoverageBackend for HttpBackend {
    fn predict(&self, request: &CoverageRequest) -> Result<Vec<CoverageSample>, CoverageError> {
        let url = self.endpoint("propagation");
        Self::read_json(&url, self.client.post(&url).json(request).send())
    }

    fn status(&self) -> Result<String, CoverageError> {
        let url = self.endpoint("");
        Self::read_json::<StatusResponse>(&url, self.client.get(&url).send()).map(|s| s.message)
    }
}
