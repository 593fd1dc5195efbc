use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use itertools::Itertools;
use reqwest::blocking::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::geo::LatLon;

const SITE_ID_COLUMN: &str = "SiteID";
const LATITUDE_COLUMN: &str = "Latitude";
const LONGITUDE_COLUMN: &str = "Longitude";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} responded with {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("failed to open {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed catalog: {0}")]
    Csv(#[from] csv::Error),
    #[error("catalog header has no {0} column")]
    MissingColumn(&'static str),
}

/// One known transmitter site of a region.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteRecord {
    pub site_id: String,
    /// `None` when either coordinate cell is not a number.
    pub location: Option<LatLon>,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(rename = "SiteID", default)]
    site_id: String,
    #[serde(rename = "Latitude", default)]
    latitude: String,
    #[serde(rename = "Longitude", default)]
    longitude: String,
}

impl RawRecord {
    fn into_record(self) -> Option<SiteRecord> {
        if self.site_id.is_empty() {
            return None;
        }
        let location = match (parse_coordinate(&self.latitude), parse_coordinate(&self.longitude)) {
            (Some(latitude), Some(longitude)) => Some(LatLon::new(latitude, longitude)),
            _ => None,
        };
        Some(SiteRecord { site_id: self.site_id, location })
    }
}

fn parse_coordinate(cell: &str) -> Option<f64> {
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    records: Vec<SiteRecord>,
}

impl Catalog {
    pub fn new(records: Vec<SiteRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[SiteRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// First record whose identifier equals `site_id` exactly.
    pub fn find(&self, site_id: &str) -> Option<&SiteRecord> {
        self.records.iter().find(|r| r.site_id == site_id)
    }

    /// Records that can be placed on the map.
    pub fn located(&self) -> impl Iterator<Item = (&SiteRecord, LatLon)> {
        self.records
            .iter()
            .filter_map(|r| r.location.map(|loc| (r, loc)))
    }
}

/// File name of a region's catalog: `"North East"` -> `sites_NORTH_EAST.csv`.
pub fn region_resource_name(region: &str) -> String {
    format!(
        "sites_{}.csv",
        region.split_whitespace().map(str::to_uppercase).join("_")
    )
}

/// Parse a catalog CSV. The header must name the `SiteID`, `Latitude` and
/// `Longitude` columns; other columns are ignored and blank rows skipped.
pub fn parse_catalog<R: Read>(reader: R) -> Result<Catalog, CatalogError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    for column in [SITE_ID_COLUMN, LATITUDE_COLUMN, LONGITUDE_COLUMN] {
        if !headers.iter().any(|h| h == column) {
            return Err(CatalogError::MissingColumn(column));
        }
    }

    let mut records = Vec::new();
    for row in rdr.deserialize::<RawRecord>() {
        if let Some(record) = row?.into_record() {
            records.push(record);
        }
    }
    Ok(Catalog::new(records))
}

/// Where region catalogs come from.
pub trait CatalogSource: Send + Sync {
    fn load(&self, region: &str) -> Result<Catalog, CatalogError>;
}

pub struct HttpCatalogSource {
    client: Client,
    base_url: String,
}

impl HttpCatalogSource {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn url_for(&self, region: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            region_resource_name(region)
        )
    }
}

impl CatalogSource for HttpCatalogSource {
    fn load(&self, region: &str) -> Result<Catalog, CatalogError> {
        let url = self.url_for(region);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|source| CatalogError::Fetch { url: url.clone(), source })?;
        if !response.status().is_success() {
            return Err(CatalogError::Status {
                url,
                status: response.status(),
            });
        }
        parse_catalog(response)
    }
}

/// Catalogs stored as files in a local directory.
pub struct DirCatalogSource {
    root: PathBuf,
}

impl DirCatalogSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, region: &str) -> PathBuf {
        self.root.join(region_resource_name(region))
    }
}

impl CatalogSource for DirCatalogSource {
    fn load(&self, region: &str) -> Result<Catalog, CatalogError> {
        let path = self.path_for(region);
        let file = File::open(&path).map_err(|source| CatalogError::Io { path, source })?;
        parse_catalog(std::io::BufReader::new(file))
    }
}

/// Pick the source matching `base`: an `http(s)://` URL or a directory.
pub fn catalog_source(base: &str, client: Client) -> Box<dyn CatalogSource> {
    if base.starts_with("http://") || base.starts_with("https://") {
        Box::new(HttpCatalogSource::new(client, base))
    } else {
        Box::new(DirCatalogSource::new(base))
    }
}
