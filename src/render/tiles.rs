//! Slippy-map basemap: tile addressing, fetching and the systems that keep the
//! visible tiles spawned as sprites.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use bevy::prelude::*;
use bevy::render::render_asset::RenderAssetUsages;
use bevy::render::render_resource::{Extent3d, TextureDimension, TextureFormat};
use bevy::tasks::{IoTaskPool, Task};
use bevy::window::PrimaryWindow;
use futures_lite::future;
use reqwest::blocking::Client;
use thiserror::Error;

use crate::cache::{TileCache, TileMetrics};
use crate::geo::MERCATOR_HALF_EXTENT;

pub const TILE_PIXELS: f64 = 256.0;
pub const MAX_ZOOM: u8 = 19;
/// How long a failed tile is left blank before it is requested again.
pub const TILE_RETRY_AFTER: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum TileError {
    #[error("tile request {url} failed: {source}")]
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
    #[error("failed to decode tile {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: image::ImageError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BasemapProvider {
    #[default]
    OpenStreetMap,
    CartoPositron,
    OpenTopoMap,
    EsriImagery,
}

impl BasemapProvider {
    pub const ALL: [BasemapProvider; 4] = [
        BasemapProvider::OpenStreetMap,
        BasemapProvider::CartoPositron,
        BasemapProvider::OpenTopoMap,
        BasemapProvider::EsriImagery,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            BasemapProvider::OpenStreetMap => "OpenStreetMap",
            BasemapProvider::CartoPositron => "Carto Positron",
            BasemapProvider::OpenTopoMap => "OpenTopoMap",
            BasemapProvider::EsriImagery => "Esri World Imagery",
        }
    }

    pub fn url_template(&self) -> &'static str {
        match self {
            BasemapProvider::OpenStreetMap => "https://tile.openstreetmap.org/{z}/{x}/{y}.png",
            BasemapProvider::CartoPositron => "https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}.png",
            BasemapProvider::OpenTopoMap => "https://{s}.tile.opentopomap.org/{z}/{x}/{y}.png",
            // Esri addresses tiles row first.
            BasemapProvider::EsriImagery => {
                "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}"
            }
        }
    }

    pub fn attribution(&self) -> &'static str {
        match self {
            BasemapProvider::OpenStreetMap => "© OpenStreetMap contributors",
            BasemapProvider::CartoPositron => "© OpenStreetMap contributors © CARTO",
            BasemapProvider::OpenTopoMap => "© OpenStreetMap contributors, SRTM | © OpenTopoMap",
            BasemapProvider::EsriImagery => "Tiles © Esri",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub provider: BasemapProvider,
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    pub fn url(&self) -> String {
        // {s} subdomain rotation
        let subdomain = ["a", "b", "c"][((self.x + self.y) % 3) as usize];
        self.provider
            .url_template()
            .replace("{s}", subdomain)
            .replace("{z}", &self.z.to_string())
            .replace("{x}", &self.x.to_string())
            .replace("{y}", &self.y.to_string())
    }

    /// Edge length of a tile at zoom `z`, in world meters.
    pub fn world_size(z: u8) -> f64 {
        2.0 * MERCATOR_HALF_EXTENT / f64::from(1u32 << z)
    }

    pub fn world_center(&self) -> Vec2 {
        let size = Self::world_size(self.z);
        let x = -MERCATOR_HALF_EXTENT + (f64::from(self.x) + 0.5) * size;
        let y = MERCATOR_HALF_EXTENT - (f64::from(self.y) + 0.5) * size;
        Vec2::new(x as f32, y as f32)
    }
}

/// Zoom level whose native resolution is closest to `meters_per_pixel`.
pub fn zoom_for_scale(meters_per_pixel: f32) -> u8 {
    let ideal = (2.0 * MERCATOR_HALF_EXTENT / (TILE_PIXELS * f64::from(meters_per_pixel))).log2();
    if !ideal.is_finite() {
        return 0;
    }
    ideal.round().clamp(0.0, f64::from(MAX_ZOOM)) as u8
}

/// Meters per pixel at which tiles of zoom `z` display at native size.
pub fn scale_for_zoom(z: u8) -> f32 {
    (TileKey::world_size(z) / TILE_PIXELS) as f32
}

/// Tiles of `provider` at zoom `z` overlapping the world rectangle
/// `[min, max]`. Rows and columns outside the world are dropped.
pub fn visible_tiles(provider: BasemapProvider, z: u8, min: Vec2, max: Vec2) -> Vec<TileKey> {
    let size = TileKey::world_size(z);
    let last = i64::from((1u32 << z) - 1);
    let column = |x: f32| (((f64::from(x) + MERCATOR_HALF_EXTENT) / size).floor() as i64).clamp(0, last);
    let row = |y: f32| (((MERCATOR_HALF_EXTENT - f64::from(y)) / size).floor() as i64).clamp(0, last);

    let mut keys = Vec::new();
    for y in row(max.y)..=row(min.y) {
        for x in column(min.x)..=column(max.x) {
            keys.push(TileKey {
                provider,
                z,
                x: x as u32,
                y: y as u32,
            });
        }
    }
    keys
}

/// Download and decode one tile into an RGBA texture.
pub fn fetch_tile(client: &Client, key: TileKey) -> Result<Image, TileError> {
    let url = key.url();
    let response = client
        .get(&url)
        .send()
        .map_err(|source| TileError::Transport { url: url.clone(), source })?;
    if !response.status().is_success() {
        return Err(TileError::Status {
            url,
            status: response.status(),
        });
    }
    let bytes = response
        .bytes()
        .map_err(|source| TileError::Transport { url: url.clone(), source })?;
    let rgba = image::load_from_memory(&bytes)
        .map_err(|source| TileError::Decode { url, source })?
        .into_rgba8();
    let (width, height) = rgba.dimensions();

    Ok(Image::new(
        Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        rgba.into_raw(),
        TextureFormat::Rgba8UnormSrgb,
        RenderAssetUsages::RENDER_WORLD | RenderAssetUsages::MAIN_WORLD,
    ))
}

/// Active basemap layer.
#[derive(Resource)]
pub struct Basemap {
    pub provider: BasemapProvider,
    pub zoom: u8,
    client: Client,
}

impl Basemap {
    pub fn new(client: Client) -> Self {
        Self {
            provider: BasemapProvider::default(),
            zoom: 0,
            client,
        }
    }

    fn shows(&self, key: &TileKey) -> bool {
        key.provider == self.provider && key.z == self.zoom
    }
}

/// Tiles in flight, and when recently failed tiles failed.
#[derive(Resource, Default)]
pub struct PendingTiles {
    in_flight: HashSet<TileKey>,
    failed: HashMap<TileKey, Duration>,
    provider: Option<BasemapProvider>,
}

impl PendingTiles {
    /// Whether `key` should be fetched at app time `now`.
    pub fn wants(&self, key: &TileKey, now: Duration) -> bool {
        !self.in_flight.contains(key)
            && self
                .failed
                .get(key)
                .is_none_or(|at| now.saturating_sub(*at) >= TILE_RETRY_AFTER)
    }

    pub fn start(&mut self, key: TileKey) {
        self.failed.remove(&key);
        self.in_flight.insert(key);
    }

    pub fn succeeded(&mut self, key: TileKey) {
        self.in_flight.remove(&key);
    }

    pub fn mark_failed(&mut self, key: TileKey, now: Duration) {
        self.in_flight.remove(&key);
        self.failed.insert(key, now);
    }

    /// Switching provider gives every failed tile a fresh chance.
    pub fn follow_provider(&mut self, provider: BasemapProvider) {
        if self.provider != Some(provider) {
            self.failed.clear();
            self.provider = Some(provider);
        }
    }
}

#[derive(Component)]
pub struct BasemapTile(pub TileKey);

#[derive(Component)]
pub struct TileFetchTask {
    key: TileKey,
    task: Task<Result<Image, TileError>>,
}

const TILE_DEPTH: f32 = -10.0;

fn spawn_tile_sprite(commands: &mut Commands, key: TileKey, image: Handle<Image>) {
    let size = TileKey::world_size(key.z) as f32;
    let center = key.world_center();
    commands.spawn((
        Sprite {
            image,
            custom_size: Some(Vec2::splat(size)),
            ..default()
        },
        Transform::from_xyz(center.x, center.y, TILE_DEPTH),
        BasemapTile(key),
    ));
}

pub fn basemap_system(
    mut commands: Commands,
    mut basemap: ResMut<Basemap>,
    mut cache: ResMut<TileCache>,
    mut pending: ResMut<PendingTiles>,
    mut metrics: ResMut<TileMetrics>,
    time: Res<Time>,
    cameras: Query<(&Transform, &OrthographicProjection), With<Camera2d>>,
    windows: Query<&Window, With<PrimaryWindow>>,
    spawned: Query<(Entity, &BasemapTile)>,
) {
    let Ok((cam_transform, projection)) = cameras.get_single() else {
        return;
    };
    let Ok(window) = windows.get_single() else {
        return;
    };

    basemap.zoom = zoom_for_scale(projection.scale);
    pending.follow_provider(basemap.provider);
    let center = cam_transform.translation.truncate();
    let half = Vec2::new(window.width(), window.height()) * 0.5 * projection.scale;
    let wanted: HashSet<TileKey> = visible_tiles(basemap.provider, basemap.zoom, center - half, center + half)
        .into_iter()
        .collect();

    let mut present = HashSet::new();
    for (entity, tile) in spawned.iter() {
        if wanted.contains(&tile.0) {
            present.insert(tile.0);
        } else {
            commands.entity(entity).despawn();
        }
    }

    let pool = IoTaskPool::get();
    for key in wanted.difference(&present) {
        if let Some(handle) = cache.get(key) {
            metrics.cache_hits += 1;
            spawn_tile_sprite(&mut commands, *key, handle);
            continue;
        }
        if !pending.wants(key, time.elapsed()) {
            continue;
        }

        let key = *key;
        let client = basemap.client.clone();
        let task = pool.spawn(async move { fetch_tile(&client, key) });
        pending.start(key);
        commands.spawn(TileFetchTask { key, task });
    }
}

pub fn handle_tile_tasks(
    mut commands: Commands,
    mut tasks: Query<(Entity, &mut TileFetchTask)>,
    mut images: ResMut<Assets<Image>>,
    mut cache: ResMut<TileCache>,
    mut pending: ResMut<PendingTiles>,
    mut metrics: ResMut<TileMetrics>,
    basemap: Res<Basemap>,
    time: Res<Time>,
) {
    for (entity, mut fetch) in &mut tasks {
        let Some(result) = future::block_on(future::poll_once(&mut fetch.task)) else {
            continue;
        };
        let key = fetch.key;

        match result {
            Ok(image) => {
                pending.succeeded(key);
                metrics.tiles_fetched += 1;
                let handle = images.add(image);
                cache.insert(key, handle.clone());
                if basemap.shows(&key) {
                    spawn_tile_sprite(&mut commands, key, handle);
                }
            }
            Err(err) => {
                metrics.fetch_failures += 1;
                warn!("Basemap tile unavailable: {err}");
                pending.mark_failed(key, time.elapsed());
            }
        }

        commands.entity(entity).despawn();
    }
}
