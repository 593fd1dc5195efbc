pub mod tiles;

use bevy::math::Isometry2d;
use bevy::prelude::*;
use itertools::Itertools;

use crate::controller::Controller;
use crate::coverage::CoverageSample;
use crate::geo::{latlon_to_webmercator, webmercator_to_latlon, LatLon, WebMercator};

/// Signal-strength classes, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalBand {
    Excellent, // blue
    Good,      // green
    Fair,      // lime
    Poor,      // yellow
    Weak,      // red
}

impl SignalBand {
    /// Evaluation order for [`SignalBand::for_rsrp`].
    pub const ALL: [SignalBand; 5] = [
        SignalBand::Excellent,
        SignalBand::Good,
        SignalBand::Fair,
        SignalBand::Poor,
        SignalBand::Weak,
    ];

    /// Inclusive lower bound in dBm; the last band catches everything else.
    pub fn threshold(&self) -> Option<f64> {
        match self {
            SignalBand::Excellent => Some(-95.0),
            SignalBand::Good => Some(-100.0),
            SignalBand::Fair => Some(-105.0),
            SignalBand::Poor => Some(-110.0),
            SignalBand::Weak => None,
        }
    }

    /// First band, strongest first, whose threshold `rsrp` reaches. NaN
    /// reaches none and lands in [`SignalBand::Weak`].
    pub fn for_rsrp(rsrp: f64) -> Self {
        Self::ALL
            .into_iter()
            .find(|band| band.threshold().is_none_or(|t| rsrp >= t))
            .unwrap_or(SignalBand::Weak)
    }

    pub fn color_name(&self) -> &'static str {
        match self {
            SignalBand::Excellent => "blue",
            SignalBand::Good => "green",
            SignalBand::Fair => "lime",
            SignalBand::Poor => "yellow",
            SignalBand::Weak => "red",
        }
    }

    /// CSS named colors.
    pub fn rgb(&self) -> [u8; 3] {
        match self {
            SignalBand::Excellent => [0, 0, 255],
            SignalBand::Good => [0, 128, 0],
            SignalBand::Fair => [0, 255, 0],
            SignalBand::Poor => [255, 255, 0],
            SignalBand::Weak => [255, 0, 0],
        }
    }

    pub fn color(&self) -> Color {
        let [r, g, b] = self.rgb();
        Color::srgb_u8(r, g, b)
    }

    pub fn label(&self) -> String {
        match self.threshold() {
            Some(t) => format!(">= {t:.0} dBm"),
            None => "< -110 dBm".to_string(),
        }
    }
}

/// Number of samples per band, in legend order.
pub fn band_counts(samples: &[CoverageSample]) -> Vec<(SignalBand, usize)> {
    let counts = samples
        .iter()
        .map(|s| SignalBand::for_rsrp(s.rsrp))
        .counts();
    SignalBand::ALL
        .into_iter()
        .map(|band| (band, counts.get(&band).copied().unwrap_or(0)))
        .collect()
}

/// Map world space is Web Mercator meters.
pub fn world_position(loc: LatLon) -> Vec2 {
    let m = latlon_to_webmercator(loc);
    Vec2::new(m.x as f32, m.y as f32)
}

pub fn world_to_latlon(pos: Vec2) -> LatLon {
    webmercator_to_latlon(WebMercator {
        x: pos.x as f64,
        y: pos.y as f64,
    })
}

// Marker radii in screen pixels.
const CATALOG_MARKER_PX: f32 = 6.0;
const SITE_MARKER_PX: f32 = 9.0;
const TARGET_MARKER_PX: f32 = 5.0;
const SAMPLE_MARKER_PX: f32 = 4.0;

pub fn draw_map_overlays(
    mut gizmos: Gizmos,
    controller: Res<Controller>,
    cameras: Query<&OrthographicProjection, With<Camera2d>>,
) {
    let Ok(projection) = cameras.get_single() else {
        return;
    };
    // Keep markers a constant size on screen.
    let px = projection.scale;

    for sample in controller.coverage() {
        let pos = world_position(sample.location());
        let color = SignalBand::for_rsrp(sample.rsrp).color();
        for ring in [1.0, 0.66, 0.33] {
            gizmos.circle_2d(Isometry2d::from_translation(pos), SAMPLE_MARKER_PX * ring * px, color);
        }
    }

    let catalog_color = Color::srgb(0.2, 0.2, 0.2);
    for (_, loc) in controller.catalog().located() {
        let pos = world_position(loc);
        gizmos
            .circle_2d(Isometry2d::from_translation(pos), CATALOG_MARKER_PX * px, catalog_color)
            .resolution(16);
    }

    let Some(site) = controller.site_location() else {
        return;
    };
    let site_pos = world_position(site);
    let site_color = Color::srgb(0.85, 0.1, 0.1);
    gizmos
        .circle_2d(Isometry2d::from_translation(site_pos), SITE_MARKER_PX * px, site_color)
        .resolution(32);

    if let Some(target) = controller.clicked() {
        let target_pos = world_position(target);
        let line_color = Color::srgb(0.1, 0.1, 0.8);
        gizmos.line_2d(site_pos, target_pos, line_color);
        gizmos.circle_2d(Isometry2d::from_translation(target_pos), TARGET_MARKER_PX * px, line_color);
    }
}
