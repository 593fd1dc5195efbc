use bevy::prelude::*;
use bevy_egui::EguiPlugin;
use std::sync::Arc;

use rf_coverage_map::cache::{TileCache, TileMetrics};
use rf_coverage_map::catalog::catalog_source;
use rf_coverage_map::config::AppConfig;
use rf_coverage_map::controller::tasks::{apply_completions, probe_backend};
use rf_coverage_map::controller::{Controller, Services};
use rf_coverage_map::coverage::HttpBackend;
use rf_coverage_map::render::draw_map_overlays;
use rf_coverage_map::render::tiles::{basemap_system, handle_tile_tasks, Basemap, PendingTiles};
use rf_coverage_map::ui::{
    alert_system, hover_tooltip_system, legend_system, map_click_system, map_control_system,
    setup_camera, ui_panel_system, MapNavigation,
};

fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    let client = config.http_client()?;
    let tile_client = config.tile_client()?;

    let services = Services::new(
        Arc::from(catalog_source(&config.sites_base, client.clone())),
        Arc::new(HttpBackend::new(client, config.backend_url.clone())),
    );
    let controller = Controller::new(config.regions.clone(), config.resolution, config.radius_km);

    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "RF Coverage Map".into(),
                ..default()
            }),
            ..default()
        }))
        .add_plugins(EguiPlugin)
        .insert_resource(config)
        .insert_resource(controller)
        .insert_resource(services)
        .insert_resource(Basemap::new(tile_client))
        .init_resource::<TileCache>()
        .init_resource::<TileMetrics>()
        .init_resource::<PendingTiles>()
        .init_resource::<MapNavigation>()
        .add_systems(Startup, (setup_camera, probe_backend))
        .add_systems(Update, (
            map_control_system,
            ui_panel_system,
            alert_system,
            legend_system,
            hover_tooltip_system,
            map_click_system,
            apply_completions,
            // Sprites spawned by the fetch handler must be visible to the
            // next basemap pass.
            (basemap_system, handle_tile_tasks).chain(),
            draw_map_overlays,
        ))
        .run();

    Ok(())
}
