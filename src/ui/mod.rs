use bevy::input::mouse::{MouseMotion, MouseWheel};
use bevy::prelude::*;
use bevy::window::PrimaryWindow;
use bevy_egui::{egui, EguiContexts};

use crate::cache::{TileCache, TileMetrics};
use crate::config::{AppConfig, MAX_RADIUS_KM, MIN_RADIUS_KM};
use crate::controller::tasks::spawn_effect;
use crate::controller::{Controller, Services};
use crate::coverage::Environment;
use crate::geo::{haversine_distance, initial_bearing};
use crate::render::tiles::{scale_for_zoom, Basemap, BasemapProvider, MAX_ZOOM};
use crate::render::{band_counts, world_position, world_to_latlon};

// Meters per pixel.
const MIN_SCALE: f32 = 0.15;
const MAX_SCALE: f32 = 80_000.0;

const CLICK_SLOP_PX: f32 = 4.0;
const HOVER_RADIUS_PX: f32 = 8.0;

#[derive(Resource)]
pub struct MapNavigation {
    pub pan_speed: f32, // screen pixels per second
    pub zoom_sensitivity: f32,
}

impl Default for MapNavigation {
    fn default() -> Self {
        Self {
            pan_speed: 600.0,
            zoom_sensitivity: 0.1,
        }
    }
}

pub fn setup_camera(mut commands: Commands, config: Res<AppConfig>) {
    let center = world_position(config.map_center);
    commands.spawn((
        Camera2d,
        OrthographicProjection {
            scale: scale_for_zoom(config.map_zoom.min(MAX_ZOOM)),
            ..OrthographicProjection::default_2d()
        },
        Transform::from_xyz(center.x, center.y, 0.0),
    ));
}

pub fn map_control_system(
    nav: Res<MapNavigation>,
    keyboard: Res<ButtonInput<KeyCode>>,
    mouse_button: Res<ButtonInput<MouseButton>>,
    mut mouse_motion: EventReader<MouseMotion>,
    mut scroll_evr: EventReader<MouseWheel>,
    time: Res<Time>,
    mut cameras: Query<
        (&mut Transform, &mut OrthographicProjection, &GlobalTransform, &Camera),
        With<Camera2d>,
    >,
    windows: Query<&Window, With<PrimaryWindow>>,
    mut contexts: EguiContexts,
) {
    let Some(ctx) = contexts.try_ctx_mut() else {
        return;
    };
    let pointer_free = !ctx.wants_pointer_input();
    let keyboard_free = !ctx.wants_keyboard_input();

    let Ok((mut transform, mut projection, cam_global, camera)) = cameras.get_single_mut() else {
        return;
    };

    // --- Zoom (Mouse Wheel), anchored on the cursor ---
    let scroll: f32 = scroll_evr.read().map(|ev| ev.y).sum();
    if pointer_free && scroll != 0.0 {
        let factor = (1.0 - scroll * nav.zoom_sensitivity).clamp(0.5, 2.0);
        let new_scale = (projection.scale * factor).clamp(MIN_SCALE, MAX_SCALE);

        let anchor = windows
            .get_single()
            .ok()
            .and_then(|w| w.cursor_position())
            .and_then(|c| camera.viewport_to_world_2d(cam_global, c).ok());
        if let Some(anchor) = anchor {
            let ratio = new_scale / projection.scale;
            let center = transform.translation.truncate();
            let moved = anchor - (anchor - center) * ratio;
            transform.translation.x = moved.x;
            transform.translation.y = moved.y;
        }
        projection.scale = new_scale;
    }

    // --- Pan (Keyboard & Mouse Drag) ---
    let scale = projection.scale;
    let step = nav.pan_speed * time.delta_secs() * scale;
    let mut delta = Vec2::ZERO;

    if keyboard_free {
        if keyboard.pressed(KeyCode::ArrowUp) || keyboard.pressed(KeyCode::KeyW) {
            delta.y += step;
        }
        if keyboard.pressed(KeyCode::ArrowDown) || keyboard.pressed(KeyCode::KeyS) {
            delta.y -= step;
        }
        if keyboard.pressed(KeyCode::ArrowLeft) || keyboard.pressed(KeyCode::KeyA) {
            delta.x -= step;
        }
        if keyboard.pressed(KeyCode::ArrowRight) || keyboard.pressed(KeyCode::KeyD) {
            delta.x += step;
        }
    }

    let dragging = mouse_button.pressed(MouseButton::Left) || mouse_button.pressed(MouseButton::Right);
    if pointer_free && dragging {
        // Screen y grows downwards, world y upwards.
        for ev in mouse_motion.read() {
            delta.x -= ev.delta.x * scale;
            delta.y += ev.delta.y * scale;
        }
    } else {
        mouse_motion.clear();
    }

    transform.translation.x += delta.x;
    transform.translation.y += delta.y;
}

/// A left press and release without dragging is a map click.
pub fn map_click_system(
    mut commands: Commands,
    mut controller: ResMut<Controller>,
    services: Res<Services>,
    mouse_button: Res<ButtonInput<MouseButton>>,
    cameras: Query<(&Camera, &GlobalTransform), With<Camera2d>>,
    windows: Query<&Window, With<PrimaryWindow>>,
    mut contexts: EguiContexts,
    mut pressed_at: Local<Option<Vec2>>,
) {
    let Some(ctx) = contexts.try_ctx_mut() else {
        return;
    };
    let Ok(window) = windows.get_single() else {
        return;
    };
    let cursor = window.cursor_position();

    if mouse_button.just_pressed(MouseButton::Left) {
        *pressed_at = if ctx.wants_pointer_input() { None } else { cursor };
    }
    if !mouse_button.just_released(MouseButton::Left) {
        return;
    }
    let (Some(start), Some(end)) = (pressed_at.take(), cursor) else {
        return;
    };
    // The alert is modal.
    if start.distance(end) > CLICK_SLOP_PX || controller.alert().is_some() {
        return;
    }

    let Ok((camera, cam_global)) = cameras.get_single() else {
        return;
    };
    let Ok(world) = camera.viewport_to_world_2d(cam_global, end) else {
        return;
    };
    let point = world_to_latlon(world);
    if !point.is_valid() {
        return;
    }

    if let Some(effect) = controller.on_map_click(point) {
        spawn_effect(&mut commands, &services, effect);
    }
}

fn optional_degrees(ui: &mut egui::Ui, label: &str, value: &mut Option<f64>) {
    let mut enabled = value.is_some();
    if ui.checkbox(&mut enabled, label).changed() {
        *value = enabled.then_some(0.0);
    }
    if let Some(v) = value {
        ui.add(egui::DragValue::new(v).range(-30.0..=30.0).speed(0.5).suffix("°"));
    } else {
        ui.weak("not sent");
    }
    ui.end_row();
}

pub fn ui_panel_system(
    mut contexts: EguiContexts,
    mut commands: Commands,
    mut controller: ResMut<Controller>,
    services: Res<Services>,
    mut basemap: ResMut<Basemap>,
    metrics: Res<TileMetrics>,
    cache: Res<TileCache>,
) {
    let Some(ctx) = contexts.try_ctx_mut() else {
        return;
    };
    let mut effects = Vec::new();

    egui::SidePanel::left("controls").default_width(290.0).show(ctx, |ui| {
        ui.heading("RF Coverage");
        ui.separator();

        let mut chosen = None;
        egui::ComboBox::from_label("Region")
            .selected_text(controller.region().unwrap_or("Select a region").to_string())
            .show_ui(ui, |ui| {
                for region in controller.regions() {
                    let selected = controller.region() == Some(region.as_str());
                    if ui.selectable_label(selected, region).clicked() {
                        chosen = Some(region.clone());
                    }
                }
            });
        if let Some(region) = chosen {
            effects.push(controller.select_region(&region));
        }
        if controller.catalog_loading() {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label("Loading sites...");
            });
        } else if controller.region().is_some() {
            ui.label(format!("{} sites loaded", controller.catalog().len()));
        }

        ui.separator();
        ui.heading("Site");
        egui::Grid::new("site_grid").num_columns(2).show(ui, |ui| {
            ui.label("Site ID");
            let response = ui.text_edit_singleline(&mut controller.site.site_id);
            if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                // A failed lookup has already raised the alert.
                if let Ok(loc) = controller.confirm_site_id() {
                    info!("Site moved to {:.5}, {:.5}", loc.latitude, loc.longitude);
                }
            }
            ui.end_row();

            ui.label("Latitude");
            ui.text_edit_singleline(&mut controller.site.latitude);
            ui.end_row();

            ui.label("Longitude");
            ui.text_edit_singleline(&mut controller.site.longitude);
            ui.end_row();
        });

        ui.separator();
        ui.heading("Antenna");
        egui::Grid::new("antenna_grid").num_columns(2).show(ui, |ui| {
            let antenna = &mut controller.antenna;

            ui.label("Azimuth");
            ui.add(egui::DragValue::new(&mut antenna.azimuth).range(0.0..=359.99).speed(1.0).suffix("°"));
            ui.end_row();

            ui.label("Beamwidth");
            ui.add(egui::DragValue::new(&mut antenna.beamwidth).range(1.0..=360.0).speed(1.0).suffix("°"));
            ui.end_row();

            ui.label("Downtilt");
            ui.add(egui::DragValue::new(&mut antenna.downtilt).range(-30.0..=30.0).speed(0.5).suffix("°"));
            ui.end_row();

            optional_degrees(ui, "Mechanical tilt", &mut antenna.mechanical_tilt);
            optional_degrees(ui, "Electrical tilt", &mut antenna.electrical_tilt);

            ui.label("Height");
            ui.add(egui::DragValue::new(&mut antenna.antenna_height).range(1.0..=500.0).speed(1.0).suffix(" m"));
            ui.end_row();

            ui.label("Frequency");
            ui.add(egui::DragValue::new(&mut antenna.frequency).range(100.0..=6000.0).speed(10.0).suffix(" MHz"));
            ui.end_row();

            ui.label("Environment");
            egui::ComboBox::from_id_salt("environment")
                .selected_text(antenna.environment.label())
                .show_ui(ui, |ui| {
                    for env in Environment::ALL {
                        ui.selectable_value(&mut antenna.environment, env, env.label());
                    }
                });
            ui.end_row();

            ui.label("Radius");
            ui.add(egui::DragValue::new(&mut controller.radius_km).range(MIN_RADIUS_KM..=MAX_RADIUS_KM).speed(0.1).suffix(" km"));
            ui.end_row();
        });

        ui.add_space(6.0);
        ui.horizontal(|ui| {
            if ui.button("Calculate").clicked() {
                effects.extend(controller.calculate());
            }
            if controller.coverage_loading() {
                ui.spinner();
            } else {
                ui.label(format!("{} samples", controller.coverage().len()));
            }
        });
        ui.weak("Click the map to aim the antenna and predict.");

        if let (Some(site), Some(target)) = (controller.site_location(), controller.clicked()) {
            ui.label(format!(
                "Target {:.5}, {:.5}: {:.1}° at {:.2} km",
                target.latitude,
                target.longitude,
                initial_bearing(site, target),
                haversine_distance(site, target) / 1000.0
            ));
        }

        ui.separator();
        ui.heading("Basemap");
        egui::ComboBox::from_id_salt("basemap")
            .selected_text(basemap.provider.label())
            .show_ui(ui, |ui| {
                for provider in BasemapProvider::ALL {
                    ui.selectable_value(&mut basemap.provider, provider, provider.label());
                }
            });
        ui.small(basemap.provider.attribution());
        ui.label(format!(
            "Tiles fetched: {}, reused: {}, failed: {}",
            metrics.tiles_fetched, metrics.cache_hits, metrics.fetch_failures
        ));
        if !cache.is_empty() {
            ui.weak(format!("{} tiles cached", cache.len()));
        }

        ui.separator();
        match controller.backend_status() {
            None => ui.label("Backend: checking..."),
            Some(Ok(message)) => ui.label(format!("Backend: {message}")),
            Some(Err(err)) => ui.colored_label(egui::Color32::RED, format!("Backend unreachable: {err}")),
        };
    });

    for effect in effects {
        spawn_effect(&mut commands, &services, effect);
    }
}

pub fn legend_system(mut contexts: EguiContexts, controller: Res<Controller>) {
    let Some(ctx) = contexts.try_ctx_mut() else {
        return;
    };
    let counts = band_counts(controller.coverage());

    egui::Window::new("Legend")
        .anchor(egui::Align2::RIGHT_BOTTOM, [-12.0, -12.0])
        .resizable(false)
        .show(ctx, |ui| {
            ui.label("RSRP");
            for (band, count) in counts {
                ui.horizontal(|ui| {
                    let [r, g, b] = band.rgb();
                    let (rect, _) = ui.allocate_exact_size(egui::vec2(14.0, 14.0), egui::Sense::hover());
                    ui.painter().rect_filled(rect, 2.0, egui::Color32::from_rgb(r, g, b));
                    ui.label(format!("{} ({})", band.label(), band.color_name()));
                    if count > 0 {
                        ui.weak(format!("({count})"));
                    }
                });
            }
        });
}

pub fn alert_system(mut contexts: EguiContexts, mut controller: ResMut<Controller>) {
    let Some(ctx) = contexts.try_ctx_mut() else {
        return;
    };
    let Some(message) = controller.alert().map(|a| a.to_string()) else {
        return;
    };

    let mut dismissed = false;
    egui::Window::new("Warning")
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .collapsible(false)
        .resizable(false)
        .show(ctx, |ui| {
            ui.label(message);
            if ui.button("OK").clicked() {
                dismissed = true;
            }
        });
    if dismissed {
        controller.dismiss_alert();
    }
}

/// Tooltip text for the marker under `world`; sites win over samples.
pub fn hover_text(controller: &Controller, world: Vec2, radius: f32) -> Option<String> {
    let site = controller
        .catalog()
        .located()
        .map(|(record, loc)| (world_position(loc).distance(world), record))
        .filter(|(d, _)| *d <= radius)
        .min_by(|a, b| a.0.total_cmp(&b.0));
    if let Some((_, record)) = site {
        return Some(record.site_id.clone());
    }

    controller
        .coverage()
        .iter()
        .map(|s| (world_position(s.location()).distance(world), s))
        .filter(|(d, _)| *d <= radius)
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, s)| format!("{:.1} dBm", s.rsrp))
}

pub fn hover_tooltip_system(
    mut contexts: EguiContexts,
    controller: Res<Controller>,
    cameras: Query<(&Camera, &GlobalTransform, &OrthographicProjection), With<Camera2d>>,
    windows: Query<&Window, With<PrimaryWindow>>,
) {
    let Some(ctx) = contexts.try_ctx_mut() else {
        return;
    };
    if ctx.wants_pointer_input() {
        return;
    }
    let Some(cursor) = windows.get_single().ok().and_then(|w| w.cursor_position()) else {
        return;
    };
    let Ok((camera, cam_global, projection)) = cameras.get_single() else {
        return;
    };
    let Ok(world) = camera.viewport_to_world_2d(cam_global, cursor) else {
        return;
    };
    let Some(text) = hover_text(&controller, world, HOVER_RADIUS_PX * projection.scale) else {
        return;
    };

    egui::Area::new(egui::Id::new("map_hover"))
        .order(egui::Order::Tooltip)
        .fixed_pos(egui::pos2(cursor.x + 12.0, cursor.y + 12.0))
        .interactable(false)
        .show(ctx, |ui| {
            egui::Frame::popup(ui.style()).show(ui, |ui| {
                ui.label(text);
            });
        });
}
