// src/main.rs
//! Headless smoke run of the virtual display subsystem.
//!
//! Usage: `vdisplay [OPTIONS]`, where OPTIONS is the display option string
//! (default `geometry=1920x1080+0+0`). `VDISPLAY_CONFIG` may point at a JSON config.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use log::{info, warn};

use vdisplay::{
    BackendRegistry, DisplayConfig, DisplaySetup, HeadlessBackend, Surface, SysfsBacklight,
    EDID_WITH_EXTENSION_SIZE,
};

const DEFAULT_OPTIONS: &str = "geometry=1920x1080+0+0";

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    info!("Starting vdisplay...");

    // --- Configuration ---
    let config = match std::env::var("VDISPLAY_CONFIG") {
        Ok(path) => DisplayConfig::load(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        Err(_) => DisplayConfig::default(),
    };
    let options = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_OPTIONS.to_string());
    info!("Display options: '{}'", options);

    let registry = BackendRegistry::new()
        .with(Arc::new(HeadlessBackend::window().with_geometry(config.geometry.clone())?))
        .with(Arc::new(HeadlessBackend::lease().with_geometry(config.geometry.clone())?));

    let mut setup = DisplaySetup::new(config, registry, Arc::new(SysfsBacklight::default()));
    if let Err(e) = setup.configure(&options) {
        warn!("Display options partially applied: {}", e);
    }

    // --- Bring-up ---
    let display = setup.realize().context("Failed to realize display backends")?;
    let connection = display
        .init(Some(Arc::new(|frame: u32, pipe: u32| {
            log::trace!("vblank: frame {} on pipe {}", frame, pipe);
        })))
        .context("Failed to start display thread")?;
    info!("Connected: {:?}", connection);

    for screen in 0..connection.scanouts {
        let geometry = display.display_info(connection.handle, screen);
        info!("Screen {}: {:?}", screen, geometry);

        let mut edid = [0u8; EDID_WITH_EXTENSION_SIZE];
        display.get_edid(connection.handle, screen, &mut edid);
        info!(
            "Screen {} EDID: {}",
            screen,
            edid.iter().map(|b| format!("{:02x}", b)).collect::<String>()
        );

        let frame = Surface::blank(geometry.width, geometry.height);
        if let Some(done) = display.surface_set(connection.handle, screen, frame.clone()) {
            done.wait_timeout(Duration::from_secs(1));
        }
        if let Some(done) = display.surface_update(connection.handle, screen, frame) {
            info!("Screen {} first frame: {:?}", screen, done.wait_timeout(Duration::from_secs(1)));
        }
    }

    for id in 0..connection.backlights {
        match display.backlight_info(connection.handle, id) {
            Ok(backlight) => info!("Backlight {}: {}", id, serde_json::to_string(&backlight)?),
            Err(e) => warn!("Backlight {}: {}", id, e),
        }
    }

    // --- Teardown ---
    display
        .deinit(connection.handle)
        .context("Failed to stop display thread")?;
    info!("vdisplay finished");
    Ok(())
}
