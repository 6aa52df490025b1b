#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod app;
mod config;
mod history;
mod presenter;
mod protocol;
mod sanitize;
mod server;

use anyhow::Result;
use eframe::egui;

use crate::app::ClaiEmulator;
use crate::config::Config;
use crate::server::ClaiPresenter;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config = Config::load();
    log::info!("using CLAI server at {}", config.address());

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("CLAI Emulator")
            .with_inner_size(config.window_size)
            .with_min_inner_size([480.0, 320.0]),
        ..Default::default()
    };

    eframe::run_native(
        "CLAI Emulator",
        native_options,
        Box::new(move |cc| Box::new(ClaiEmulator::new(cc, Box::new(ClaiPresenter::new(config))))),
    )
    .map_err(|e| anyhow::anyhow!("eframe: {e}"))
}
