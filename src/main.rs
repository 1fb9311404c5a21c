mod app;
mod config;
mod download;
mod error;
mod upload;
mod utils;
mod viewer;

use app::ModelUploader;
use config::AppConfig;
use eframe::CreationContext;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), eframe::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env();

    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_inner_size([720.0, 820.0])
            .with_min_inner_size([480.0, 600.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Image to 3D Model",
        options,
        Box::new(move |cc: &CreationContext| Box::new(ModelUploader::new(cc, config))),
    )
}
