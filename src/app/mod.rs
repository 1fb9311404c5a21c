mod controller;
mod preview;
mod state;
mod ui;

use crate::config::AppConfig;
use crate::download::DialogSaveSink;
use crate::error::Result;
use crate::upload::{media_type_for, HttpUploadClient, SelectedFile};
use crate::viewer::{self, ModelViewer, Turntable};
use controller::Controller;
use eframe::{egui, App};
use rfd::FileDialog;
use state::{PreviewSlot, ViewerArea};
use std::io;
use std::path::Path;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;
use tracing::{info, warn};

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "webp", "bmp", "gif"];

/// Buttons the renderer can press; applied after the frame is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UiAction {
    PickFile,
    Clear,
    Upload,
    Download,
    OpenExternally,
}

/// The viewer area as the window sees it: the model loads off the UI thread.
enum ViewerSlot {
    Empty,
    Loading {
        config: ModelViewer,
        rx: Receiver<Turntable>,
    },
    Ready(Turntable),
}

impl ViewerSlot {
    fn config(&self) -> Option<&ModelViewer> {
        match self {
            ViewerSlot::Empty => None,
            ViewerSlot::Loading { config, .. } => Some(config),
            ViewerSlot::Ready(turntable) => Some(turntable.config()),
        }
    }
}

pub struct ModelUploader {
    config: AppConfig,
    controller: Controller,
    preview_texture: Option<(u64, egui::TextureHandle)>,
    viewer: ViewerSlot,
    hovering_files: bool,
}

impl ModelUploader {
    pub fn new(cc: &eframe::CreationContext<'_>, config: AppConfig) -> Self {
        info!("Initializing model uploader against {}", config.endpoint);

        let ctx = cc.egui_ctx.clone();
        let controller = Controller::new(
            Arc::new(HttpUploadClient::new(config.endpoint.clone())),
            Box::new(DialogSaveSink),
            config.download_name.clone(),
        )
        .with_waker(move || ctx.request_repaint());

        Self::with_controller(config, controller)
    }

    fn with_controller(config: AppConfig, controller: Controller) -> Self {
        Self {
            config,
            controller,
            preview_texture: None,
            viewer: ViewerSlot::Empty,
            hovering_files: false,
        }
    }

    pub fn update_state(&mut self, ctx: &egui::Context) {
        if self.controller.poll() {
            ctx.request_repaint();
        }

        let (hovering, dropped) =
            ctx.input(|i| (!i.raw.hovered_files.is_empty(), i.raw.dropped_files.clone()));

        if hovering && !self.hovering_files {
            self.controller.drag_over();
        } else if !hovering && self.hovering_files && dropped.is_empty() {
            self.controller.drag_leave();
        }
        self.hovering_files = hovering;

        if !dropped.is_empty() {
            let files = dropped
                .iter()
                .filter_map(|file| match selected_from_dropped(file) {
                    Ok(selected) => Some(selected),
                    Err(e) => {
                        warn!("Skipping dropped file '{}': {}", file.name, e);
                        None
                    }
                })
                .collect();
            self.controller.drop_files(files);
        }

        self.sync_preview_texture(ctx);
        self.sync_viewer(ctx);
    }

    fn sync_preview_texture(&mut self, ctx: &egui::Context) {
        match &self.controller.ui().preview {
            PreviewSlot::Ready { token, image } => {
                if self.preview_texture.as_ref().map(|(t, _)| *t) != Some(*token) {
                    let color = egui::ColorImage::from_rgba_unmultiplied(image.size, &image.rgba);
                    let texture = ctx.load_texture(
                        format!("preview-{token}"),
                        color,
                        egui::TextureOptions::LINEAR,
                    );
                    self.preview_texture = Some((*token, texture));
                }
            }
            _ => self.preview_texture = None,
        }
    }

    fn sync_viewer(&mut self, ctx: &egui::Context) {
        let ViewerArea::Model(config) = &self.controller.ui().viewer else {
            self.viewer = ViewerSlot::Empty;
            return;
        };
        if self.viewer.config() != Some(config) {
            let ctx = ctx.clone();
            let rx = viewer::spawn_load(config.clone(), move || ctx.request_repaint());
            self.viewer = ViewerSlot::Loading {
                config: config.clone(),
                rx,
            };
        }

        let loaded = match &self.viewer {
            ViewerSlot::Loading { config, rx } => match rx.try_recv() {
                Ok(turntable) => Some(turntable),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => {
                    warn!("Model loader stopped without a result");
                    Some(Turntable::placeholder(config.clone()))
                }
            },
            _ => None,
        };
        if let Some(turntable) = loaded {
            self.viewer = ViewerSlot::Ready(turntable);
        }
    }

    fn apply(&mut self, action: UiAction) {
        match action {
            UiAction::PickFile => {
                let Some(path) = FileDialog::new()
                    .add_filter("Images", &IMAGE_EXTENSIONS)
                    .pick_file()
                else {
                    return;
                };
                match SelectedFile::from_path(&path) {
                    Ok(file) => self.controller.select(file),
                    Err(e) => self
                        .controller
                        .report_error(format!("❌ Could not read {}: {}", path.display(), e)),
                }
            }
            UiAction::Clear => self.controller.clear(),
            UiAction::Upload => self.controller.upload(),
            UiAction::Download => self.controller.download(),
            UiAction::OpenExternally => {
                let ViewerArea::Model(config) = &self.controller.ui().viewer else {
                    return;
                };
                let source = config.source.clone();
                if let Err(e) = viewer::open_externally(&source) {
                    self.controller
                        .report_error(format!("❌ Could not open the model: {}", e));
                }
            }
        }
    }
}

fn selected_from_dropped(file: &egui::DroppedFile) -> Result<SelectedFile> {
    if let Some(bytes) = &file.bytes {
        return Ok(SelectedFile::new(
            file.name.clone(),
            media_type_for(Path::new(&file.name)),
            bytes.to_vec(),
        ));
    }
    match &file.path {
        Some(path) => SelectedFile::from_path(path),
        None => Err(io::Error::new(
            io::ErrorKind::NotFound,
            "dropped file has neither a path nor contents",
        )
        .into()),
    }
}

impl App for ModelUploader {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.update_state(ctx);
        for action in self.render(ctx) {
            self.apply(action);
        }
    }
}
