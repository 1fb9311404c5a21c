use super::state::{PreviewSlot, UiState};
use super::{ModelUploader, UiAction, ViewerSlot, IMAGE_EXTENSIONS};
use crate::utils::file_size::FileSizeUtils;
use eframe::egui::{self, Align, Color32, RichText, Stroke};

const ACCENT: Color32 = Color32::from_rgb(161, 89, 225);
const ERROR_RED: Color32 = Color32::from_rgb(220, 50, 50);
const PREVIEW_MAX_HEIGHT: f32 = 220.0;

impl ModelUploader {
    pub(super) fn render(&mut self, ctx: &egui::Context) -> Vec<UiAction> {
        let mut actions = Vec::new();
        let view = self.controller.ui().clone();
        let state = self.controller.state();
        let selected = self
            .controller
            .selected()
            .map(|f| format!("{} ({})", f.name, FileSizeUtils::format_size(f.size())));

        egui::CentralPanel::default().show(ctx, |ui| {
            let footer_height = 30.0;
            let content_height = ui.available_height() - footer_height;

            egui::ScrollArea::vertical()
                .max_height(content_height)
                .show(ui, |ui| {
                    ui.add_space(16.0);
                    ui.vertical_centered(|ui| {
                        ui.heading("Image to 3D Model");
                        ui.add_space(5.0);
                        ui.label(
                            RichText::new("Drop a photo, upload it, and get a 3D model back")
                                .color(ui.visuals().text_color().gamma_multiply(0.7)),
                        );
                    });

                    ui.add_space(16.0);

                    let stroke = if view.drop_active {
                        Stroke::new(2.0, ACCENT)
                    } else {
                        ui.visuals().widgets.noninteractive.bg_stroke
                    };
                    egui::Frame::group(ui.style())
                        .stroke(stroke)
                        .inner_margin(12.0)
                        .show(ui, |ui| {
                            ui.set_width(ui.available_width());
                            ui.vertical_centered(|ui| match &view.preview {
                                PreviewSlot::Empty => {
                                    ui.label(RichText::new("🖼").size(48.0));
                                    ui.label("Drag & drop an image here");
                                }
                                PreviewSlot::Decoding { .. } => {
                                    ui.spinner();
                                }
                                PreviewSlot::Ready { .. } => {
                                    if let Some((_, texture)) = &self.preview_texture {
                                        let size = texture.size_vec2();
                                        let scale = (PREVIEW_MAX_HEIGHT / size.y)
                                            .min(ui.available_width() / size.x)
                                            .min(1.0);
                                        ui.image((texture.id(), size * scale));
                                    }
                                }
                                PreviewSlot::Unavailable { .. } => {
                                    ui.label(
                                        RichText::new("Preview unavailable for this file")
                                            .color(ui.visuals().weak_text_color()),
                                    );
                                }
                            });
                        });

                    if view.placeholder_visible() {
                        ui.small(format!(
                            "or choose one from disk ({})",
                            IMAGE_EXTENSIONS.join(", ")
                        ));
                    }

                    ui.add_space(10.0);
                    ui.horizontal(|ui| {
                        if ui.button("📁 Choose Image").clicked() {
                            actions.push(UiAction::PickFile);
                        }
                        if selected.is_some() && ui.button("🗑 Clear").clicked() {
                            actions.push(UiAction::Clear);
                        }
                        if let Some(selected) = &selected {
                            ui.label(format!("Selected: {}", selected));
                        }
                    });

                    ui.add_space(16.0);
                    ui.vertical_centered(|ui| {
                        let label = if view.busy {
                            "⏳ Uploading..."
                        } else {
                            "📤 Upload Image"
                        };
                        let button = egui::Button::new(label).min_size(egui::vec2(200.0, 40.0));
                        if ui.add_enabled(view.upload_enabled, button).clicked() {
                            actions.push(UiAction::Upload);
                        }

                        if view.busy {
                            ui.add_space(6.0);
                            ui.spinner();
                        }

                        if let Some(message) = &view.message {
                            ui.add_space(6.0);
                            if state == UiState::Error {
                                ui.colored_label(ERROR_RED, message);
                            } else {
                                ui.label(message);
                            }
                        }
                    });

                    ui.add_space(16.0);
                    ui.group(|ui| {
                        ui.set_width(ui.available_width());
                        match &mut self.viewer {
                            ViewerSlot::Ready(turntable) => {
                                turntable
                                    .show(ui)
                                    .on_hover_text("Drag to orbit the model");
                                ui.add_space(6.0);
                                ui.horizontal(|ui| {
                                    if ui.button("↗ Open externally").clicked() {
                                        actions.push(UiAction::OpenExternally);
                                    }
                                    if view.download_visible {
                                        let button = egui::Button::new(format!(
                                            "💾 Download {}",
                                            self.config.download_name
                                        ));
                                        if ui.add_enabled(view.download_enabled, button).clicked()
                                        {
                                            actions.push(UiAction::Download);
                                        }
                                    }
                                });
                            }
                            ViewerSlot::Loading { .. } => {
                                ui.vertical_centered(|ui| {
                                    ui.add_space(20.0);
                                    ui.spinner();
                                    ui.label("Loading model...");
                                    ui.add_space(20.0);
                                });
                            }
                            ViewerSlot::Empty => {
                                ui.vertical_centered(|ui| {
                                    ui.add_space(20.0);
                                    ui.label(
                                        RichText::new("Your 3D model will appear here")
                                            .color(ui.visuals().weak_text_color()),
                                    );
                                    ui.add_space(20.0);
                                });
                            }
                        }
                    });

                    ui.add_space(16.0);
                });

            ui.with_layout(egui::Layout::bottom_up(Align::Center), |ui| {
                ui.add_space(6.0);
                ui.label(
                    RichText::new(format!("Endpoint: {}", self.config.endpoint))
                        .small()
                        .color(ui.visuals().weak_text_color()),
                );
            });
        });

        actions
    }
}
