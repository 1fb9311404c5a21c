pub mod mesh;
pub mod ply;

use crate::error::{Error, Result};
use crate::utils::data_url::{self, Blob, DEFAULT_MODEL_MEDIA_TYPE};
use eframe::egui::{self, Color32, Pos2, Rect, Sense, Stroke};
use mesh::Wireframe;
use ply::PointCloud;
use std::io::Write;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use tracing::{debug, info, warn};

pub const VIEWPORT_HEIGHT: f32 = 500.0;

const MAX_DRAWN_POINTS: usize = 40_000;
const MAX_DRAWN_EDGES: usize = 60_000;
const MODEL_COLOR: Color32 = Color32::from_rgb(161, 89, 225);
const AUTO_ROTATE_SPEED: f32 = 0.5;
const DRAG_SENSITIVITY: f32 = 0.01;
const PITCH_LIMIT: f32 = 1.4;

/// Configuration of the embedded model viewer: what to load and how it behaves.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelViewer {
    pub source: String,
    pub auto_rotate: bool,
    pub camera_controls: bool,
    pub height: f32,
}

impl ModelViewer {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            auto_rotate: true,
            camera_controls: true,
            height: VIEWPORT_HEIGHT,
        }
    }
}

enum Geometry {
    Points(PointCloud),
    Mesh(Wireframe),
    Placeholder,
}

/// Live turntable for one [`ModelViewer`] configuration.
pub struct Turntable {
    config: ModelViewer,
    geometry: Geometry,
    yaw: f32,
    pitch: f32,
}

impl Turntable {
    /// Decodes the model behind `config.source`. Blocks; see [`spawn_load`].
    pub fn load(config: ModelViewer) -> Self {
        let geometry = load_geometry(&config.source);
        Self::with_geometry(config, geometry)
    }

    pub fn placeholder(config: ModelViewer) -> Self {
        Self::with_geometry(config, Geometry::Placeholder)
    }

    fn with_geometry(config: ModelViewer, geometry: Geometry) -> Self {
        Self {
            config,
            geometry,
            yaw: 0.0,
            pitch: 0.3,
        }
    }

    pub fn config(&self) -> &ModelViewer {
        &self.config
    }

    pub fn show(&mut self, ui: &mut egui::Ui) -> egui::Response {
        let size = egui::vec2(ui.available_width(), self.config.height);
        let sense = if self.config.camera_controls {
            Sense::drag()
        } else {
            Sense::hover()
        };
        let (response, painter) = ui.allocate_painter(size, sense);
        let rect = response.rect;

        if self.config.camera_controls && response.dragged() {
            let delta = response.drag_delta();
            self.yaw += delta.x * DRAG_SENSITIVITY;
            self.pitch = (self.pitch + delta.y * DRAG_SENSITIVITY).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        } else if self.config.auto_rotate {
            self.yaw += ui.input(|i| i.stable_dt) * AUTO_ROTATE_SPEED;
            ui.ctx().request_repaint();
        }

        painter.rect_filled(rect, 6.0, ui.visuals().extreme_bg_color);

        match &self.geometry {
            Geometry::Points(cloud) => {
                let stride = (cloud.points.len() / MAX_DRAWN_POINTS).max(1);
                for (i, point) in cloud.points.iter().enumerate().step_by(stride) {
                    let color = cloud
                        .colors
                        .as_ref()
                        .and_then(|c| c.get(i))
                        .map(|[r, g, b]| Color32::from_rgb(*r, *g, *b))
                        .unwrap_or(MODEL_COLOR);
                    let p = project(*point, self.yaw, self.pitch);
                    painter.circle_filled(to_screen(rect, p), 1.2, color);
                }
            }
            Geometry::Mesh(wireframe) => {
                let screen: Vec<Pos2> = wireframe
                    .positions
                    .iter()
                    .map(|p| to_screen(rect, project(*p, self.yaw, self.pitch)))
                    .collect();
                if wireframe.edges.is_empty() {
                    let stride = (screen.len() / MAX_DRAWN_POINTS).max(1);
                    for pos in screen.iter().step_by(stride) {
                        painter.circle_filled(*pos, 1.2, MODEL_COLOR);
                    }
                } else {
                    let stroke = Stroke::new(0.6, MODEL_COLOR);
                    let stride = (wireframe.edges.len() / MAX_DRAWN_EDGES).max(1);
                    for [a, b] in wireframe.edges.iter().step_by(stride) {
                        painter.line_segment([screen[*a], screen[*b]], stroke);
                    }
                }
            }
            Geometry::Placeholder => {
                let stroke = Stroke::new(1.5, MODEL_COLOR);
                let corners: Vec<Pos2> = CUBE_CORNERS
                    .iter()
                    .map(|c| to_screen(rect, project(*c, self.yaw, self.pitch)))
                    .collect();
                for [a, b] in CUBE_EDGES {
                    painter.line_segment([corners[a], corners[b]], stroke);
                }
                painter.text(
                    rect.center_bottom() - egui::vec2(0.0, 16.0),
                    egui::Align2::CENTER_BOTTOM,
                    "Preview not available in-app, use Open externally",
                    egui::FontId::proportional(13.0),
                    ui.visuals().weak_text_color(),
                );
            }
        }

        response
    }
}

const CUBE_CORNERS: [[f32; 3]; 8] = [
    [-0.5, -0.5, -0.5],
    [0.5, -0.5, -0.5],
    [0.5, 0.5, -0.5],
    [-0.5, 0.5, -0.5],
    [-0.5, -0.5, 0.5],
    [0.5, -0.5, 0.5],
    [0.5, 0.5, 0.5],
    [-0.5, 0.5, 0.5],
];

const CUBE_EDGES: [[usize; 2]; 12] = [
    [0, 1],
    [1, 2],
    [2, 3],
    [3, 0],
    [4, 5],
    [5, 6],
    [6, 7],
    [7, 4],
    [0, 4],
    [1, 5],
    [2, 6],
    [3, 7],
];

/// Loads a turntable on a worker thread and calls `on_ready` once it has been sent.
///
/// A failed spawn or a panicking worker still yields a placeholder turntable
/// or a disconnected receiver, never a hung UI.
pub fn spawn_load(
    config: ModelViewer,
    on_ready: impl FnOnce() + Send + 'static,
) -> Receiver<Turntable> {
    let (tx, rx) = mpsc::channel();
    let fallback_tx = tx.clone();
    let fallback = config.clone();

    let spawned = thread::Builder::new()
        .name("model-load".to_string())
        .spawn(move || {
            if tx.send(Turntable::load(config)).is_ok() {
                on_ready();
            }
        });

    if let Err(e) = spawned {
        warn!("Failed to start model loader: {}", e);
        let _ = fallback_tx.send(Turntable::placeholder(fallback));
    }
    rx
}

fn load_geometry(source: &str) -> Geometry {
    if !data_url::is_data_url(source) {
        return Geometry::Placeholder;
    }
    let blob = match data_url::decode(source, DEFAULT_MODEL_MEDIA_TYPE) {
        Ok(blob) => blob,
        Err(e) => {
            debug!("Viewer could not decode its source: {}", e);
            return Geometry::Placeholder;
        }
    };

    if mesh::looks_like_glb(&blob.bytes) {
        match mesh::load(&blob.bytes) {
            Ok(mut wireframe) => {
                info!(
                    "Viewer loaded glTF mesh with {} vertices",
                    wireframe.positions.len()
                );
                normalize(&mut wireframe.positions);
                return Geometry::Mesh(wireframe);
            }
            Err(e) => debug!("Viewer could not read glTF: {}", e),
        }
    } else if ply::looks_like_ply(&blob.bytes) {
        match ply::parse(&blob.bytes) {
            Ok(mut cloud) if !cloud.points.is_empty() => {
                info!("Viewer loaded {} points", cloud.points.len());
                normalize(&mut cloud.points);
                return Geometry::Points(cloud);
            }
            Ok(_) => debug!("PLY payload has no vertices"),
            Err(e) => debug!("Viewer could not read PLY: {}", e),
        }
    } else {
        debug!("Viewer has no reader for {}", blob.media_type);
    }
    Geometry::Placeholder
}

/// Centers the points on the origin and scales them into a unit cube.
fn normalize(points: &mut [[f32; 3]]) {
    let mut min = [f32::INFINITY; 3];
    let mut max = [f32::NEG_INFINITY; 3];
    for p in points.iter() {
        for axis in 0..3 {
            min[axis] = min[axis].min(p[axis]);
            max[axis] = max[axis].max(p[axis]);
        }
    }

    let center = [0usize, 1, 2].map(|a| (min[a] + max[a]) / 2.0);
    let extent = (0..3).map(|a| max[a] - min[a]).fold(0.0f32, f32::max);
    let scale = if extent > f32::EPSILON { 1.0 / extent } else { 1.0 };

    for p in points.iter_mut() {
        for axis in 0..3 {
            p[axis] = (p[axis] - center[axis]) * scale;
        }
    }
}

/// Rotates by yaw around Y, then pitch around X.
fn project(p: [f32; 3], yaw: f32, pitch: f32) -> [f32; 3] {
    let (sy, cy) = yaw.sin_cos();
    let (sp, cp) = pitch.sin_cos();
    let x = p[0] * cy + p[2] * sy;
    let z = -p[0] * sy + p[2] * cy;
    let y = p[1] * cp - z * sp;
    let z = p[1] * sp + z * cp;
    [x, y, z]
}

fn to_screen(rect: Rect, p: [f32; 3]) -> Pos2 {
    let scale = rect.height().min(rect.width()) * 0.7;
    let perspective = 1.0 / (1.0 + p[2] * 0.3).max(0.2);
    rect.center() + egui::vec2(p[0], -p[1]) * scale * perspective
}

/// Hands the model to the operating system's default viewer.
pub fn open_externally(source: &str) -> Result<()> {
    if !data_url::is_data_url(source) {
        open::that(source)?;
        return Ok(());
    }

    let blob = data_url::decode(source, DEFAULT_MODEL_MEDIA_TYPE)?;
    let path = stage_for_viewer(&blob)?;
    info!("Opening {} externally", path.display());
    open::that(&path)?;
    Ok(())
}

/// Writes the model to a fresh, uniquely named temp file that outlives this process's handle.
fn stage_for_viewer(blob: &Blob) -> Result<PathBuf> {
    let extension = if ply::looks_like_ply(&blob.bytes) {
        "ply"
    } else {
        extension_for(&blob.media_type)
    };
    let mut file = tempfile::Builder::new()
        .prefix("model-preview-")
        .suffix(&format!(".{extension}"))
        .tempfile()?;
    file.write_all(&blob.bytes)?;
    let (_, path) = file.keep().map_err(|e| Error::Io(e.error))?;
    Ok(path)
}

fn extension_for(media_type: &str) -> &'static str {
    match media_type {
        "model/gltf-binary" => "glb",
        "model/gltf+json" => "gltf",
        "model/obj" => "obj",
        "model/stl" => "stl",
        "model/ply" | "application/ply" => "ply",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use std::time::Duration;

    fn ply_data_url() -> String {
        let ply = b"ply\nformat ascii 1.0\nelement vertex 2\nproperty float x\nproperty float y\nproperty float z\nend_header\n0 0 0\n4 2 0\n";
        format!("data:application/ply;base64,{}", STANDARD.encode(ply))
    }

    #[test]
    fn viewer_defaults_match_presenter_contract() {
        let viewer = ModelViewer::new("data:model/gltf-binary;base64,AAA=");
        assert!(viewer.auto_rotate);
        assert!(viewer.camera_controls);
        assert_eq!(viewer.height, VIEWPORT_HEIGHT);
    }

    #[test]
    fn ply_sources_load_as_points() {
        let turntable = Turntable::load(ModelViewer::new(ply_data_url()));
        let Geometry::Points(cloud) = &turntable.geometry else {
            panic!("expected point geometry");
        };
        assert_eq!(cloud.points, vec![[-0.5, -0.25, 0.0], [0.5, 0.25, 0.0]]);
    }

    #[test]
    fn glb_sources_load_as_wireframe() {
        let source = format!(
            "data:model/gltf-binary;base64,{}",
            STANDARD.encode(mesh::triangle_glb())
        );
        let turntable = Turntable::load(ModelViewer::new(source));
        let Geometry::Mesh(wireframe) = &turntable.geometry else {
            panic!("expected mesh geometry");
        };
        assert_eq!(
            wireframe.positions,
            vec![[0.0, -0.25, 0.0], [0.5, -0.25, 0.0], [-0.5, 0.25, 0.0]]
        );
        assert_eq!(wireframe.edges.len(), 3);
    }

    #[test]
    fn unreadable_sources_fall_back_to_placeholder() {
        let broken_glb =
            Turntable::load(ModelViewer::new("data:model/gltf-binary;base64,Z2xURg=="));
        assert!(matches!(broken_glb.geometry, Geometry::Placeholder));

        let huge_ply = format!(
            "data:application/ply;base64,{}",
            STANDARD.encode(b"ply\nformat ascii 1.0\nelement vertex 1000000000000000000\nproperty float x\nproperty float y\nproperty float z\nend_header\n0 0 0\n")
        );
        let huge = Turntable::load(ModelViewer::new(huge_ply));
        assert!(matches!(huge.geometry, Geometry::Placeholder));

        let remote = Turntable::load(ModelViewer::new("https://example.com/m.glb"));
        assert!(matches!(remote.geometry, Geometry::Placeholder));
    }

    #[test]
    fn spawned_load_delivers_turntable_and_wakes() {
        let (woke_tx, woke_rx) = mpsc::channel();
        let config = ModelViewer::new(ply_data_url());
        let rx = spawn_load(config.clone(), move || {
            let _ = woke_tx.send(());
        });

        let turntable = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(turntable.config(), &config);
        assert!(matches!(turntable.geometry, Geometry::Points(_)));
        woke_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    }

    #[test]
    fn staged_models_get_unique_private_paths() {
        let blob = Blob {
            media_type: "model/gltf-binary".to_string(),
            bytes: mesh::triangle_glb(),
        };
        let first = stage_for_viewer(&blob).unwrap();
        let second = stage_for_viewer(&blob).unwrap();

        assert_ne!(first, second);
        for path in [&first, &second] {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            assert!(name.starts_with("model-preview-"));
            assert!(name.ends_with(".glb"));
            assert_eq!(std::fs::read(path).unwrap(), blob.bytes);
            std::fs::remove_file(path).unwrap();
        }
    }

    #[test]
    fn projection_preserves_length() {
        let p = project([0.3, -0.2, 0.4], 1.1, -0.7);
        let len = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
        assert!((len - 0.538_516_5).abs() < 1e-4);
    }

    #[test]
    fn media_types_map_to_extensions() {
        assert_eq!(extension_for("model/gltf-binary"), "glb");
        assert_eq!(extension_for("application/octet-stream"), "bin");
    }
}
