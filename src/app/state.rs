use super::preview::PreviewImage;
use crate::viewer::ModelViewer;
use std::sync::Arc;

pub const PROCESSING_MESSAGE: &str = "⏳ Processing...";
pub const UPLOAD_FAILED_MESSAGE: &str = "❌ Error uploading image. Try again.";
pub const DOWNLOAD_FAILED_MESSAGE: &str = "❌ Could not prepare the model for download.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiState {
    #[default]
    Idle,
    Ready,
    Uploading,
    Success,
    Error,
}

/// The single preview slot inside the drop zone.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PreviewSlot {
    #[default]
    Empty,
    Decoding {
        token: u64,
    },
    Ready {
        token: u64,
        image: Arc<PreviewImage>,
    },
    Unavailable {
        token: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ViewerArea {
    #[default]
    Placeholder,
    Model(ModelViewer),
}

/// Everything the window shows, owned by the controller and read by the renderer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UiContext {
    pub upload_enabled: bool,
    pub busy: bool,
    pub message: Option<String>,
    pub drop_active: bool,
    pub preview: PreviewSlot,
    pub viewer: ViewerArea,
    pub download_visible: bool,
    pub download_enabled: bool,
}

impl UiContext {
    pub fn placeholder_visible(&self) -> bool {
        matches!(self.preview, PreviewSlot::Empty)
    }
}
