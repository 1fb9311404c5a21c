mod client;
mod types;

pub use client::{HttpUploadClient, UploadClient};
pub use types::{media_type_for, SelectedFile, UploadResult};
