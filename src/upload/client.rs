use crate::error::Result;
use crate::upload::types::{SelectedFile, UploadResult};
use reqwest::multipart::{Form, Part};
use tracing::{debug, info};

/// Multipart field the conversion service reads the image from.
pub const IMAGE_FIELD: &str = "image";

/// Sends one selected file to the conversion service and returns its parsed reply.
///
/// Called from a worker thread, never from the UI thread.
pub trait UploadClient: Send + Sync {
    fn upload(&self, file: &SelectedFile) -> Result<UploadResult>;
}

#[derive(Debug, Clone)]
pub struct HttpUploadClient {
    endpoint: String,
}

impl HttpUploadClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    async fn send(&self, file: &SelectedFile) -> Result<UploadResult> {
        let part = Part::bytes(file.bytes.to_vec())
            .file_name(file.name.clone())
            .mime_str(&file.media_type)?;
        let form = Form::new().part(IMAGE_FIELD, part);

        info!("Uploading '{}' ({} bytes) to {}", file.name, file.size(), self.endpoint);

        // Built per request: each upload runs on its own short-lived runtime.
        let client = reqwest::Client::new();
        let response = client.post(&self.endpoint).multipart(form).send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!("Upload response status {}: {} bytes", status, body.len());

        // The service reports its own failures in the JSON message, so the body
        // is parsed whatever the status code.
        UploadResult::from_json(&body)
    }
}

impl UploadClient for HttpUploadClient {
    fn upload(&self, file: &SelectedFile) -> Result<UploadResult> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.send(file))
    }
}
