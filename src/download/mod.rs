use crate::error::Result;
use crate::utils::data_url::Blob;
use rfd::FileDialog;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Temporary on-disk copy of a blob, handed to a [`SaveSink`].
///
/// The backing file is removed when the handle is dropped.
pub struct ObjectUrl {
    file: NamedTempFile,
    media_type: String,
    len: usize,
}

impl ObjectUrl {
    pub fn create(blob: &Blob) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("model-download-")
            .tempfile()?;
        file.write_all(&blob.bytes)?;
        file.flush()?;
        debug!("Staged {} bytes at {}", blob.bytes.len(), file.path().display());

        Ok(Self {
            file,
            media_type: blob.media_type.clone(),
            len: blob.bytes.len(),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

impl Drop for ObjectUrl {
    fn drop(&mut self) {
        debug!("Releasing staged download {}", self.file.path().display());
    }
}

/// Local save mechanism for a staged download.
pub trait SaveSink {
    fn save(&self, object: &ObjectUrl, file_name: &str) -> Result<()>;
}

/// Native save dialog pre-filled with the suggested file name.
#[derive(Debug, Default, Clone, Copy)]
pub struct DialogSaveSink;

impl SaveSink for DialogSaveSink {
    fn save(&self, object: &ObjectUrl, file_name: &str) -> Result<()> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("ply");

        let Some(destination) = FileDialog::new()
            .set_file_name(file_name)
            .add_filter("3D model", &[extension])
            .save_file()
        else {
            info!("Save dialog dismissed");
            return Ok(());
        };

        fs::copy(object.path(), &destination)?;
        info!(
            "Saved {} ({}, {} bytes)",
            destination.display(),
            object.media_type(),
            object.len()
        );
        Ok(())
    }
}
