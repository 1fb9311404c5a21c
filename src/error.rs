use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Malformed data URL: {0}")]
    MalformedDataUrl(String),

    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),

    #[error("Model has no drawable geometry")]
    EmptyModel,

    #[error("PLY parse error: {0}")]
    Ply(String),

    #[error("Upload worker stopped before the request settled")]
    UploadAborted,
}

pub type Result<T> = std::result::Result<T, Error>;
