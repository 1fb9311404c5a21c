use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Media type assumed for model payloads whose header names none.
pub const DEFAULT_MODEL_MEDIA_TYPE: &str = "model/gltf-binary";

/// Binary payload recovered from its textual encoding, tagged with a media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub media_type: String,
    pub bytes: Vec<u8>,
}

pub fn is_data_url(reference: &str) -> bool {
    reference.trim_start().starts_with("data:")
}

/// Decodes `data:<type>;base64,<payload>` or a bare base64 string.
pub fn decode(reference: &str, default_media_type: &str) -> Result<Blob> {
    let reference = reference.trim();

    let (media_type, payload) = if let Some(rest) = reference.strip_prefix("data:") {
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| Error::MalformedDataUrl("missing ',' separator".to_string()))?;

        let mut params = header.split(';');
        let media_type = params.next().unwrap_or_default().trim();
        if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
            return Err(Error::MalformedDataUrl(
                "only base64 payloads are supported".to_string(),
            ));
        }
        (media_type, payload)
    } else if reference.contains("://") {
        return Err(Error::MalformedDataUrl(
            "expected an embedded payload, got a remote URL".to_string(),
        ));
    } else {
        ("", reference.split_once(',').map_or(reference, |(_, tail)| tail))
    };

    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(compact)?;

    Ok(Blob {
        media_type: if media_type.is_empty() {
            default_media_type.to_string()
        } else {
            media_type.to_string()
        },
        bytes,
    })
}
