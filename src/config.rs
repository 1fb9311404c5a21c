use std::env;

pub const ENDPOINT_VAR: &str = "MODEL_UPLOADER_ENDPOINT";
pub const DOWNLOAD_NAME_VAR: &str = "MODEL_UPLOADER_DOWNLOAD_NAME";

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:5000/upload";
pub const DEFAULT_DOWNLOAD_NAME: &str = "model.ply";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub endpoint: String,
    pub download_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            download_name: DEFAULT_DOWNLOAD_NAME.to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup; blank values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str, default: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            endpoint: read(ENDPOINT_VAR, DEFAULT_ENDPOINT),
            download_name: read(DOWNLOAD_NAME_VAR, DEFAULT_DOWNLOAD_NAME),
        }
    }
}
