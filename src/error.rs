// Trailcam Uploader Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Transcode error: {0}")]
    Transcode(String),

    #[error("FFprobe error: {0}")]
    FFprobe(String),

    #[error("Sidecar error: {0}")]
    Sidecar(String),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, UploaderError>;
