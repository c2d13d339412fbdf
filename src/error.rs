use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Microphone / audio device failure
    #[error("Audio error: {0}")]
    Audio(String),

    /// Mesh or clip file could not be used
    #[error("Asset error: {0}")]
    Asset(String),

    /// No usable GPU adapter/device or presentation surface
    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Remote service answered, but not with what we asked for
    #[error("API error: {0}")]
    Api(String),
}
