//! Error types for the bridge, cache and content loader

use crate::platform::HardwareError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    UrlParse(#[from] url::ParseError),

    #[error("Invalid URL: '{0}'")]
    InvalidUrl(String),

    #[error(transparent)]
    Hardware(#[from] HardwareError),

    #[error("No tokio runtime available: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),

    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
