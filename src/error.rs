use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AnpError {
    #[error("invalid environment: {0} (expected onshore or offshore)")]
    InvalidEnvironment(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("request failed: {0}")]
    Http(String),

    #[error("server returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("could not decode source file: {0}")]
    Decode(String),

    #[error("could not read source archive: {0}")]
    Archive(String),

    #[error("cached dataset is unreadable: {0}")]
    CacheCorruption(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl AnpError {
    pub fn is_network(&self) -> bool {
        matches!(self, AnpError::Http(_) | AnpError::Status { .. })
    }
}
