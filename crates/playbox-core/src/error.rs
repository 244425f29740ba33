use std::path::PathBuf;
use thiserror::Error;

/// Error type for project-level operations (configuration, project loading).
///
/// Build failures have their own type, [`crate::bundler::BuildError`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config value for `{field}`: {message}")]
    ConfigInvalid { field: &'static str, message: String },

    #[error("Project directory not found: {0}")]
    ProjectNotFound(PathBuf),

    #[error("{0}")]
    Other(String),
}

impl Error {
    #[must_use]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
