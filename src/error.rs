use std::path::PathBuf;
use thiserror::Error;

/// Failures of the settings merger and the profile patcher that callers
/// need to tell apart. Expected-absent files are not errors.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("{} is not valid JSON", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{} has an unexpected shape: {detail}", path.display())]
    Shape { path: PathBuf, detail: String },

    #[error("Failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

impl SetupError {
    pub fn is_parse(&self) -> bool {
        matches!(self, SetupError::Parse { .. } | SetupError::Shape { .. })
    }
}

/// Shape errors raised by the pure document mutation, before a path is known.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("top-level value is not an object")]
    RootNotObject,
    #[error("\"hooks\" is not an object")]
    HooksNotObject,
}

impl DocumentError {
    pub fn at(self, path: impl Into<PathBuf>) -> SetupError {
        SetupError::Shape {
            path: path.into(),
            detail: self.to_string(),
        }
    }
}
