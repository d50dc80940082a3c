//! Error types shared across the AMREL workspace

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for AMREL operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bad file {path}: {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("tile {path} does not line up with the sector grid")]
    GeometryMismatch { path: PathBuf },

    #[error("empty tile set")]
    EmptySector,

    #[error("stage input missing: {0}")]
    StageMissing(String),

    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Attach the offending path to a raw I/O error.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Shorthand for a file-format complaint on `path`.
    pub fn format(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Error::Format {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for AMREL operations
pub type Result<T> = std::result::Result<T, Error>;
