// error.rs

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TbkError>;

#[derive(Error, Debug)]
pub enum TbkError {
    #[error("Format error in {path:?}: {reason}")]
    Format { path: Option<PathBuf>, reason: String },

    #[error("Unsupported dtype tag {0}")]
    UnsupportedDType(i64),

    #[error("Cannot encode {value:?} as {dtype}: {reason}")]
    Encode {
        dtype: String,
        value: String,
        reason: String,
    },

    #[error("Cannot decode {dtype}: expected {expected} bytes, found {found}")]
    Decode {
        dtype: String,
        expected: usize,
        found: usize,
    },

    #[error("Row index {row} out of range [0, {record_count})")]
    OutOfRange { row: i64, record_count: i64 },

    #[error("Writer session for {0} has already been finalized.")]
    FileAlreadyFinalized(PathBuf),

    #[error("Unsupported query: {0}")]
    QueryUnsupported(String),

    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid region {region:?}: {reason}")]
    InvalidRegion { region: String, reason: String },

    #[error("{0}")]
    StringError(String),
}

impl TbkError {
    pub(crate) fn format(path: Option<PathBuf>, reason: impl Into<String>) -> Self {
        TbkError::Format {
            path,
            reason: reason.into(),
        }
    }

    /// True when this error means the downstream consumer went away (e.g. `| head`).
    pub fn is_broken_pipe(&self) -> bool {
        match self {
            TbkError::IOError(e) => e.kind() == std::io::ErrorKind::BrokenPipe,
            TbkError::Csv(e) => match e.kind() {
                csv::ErrorKind::Io(e) => e.kind() == std::io::ErrorKind::BrokenPipe,
                _ => false,
            },
            _ => false,
        }
    }
}

// Add a convenience implementation for &str errors
impl From<&str> for TbkError {
    fn from(error: &str) -> Self {
        TbkError::StringError(error.to_string())
    }
}

impl From<String> for TbkError {
    fn from(error: String) -> Self {
        TbkError::StringError(error)
    }
}

#[cfg(feature = "cli")]
impl From<indicatif::style::TemplateError> for TbkError {
    fn from(error: indicatif::style::TemplateError) -> Self {
        TbkError::StringError(format!("Template error: {}", error))
    }
}
