//! Error types for the ZIP3 pipeline
//!
//! Every variant carries a message a user can act on. Only
//! [`Zip3Error::InvalidGeometry`] is recoverable: the offending record is
//! dropped and counted, the batch continues. Everything else aborts the run.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ZIP3 operations
pub type Result<T> = std::result::Result<T, Zip3Error>;

/// Main error type for the ZIP3 pipeline
#[derive(Error, Debug)]
pub enum Zip3Error {
    /// A required local input is absent
    #[error("Missing input '{}': {hint}", path.display())]
    MissingInput { path: PathBuf, hint: String },

    /// Fetching auxiliary data over the network failed
    #[error("Download of '{url}' failed: {reason}. Check your network connection or place the files in the cache directory manually.")]
    Download { url: String, reason: String },

    /// A polygon could not be repaired
    #[error("Invalid geometry for {key}: {reason}")]
    InvalidGeometry { key: String, reason: String },

    /// Persisting an output file failed
    #[error("Failed to write '{}': {reason}. Check file permissions and disk space.", path.display())]
    Write { path: PathBuf, reason: String },

    /// An input file exists but could not be decoded
    #[error("Failed to read '{}': {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("Unsupported coordinate reference system: {0}")]
    UnsupportedCrs(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Zip3Error {
    pub fn missing_input(path: impl Into<PathBuf>, hint: impl Into<String>) -> Self {
        Self::MissingInput {
            path: path.into(),
            hint: hint.into(),
        }
    }

    pub fn download(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Download {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_geometry(key: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Write {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn read(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Read {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error must abort the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Zip3Error::InvalidGeometry { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_invalid_geometry_is_recoverable() {
        assert!(!Zip3Error::invalid_geometry("MA-021", "empty after repair").is_fatal());
        assert!(Zip3Error::missing_input("a.shp", "provide it").is_fatal());
        assert!(Zip3Error::download("http://x", "404 Not Found").is_fatal());
        assert!(Zip3Error::write("/out", "permission denied").is_fatal());
    }

    #[test]
    fn test_messages_name_the_path() {
        let err = Zip3Error::missing_input("cb_2018_us_zcta510_500k.shp", "download it from census.gov");
        let msg = err.to_string();
        assert!(msg.contains("cb_2018_us_zcta510_500k.shp"));
        assert!(msg.contains("census.gov"));
    }
}
