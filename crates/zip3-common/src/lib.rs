//! ZIP3 Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the ZIP3 workspace.
//!
//! # Overview
//!
//! - **Error Handling**: the pipeline's error taxonomy and result type
//! - **Logging**: `tracing` subscriber setup shared by every binary
//! - **Checksums**: SHA-256 digests for downloads and exported files
//! - **Types**: region keys and ZIP/state identifier helpers
//!
//! # Example
//!
//! ```no_run
//! use zip3_common::{Result, Zip3Error};
//! use zip3_common::checksum::sha256_file;
//!
//! fn describe(path: &str) -> Result<()> {
//!     let digest = sha256_file(path)?;
//!     tracing::info!(sha256 = %digest.sha256, size = digest.size, "Checksummed file");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{Result, Zip3Error};
pub use types::RegionKey;
