//! ZIP3 Ingest Library
//!
//! Builds one polygon per (state, three-digit ZIP prefix) from the Census
//! ZIP Code Tabulation Areas, trimmed to state boundaries.
//!
//! # Stages
//!
//! - **Load**: ZCTA shapefile (local) and state boundaries (cached download)
//! - **Join**: one state per ZCTA, by containment with a centroid fallback
//! - **Clip**: ZCTA ∩ assigned state
//! - **Dissolve**: union per (state, ZIP3)
//! - **Repair**: overlay-based repair and topology-preserving simplification
//! - **Coverage**: summed region area against official state area
//! - **Export**: Shapefile, GeoPackage and GeoJSON
//!
//! # Example
//!
//! ```no_run
//! use zip3_ingest::{Pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::from_env()?;
//!     let output = Pipeline::new(config).run().await?;
//!     println!("{} regions", output.regions.len());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod clip;
pub mod config;
pub mod coverage;
pub mod crs;
pub mod dissolve;
pub mod export;
pub mod geometry;
pub mod join;
pub mod loader;
pub mod manifest;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod repair;
pub mod verify;

pub use config::PipelineConfig;
pub use crs::Crs;
pub use geometry::Geometry;
pub use pipeline::{Pipeline, PipelineOutput, PipelineStats};
pub use zip3_common::{RegionKey, Result, Zip3Error};
