//! Output manifest (manifest.json)
//!
//! Written next to the exported layers: what was produced, when, in which
//! CRS, and a SHA-256 per file so downstream consumers can verify copies.

use crate::config::ExportFormat;
use crate::crs::Crs;
use crate::export::ExportedFile;
use crate::models::Zip3Region;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use zip3_common::checksum::sha256_file;
use zip3_common::{Result, Zip3Error};

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputManifest {
    pub created_at: DateTime<Utc>,
    pub generator: String,
    pub crs: Crs,
    pub layer_name: String,
    pub record_count: usize,
    pub state_count: usize,
    pub files: Vec<ManifestFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestFile {
    pub format: ExportFormat,
    /// File name relative to the output directory
    pub name: String,
    pub sha256: String,
    pub size: u64,
}

impl OutputManifest {
    /// Describe the exported files, hashing each one
    pub fn build(exported: &[ExportedFile], regions: &[Zip3Region], crs: Crs, layer_name: &str) -> Result<Self> {
        let mut files = Vec::new();
        for export in exported {
            for path in &export.files {
                let digest = sha256_file(path)?;
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                files.push(ManifestFile {
                    format: export.format,
                    name,
                    sha256: digest.sha256,
                    size: digest.size,
                });
            }
        }

        let states: BTreeSet<&str> = regions.iter().map(|r| r.state_abbr()).collect();

        Ok(Self {
            created_at: Utc::now(),
            generator: concat!("zip3-ingest ", env!("CARGO_PKG_VERSION")).to_string(),
            crs,
            layer_name: layer_name.to_string(),
            record_count: regions.len(),
            state_count: states.len(),
            files,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| Zip3Error::write(path, e))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Zip3Error::read(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }
}
