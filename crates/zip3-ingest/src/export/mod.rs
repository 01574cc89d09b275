//! Region export
//!
//! Every format carries exactly two attributes, [`FIELD_STATE`] and
//! [`FIELD_ZIP3`], plus the geometry and a declared CRS.

pub mod gpkg;
pub mod json;
pub mod shp;

pub use gpkg::GeoPackageWriter;
pub use json::GeoJsonWriter;
pub use shp::ShapefileWriter;

use crate::config::{ExportFormat, OutputConfig};
use crate::crs::Crs;
use crate::models::Zip3Region;
use std::path::PathBuf;
use tracing::info;
use zip3_common::{Result, Zip3Error};

/// State abbreviation attribute
pub const FIELD_STATE: &str = "STUSPS";

/// ZIP3 prefix attribute
pub const FIELD_ZIP3: &str = "ZIP3";

/// One written output
#[derive(Debug, Clone)]
pub struct ExportedFile {
    pub format: ExportFormat,
    /// Primary path (the `.shp` for shapefiles)
    pub path: PathBuf,
    /// Every file the format produced, primary path included
    pub files: Vec<PathBuf>,
}

pub struct Exporter<'a> {
    config: &'a OutputConfig,
}

impl<'a> Exporter<'a> {
    pub fn new(config: &'a OutputConfig) -> Self {
        Self { config }
    }

    /// Write `regions` (in `crs`) in every configured format
    pub fn export(&self, regions: &[Zip3Region], crs: Crs) -> Result<Vec<ExportedFile>> {
        std::fs::create_dir_all(&self.config.dir).map_err(|e| Zip3Error::write(&self.config.dir, e))?;

        let mut written = Vec::with_capacity(self.config.formats.len());
        for &format in &self.config.formats {
            let path = self.config.path_for(format);
            let files = match format {
                ExportFormat::Shapefile => {
                    ShapefileWriter::write(&path, regions, crs)?;
                    ShapefileWriter::sidecars(&path)
                },
                ExportFormat::Geopackage => {
                    GeoPackageWriter::write(&path, &self.config.layer_name, regions, crs)?;
                    vec![path.clone()]
                },
                ExportFormat::Geojson => {
                    GeoJsonWriter::write(&path, regions, crs)?;
                    vec![path.clone()]
                },
            };
            info!(format = ?format, path = %path.display(), records = regions.len(), "Exported regions");
            written.push(ExportedFile { format, path, files });
        }

        Ok(written)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod tests {
    use super::*;
    use crate::geometry::tests::rect;
    use zip3_common::RegionKey;

    pub(crate) fn sample_regions() -> Vec<Zip3Region> {
        vec![
            Zip3Region {
                key: RegionKey::new("MA", "021"),
                geometry: rect(-71.2, 42.2, -71.0, 42.4),
                member_count: 3,
            },
            Zip3Region {
                key: RegionKey::new("NH", "030"),
                geometry: rect(-71.6, 42.8, -71.3, 43.1),
                member_count: 1,
            },
        ]
    }

    #[test]
    fn test_export_creates_directory_and_all_formats() {
        let dir = tempfile::tempdir().unwrap();
        let config = OutputConfig {
            dir: dir.path().join("nested/out"),
            formats: vec![ExportFormat::Shapefile, ExportFormat::Geopackage, ExportFormat::Geojson],
            ..OutputConfig::default()
        };

        let written = Exporter::new(&config).export(&sample_regions(), Crs::Nad83).unwrap();
        assert_eq!(written.len(), 3);
        for file in written.iter().flat_map(|w| &w.files) {
            assert!(file.exists(), "{} missing", file.display());
        }
        assert_eq!(written[0].files.len(), 4);
    }

    #[test]
    fn test_export_under_a_file_is_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        let config = OutputConfig {
            dir: blocker.join("out"),
            ..OutputConfig::default()
        };
        let err = Exporter::new(&config).export(&sample_regions(), Crs::Nad83).unwrap_err();
        assert!(matches!(err, Zip3Error::Write { .. }));
    }
}
