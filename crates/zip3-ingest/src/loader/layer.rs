//! Shapefile layer reading
//!
//! A layer is the `.shp`/`.shx`/`.dbf` triple plus the `.prj` that names its
//! CRS. Only polygon shapes are admitted; null shapes are skipped and counted.

use crate::crs::Crs;
use crate::geometry::Geometry;
use shapefile::dbase::{FieldValue, Record};
use shapefile::Shape;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zip3_common::{Result, Zip3Error};

/// Polygon features and attribute records read from one shapefile
#[derive(Debug)]
pub struct PolygonLayer {
    pub path: PathBuf,
    pub crs: Crs,
    pub features: Vec<(Geometry, Record)>,
    /// Null or non-polygon shapes that were skipped
    pub skipped_shapes: usize,
}

impl PolygonLayer {
    /// Read every polygon feature of `shp_path`.
    ///
    /// `default_crs` is used when the layer has no `.prj` sidecar; a `.prj`
    /// that names an unsupported CRS is an error.
    pub fn read(shp_path: &Path, default_crs: Crs) -> Result<Self> {
        let crs = read_prj(shp_path)?.unwrap_or_else(|| {
            warn!(
                path = %shp_path.display(),
                crs = %default_crs,
                "No .prj file found, assuming default CRS"
            );
            default_crs
        });

        let mut reader =
            shapefile::Reader::from_path(shp_path).map_err(|e| Zip3Error::read(shp_path, e))?;

        let mut features = Vec::new();
        let mut skipped_shapes = 0;

        for item in reader.iter_shapes_and_records() {
            let (shape, record) = item.map_err(|e| Zip3Error::read(shp_path, e))?;
            let multi: geo::MultiPolygon<f64> = match shape {
                Shape::Polygon(p) => p.into(),
                other => {
                    debug!(shape_type = ?other.shapetype(), "Skipping non-polygon shape");
                    skipped_shapes += 1;
                    continue;
                },
            };
            features.push((Geometry::from_multi(multi), record));
        }

        Ok(Self {
            path: shp_path.to_path_buf(),
            crs,
            features,
            skipped_shapes,
        })
    }
}

/// CRS named by the `.prj` next to `shp_path`, `None` if there is no `.prj`
pub fn read_prj(shp_path: &Path) -> Result<Option<Crs>> {
    let prj_path = shp_path.with_extension("prj");
    if !prj_path.exists() {
        return Ok(None);
    }

    let wkt = std::fs::read_to_string(&prj_path).map_err(|e| Zip3Error::read(&prj_path, e))?;
    Crs::from_wkt(&wkt)
        .map(Some)
        .ok_or_else(|| Zip3Error::UnsupportedCrs(format!("{}: {}", prj_path.display(), wkt.trim())))
}

/// Text value of a character or numeric attribute, trimmed
pub fn field_string(record: &Record, name: &str) -> Option<String> {
    match record.get(name)? {
        FieldValue::Character(Some(s)) | FieldValue::Memo(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        },
        FieldValue::Numeric(Some(n)) => Some(format!("{}", n)),
        FieldValue::Integer(i) => Some(i.to_string()),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_read_prj_missing_and_present() {
        let dir = tempfile::tempdir().unwrap();
        let shp = dir.path().join("layer.shp");
        assert!(read_prj(&shp).unwrap().is_none());

        std::fs::write(dir.path().join("layer.prj"), Crs::Nad83.wkt()).unwrap();
        assert_eq!(read_prj(&shp).unwrap(), Some(Crs::Nad83));
    }

    #[test]
    fn test_read_prj_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("layer.prj"),
            r#"PROJCS["NAD_1983_StatePlane_Massachusetts_Mainland_FIPS_2001",GEOGCS["GCS_North_American_1983"]]"#,
        )
        .unwrap();
        let err = read_prj(&dir.path().join("layer.shp")).unwrap_err();
        assert!(matches!(err, Zip3Error::UnsupportedCrs(_)));
    }

    #[test]
    fn test_field_string() {
        let mut record = Record::default();
        record.insert("GEOID10".to_string(), FieldValue::Character(Some("02134 ".to_string())));
        record.insert("EMPTY".to_string(), FieldValue::Character(None));
        assert_eq!(field_string(&record, "GEOID10").as_deref(), Some("02134"));
        assert_eq!(field_string(&record, "EMPTY"), None);
        assert_eq!(field_string(&record, "MISSING"), None);
    }
}
