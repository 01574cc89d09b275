//! Shared fixtures: small synthetic ZCTA and state shapefiles in NAD83
//!
//! ```text
//!  VT (no ZCTAs) | NH   03101
//!                |      03060 (straddles MA/NH, centroid in NH)
//!  ------------- MA ------------------------------------------
//!        01001 01002     02134      01950 (straddles, centroid in MA)
//! ```

#![allow(dead_code)]

use geo::{polygon, MultiPolygon};
use shapefile::dbase::{FieldName, FieldValue, Record, TableWriterBuilder};
use std::path::{Path, PathBuf};
use zip3_ingest::config::{ExportFormat, PipelineConfig};
use zip3_ingest::{Crs, Geometry};

pub const ZCTA_BASE: &str = "zcta_fixture";
pub const STATE_BASE: &str = "state_fixture";

pub fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![polygon![
        (x: x0, y: y0),
        (x: x1, y: y0),
        (x: x1, y: y1),
        (x: x0, y: y1),
        (x: x0, y: y0),
    ]])
}

/// (zip5, geometry, state the ZCTA must end up in; `None` if outside every state)
pub fn zctas() -> Vec<(&'static str, MultiPolygon<f64>, Option<&'static str>)> {
    vec![
        ("02134", rect(-71.2, 42.3, -71.1, 42.4), Some("MA")),
        ("01001", rect(-72.7, 42.0, -72.6, 42.1), Some("MA")),
        ("01002", rect(-72.6, 42.0, -72.5, 42.1), Some("MA")),
        ("01950", rect(-70.9, 42.3, -70.8, 42.6), Some("MA")),
        ("03060", rect(-71.5, 42.4, -71.4, 42.7), Some("NH")),
        ("03101", rect(-71.5, 43.0, -71.4, 43.1), Some("NH")),
        ("96799", rect(-60.0, 30.0, -59.9, 30.1), None),
    ]
}

/// (abbreviation, FIPS, geometry)
pub fn states() -> Vec<(&'static str, &'static str, MultiPolygon<f64>)> {
    vec![
        ("MA", "25", rect(-73.0, 41.5, -70.0, 42.5)),
        ("NH", "33", rect(-72.5, 42.5, -70.5, 45.0)),
        ("VT", "50", rect(-73.4, 42.7, -72.5, 45.0)),
    ]
}

pub fn zcta_area(zip5: &str) -> f64 {
    zctas()
        .into_iter()
        .find(|(z, _, _)| *z == zip5)
        .map(|(_, g, _)| Geometry::from(g).area())
        .unwrap_or_default()
}

pub fn state_geometry(abbr: &str) -> Geometry {
    states()
        .into_iter()
        .find(|(s, _, _)| *s == abbr)
        .map(|(_, _, g)| Geometry::from(g))
        .unwrap_or_else(Geometry::empty)
}

fn write_layer(path: &Path, fields: &[(&str, u8)], rows: Vec<(MultiPolygon<f64>, Vec<(&str, String)>)>) {
    let mut table = TableWriterBuilder::new();
    for (name, len) in fields {
        table = table.add_character_field(FieldName::try_from(*name).unwrap(), *len);
    }

    let mut writer = shapefile::Writer::from_path(path, table).unwrap();
    for (geometry, values) in rows {
        let mut record = Record::default();
        for (name, value) in values {
            record.insert(name.to_string(), FieldValue::Character(Some(value)));
        }
        writer
            .write_shape_and_record(&shapefile::Polygon::from(geometry), &record)
            .unwrap();
    }
    drop(writer);

    std::fs::write(path.with_extension("prj"), Crs::Nad83.wkt()).unwrap();
}

pub fn write_zcta_layer(dir: &Path) -> PathBuf {
    let path = dir.join(format!("{ZCTA_BASE}.shp"));
    let rows = zctas()
        .into_iter()
        .map(|(zip5, g, _)| (g, vec![("GEOID10", zip5.to_string())]))
        .collect();
    write_layer(&path, &[("GEOID10", 5)], rows);
    path
}

pub fn write_state_layer(dir: &Path) -> PathBuf {
    let path = dir.join(format!("{STATE_BASE}.shp"));
    let rows = states()
        .into_iter()
        .map(|(abbr, fips, g)| (g, vec![("STUSPS", abbr.to_string()), ("STATEFP", fips.to_string())]))
        .collect();
    write_layer(&path, &[("STUSPS", 2), ("STATEFP", 2)], rows);
    path
}

/// Zip the state layer's files, as the Census distributes them
pub fn state_archive_bytes(scratch: &Path) -> Vec<u8> {
    use std::io::Write;

    let shp = write_state_layer(scratch);
    let mut buf = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        let options = zip::write::SimpleFileOptions::default();
        for ext in ["shp", "shx", "dbf", "prj"] {
            let file = shp.with_extension(ext);
            let name = file.file_name().unwrap().to_string_lossy().into_owned();
            zip.start_file(name, options).unwrap();
            zip.write_all(&std::fs::read(&file).unwrap()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf.into_inner()
}

/// Fixture layers on disk plus a config pointing at them
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub config: PipelineConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let zcta_dir = dir.path().join("zcta");
        let state_dir = dir.path().join("states");
        std::fs::create_dir_all(&zcta_dir).unwrap();
        std::fs::create_dir_all(&state_dir).unwrap();
        write_zcta_layer(&zcta_dir);
        write_state_layer(&state_dir);

        let config = PipelineConfig::builder()
            .zcta_dir(&zcta_dir)
            .zcta_base_name(ZCTA_BASE)
            .state_cache_dir(&state_dir)
            .state_base_name(STATE_BASE)
            // never reached while the layer is cached
            .state_url("http://127.0.0.1:9/unreachable.zip")
            .output_dir(dir.path().join("out"))
            .formats(vec![ExportFormat::Shapefile, ExportFormat::Geopackage, ExportFormat::Geojson])
            .build()
            .unwrap();

        Self { dir, config }
    }

    pub fn with_output(&self, name: &str) -> PipelineConfig {
        let mut config = self.config.clone();
        config.output.dir = self.dir.path().join(name);
        config
    }
}
