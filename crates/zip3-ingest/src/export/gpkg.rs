//! OGC GeoPackage output
//!
//! A GeoPackage is a SQLite database with three metadata tables and one
//! feature table. Geometries are stored as GeoPackage binary: a `GP` header
//! with SRS id and envelope followed by little-endian WKB.

use super::{FIELD_STATE, FIELD_ZIP3};
use crate::crs::Crs;
use crate::models::Zip3Region;
use geo::{MultiPolygon, Rect};
use rusqlite::{params, Connection};
use std::path::Path;
use zip3_common::{Result, Zip3Error};

/// "GPKG" as a big-endian integer
pub const GPKG_APPLICATION_ID: i32 = 0x4750_4B47;

/// GeoPackage 1.3.0
pub const GPKG_USER_VERSION: i32 = 10300;

const GEOMETRY_COLUMN: &str = "geom";

const WKB_POLYGON: u32 = 3;
const WKB_MULTIPOLYGON: u32 = 6;

const SCHEMA: &str = r#"
CREATE TABLE gpkg_spatial_ref_sys (
    srs_name TEXT NOT NULL,
    srs_id INTEGER NOT NULL PRIMARY KEY,
    organization TEXT NOT NULL,
    organization_coordsys_id INTEGER NOT NULL,
    definition TEXT NOT NULL,
    description TEXT
);
CREATE TABLE gpkg_contents (
    table_name TEXT NOT NULL PRIMARY KEY,
    data_type TEXT NOT NULL,
    identifier TEXT UNIQUE,
    description TEXT DEFAULT '',
    last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
    min_x DOUBLE,
    min_y DOUBLE,
    max_x DOUBLE,
    max_y DOUBLE,
    srs_id INTEGER,
    CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
CREATE TABLE gpkg_geometry_columns (
    table_name TEXT NOT NULL,
    column_name TEXT NOT NULL,
    geometry_type_name TEXT NOT NULL,
    srs_id INTEGER NOT NULL,
    z TINYINT NOT NULL,
    m TINYINT NOT NULL,
    CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
    CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
    CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
INSERT INTO gpkg_spatial_ref_sys VALUES
    ('Undefined cartesian SRS', -1, 'NONE', -1, 'undefined', 'undefined cartesian coordinate reference system'),
    ('Undefined geographic SRS', 0, 'NONE', 0, 'undefined', 'undefined geographic coordinate reference system');
"#;

pub struct GeoPackageWriter;

impl GeoPackageWriter {
    /// Write `regions` as feature table `layer`, replacing any existing file
    pub fn write(path: &Path, layer: &str, regions: &[Zip3Region], crs: Crs) -> Result<()> {
        let err = |e: rusqlite::Error| Zip3Error::write(path, e);

        if path.exists() {
            std::fs::remove_file(path).map_err(|e| Zip3Error::write(path, e))?;
        }

        let mut conn = Connection::open(path).map_err(err)?;
        conn.execute_batch(&format!(
            "PRAGMA application_id = {}; PRAGMA user_version = {};",
            GPKG_APPLICATION_ID, GPKG_USER_VERSION
        ))
        .map_err(err)?;

        let tx = conn.transaction().map_err(err)?;
        tx.execute_batch(SCHEMA).map_err(err)?;

        // EPSG:4326 is a required row whatever the data CRS
        let srs_id = crs.epsg() as i32;
        for srs in [Crs::Wgs84, crs] {
            tx.execute(
                "INSERT OR IGNORE INTO gpkg_spatial_ref_sys VALUES (?1, ?2, 'EPSG', ?2, ?3, NULL)",
                params![srs.name(), srs.epsg() as i32, srs.wkt()],
            )
            .map_err(err)?;
        }

        let table = quote_ident(layer);
        tx.execute_batch(&format!(
            "CREATE TABLE {table} (
                fid INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                {GEOMETRY_COLUMN} MULTIPOLYGON,
                {FIELD_STATE} TEXT NOT NULL,
                {FIELD_ZIP3} TEXT NOT NULL
            );"
        ))
        .map_err(err)?;

        let extent = regions
            .iter()
            .filter_map(|r| r.geometry.bounding_rect())
            .reduce(merge_rect);
        tx.execute(
            "INSERT INTO gpkg_contents (table_name, data_type, identifier, last_change, min_x, min_y, max_x, max_y, srs_id)
             VALUES (?1, 'features', ?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                layer,
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
                extent.map(|r| r.min().x),
                extent.map(|r| r.min().y),
                extent.map(|r| r.max().x),
                extent.map(|r| r.max().y),
                srs_id,
            ],
        )
        .map_err(err)?;
        tx.execute(
            "INSERT INTO gpkg_geometry_columns VALUES (?1, ?2, 'MULTIPOLYGON', ?3, 0, 0)",
            params![layer, GEOMETRY_COLUMN, srs_id],
        )
        .map_err(err)?;

        {
            let mut insert = tx
                .prepare(&format!(
                    "INSERT INTO {table} ({GEOMETRY_COLUMN}, {FIELD_STATE}, {FIELD_ZIP3}) VALUES (?1, ?2, ?3)"
                ))
                .map_err(err)?;
            for region in regions {
                let blob = encode_geometry(&region.geometry.as_multi(), srs_id);
                insert
                    .execute(params![blob, region.state_abbr(), region.zip3()])
                    .map_err(err)?;
            }
        }

        tx.commit().map_err(err)?;
        Ok(())
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn merge_rect(a: Rect<f64>, b: Rect<f64>) -> Rect<f64> {
    Rect::new(
        (a.min().x.min(b.min().x), a.min().y.min(b.min().y)),
        (a.max().x.max(b.max().x), a.max().y.max(b.max().y)),
    )
}

/// GeoPackage binary for a multipolygon
pub fn encode_geometry(mp: &MultiPolygon<f64>, srs_id: i32) -> Vec<u8> {
    let envelope = geo::BoundingRect::bounding_rect(mp);
    let mut buf = Vec::with_capacity(64 + mp.0.len() * 64);

    buf.extend_from_slice(b"GP");
    buf.push(0); // version 1
    match envelope {
        // little-endian, xy envelope
        Some(_) => buf.push(0b0000_0011),
        // little-endian, no envelope, empty
        None => buf.push(0b0001_0001),
    }
    buf.extend_from_slice(&srs_id.to_le_bytes());
    if let Some(env) = envelope {
        for v in [env.min().x, env.max().x, env.min().y, env.max().y] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
    }

    buf.push(1);
    buf.extend_from_slice(&WKB_MULTIPOLYGON.to_le_bytes());
    buf.extend_from_slice(&(mp.0.len() as u32).to_le_bytes());
    for polygon in &mp.0 {
        buf.push(1);
        buf.extend_from_slice(&WKB_POLYGON.to_le_bytes());
        let rings = 1 + polygon.interiors().len();
        buf.extend_from_slice(&(rings as u32).to_le_bytes());
        for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
            buf.extend_from_slice(&(ring.0.len() as u32).to_le_bytes());
            for c in &ring.0 {
                buf.extend_from_slice(&c.x.to_le_bytes());
                buf.extend_from_slice(&c.y.to_le_bytes());
            }
        }
    }
    buf
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::export::tests::sample_regions;

    #[test]
    fn test_encode_geometry_layout() {
        let mp = sample_regions()[0].geometry.as_multi().into_owned();
        let blob = encode_geometry(&mp, 4269);

        assert_eq!(&blob[0..2], b"GP");
        assert_eq!(blob[3], 0b0000_0011);
        assert_eq!(i32::from_le_bytes(blob[4..8].try_into().unwrap()), 4269);
        // WKB follows the 8-byte header and the 32-byte envelope
        assert_eq!(blob[40], 1);
        assert_eq!(u32::from_le_bytes(blob[41..45].try_into().unwrap()), WKB_MULTIPOLYGON);
        assert_eq!(u32::from_le_bytes(blob[45..49].try_into().unwrap()), 1);
    }

    #[test]
    fn test_encode_empty_geometry() {
        let blob = encode_geometry(&MultiPolygon::new(vec![]), 4269);
        assert_eq!(blob[3] & 0b0001_0000, 0b0001_0000);
        assert_eq!(blob.len(), 8 + 9);
    }

    #[test]
    fn test_geopackage_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state_zip3_trimmed.gpkg");
        let regions = sample_regions();

        // Second write replaces the first
        GeoPackageWriter::write(&path, "zip3_state", &regions, Crs::Nad83).unwrap();
        GeoPackageWriter::write(&path, "zip3_state", &regions, Crs::Nad83).unwrap();

        let conn = Connection::open(&path).unwrap();
        let app_id: i32 = conn.query_row("PRAGMA application_id", [], |r| r.get(0)).unwrap();
        assert_eq!(app_id, GPKG_APPLICATION_ID);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM zip3_state", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count as usize, regions.len());

        let (state, zip3, blob): (String, String, Vec<u8>) = conn
            .query_row("SELECT STUSPS, ZIP3, geom FROM zip3_state ORDER BY fid LIMIT 1", [], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })
            .unwrap();
        assert_eq!((state.as_str(), zip3.as_str()), ("MA", "021"));
        assert_eq!(&blob[0..2], b"GP");

        let srs: i64 = conn
            .query_row(
                "SELECT srs_id FROM gpkg_geometry_columns WHERE table_name = 'zip3_state'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(srs, 4269);

        let srs_ids: Vec<i64> = conn
            .prepare("SELECT srs_id FROM gpkg_spatial_ref_sys ORDER BY srs_id")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(srs_ids, vec![-1, 0, 4269, 4326]);
    }

    #[test]
    fn test_geopackage_wgs84_data_has_single_srs_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wgs84.gpkg");
        GeoPackageWriter::write(&path, "zip3_state", &sample_regions(), Crs::Wgs84).unwrap();

        let conn = Connection::open(&path).unwrap();
        let (rows, org_id): (i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), MAX(organization_coordsys_id) FROM gpkg_spatial_ref_sys WHERE srs_id = 4326",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!((rows, org_id), (1, 4326));
    }
}
