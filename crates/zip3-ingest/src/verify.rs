//! Post-export verification
//!
//! Reads the exported shapefile back and checks the contract downstream
//! consumers rely on: exactly the `STUSPS`/`ZIP3` attributes, three-digit
//! prefixes, unique keys and a recognized CRS. When a GeoPackage or a
//! manifest sits next to it, their record count and checksums are checked too.

use crate::config::{ExportFormat, OutputConfig};
use crate::crs::Crs;
use crate::export::{FIELD_STATE, FIELD_ZIP3};
use crate::loader::layer::{field_string, PolygonLayer};
use crate::manifest::{OutputManifest, MANIFEST_FILE};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zip3_common::checksum::verify_sha256;
use zip3_common::{Result, Zip3Error};

/// Pseudo-field dbase readers report for the record deletion marker
const DELETION_FLAG: &str = "DeletionFlag";

const SAMPLE_PREFIXES: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub path: PathBuf,
    pub crs: Crs,
    pub record_count: usize,
    pub state_count: usize,
    pub fields: Vec<String>,
    /// First few ZIP3 prefixes per state, sorted
    pub samples: BTreeMap<String, Vec<String>>,
    pub issues: Vec<String>,
}

impl VerificationReport {
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn log(&self) {
        info!(
            path = %self.path.display(),
            records = self.record_count,
            states = self.state_count,
            crs = %self.crs,
            fields = ?self.fields,
            "Verified exported layer"
        );
        for (state, prefixes) in &self.samples {
            info!(state = %state, prefixes = %prefixes.join(", "), "Sample ZIP3 prefixes");
        }
        for issue in &self.issues {
            warn!(issue = %issue, "Verification issue");
        }
    }
}

pub struct OutputVerifier<'a> {
    config: &'a OutputConfig,
}

impl<'a> OutputVerifier<'a> {
    pub fn new(config: &'a OutputConfig) -> Self {
        Self { config }
    }

    /// Verify the shapefile in the configured output directory
    pub fn verify(&self) -> Result<VerificationReport> {
        let path = self.config.path_for(ExportFormat::Shapefile);
        if !path.exists() {
            return Err(Zip3Error::missing_input(&path, "run `zip3-ingest transform` first"));
        }

        let mut issues = Vec::new();

        let fields = dbf_fields(&path)?;
        let expected = [FIELD_STATE, FIELD_ZIP3];
        if fields.len() != expected.len() || !expected.iter().all(|f| fields.iter().any(|g| g == f)) {
            issues.push(format!("expected fields {:?}, found {:?}", expected, fields));
        }

        if !path.with_extension("prj").exists() {
            issues.push("missing .prj sidecar".to_string());
        }
        let layer = PolygonLayer::read(&path, Crs::Nad83)?;
        if layer.skipped_shapes > 0 {
            issues.push(format!("{} null or non-polygon shapes", layer.skipped_shapes));
        }

        let mut keys = BTreeSet::new();
        let mut samples: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (index, (geometry, record)) in layer.features.iter().enumerate() {
            let state = field_string(record, FIELD_STATE).unwrap_or_default();
            let zip3 = field_string(record, FIELD_ZIP3).unwrap_or_default();

            if zip3.len() != 3 || !zip3.bytes().all(|b| b.is_ascii_digit()) {
                issues.push(format!("record {}: ZIP3 '{}' is not three digits", index, zip3));
            }
            if state.len() != 2 {
                issues.push(format!("record {}: state '{}' is not a two-letter code", index, state));
            }
            if geometry.is_empty() {
                issues.push(format!("record {}: empty geometry for {}-{}", index, state, zip3));
            }
            if !keys.insert((state.clone(), zip3.clone())) {
                issues.push(format!("duplicate key {}-{}", state, zip3));
            }
            samples.entry(state).or_default().push(zip3);
        }
        for prefixes in samples.values_mut() {
            prefixes.sort();
            prefixes.truncate(SAMPLE_PREFIXES);
        }

        let record_count = layer.features.len();
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        self.check_geopackage(record_count, &mut issues);
        check_manifest(dir, record_count, &mut issues)?;

        Ok(VerificationReport {
            path,
            crs: layer.crs,
            record_count,
            state_count: samples.len(),
            fields,
            samples,
            issues,
        })
    }

    fn check_geopackage(&self, expected: usize, issues: &mut Vec<String>) {
        let path = self.config.path_for(ExportFormat::Geopackage);
        if !path.exists() {
            return;
        }
        let count = rusqlite::Connection::open(&path).and_then(|conn| {
            conn.query_row(
                &format!("SELECT COUNT(*) FROM \"{}\"", self.config.layer_name.replace('"', "\"\"")),
                [],
                |row| row.get::<_, i64>(0),
            )
        });
        match count {
            Ok(n) if n as usize == expected => {},
            Ok(n) => issues.push(format!(
                "GeoPackage layer '{}' has {} records, shapefile has {}",
                self.config.layer_name, n, expected
            )),
            Err(e) => issues.push(format!("GeoPackage {} unreadable: {}", path.display(), e)),
        }
    }
}

/// Attribute names of the `.dbf` next to `shp`
fn dbf_fields(shp: &Path) -> Result<Vec<String>> {
    let dbf = shp.with_extension("dbf");
    let reader = shapefile::dbase::Reader::from_path(&dbf).map_err(|e| Zip3Error::read(&dbf, e))?;
    Ok(reader
        .fields()
        .iter()
        .map(|f| f.name().to_string())
        .filter(|name| name != DELETION_FLAG)
        .collect())
}

fn check_manifest(dir: &Path, record_count: usize, issues: &mut Vec<String>) -> Result<()> {
    let path = dir.join(MANIFEST_FILE);
    if !path.exists() {
        return Ok(());
    }
    let manifest = OutputManifest::load(&path)?;
    if manifest.record_count != record_count {
        issues.push(format!(
            "manifest records {} but the shapefile has {}",
            manifest.record_count, record_count
        ));
    }
    for file in &manifest.files {
        let file_path = dir.join(&file.name);
        match verify_sha256(&file_path, &file.sha256) {
            Ok(()) => {},
            Err(Zip3Error::ChecksumMismatch { .. }) => {
                issues.push(format!("{} does not match its manifest checksum", file.name));
            },
            Err(e) => issues.push(format!("{}: {}", file.name, e)),
        }
    }
    Ok(())
}
