//! Input loading
//!
//! Reads the ZCTA layer (which must be supplied locally), makes sure the state
//! layer is cached, and brings both into the ZCTA layer's CRS.

pub mod download;
pub mod layer;

use crate::config::InputConfig;
use crate::crs::Crs;
use crate::models::{StateRecord, ZctaRecord};
use layer::{field_string, PolygonLayer};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, info_span, warn};
use zip3_common::types::{is_state_abbr, zip3_prefix};
use zip3_common::{Result, Zip3Error};

pub use download::StateBoundaryFetcher;

/// Sidecar files a ZCTA shapefile set must ship with
pub const REQUIRED_ZCTA_EXTENSIONS: &[&str] = &["shp", "shx", "dbf", "prj"];

/// Both input datasets in one CRS
#[derive(Debug)]
pub struct LoadedInputs {
    pub zctas: Vec<ZctaRecord>,
    pub states: Vec<StateRecord>,
    /// CRS of every geometry above (the ZCTA layer's native CRS)
    pub crs: Crs,
    pub stats: LoadStats,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadStats {
    pub zctas_loaded: usize,
    /// Records whose ZIP field is not five digits
    pub zctas_malformed: usize,
    pub zctas_null_shape: usize,
    pub states_loaded: usize,
    /// States removed by the include list or lacking an abbreviation
    pub states_filtered: usize,
}

/// Reads both input layers according to an [`InputConfig`]
pub struct InputLoader<'a> {
    config: &'a InputConfig,
}

impl<'a> InputLoader<'a> {
    pub fn new(config: &'a InputConfig) -> Self {
        Self { config }
    }

    /// Fail fast, before any download or geometry work, if the ZCTA set is incomplete
    pub fn check_zcta_files(&self) -> Result<()> {
        let missing: Vec<String> = REQUIRED_ZCTA_EXTENSIONS
            .iter()
            .map(|ext| self.config.zcta_file(ext))
            .filter(|path| !path.exists())
            .map(|path| path.display().to_string())
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        Err(Zip3Error::missing_input(
            self.config.zcta_file("shp"),
            format!(
                "missing {}. Download {}.zip from the Census cartographic boundary files and unpack it into {}",
                missing.join(", "),
                self.config.zcta_base_name,
                self.config.zcta_dir.display()
            ),
        ))
    }

    /// Check inputs, ensure the state layer is cached, and load both layers
    pub async fn load(&self) -> Result<LoadedInputs> {
        self.check_zcta_files()?;
        let state_path = StateBoundaryFetcher::new(self.config)?.ensure_present().await?;
        self.load_local(&state_path)
    }

    /// Load both layers from disk; the state layer is reprojected to the ZCTA CRS
    pub fn load_local(&self, state_path: &Path) -> Result<LoadedInputs> {
        self.check_zcta_files()?;
        let mut stats = LoadStats::default();

        let (zctas, crs) = {
            let _span = info_span!("load_zctas").entered();
            self.read_zctas(&mut stats)?
        };

        let states = {
            let _span = info_span!("load_states").entered();
            self.read_states(state_path, crs, &mut stats)?
        };

        info!(
            zctas = stats.zctas_loaded,
            states = stats.states_loaded,
            crs = %crs,
            "Loaded input layers"
        );

        Ok(LoadedInputs {
            zctas,
            states,
            crs,
            stats,
        })
    }

    /// Load only the state layer, reprojected to `target`
    pub fn load_states(&self, state_path: &Path, target: Crs) -> Result<Vec<StateRecord>> {
        let _span = info_span!("load_states").entered();
        self.read_states(state_path, target, &mut LoadStats::default())
    }

    fn read_zctas(&self, stats: &mut LoadStats) -> Result<(Vec<ZctaRecord>, Crs)> {
        let path = self.config.zcta_file("shp");
        let layer = PolygonLayer::read(&path, Crs::Nad83)?;
        stats.zctas_null_shape = layer.skipped_shapes;

        let mut zctas = Vec::with_capacity(layer.features.len());
        for (geometry, record) in layer.features {
            let zip5 = field_string(&record, &self.config.zip_field);
            match zip5 {
                Some(zip5) if zip3_prefix(&zip5).is_some() => {
                    zctas.push(ZctaRecord { zip5, geometry });
                },
                other => {
                    stats.zctas_malformed += 1;
                    debug!(value = ?other, field = %self.config.zip_field, "Skipping ZCTA with malformed ZIP");
                },
            }
        }
        stats.zctas_loaded = zctas.len();

        if zctas.is_empty() {
            return Err(Zip3Error::read(
                &path,
                format!("no polygon records with a five-digit '{}' field", self.config.zip_field),
            ));
        }
        if stats.zctas_malformed > 0 || stats.zctas_null_shape > 0 {
            warn!(
                malformed = stats.zctas_malformed,
                null_shapes = stats.zctas_null_shape,
                "Skipped unusable ZCTA records"
            );
        }
        info!(count = zctas.len(), crs = %layer.crs, "Loaded ZCTA polygons");

        Ok((zctas, layer.crs))
    }

    fn read_states(&self, path: &Path, target: Crs, stats: &mut LoadStats) -> Result<Vec<StateRecord>> {
        let layer = PolygonLayer::read(path, Crs::Nad83)?;
        if layer.crs != target {
            info!(from = %layer.crs, to = %target, "Reprojecting state boundaries to ZCTA CRS");
        }

        let total = layer.features.len();
        let mut states = Vec::with_capacity(total);
        for (geometry, record) in layer.features {
            let Some(state_abbr) = field_string(&record, &self.config.state_abbr_field)
                .filter(|abbr| is_state_abbr(abbr))
            else {
                continue;
            };
            if !self.config.includes_state(&state_abbr) {
                continue;
            }
            states.push(StateRecord {
                state_abbr,
                state_fips: field_string(&record, &self.config.state_fips_field).unwrap_or_default(),
                geometry: geometry.reproject(layer.crs, target),
            });
        }

        stats.states_loaded = states.len();
        stats.states_filtered = total - states.len();
        if stats.states_filtered > 0 {
            warn!(
                filtered = stats.states_filtered,
                "Filtered out states/territories not selected for processing"
            );
        }
        if states.is_empty() {
            return Err(Zip3Error::read(
                path,
                format!("no state polygons with a '{}' field remain", self.config.state_abbr_field),
            ));
        }
        info!(count = states.len(), "Loaded state polygons");

        Ok(states)
    }
}
