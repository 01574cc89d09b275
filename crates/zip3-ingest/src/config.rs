//! Pipeline configuration
//!
//! Every tunable the stages read lives in [`PipelineConfig`], which is built
//! once per run and passed down explicitly. Values come from (lowest to
//! highest precedence) the defaults below, an optional TOML file, and
//! `ZIP3_*` environment variables, e.g.
//!
//! ```text
//! ZIP3_OUTPUT__DIR=/data/out
//! ZIP3_GEOMETRY__SIMPLIFY_TOLERANCE_M=50
//! ZIP3_OUTPUT__FORMATS=shapefile,geopackage,geojson
//! ```

use crate::crs::Crs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use zip3_common::{Result, Zip3Error};

// ============================================================================
// Input Defaults
// ============================================================================

/// Base name of the Census 2018 cartographic-boundary ZCTA shapefile set.
pub const DEFAULT_ZCTA_BASE_NAME: &str = "cb_2018_us_zcta510_500k";

/// Attribute holding the five-digit ZIP code in the ZCTA layer.
pub const DEFAULT_ZIP_FIELD: &str = "GEOID10";

/// Directory the state boundaries are cached in.
pub const DEFAULT_STATE_CACHE_DIR: &str = "state_shp";

/// Base name of the Census 2018 cartographic-boundary state shapefile set.
pub const DEFAULT_STATE_BASE_NAME: &str = "cb_2018_us_state_500k";

/// Public endpoint for the state boundary archive.
pub const DEFAULT_STATE_URL: &str =
    "https://www2.census.gov/geo/tiger/GENZ2018/shp/cb_2018_us_state_500k.zip";

pub const DEFAULT_STATE_ABBR_FIELD: &str = "STUSPS";

pub const DEFAULT_STATE_FIPS_FIELD: &str = "STATEFP";

/// HTTP timeout for the state download (5 minutes).
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 300;

// ============================================================================
// Geometry Defaults
// ============================================================================

/// Simplification tolerance in metres, applied in the working CRS.
pub const DEFAULT_SIMPLIFY_TOLERANCE_M: f64 = 75.0;

/// Trimmed polygons at or below this area (data CRS units) are dropped.
pub const DEFAULT_MIN_CLIP_AREA: f64 = 0.0;

// ============================================================================
// Coverage Defaults
// ============================================================================

/// Coverage ratios above this are reported as data-quality warnings.
pub const DEFAULT_COVERAGE_MAX_RATIO: f64 = 1.05;

pub const DEFAULT_BAND_EXCELLENT: f64 = 0.95;
pub const DEFAULT_BAND_GOOD: f64 = 0.85;
pub const DEFAULT_BAND_FAIR: f64 = 0.75;

/// How many lowest/highest states the coverage summary logs.
pub const DEFAULT_REPORT_EXTREMES: usize = 10;

// ============================================================================
// Output Defaults
// ============================================================================

pub const DEFAULT_OUTPUT_DIR: &str = "out";

pub const DEFAULT_OUTPUT_BASE_NAME: &str = "state_zip3_trimmed";

/// GeoPackage table / layer name.
pub const DEFAULT_LAYER_NAME: &str = "zip3_state";

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "ZIP3";

/// How a ZCTA picks its owning state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JoinPredicate {
    /// The state that fully contains the ZCTA; straddlers fall back to the centroid
    #[default]
    Within,
    /// The state sharing the most area with the ZCTA
    LargestOverlap,
}

impl std::str::FromStr for JoinPredicate {
    type Err = Zip3Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "within" | "contains" => Ok(JoinPredicate::Within),
            "largest_overlap" | "overlap" => Ok(JoinPredicate::LargestOverlap),
            _ => Err(Zip3Error::config(format!("Unknown join predicate: {}", s))),
        }
    }
}

/// Vector file format written by the exporter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Shapefile,
    Geopackage,
    Geojson,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Shapefile => "shp",
            ExportFormat::Geopackage => "gpkg",
            ExportFormat::Geojson => "geojson",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = Zip3Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "shapefile" | "shp" => Ok(ExportFormat::Shapefile),
            "geopackage" | "gpkg" => Ok(ExportFormat::Geopackage),
            "geojson" | "json" => Ok(ExportFormat::Geojson),
            _ => Err(Zip3Error::config(format!("Unknown export format: {}", s))),
        }
    }
}

/// Top-level pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub input: InputConfig,
    pub join: JoinConfig,
    pub geometry: GeometryConfig,
    pub coverage: CoverageConfig,
    pub output: OutputConfig,
}

/// Where the two input datasets come from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Directory holding the ZCTA shapefile set
    pub zcta_dir: PathBuf,
    pub zcta_base_name: String,
    pub zip_field: String,

    pub state_cache_dir: PathBuf,
    pub state_base_name: String,
    pub state_url: String,
    pub state_abbr_field: String,
    pub state_fips_field: String,

    /// Expected SHA-256 of the state archive; verified when set
    pub state_archive_sha256: Option<String>,

    pub http_timeout_secs: u64,

    /// Restrict processing to these state abbreviations (empty = all)
    pub include_states: Vec<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            zcta_dir: PathBuf::from("."),
            zcta_base_name: DEFAULT_ZCTA_BASE_NAME.to_string(),
            zip_field: DEFAULT_ZIP_FIELD.to_string(),
            state_cache_dir: PathBuf::from(DEFAULT_STATE_CACHE_DIR),
            state_base_name: DEFAULT_STATE_BASE_NAME.to_string(),
            state_url: DEFAULT_STATE_URL.to_string(),
            state_abbr_field: DEFAULT_STATE_ABBR_FIELD.to_string(),
            state_fips_field: DEFAULT_STATE_FIPS_FIELD.to_string(),
            state_archive_sha256: None,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            include_states: Vec::new(),
        }
    }
}

impl InputConfig {
    /// Path of the ZCTA file with the given extension ("shp", "dbf", ...)
    pub fn zcta_file(&self, extension: &str) -> PathBuf {
        self.zcta_dir
            .join(format!("{}.{}", self.zcta_base_name, extension))
    }

    pub fn state_shapefile(&self) -> PathBuf {
        self.state_cache_dir
            .join(format!("{}.shp", self.state_base_name))
    }

    pub fn includes_state(&self, state_abbr: &str) -> bool {
        self.include_states.is_empty()
            || self
                .include_states
                .iter()
                .any(|s| s.eq_ignore_ascii_case(state_abbr))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    pub predicate: JoinPredicate,
    /// Assign ZCTAs no predicate matched to the state containing their centroid
    pub centroid_fallback: bool,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            predicate: JoinPredicate::Within,
            centroid_fallback: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    pub min_clip_area: f64,
    pub simplify: bool,
    pub simplify_tolerance_m: f64,
    /// Projected CRS used for simplification and area measurement
    pub working_crs: Crs,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            min_clip_area: DEFAULT_MIN_CLIP_AREA,
            simplify: true,
            simplify_tolerance_m: DEFAULT_SIMPLIFY_TOLERANCE_M,
            working_crs: Crs::ConusAlbers,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    pub max_ratio: f64,
    pub band_excellent: f64,
    pub band_good: f64,
    pub band_fair: f64,
    pub report_extremes: usize,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            max_ratio: DEFAULT_COVERAGE_MAX_RATIO,
            band_excellent: DEFAULT_BAND_EXCELLENT,
            band_good: DEFAULT_BAND_GOOD,
            band_fair: DEFAULT_BAND_FAIR,
            report_extremes: DEFAULT_REPORT_EXTREMES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub base_name: String,
    pub layer_name: String,
    pub formats: Vec<ExportFormat>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            base_name: DEFAULT_OUTPUT_BASE_NAME.to_string(),
            layer_name: DEFAULT_LAYER_NAME.to_string(),
            formats: vec![ExportFormat::Shapefile, ExportFormat::Geopackage],
        }
    }
}

impl OutputConfig {
    pub fn path_for(&self, format: ExportFormat) -> PathBuf {
        self.dir
            .join(format!("{}.{}", self.base_name, format.extension()))
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Defaults overridden by `ZIP3_*` variables (a `.env` file is honoured)
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Defaults, then the optional TOML file, then `ZIP3_*` variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = config::Config::try_from(&PipelineConfig::default()).map_err(config_error)?;
        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            if !path.exists() {
                return Err(Zip3Error::missing_input(
                    path,
                    "the configuration file passed with --config does not exist",
                ));
            }
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("output.formats")
                .with_list_parse_key("input.include_states"),
        );

        let config: PipelineConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(config_error)?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.input.zcta_base_name.is_empty() || self.input.state_base_name.is_empty() {
            return Err(Zip3Error::config("Input base names cannot be empty"));
        }
        if self.input.zip_field.is_empty() || self.input.state_abbr_field.is_empty() {
            return Err(Zip3Error::config("Input field names cannot be empty"));
        }
        if !self.input.state_url.starts_with("http://") && !self.input.state_url.starts_with("https://") {
            return Err(Zip3Error::config(format!(
                "State URL must be http(s): {}",
                self.input.state_url
            )));
        }
        if self.input.http_timeout_secs == 0 {
            return Err(Zip3Error::config("HTTP timeout must be greater than 0"));
        }
        if !(self.geometry.min_clip_area >= 0.0) {
            return Err(Zip3Error::config("min_clip_area must be non-negative"));
        }
        if self.geometry.simplify && !(self.geometry.simplify_tolerance_m > 0.0) {
            return Err(Zip3Error::config(
                "simplify_tolerance_m must be positive when simplification is enabled",
            ));
        }
        if self.geometry.working_crs.is_geographic() {
            return Err(Zip3Error::config(format!(
                "working_crs must be projected, got {}",
                self.geometry.working_crs
            )));
        }

        let c = &self.coverage;
        if !(c.max_ratio > 0.0) {
            return Err(Zip3Error::config("Coverage max_ratio must be positive"));
        }
        if !(c.band_excellent > c.band_good && c.band_good > c.band_fair && c.band_fair > 0.0) {
            return Err(Zip3Error::config(
                "Coverage bands must satisfy excellent > good > fair > 0",
            ));
        }

        if self.output.base_name.is_empty() || self.output.layer_name.is_empty() {
            return Err(Zip3Error::config("Output base and layer names cannot be empty"));
        }
        if self.output.formats.is_empty() {
            return Err(Zip3Error::config("At least one output format is required"));
        }

        Ok(())
    }
}

fn config_error(err: config::ConfigError) -> Zip3Error {
    Zip3Error::config(err.to_string())
}

/// Builder for PipelineConfig
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn zcta_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input.zcta_dir = dir.into();
        self
    }

    pub fn zcta_base_name(mut self, name: impl Into<String>) -> Self {
        self.config.input.zcta_base_name = name.into();
        self
    }

    pub fn state_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input.state_cache_dir = dir.into();
        self
    }

    pub fn state_base_name(mut self, name: impl Into<String>) -> Self {
        self.config.input.state_base_name = name.into();
        self
    }

    pub fn state_url(mut self, url: impl Into<String>) -> Self {
        self.config.input.state_url = url.into();
        self
    }

    pub fn state_archive_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.config.input.state_archive_sha256 = Some(sha256.into());
        self
    }

    pub fn include_states(mut self, states: Vec<String>) -> Self {
        self.config.input.include_states = states;
        self
    }

    pub fn join_predicate(mut self, predicate: JoinPredicate) -> Self {
        self.config.join.predicate = predicate;
        self
    }

    pub fn centroid_fallback(mut self, enabled: bool) -> Self {
        self.config.join.centroid_fallback = enabled;
        self
    }

    pub fn min_clip_area(mut self, area: f64) -> Self {
        self.config.geometry.min_clip_area = area;
        self
    }

    pub fn simplify(mut self, enabled: bool) -> Self {
        self.config.geometry.simplify = enabled;
        self
    }

    pub fn simplify_tolerance_m(mut self, tolerance: f64) -> Self {
        self.config.geometry.simplify_tolerance_m = tolerance;
        self
    }

    pub fn coverage_max_ratio(mut self, ratio: f64) -> Self {
        self.config.coverage.max_ratio = ratio;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output.dir = dir.into();
        self
    }

    pub fn output_base_name(mut self, name: impl Into<String>) -> Self {
        self.config.output.base_name = name.into();
        self
    }

    pub fn formats(mut self, formats: Vec<ExportFormat>) -> Self {
        self.config.output.formats = formats;
        self
    }

    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
