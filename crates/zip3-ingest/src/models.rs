//! Records flowing between the pipeline stages
//!
//! Each stage consumes the previous stage's collection whole and produces a
//! new one; nothing is mutated in place across stages.

use crate::geometry::Geometry;
use serde::{Deserialize, Serialize};
use zip3_common::types::zip3_prefix;
use zip3_common::RegionKey;

/// One ZIP Code Tabulation Area from the input layer
#[derive(Debug, Clone)]
pub struct ZctaRecord {
    pub zip5: String,
    pub geometry: Geometry,
}

impl ZctaRecord {
    /// Three-digit prefix; the loader only admits records where this exists
    pub fn zip3(&self) -> &str {
        zip3_prefix(&self.zip5).unwrap_or_default()
    }
}

/// One state (or territory) boundary
#[derive(Debug, Clone)]
pub struct StateRecord {
    pub state_abbr: String,
    pub state_fips: String,
    pub geometry: Geometry,
}

/// Which rule placed a ZCTA in its state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMethod {
    /// Fully contained in the state polygon
    Within,
    /// Straddling; the state contains the ZCTA's centroid
    Centroid,
    /// The state sharing the largest area with the ZCTA
    LargestOverlap,
}

/// A ZCTA paired with the single state it was joined to
#[derive(Debug, Clone)]
pub struct AssignedZcta {
    pub zcta: ZctaRecord,
    pub state_abbr: String,
    /// Index into the state list the joiner was given
    pub state_index: usize,
    pub method: AssignmentMethod,
}

/// A ZCTA cut down to its assigned state's boundary
#[derive(Debug, Clone)]
pub struct TrimmedPolygon {
    pub zip5: String,
    pub state_abbr: String,
    pub geometry: Geometry,
}

impl TrimmedPolygon {
    pub fn key(&self) -> RegionKey {
        RegionKey::new(
            self.state_abbr.clone(),
            zip3_prefix(&self.zip5).unwrap_or_default(),
        )
    }
}

/// The unit of output: one polygon per (state, ZIP3)
#[derive(Debug, Clone)]
pub struct Zip3Region {
    pub key: RegionKey,
    pub geometry: Geometry,
    /// Number of trimmed ZCTA polygons dissolved into this region
    pub member_count: usize,
}

impl Zip3Region {
    pub fn state_abbr(&self) -> &str {
        &self.key.state_abbr
    }

    pub fn zip3(&self) -> &str {
        &self.key.zip3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trimmed_polygon_key() {
        let trimmed = TrimmedPolygon {
            zip5: "02134".to_string(),
            state_abbr: "MA".to_string(),
            geometry: Geometry::empty(),
        };
        assert_eq!(trimmed.key(), RegionKey::new("MA", "021"));
    }

    #[test]
    fn test_zcta_zip3() {
        let zcta = ZctaRecord {
            zip5: "99501".to_string(),
            geometry: Geometry::empty(),
        };
        assert_eq!(zcta.zip3(), "995");
    }
}
