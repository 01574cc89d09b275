//! Common types shared by the pipeline stages

use serde::{Deserialize, Serialize};

/// Output key of a ZIP3 region: the owning state and the three-digit ZIP prefix.
///
/// Ordering is by state first, then prefix, which is also the order regions
/// are exported in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionKey {
    pub state_abbr: String,
    pub zip3: String,
}

impl RegionKey {
    pub fn new(state_abbr: impl Into<String>, zip3: impl Into<String>) -> Self {
        Self {
            state_abbr: state_abbr.into(),
            zip3: zip3.into(),
        }
    }
}

impl std::fmt::Display for RegionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.state_abbr, self.zip3)
    }
}

/// First three characters of a five-digit ZIP code.
///
/// Returns `None` for anything that is not five ASCII digits, so a malformed
/// identifier never produces a bogus prefix.
pub fn zip3_prefix(zip5: &str) -> Option<&str> {
    let zip5 = zip5.trim();
    if zip5.len() == 5 && zip5.bytes().all(|b| b.is_ascii_digit()) {
        Some(&zip5[..3])
    } else {
        None
    }
}

/// Whether a string looks like a USPS state/territory abbreviation
pub fn is_state_abbr(s: &str) -> bool {
    s.len() == 2 && s.bytes().all(|b| b.is_ascii_uppercase())
}
