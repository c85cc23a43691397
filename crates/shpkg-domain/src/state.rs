use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a destination directory stands relative to its archive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionState {
    /// Destination directory does not exist.
    Absent,
    /// Destination exists but the record is missing or names another archive.
    Stale,
    /// Destination exists and the record matches the archive.
    Valid,
}

impl ExtractionState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ExtractionState::Absent => "absent",
            ExtractionState::Stale => "stale",
            ExtractionState::Valid => "valid",
        }
    }

    #[must_use]
    pub fn needs_extraction(self) -> bool {
        !matches!(self, ExtractionState::Valid)
    }
}

impl fmt::Display for ExtractionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[must_use]
pub fn canonical_state(dest_exists: bool, record_matches: bool) -> ExtractionState {
    if !dest_exists {
        ExtractionState::Absent
    } else if !record_matches {
        ExtractionState::Stale
    } else {
        ExtractionState::Valid
    }
}
