//! Pipeline health as a tagged status

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Current health of a pipeline derived from its builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BuildStatus {
    #[default]
    Unknown,
    Succeeded { latest: DateTime<Utc> },
    Failed { since: DateTime<Utc> },
}

impl BuildStatus {
    /// Combine two statuses.
    ///
    /// - `Unknown` loses to anything.
    /// - Two successes: the later one.
    /// - Success and failure: whichever timestamp is later.
    /// - Two failures: the earlier `since`, the failure has lasted that long.
    pub fn merge(self, other: BuildStatus) -> BuildStatus {
        use BuildStatus::*;

        match (self, other) {
            (Unknown, b) => b,
            (a, Unknown) => a,
            (Succeeded { latest: a }, Succeeded { latest: b }) => Succeeded { latest: a.max(b) },
            (Succeeded { latest }, Failed { since }) | (Failed { since }, Succeeded { latest }) => {
                if latest < since {
                    Failed { since }
                } else {
                    Succeeded { latest }
                }
            }
            (Failed { since: a }, Failed { since: b }) => Failed { since: a.min(b) },
        }
    }
}

/// Status as presented per pipeline. `Unused` marks definitions with no
/// builds in the lookback window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PipelineStatus {
    Unknown,
    Succeeded { latest: DateTime<Utc> },
    Failed { since: DateTime<Utc> },
    Unused { since: DateTime<Utc> },
}

impl From<BuildStatus> for PipelineStatus {
    fn from(status: BuildStatus) -> Self {
        match status {
            BuildStatus::Unknown => PipelineStatus::Unknown,
            BuildStatus::Succeeded { latest } => PipelineStatus::Succeeded { latest },
            BuildStatus::Failed { since } => PipelineStatus::Failed { since },
        }
    }
}
