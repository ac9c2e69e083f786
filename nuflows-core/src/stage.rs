//! Stage abstraction for the run sequence.
//!
//! Each pipeline step (train, export, plot) is a [`Stage`] returning an
//! explicit [`StageOutcome`] instead of a shell exit code, so the sequencer
//! can be exercised with substitute stages that return controlled results.

use crate::error::OrchestratorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Which pipeline step a stage implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Train,
    Export,
    Plot,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Train => "train",
            Self::Export => "export",
            Self::Plot => "plot",
        };
        f.write_str(name)
    }
}

/// Successful result of one stage: the artifact it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub stage: StageKind,
    /// Checkpoint dir for train, candidate file for export, figure dir for
    /// plot. The path follows the project/run naming convention; the stage
    /// does not verify what the external process wrote there.
    pub artifact: PathBuf,
}

/// One externally executed pipeline step.
#[async_trait::async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    async fn run(&self) -> Result<StageOutcome, OrchestratorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_kind_display() {
        assert_eq!(StageKind::Train.to_string(), "train");
        assert_eq!(StageKind::Export.to_string(), "export");
        assert_eq!(StageKind::Plot.to_string(), "plot");
    }
}
