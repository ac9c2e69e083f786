//! Run bookkeeping — one record per sequenced run, persisted as JSON.
//!
//! Records are append-only observations of what the sequencer did; nothing
//! reads them back to drive control flow.

use crate::error::OrchestratorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Lifecycle of a sequenced run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One training/export sequence, identified by project and run label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub project: String,
    pub run: String,
    pub seed: u64,
    pub status: RunStatus,
    pub checkpoint_path: Option<PathBuf>,
    pub candidate_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn new(project: &str, run: &str, seed: u64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            project: project.to_string(),
            run: run.to_string(),
            seed,
            status: RunStatus::Pending,
            checkpoint_path: None,
            candidate_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_status(&mut self, status: RunStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// All recorded runs, stored at `<root>/runs/runs.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunRegistry {
    pub runs: Vec<RunRecord>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self { runs: Vec::new() }
    }

    pub fn add(&mut self, record: RunRecord) {
        self.runs.push(record);
    }

    /// Find the first record for a project/run label. Labels can repeat
    /// across re-runs; use [`find_by_id_mut`](Self::find_by_id_mut) when a
    /// specific attempt must be addressed.
    pub fn find_mut(&mut self, project: &str, run: &str) -> Option<&mut RunRecord> {
        self.runs
            .iter_mut()
            .find(|r| r.project == project && r.run == run)
    }

    pub fn find_by_id_mut(&mut self, id: &str) -> Option<&mut RunRecord> {
        self.runs.iter_mut().find(|r| r.id == id)
    }

    pub fn list_by_status(&self, status: &RunStatus) -> Vec<&RunRecord> {
        self.runs.iter().filter(|r| &r.status == status).collect()
    }

    /// Load the registry, treating a missing file as empty.
    pub fn load(path: &Path) -> Result<Self, OrchestratorError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save atomically (tmp file + rename) so a crash mid-write never
    /// corrupts the registry.
    pub fn save(&self, path: &Path) -> Result<(), OrchestratorError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &content)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_record_lifecycle() {
        let mut record = RunRecord::new("demo", "run-00", 42);
        assert_eq!(record.status, RunStatus::Pending);

        record.set_status(RunStatus::Running);
        record.set_status(RunStatus::Completed);
        assert_eq!(record.status, RunStatus::Completed);
        assert!(record.updated_at >= record.created_at);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let registry = RunRegistry::load(&dir.path().join("runs.json")).unwrap();
        assert!(registry.runs.is_empty());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("runs.json");

        let mut registry = RunRegistry::new();
        registry.add(RunRecord::new("demo", "run-00", 42));
        registry.add(RunRecord::new("demo", "run-01", 7));
        registry.save(&path).unwrap();

        let loaded = RunRegistry::load(&path).unwrap();
        assert_eq!(loaded.runs.len(), 2);
        assert_eq!(loaded.runs[1].run, "run-01");
        assert_eq!(loaded.runs[1].seed, 7);
    }

    #[test]
    fn test_repeated_labels_resolve_by_id() {
        let mut registry = RunRegistry::new();
        let mut prior = RunRecord::new("demo", "run-00", 42);
        prior.set_status(RunStatus::Completed);
        let prior_id = prior.id.clone();
        registry.add(prior);

        // A re-run of the same project/run label gets its own record.
        let mut fresh = RunRecord::new("demo", "run-00", 7);
        fresh.set_status(RunStatus::Running);
        let fresh_id = fresh.id.clone();
        registry.add(fresh);

        assert_ne!(prior_id, fresh_id);

        registry
            .find_by_id_mut(&fresh_id)
            .unwrap()
            .set_status(RunStatus::Failed);

        // The earlier attempt's history is untouched.
        assert_eq!(registry.runs[0].id, prior_id);
        assert_eq!(registry.runs[0].status, RunStatus::Completed);
        assert_eq!(registry.runs[1].id, fresh_id);
        assert_eq!(registry.runs[1].status, RunStatus::Failed);
    }

    #[test]
    fn test_find_and_filter() {
        let mut registry = RunRegistry::new();
        registry.add(RunRecord::new("demo", "run-00", 42));
        registry.add(RunRecord::new("demo", "run-01", 7));

        registry
            .find_mut("demo", "run-01")
            .unwrap()
            .set_status(RunStatus::Failed);

        assert_eq!(registry.list_by_status(&RunStatus::Pending).len(), 1);
        assert_eq!(registry.list_by_status(&RunStatus::Failed).len(), 1);
        assert!(registry.find_mut("demo", "run-99").is_none());
    }
}
