//! Dataset precondition checks.
//!
//! Validates that a dataset file the datamodule will be pointed at actually
//! exists, before a run is submitted or started. The file contents belong to
//! the external framework and are not parsed here.

use crate::config::DatamoduleConfig;
use crate::error::OrchestratorError;
use std::path::{Path, PathBuf};

/// What a passed data check resolved.
#[derive(Debug, Clone)]
pub struct DataCheckReport {
    pub file: PathBuf,
    /// Directory the datamodule would be configured with.
    pub data_dir: PathBuf,
    pub size_bytes: u64,
    /// Kinematic coordinate selections the run would load the file with.
    pub met_kins: String,
    pub lep_kins: String,
    pub jet_kins: String,
    pub nu_kins: String,
}

/// Check that `file` exists and is a regular file, and report the datamodule
/// settings a run over it would use.
pub fn check_data_file(
    file: &Path,
    datamodule: &DatamoduleConfig,
) -> Result<DataCheckReport, OrchestratorError> {
    if !file.exists() {
        return Err(OrchestratorError::DataFileMissing(file.to_path_buf()));
    }
    let metadata = std::fs::metadata(file)?;
    if !metadata.is_file() {
        return Err(OrchestratorError::DataNotAFile(file.to_path_buf()));
    }

    let data_dir = file.parent().unwrap_or(Path::new(".")).to_path_buf();
    Ok(DataCheckReport {
        file: file.to_path_buf(),
        data_dir,
        size_bytes: metadata.len(),
        met_kins: datamodule.met_kins.clone(),
        lep_kins: datamodule.lep_kins.clone(),
        jet_kins: datamodule.jet_kins.clone(),
        nu_kins: datamodule.nu_kins.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = check_data_file(
            &dir.path().join("absent.h5"),
            &DatamoduleConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, OrchestratorError::DataFileMissing(_)));
    }

    #[test]
    fn test_directory_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = check_data_file(dir.path(), &DatamoduleConfig::default()).unwrap_err();
        assert!(matches!(err, OrchestratorError::DataNotAFile(_)));
    }

    #[test]
    fn test_report_resolves_data_dir_and_kinematics() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("events.h5");
        std::fs::write(&file, b"not really hdf5").unwrap();

        let report = check_data_file(&file, &DatamoduleConfig::default()).unwrap();
        assert_eq!(report.data_dir, dir.path());
        assert_eq!(report.size_bytes, 15);
        assert_eq!(report.met_kins, "px,py");
        assert_eq!(report.nu_kins, "px,py,pz");
    }
}
