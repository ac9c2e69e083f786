//! Runtime environment activation.
//!
//! All process-wide environment state is read exactly once, at startup, into
//! a [`RuntimeEnv`] value. Downstream components (drivers, sequencer,
//! submitter) receive it by value and never touch `std::env` themselves.

use crate::error::OrchestratorError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Root-path variable pointing at the repository checkout the Python entry
/// points live under. Required by every orchestration command.
pub const ROOT_VAR: &str = "NUFLOWS_ROOT";

/// Module-search-path variable extended (never replaced) with the root.
pub const PYTHONPATH_VAR: &str = "PYTHONPATH";

/// Variables captured into the activation snapshot and digested into the
/// fingerprint. The diagnostic preamble dumps these instead of the whole
/// process environment, which routinely carries credentials.
const TRACKED_VARS: [&str; 4] = [ROOT_VAR, PYTHONPATH_VAR, "PATH", "CUDA_VISIBLE_DEVICES"];

/// Snapshot of the environment an orchestration run executes in.
#[derive(Debug, Clone)]
pub struct RuntimeEnv {
    /// Repository root, from [`ROOT_VAR`].
    pub root: PathBuf,
    /// Module search path forwarded to spawned Python processes. Contains
    /// the root as one entry, with any pre-existing entries preserved.
    pub python_path: String,
    pub user: String,
    pub host: String,
    pub cwd: PathBuf,
    /// Values of [`TRACKED_VARS`] at activation, in order, dumped in the
    /// diagnostic preamble.
    pub tracked_vars: Vec<(&'static str, String)>,
    /// Digest over [`tracked_vars`](Self::tracked_vars), logged so runs
    /// executed under different environments are distinguishable afterwards.
    pub fingerprint: String,
}

impl RuntimeEnv {
    /// Read the process environment and build the snapshot.
    ///
    /// Fails with [`OrchestratorError::MissingRootVar`] if [`ROOT_VAR`] is
    /// unset, before anything downstream is attempted.
    pub fn activate() -> Result<Self, OrchestratorError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the snapshot from an explicit lookup function. This is the
    /// seam the real [`activate`](Self::activate) goes through, so the
    /// precondition behavior is testable without mutating process state.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, OrchestratorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let root = lookup(ROOT_VAR)
            .filter(|v| !v.is_empty())
            .ok_or(OrchestratorError::MissingRootVar { var: ROOT_VAR })?;
        let root = PathBuf::from(root);

        let python_path = extend_search_path(&root, lookup(PYTHONPATH_VAR).as_deref());
        let user = lookup("USER")
            .or_else(|| lookup("USERNAME"))
            .unwrap_or_else(|| "unknown".to_string());
        let host = lookup("HOSTNAME").unwrap_or_else(|| "localhost".to_string());
        let cwd = std::env::current_dir().unwrap_or_else(|_| root.clone());
        let tracked_vars: Vec<(&'static str, String)> = TRACKED_VARS
            .iter()
            .map(|var| (*var, lookup(var).unwrap_or_default()))
            .collect();
        let fingerprint = fingerprint_vars(&tracked_vars);

        Ok(Self {
            root,
            python_path,
            user,
            host,
            cwd,
            tracked_vars,
            fingerprint,
        })
    }

    /// Directory a given project/run pair writes its artifacts under.
    ///
    /// This is the one naming convention shared by every stage: the output
    /// location is a pure function of root, project name, and run name.
    pub fn run_dir(&self, project: &str, run: &str) -> PathBuf {
        self.root.join("runs").join(project).join(run)
    }
}

/// SHA-256 over the run-relevant environment variables.
fn fingerprint_vars(vars: &[(&'static str, String)]) -> String {
    let mut hasher = Sha256::new();
    for (var, value) in vars {
        hasher.update(var.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Extend a search-path value so it contains `root`, preserving every prior
/// entry. Already-present roots are not duplicated.
pub fn extend_search_path(root: &Path, existing: Option<&str>) -> String {
    let sep = if cfg!(windows) { ';' } else { ':' };
    let root_str = root.to_string_lossy();
    match existing {
        None | Some("") => root_str.into_owned(),
        Some(prior) if prior.split(sep).any(|entry| entry == root_str) => prior.to_string(),
        Some(prior) => format!("{prior}{sep}{root_str}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lookup_with_root(key: &str) -> Option<String> {
        match key {
            ROOT_VAR => Some("/srv/nuflows".to_string()),
            "USER" => Some("tester".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_activate_requires_root_var() {
        let err = RuntimeEnv::from_lookup(|_| None).unwrap_err();
        assert!(err.is_missing_precondition());
        assert!(err.to_string().contains(ROOT_VAR));
    }

    #[test]
    fn test_empty_root_var_is_missing() {
        let err = RuntimeEnv::from_lookup(|key| {
            (key == ROOT_VAR).then(String::new)
        })
        .unwrap_err();
        assert!(err.to_string().contains(ROOT_VAR));
    }

    #[test]
    fn test_activation_snapshot() {
        let env = RuntimeEnv::from_lookup(lookup_with_root).unwrap();
        assert_eq!(env.root, PathBuf::from("/srv/nuflows"));
        assert_eq!(env.user, "tester");
        assert_eq!(env.python_path, "/srv/nuflows");
    }

    #[test]
    fn test_snapshot_dumps_tracked_variables() {
        let env = RuntimeEnv::from_lookup(lookup_with_root).unwrap();
        assert_eq!(env.tracked_vars.len(), TRACKED_VARS.len());
        assert!(
            env.tracked_vars
                .iter()
                .any(|(var, value)| *var == ROOT_VAR && value == "/srv/nuflows")
        );
    }

    #[test]
    fn test_fingerprint_tracks_environment() {
        let a = RuntimeEnv::from_lookup(lookup_with_root).unwrap();
        let b = RuntimeEnv::from_lookup(|key| match key {
            PYTHONPATH_VAR => Some("/elsewhere".to_string()),
            other => lookup_with_root(other),
        })
        .unwrap();
        assert_eq!(a.fingerprint.len(), 64);
        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_search_path_keeps_prior_entries() {
        let root = Path::new("/srv/nuflows");
        let extended = extend_search_path(root, Some("/usr/lib/py:/opt/tools"));
        let entries: Vec<&str> = extended.split(':').collect();
        assert!(entries.contains(&"/usr/lib/py"));
        assert!(entries.contains(&"/opt/tools"));
        assert!(entries.contains(&"/srv/nuflows"));
    }

    #[test]
    fn test_search_path_not_duplicated() {
        let root = Path::new("/srv/nuflows");
        let extended = extend_search_path(root, Some("/srv/nuflows:/opt/tools"));
        assert_eq!(extended, "/srv/nuflows:/opt/tools");
    }

    #[test]
    fn test_run_dir_is_pure_function_of_names() {
        let env = RuntimeEnv::from_lookup(lookup_with_root).unwrap();
        let a = env.run_dir("nu2flows-reproduce", "run-00");
        let b = env.run_dir("nu2flows-reproduce", "run-00");
        assert_eq!(a, b);
        assert_eq!(
            a,
            PathBuf::from("/srv/nuflows/runs/nu2flows-reproduce/run-00")
        );
    }
}
