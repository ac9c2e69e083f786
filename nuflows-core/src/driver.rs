//! Stage drivers — managed subprocess invocation of the external Python
//! entry points (training, export, plotting).
//!
//! Each driver forwards its configuration values as `key=value` override
//! arguments, maps a non-zero exit status to a structured error, and never
//! retries. Partial artifacts from a failed invocation are left in place.

use crate::config::RunConfig;
use crate::env::{PYTHONPATH_VAR, RuntimeEnv};
use crate::error::OrchestratorError;
use crate::stage::{Stage, StageKind, StageOutcome};
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Shared launcher for the Python entry points under `<root>/scripts/`.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    python_path: PathBuf,
    root: PathBuf,
    python_search_path: String,
}

impl ScriptRunner {
    pub fn new(env: &RuntimeEnv, config: &RunConfig) -> Self {
        Self {
            python_path: config
                .python
                .python_path
                .clone()
                .unwrap_or_else(|| PathBuf::from("python3")),
            root: env.root.clone(),
            python_search_path: env.python_path.clone(),
        }
    }

    /// Run one entry-point script with override arguments, enforcing a
    /// wall-clock limit. Stdout is streamed through to the operator; stderr
    /// is captured into the error on failure.
    async fn run_script(
        &self,
        stage: StageKind,
        script: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<(), OrchestratorError> {
        let script_path = self.root.join("scripts").join(script);
        debug!(%stage, script = %script_path.display(), ?args, "spawning entry point");

        let result = tokio::time::timeout(timeout, async {
            let output = Command::new(&self.python_path)
                .arg(&script_path)
                .args(args)
                .current_dir(&self.root)
                .env(PYTHONPATH_VAR, &self.python_search_path)
                .stdout(std::process::Stdio::inherit())
                .stderr(std::process::Stdio::piped())
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| OrchestratorError::StageSpawn {
                    stage,
                    message: e.to_string(),
                })?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                return Err(OrchestratorError::StageFailed {
                    stage,
                    status: output.status.code().unwrap_or(-1),
                    stderr,
                });
            }
            Ok(())
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(OrchestratorError::StageTimeout {
                stage,
                secs: timeout.as_secs(),
            }),
        }
    }
}

/// Invokes the external training entry point. Produces a checkpoint under
/// the run dir.
pub struct TrainDriver {
    runner: ScriptRunner,
    run_dir: PathBuf,
    project_name: String,
    network_name: String,
    seed: u64,
    timeout: Duration,
}

impl TrainDriver {
    pub fn new(env: &RuntimeEnv, config: &RunConfig) -> Self {
        Self {
            runner: ScriptRunner::new(env, config),
            run_dir: env.run_dir(&config.project_name, &config.network_name),
            project_name: config.project_name.clone(),
            network_name: config.network_name.clone(),
            seed: config.seed,
            timeout: Duration::from_secs(config.python.train_timeout_secs),
        }
    }
}

#[async_trait::async_trait]
impl Stage for TrainDriver {
    fn kind(&self) -> StageKind {
        StageKind::Train
    }

    async fn run(&self) -> Result<StageOutcome, OrchestratorError> {
        std::fs::create_dir_all(&self.run_dir)?;
        let args = vec![
            format!("project_name={}", self.project_name),
            format!("network_name={}", self.network_name),
            format!("seed={}", self.seed),
        ];
        info!(project = %self.project_name, run = %self.network_name, seed = self.seed, "training");
        self.runner
            .run_script(StageKind::Train, "train.py", &args, self.timeout)
            .await?;
        Ok(StageOutcome {
            stage: StageKind::Train,
            artifact: self.run_dir.join("checkpoints"),
        })
    }
}

/// Loads a trained checkpoint and draws posterior samples over the held-out
/// dataset, writing one candidate file per export run.
pub struct ExportDriver {
    runner: ScriptRunner,
    run_dir: PathBuf,
    output_dir: String,
    project_name: String,
    network_name: String,
    samples_per_event: usize,
    timeout: Duration,
}

impl ExportDriver {
    pub fn new(env: &RuntimeEnv, config: &RunConfig, samples_per_event: usize) -> Self {
        Self {
            runner: ScriptRunner::new(env, config),
            run_dir: env.run_dir(&config.project_name, &config.network_name),
            output_dir: config.paths.output_dir.clone(),
            project_name: config.project_name.clone(),
            network_name: config.network_name.clone(),
            samples_per_event,
            timeout: Duration::from_secs(config.python.export_timeout_secs),
        }
    }

    /// Candidate file the external process writes, a pure function of the
    /// run dir and sampling density.
    pub fn candidate_path(&self) -> PathBuf {
        self.run_dir
            .join(&self.output_dir)
            .join(RunConfig::candidate_file_name(self.samples_per_event))
    }
}

#[async_trait::async_trait]
impl Stage for ExportDriver {
    fn kind(&self) -> StageKind {
        StageKind::Export
    }

    async fn run(&self) -> Result<StageOutcome, OrchestratorError> {
        let args = vec![
            format!("project_name={}", self.project_name),
            format!("network_name={}", self.network_name),
            format!("samples_per_event={}", self.samples_per_event),
        ];
        info!(
            project = %self.project_name,
            run = %self.network_name,
            samples_per_event = self.samples_per_event,
            "exporting candidates"
        );
        self.runner
            .run_script(StageKind::Export, "export.py", &args, self.timeout)
            .await?;
        Ok(StageOutcome {
            stage: StageKind::Export,
            artifact: self.candidate_path(),
        })
    }
}

/// Renders comparison figures from exported candidates and ground truth.
pub struct PlotDriver {
    runner: ScriptRunner,
    run_dir: PathBuf,
    project_name: String,
    network_name: String,
    timeout: Duration,
}

impl PlotDriver {
    pub fn new(env: &RuntimeEnv, config: &RunConfig) -> Self {
        Self {
            runner: ScriptRunner::new(env, config),
            run_dir: env.run_dir(&config.project_name, &config.network_name),
            project_name: config.project_name.clone(),
            network_name: config.network_name.clone(),
            timeout: Duration::from_secs(config.python.export_timeout_secs),
        }
    }
}

#[async_trait::async_trait]
impl Stage for PlotDriver {
    fn kind(&self) -> StageKind {
        StageKind::Plot
    }

    async fn run(&self) -> Result<StageOutcome, OrchestratorError> {
        let args = vec![
            format!("project_name={}", self.project_name),
            format!("network_name={}", self.network_name),
        ];
        info!(project = %self.project_name, run = %self.network_name, "plotting");
        self.runner
            .run_script(StageKind::Plot, "plot.py", &args, self.timeout)
            .await?;
        Ok(StageOutcome {
            stage: StageKind::Plot,
            artifact: self.run_dir.join("figures"),
        })
    }
}
