//! Run sequencer — the train -> export chain with its single failure gate.
//!
//! The sequence is strictly linear: the export stage is never invoked unless
//! the train stage succeeded. There are no retries, and a failed export is
//! not specially handled beyond error propagation.

use crate::env::RuntimeEnv;
use crate::error::OrchestratorError;
use crate::stage::{Stage, StageOutcome};
use chrono::Utc;
use tracing::{debug, error, info};

/// Result of a completed train -> export sequence.
#[derive(Debug, Clone)]
pub struct SequenceReport {
    pub checkpoint: StageOutcome,
    pub candidates: StageOutcome,
}

/// Chains the train and export stages for one run.
pub struct RunSequencer<'a> {
    env: &'a RuntimeEnv,
    /// Invocation arguments, echoed in the diagnostic preamble.
    args: Vec<String>,
}

impl<'a> RunSequencer<'a> {
    pub fn new(env: &'a RuntimeEnv, args: Vec<String>) -> Self {
        Self { env, args }
    }

    /// Emit the timestamped diagnostic preamble: start time, host, user,
    /// working directory, and the full invocation.
    fn preamble(&self) {
        info!(started_at = %Utc::now().to_rfc3339(), "run sequence starting");
        info!(host = %self.env.host, user = %self.env.user, "environment");
        info!(cwd = %self.env.cwd.display(), root = %self.env.root.display(), "paths");
        info!(python_path = %self.env.python_path, "module search path");
        for (var, value) in &self.env.tracked_vars {
            debug!(%var, %value, "environment variable");
        }
        info!(env_fingerprint = %self.env.fingerprint, "environment digest");
        info!(args = %self.args.join(" "), "invocation");
    }

    /// Run the train stage, then the export stage.
    ///
    /// A train failure halts the chain before the export stage is invoked
    /// and propagates as the sequence's error.
    pub async fn execute(
        &self,
        train: &dyn Stage,
        export: &dyn Stage,
    ) -> Result<SequenceReport, OrchestratorError> {
        self.preamble();

        let checkpoint = match train.run().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(stage = %train.kind(), error = %e, "training failed, aborting sequence");
                return Err(e);
            }
        };
        info!(checkpoint = %checkpoint.artifact.display(), "training complete");

        let candidates = export.run().await?;
        info!(
            candidates = %candidates.artifact.display(),
            finished_at = %Utc::now().to_rfc3339(),
            "run sequence complete"
        );

        Ok(SequenceReport {
            checkpoint,
            candidates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::ROOT_VAR;
    use crate::stage::StageKind;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_env() -> RuntimeEnv {
        RuntimeEnv::from_lookup(|key| match key {
            ROOT_VAR => Some("/srv/nuflows".to_string()),
            _ => None,
        })
        .unwrap()
    }

    /// Substitute stage returning a controlled result and counting calls.
    struct FakeStage {
        kind: StageKind,
        fail: bool,
        artifact: PathBuf,
        calls: AtomicUsize,
    }

    impl FakeStage {
        fn ok(kind: StageKind, artifact: &str) -> Self {
            Self {
                kind,
                fail: false,
                artifact: PathBuf::from(artifact),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(kind: StageKind) -> Self {
            Self {
                kind,
                fail: true,
                artifact: PathBuf::new(),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Stage for FakeStage {
        fn kind(&self) -> StageKind {
            self.kind
        }

        async fn run(&self) -> Result<StageOutcome, OrchestratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(OrchestratorError::StageFailed {
                    stage: self.kind,
                    status: 1,
                    stderr: "controlled failure".to_string(),
                });
            }
            Ok(StageOutcome {
                stage: self.kind,
                artifact: self.artifact.clone(),
            })
        }
    }

    #[tokio::test]
    async fn test_train_failure_gates_export() {
        let env = test_env();
        let sequencer = RunSequencer::new(
            &env,
            vec![
                "project_name=demo".to_string(),
                "network_name=run-00".to_string(),
                "seed=42".to_string(),
            ],
        );
        let train = FakeStage::failing(StageKind::Train);
        let export = FakeStage::ok(StageKind::Export, "/tmp/test-1024.h5");

        let err = sequencer.execute(&train, &export).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::StageFailed {
                stage: StageKind::Train,
                ..
            }
        ));
        assert_eq!(train.call_count(), 1);
        assert_eq!(export.call_count(), 0);
    }

    #[tokio::test]
    async fn test_success_runs_export_exactly_once() {
        let env = test_env();
        let sequencer = RunSequencer::new(&env, vec![]);
        let train = FakeStage::ok(StageKind::Train, "/tmp/checkpoints");
        let export = FakeStage::ok(StageKind::Export, "/tmp/test-1024.h5");

        let report = sequencer.execute(&train, &export).await.unwrap();
        assert_eq!(train.call_count(), 1);
        assert_eq!(export.call_count(), 1);
        assert_eq!(report.checkpoint.artifact, PathBuf::from("/tmp/checkpoints"));
        assert_eq!(
            report.candidates.artifact,
            PathBuf::from("/tmp/test-1024.h5")
        );
    }

    #[tokio::test]
    async fn test_export_failure_propagates() {
        let env = test_env();
        let sequencer = RunSequencer::new(&env, vec![]);
        let train = FakeStage::ok(StageKind::Train, "/tmp/checkpoints");
        let export = FakeStage::failing(StageKind::Export);

        let err = sequencer.execute(&train, &export).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::StageFailed {
                stage: StageKind::Export,
                ..
            }
        ));
    }
}
