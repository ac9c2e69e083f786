//! Batch submission — three randomized-seed runs handed to an external
//! queue manager, fire-and-forget.
//!
//! The submitter does not wait for, observe, or coordinate the submitted
//! jobs; each receives a distinct run label and is expected by convention to
//! write under its own run dir. Generated seeds are not deduplicated across
//! the batch (a collision is possible and tolerated, matching the original
//! behavior).

use crate::env::RuntimeEnv;
use crate::error::OrchestratorError;
use rand::Rng;
use serde::Serialize;
use tokio::process::Command;
use tracing::info;

/// Project namespace used for batch-submitted runs.
pub const DEFAULT_PROJECT: &str = "nu2flows-reproduce";

/// Number of runs one batch submission enqueues.
pub const RUNS_PER_BATCH: usize = 3;

/// Inclusive seed range for generated runs.
pub const SEED_MIN: u64 = 1;
pub const SEED_MAX: u64 = 1_000_000;

/// Parameters of one submitted job, forwarded verbatim to the queue manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueJob {
    pub project: String,
    pub run: String,
    pub seed: u64,
}

/// Submission backend. The real implementation shells out to the queue
/// manager's submit command; tests substitute a recording client.
#[async_trait::async_trait]
pub trait QueueClient: Send + Sync {
    async fn submit(&self, job: &QueueJob) -> Result<(), OrchestratorError>;
}

/// Submits jobs by invoking the queue manager's submit command with the job
/// template under `<root>/scripts/`. No job id is captured and no completion
/// is tracked.
pub struct CommandQueueClient {
    submit_cmd: String,
    root: std::path::PathBuf,
}

impl CommandQueueClient {
    pub fn new(env: &RuntimeEnv, submit_cmd: impl Into<String>) -> Self {
        Self {
            submit_cmd: submit_cmd.into(),
            root: env.root.clone(),
        }
    }
}

#[async_trait::async_trait]
impl QueueClient for CommandQueueClient {
    async fn submit(&self, job: &QueueJob) -> Result<(), OrchestratorError> {
        let template = self.root.join("scripts").join("train.job");
        let output = Command::new(&self.submit_cmd)
            .arg(&template)
            .arg(format!("project={}", job.project))
            .arg(format!("run={}", job.run))
            .arg(format!("seed={}", job.seed))
            .current_dir(&self.root)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| OrchestratorError::submit(format!("failed to spawn {}: {e}", self.submit_cmd)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(OrchestratorError::submit(format!(
                "{} exited with {}: {stderr}",
                self.submit_cmd, output.status
            )));
        }
        Ok(())
    }
}

/// Enumerates the batch and forwards each (run, seed) pair to the client.
pub struct BatchSubmitter {
    project: String,
}

impl BatchSubmitter {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
        }
    }

    /// Submit [`RUNS_PER_BATCH`] jobs with zero-padded run labels and a
    /// fresh uniform seed per job. Returns the submitted jobs in order.
    pub async fn submit_all(
        &self,
        client: &dyn QueueClient,
    ) -> Result<Vec<QueueJob>, OrchestratorError> {
        let mut rng = rand::thread_rng();
        let mut jobs = Vec::with_capacity(RUNS_PER_BATCH);
        for index in 0..RUNS_PER_BATCH {
            let job = QueueJob {
                project: self.project.clone(),
                run: format!("run-{index:02}"),
                seed: rng.gen_range(SEED_MIN..=SEED_MAX),
            };
            info!(project = %job.project, run = %job.run, seed = job.seed, "submitting job");
            client.submit(&job).await?;
            jobs.push(job);
        }
        Ok(jobs)
    }
}

impl Default for BatchSubmitter {
    fn default() -> Self {
        Self::new(DEFAULT_PROJECT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingClient {
        jobs: Mutex<Vec<QueueJob>>,
        fail_after: Option<usize>,
    }

    #[async_trait::async_trait]
    impl QueueClient for RecordingClient {
        async fn submit(&self, job: &QueueJob) -> Result<(), OrchestratorError> {
            let mut jobs = self.jobs.lock().unwrap();
            if let Some(limit) = self.fail_after
                && jobs.len() >= limit
            {
                return Err(OrchestratorError::submit("queue unavailable"));
            }
            jobs.push(job.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_three_submissions_in_order() {
        let client = RecordingClient::default();
        let submitted = BatchSubmitter::default().submit_all(&client).await.unwrap();

        let recorded = client.jobs.lock().unwrap().clone();
        assert_eq!(recorded, submitted);
        assert_eq!(recorded.len(), RUNS_PER_BATCH);

        let labels: Vec<&str> = recorded.iter().map(|j| j.run.as_str()).collect();
        assert_eq!(labels, vec!["run-00", "run-01", "run-02"]);
        for job in &recorded {
            assert_eq!(job.project, DEFAULT_PROJECT);
            assert!((SEED_MIN..=SEED_MAX).contains(&job.seed));
        }
    }

    #[tokio::test]
    async fn test_repeated_batches_draw_fresh_seeds() {
        let client = RecordingClient::default();
        let submitter = BatchSubmitter::default();
        let first: Vec<u64> = submitter
            .submit_all(&client)
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.seed)
            .collect();
        let second: Vec<u64> = submitter
            .submit_all(&client)
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.seed)
            .collect();

        // The generator is never seeded, so two batches agreeing on all
        // three seeds has probability ~1e-18.
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_submission_failure_stops_the_loop() {
        let client = RecordingClient {
            fail_after: Some(1),
            ..Default::default()
        };
        let err = BatchSubmitter::default()
            .submit_all(&client)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Submit(_)));
        assert_eq!(client.jobs.lock().unwrap().len(), 1);
    }
}
