//! CLI subcommand handlers.

use crate::{Cli, Commands, ConfigAction, DataAction};
use nuflows_core::config::{self, DEFAULT_GROUPS, RunConfig};
use nuflows_core::data::check_data_file;
use nuflows_core::driver::{ExportDriver, PlotDriver, TrainDriver};
use nuflows_core::registry::{RunRecord, RunRegistry, RunStatus};
use nuflows_core::stage::Stage;
use nuflows_core::submit::{BatchSubmitter, CommandQueueClient};
use nuflows_core::{ROOT_VAR, RunSequencer, RuntimeEnv};
use std::path::PathBuf;
use tracing::info;

/// Handle a CLI invocation.
///
/// Environment activation happens first for every subcommand: a missing
/// root variable is reported and nothing downstream runs.
pub async fn handle_command(cli: Cli) -> anyhow::Result<()> {
    let root_flag = cli.root.clone();
    let env = RuntimeEnv::from_lookup(|key| {
        if key == ROOT_VAR
            && let Some(root) = &root_flag
        {
            return Some(root.display().to_string());
        }
        std::env::var(key).ok()
    })?;

    match cli.command {
        Commands::Run { project, run, seed } => {
            let config = compose_with_flags(&env, &cli.overrides, project, run, seed)?;
            handle_run(&env, &config).await
        }
        Commands::Train { project, run, seed } => {
            let config = compose_with_flags(&env, &cli.overrides, project, run, seed)?;
            let outcome = TrainDriver::new(&env, &config).run().await?;
            info!(checkpoint = %outcome.artifact.display(), "training complete");
            Ok(())
        }
        Commands::Export {
            project,
            run,
            samples_per_event,
        } => {
            let mut overrides = cli.overrides.clone();
            if let Some(samples) = samples_per_event {
                overrides.push(format!("export.samples_per_event={samples}"));
            }
            let config = compose_with_flags(&env, &overrides, project, run, None)?;
            let driver = ExportDriver::new(&env, &config, config.export.samples_per_event);
            let outcome = driver.run().await?;
            info!(candidates = %outcome.artifact.display(), "export complete");
            Ok(())
        }
        Commands::Plot { project, run } => {
            let config = compose_with_flags(&env, &cli.overrides, project, run, None)?;
            let outcome = PlotDriver::new(&env, &config).run().await?;
            info!(figures = %outcome.artifact.display(), "plotting complete");
            Ok(())
        }
        Commands::Submit { project, queue_cmd } => {
            let client = CommandQueueClient::new(&env, queue_cmd);
            let jobs = BatchSubmitter::new(project).submit_all(&client).await?;
            for job in &jobs {
                println!("submitted {}/{} (seed {})", job.project, job.run, job.seed);
            }
            Ok(())
        }
        Commands::Data { action } => match action {
            DataAction::Check { file } => {
                let config = compose_with_flags(&env, &cli.overrides, None, None, None)?;
                let report = check_data_file(&file, &config.datamodule)?;
                println!("ok: {} ({} bytes)", report.file.display(), report.size_bytes);
                println!("data dir: {}", report.data_dir.display());
                println!(
                    "kinematics: met={} lep={} jet={} nu={}",
                    report.met_kins, report.lep_kins, report.jet_kins, report.nu_kins
                );
                Ok(())
            }
        },
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let config = compose_with_flags(&env, &cli.overrides, None, None, None)?;
                println!("{}", serde_yaml::to_string(&config)?);
                Ok(())
            }
        },
    }
}

/// Compose the run configuration, folding the positional flags in as the
/// highest-precedence overrides.
fn compose_with_flags(
    env: &RuntimeEnv,
    overrides: &[String],
    project: Option<String>,
    run: Option<String>,
    seed: Option<u64>,
) -> anyhow::Result<RunConfig> {
    let mut entries: Vec<String> = overrides.to_vec();
    if let Some(project) = project {
        entries.push(format!("project_name={project}"));
    }
    if let Some(run) = run {
        entries.push(format!("network_name={run}"));
    }
    if let Some(seed) = seed {
        entries.push(format!("seed={seed}"));
    }
    Ok(config::compose(&env.root, DEFAULT_GROUPS, &entries)?)
}

/// Full sequence: record the attempt, run train -> export behind the gate,
/// and persist the outcome.
async fn handle_run(env: &RuntimeEnv, config: &RunConfig) -> anyhow::Result<()> {
    let registry_path = registry_path(env);
    let mut registry = RunRegistry::load(&registry_path)?;
    let mut record = RunRecord::new(&config.project_name, &config.network_name, config.seed);
    record.set_status(RunStatus::Running);
    let record_id = record.id.clone();
    registry.add(record);
    registry.save(&registry_path)?;

    let train = TrainDriver::new(env, config);
    let export = ExportDriver::new(env, config, config.export.samples_per_event);
    let sequencer = RunSequencer::new(env, std::env::args().collect());
    let result = sequencer.execute(&train, &export).await;

    // Finalize by id: run labels can repeat across attempts, and the record
    // to update is the one this invocation just added.
    if let Some(record) = registry.find_by_id_mut(&record_id) {
        match &result {
            Ok(report) => {
                record.checkpoint_path = Some(report.checkpoint.artifact.clone());
                record.candidate_path = Some(report.candidates.artifact.clone());
                record.set_status(RunStatus::Completed);
            }
            Err(_) => record.set_status(RunStatus::Failed),
        }
    }
    registry.save(&registry_path)?;

    let report = result?;
    println!("checkpoint: {}", report.checkpoint.artifact.display());
    println!("candidates: {}", report.candidates.artifact.display());
    Ok(())
}

fn registry_path(env: &RuntimeEnv) -> PathBuf {
    env.root.join("runs").join("runs.json")
}
