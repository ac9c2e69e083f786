//! Run-configuration composition.
//!
//! Uses `figment` for layered configuration: struct defaults -> base YAML
//! file -> per-group fragment files -> `NUFLOWS_`-prefixed environment ->
//! dotted-key command-line overrides. Overrides always win, and the composed
//! [`RunConfig`] is never mutated after extraction.

use crate::error::OrchestratorError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration groups resolved from `configs/<group>/<choice>.yaml`.
/// Order matters: later fragments override earlier ones.
pub const DEFAULT_GROUPS: &[(&str, &str)] = &[
    ("callbacks", "default"),
    ("datamodule", "dilepton"),
    ("model", "nuflows"),
    ("paths", "default"),
    ("trainer", "default"),
    ("logger", "wandb"),
    ("export", "default"),
];

/// Fully resolved configuration for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Namespace grouping related runs.
    #[serde(default = "default_project_name")]
    pub project_name: String,
    /// Run identifier within the project.
    #[serde(default = "default_network_name")]
    pub network_name: String,
    /// RNG seed forwarded to the training entry point.
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub python: PythonConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub trainer: TrainerConfig,
    #[serde(default)]
    pub datamodule: DatamoduleConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub logger: LoggerConfig,
    #[serde(default)]
    pub callbacks: CallbacksConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            project_name: default_project_name(),
            network_name: default_network_name(),
            seed: default_seed(),
            python: PythonConfig::default(),
            paths: PathsConfig::default(),
            trainer: TrainerConfig::default(),
            datamodule: DatamoduleConfig::default(),
            model: ModelConfig::default(),
            logger: LoggerConfig::default(),
            callbacks: CallbacksConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

fn default_project_name() -> String {
    "nu2flows-reproduce".to_string()
}

fn default_network_name() -> String {
    "dev".to_string()
}

fn default_seed() -> u64 {
    42
}

/// Python interpreter settings for the spawned entry points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PythonConfig {
    /// Interpreter path; `python3` on PATH when unset.
    #[serde(default)]
    pub python_path: Option<PathBuf>,
    /// Wall-clock limit for a training invocation (seconds).
    #[serde(default = "default_train_timeout")]
    pub train_timeout_secs: u64,
    /// Wall-clock limit for export and plot invocations (seconds).
    #[serde(default = "default_export_timeout")]
    pub export_timeout_secs: u64,
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            python_path: None,
            train_timeout_secs: default_train_timeout(),
            export_timeout_secs: default_export_timeout(),
        }
    }
}

fn default_train_timeout() -> u64 {
    86_400
}

fn default_export_timeout() -> u64 {
    7_200
}

/// Filesystem layout supplied to the external entry points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding the training/validation/test datasets.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Subdirectory of each run dir where exports land.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_output_dir() -> String {
    "outputs".to_string()
}

/// Settings forwarded to the external trainer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    #[serde(default = "default_max_epochs")]
    pub max_epochs: usize,
    #[serde(default = "default_precision")]
    pub precision: String,
    #[serde(default = "default_accelerator")]
    pub accelerator: String,
    #[serde(default = "default_devices")]
    pub devices: usize,
    #[serde(default = "default_true")]
    pub enable_progress_bar: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_epochs: default_max_epochs(),
            precision: default_precision(),
            accelerator: default_accelerator(),
            devices: default_devices(),
            enable_progress_bar: true,
        }
    }
}

fn default_max_epochs() -> usize {
    200
}

fn default_precision() -> String {
    "32".to_string()
}

fn default_accelerator() -> String {
    "auto".to_string()
}

fn default_devices() -> usize {
    1
}

/// Dataset selection and kinematic coordinate choices.
///
/// The kinematics strings are comma-separated variable lists the datamodule
/// converts each object collection into (from pt/eta/phi/E storage).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatamoduleConfig {
    #[serde(default)]
    pub file_list: Vec<String>,
    /// Table name inside each dataset file.
    #[serde(default = "default_table_name")]
    pub table_name: String,
    /// Maximum events loaded per file; unlimited when unset.
    #[serde(default)]
    pub n_per_file: Option<usize>,
    #[serde(default = "default_met_kins")]
    pub met_kins: String,
    #[serde(default = "default_lep_kins")]
    pub lep_kins: String,
    #[serde(default = "default_lep_kins")]
    pub jet_kins: String,
    #[serde(default = "default_nu_kins")]
    pub nu_kins: String,
    #[serde(default)]
    pub loader: LoaderConfig,
}

impl Default for DatamoduleConfig {
    fn default() -> Self {
        Self {
            file_list: Vec::new(),
            table_name: default_table_name(),
            n_per_file: None,
            met_kins: default_met_kins(),
            lep_kins: default_lep_kins(),
            jet_kins: default_lep_kins(),
            nu_kins: default_nu_kins(),
            loader: LoaderConfig::default(),
        }
    }
}

fn default_table_name() -> String {
    "delphes".to_string()
}

fn default_met_kins() -> String {
    "px,py".to_string()
}

fn default_lep_kins() -> String {
    "px,py,pz,log_energy".to_string()
}

fn default_nu_kins() -> String {
    "px,py,pz".to_string()
}

/// Batch-loading settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    #[serde(default = "default_true")]
    pub pin_memory: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            num_workers: default_num_workers(),
            pin_memory: true,
        }
    }
}

fn default_batch_size() -> usize {
    64
}

fn default_num_workers() -> usize {
    4
}

/// Model selection. The hyperparameters are opaque to the orchestrator and
/// forwarded verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Import path of the model class in the external framework.
    #[serde(default = "default_model_target")]
    pub target: String,
    #[serde(default = "empty_object")]
    pub hyperparams: serde_json::Value,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            target: default_model_target(),
            hyperparams: empty_object(),
        }
    }
}

fn default_model_target() -> String {
    "src.models.nuflows.NuFlows".to_string()
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Metric-logger settings for the external trainer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_logger_backend")]
    pub backend: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: default_logger_backend(),
        }
    }
}

fn default_logger_backend() -> String {
    "wandb".to_string()
}

/// Checkpointing and early-stopping callbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbacksConfig {
    #[serde(default = "default_monitor")]
    pub checkpoint_monitor: String,
    #[serde(default = "default_save_top_k")]
    pub save_top_k: usize,
    #[serde(default = "default_patience")]
    pub early_stopping_patience: usize,
}

impl Default for CallbacksConfig {
    fn default() -> Self {
        Self {
            checkpoint_monitor: default_monitor(),
            save_top_k: default_save_top_k(),
            early_stopping_patience: default_patience(),
        }
    }
}

fn default_monitor() -> String {
    "valid/total_loss".to_string()
}

fn default_save_top_k() -> usize {
    1
}

fn default_patience() -> usize {
    50
}

/// Export (posterior sampling) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Posterior samples drawn per event.
    #[serde(default = "default_samples_per_event")]
    pub samples_per_event: usize,
    /// Batch size during the prediction loop.
    #[serde(default = "default_export_batch_size")]
    pub batch_size: usize,
    /// Glob selecting which checkpoint to load from the run dir.
    #[serde(default = "default_ckpt_glob")]
    pub ckpt_glob: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            samples_per_event: default_samples_per_event(),
            batch_size: default_export_batch_size(),
            ckpt_glob: default_ckpt_glob(),
        }
    }
}

/// Sampling density used by the sequenced export stage.
pub fn default_samples_per_event() -> usize {
    1024
}

fn default_export_batch_size() -> usize {
    512
}

fn default_ckpt_glob() -> String {
    "*best*".to_string()
}

fn default_true() -> bool {
    true
}

impl RunConfig {
    /// Name of the candidate file an export at the given sampling density
    /// produces, relative to the run's output dir.
    pub fn candidate_file_name(samples_per_event: usize) -> String {
        format!("test-{samples_per_event}.h5")
    }
}

/// Compose the resolved configuration for one run.
///
/// Precedence, lowest to highest: struct defaults, `configs/train.yaml`
/// under `root`, each group fragment in `groups`, `NUFLOWS_`-prefixed
/// environment variables (`__` as the nesting separator), then the
/// dotted-key overrides.
pub fn compose(
    root: &Path,
    groups: &[(&str, &str)],
    overrides: &[String],
) -> Result<RunConfig, OrchestratorError> {
    let mut figment = Figment::from(Serialized::defaults(RunConfig::default()))
        .merge(Yaml::file(root.join("configs").join("train.yaml")));

    for (group, choice) in groups {
        let fragment = root
            .join("configs")
            .join(group)
            .join(format!("{choice}.yaml"));
        figment = figment.merge(Yaml::file(fragment));
    }

    figment = figment.merge(Env::prefixed("NUFLOWS_").split("__"));

    if !overrides.is_empty() {
        let tree = overrides_to_value(overrides)?;
        figment = figment.merge(Serialized::defaults(tree));
    }

    Ok(figment.extract()?)
}

/// Parse `key.path=value` override entries into a nested JSON value.
///
/// Values that parse as JSON scalars keep their type; everything else is
/// taken as a string.
fn overrides_to_value(entries: &[String]) -> Result<serde_json::Value, OrchestratorError> {
    let mut tree = serde_json::Map::new();
    for entry in entries {
        let (key, raw) = entry
            .split_once('=')
            .ok_or_else(|| OrchestratorError::InvalidOverride {
                entry: entry.clone(),
            })?;
        if key.is_empty() {
            return Err(OrchestratorError::InvalidOverride {
                entry: entry.clone(),
            });
        }
        let value = serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));

        let mut node = &mut tree;
        let mut parts = key.split('.').peekable();
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                node.insert(part.to_string(), value);
                break;
            }
            node = node
                .entry(part.to_string())
                .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()))
                .as_object_mut()
                .ok_or_else(|| OrchestratorError::InvalidOverride {
                    entry: entry.clone(),
                })?;
        }
    }
    Ok(serde_json::Value::Object(tree))
}
