//! nuflows-core — orchestration for conditional normalizing-flow neutrino
//! regression runs.
//!
//! The deep-learning work lives in external Python entry points; this crate
//! owns everything around them: environment activation, layered run
//! configuration, the train -> export sequence with its failure gate, batch
//! submission of randomized-seed runs, and run bookkeeping.

pub mod config;
pub mod data;
pub mod driver;
pub mod env;
pub mod error;
pub mod registry;
pub mod sequencer;
pub mod stage;
pub mod submit;

pub use config::{RunConfig, compose};
pub use env::{ROOT_VAR, RuntimeEnv};
pub use error::OrchestratorError;
pub use sequencer::{RunSequencer, SequenceReport};
pub use stage::{Stage, StageKind, StageOutcome};
pub use submit::{BatchSubmitter, QueueClient, QueueJob};
