//! Training driver.
//!
//! This module owns the control flow of a training job: pick a role, build the
//! network through a [`Backend`], then either serve parameters or run the
//! trainer loop. The numerical work (kernels, gradients, the Adam update,
//! splitting the program between trainers and parameter servers) belongs to
//! the backend.
//!
//! # Flow
//!
//! ```text
//! JobConfig ──► dispatch ──┬── PSERVER ──► Backend::pserver(endpoint).serve()
//!                          └── TRAINER ──► run_trainer
//!                                           for pass in 0..pass_num
//!                                             for feed in loader     (shuffle ► batch ► DataFeeder)
//!                                               program.run(feed) ─► cost, acc
//!                                               stop early when cost < 1.0 && acc > 0.8
//! ```

pub mod backend;
pub mod dispatch;
pub mod trainer;

pub use backend::{Backend, BackendError, ParameterServer, StepOutput, TrainerProgram};
pub use dispatch::{dispatch, JobConfig, RoleOutcome};
pub use trainer::{run_trainer, EarlyStop, TrainConfig, TrainOutcome};

use crate::cluster::ConfigError;
use crate::data::DataError;
use crate::feed::FeedError;
use crate::model::ModelError;
use thiserror::Error;

/// Error type for a training job.
#[derive(Error, Debug)]
pub enum TrainError {
    #[error("cluster configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("model configuration: {0}")]
    Model(#[from] ModelError),
    #[error("data pipeline: {0}")]
    Data(#[from] DataError),
    #[error("feeding batch: {0}")]
    Feed(#[from] FeedError),
    #[error("backend: {0}")]
    Backend(#[from] BackendError),
}

pub type Result<T> = std::result::Result<T, TrainError>;
