//! Seams implemented by an execution framework.

use crate::cluster::{ClusterConfig, Endpoint};
use crate::feed::Feed;
use crate::model::{AdamConfig, StackedLstmConfig};
use crate::tensor::{Cpu, Device};
use std::error::Error as StdError;
use thiserror::Error;

/// Failure reported by a backend.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct BackendError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an underlying framework error.
    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The fetch list of one trainer step.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StepOutput {
    /// Mean cross-entropy over the batch.
    pub cost: f32,
    /// Fraction of the batch classified correctly.
    pub accuracy: f32,
}

/// The trainer half of a built program.
pub trait TrainerProgram<D: Device = Cpu> {
    /// Runs forward, backward and the optimizer step on one mini-batch.
    ///
    /// The feed is consumed: an encoded batch is used for exactly one step.
    fn run(&mut self, feed: Feed<D>) -> Result<StepOutput, BackendError>;
}

/// A parameter-server process. `serve` blocks until the job ends.
pub trait ParameterServer {
    fn serve(&mut self) -> Result<(), BackendError>;
}

/// A framework able to build the sentiment network and run it in either role.
pub trait Backend {
    /// Placement fed tensors are tagged with.
    type Place: Device;
    type Trainer: TrainerProgram<Self::Place>;
    type Server: ParameterServer;

    fn place(&self) -> Self::Place;

    /// Builds the network and optimizer, split for `cluster` when it has parameter servers.
    ///
    /// Runs once per process, before the role-specific program is requested.
    fn build(
        &mut self,
        model: &StackedLstmConfig,
        optimizer: &AdamConfig,
        cluster: &ClusterConfig,
    ) -> Result<(), BackendError>;

    fn trainer(&mut self) -> Result<Self::Trainer, BackendError>;

    fn pserver(&mut self, endpoint: &Endpoint) -> Result<Self::Server, BackendError>;
}

impl<D: Device, T: TrainerProgram<D> + ?Sized> TrainerProgram<D> for &mut T {
    fn run(&mut self, feed: Feed<D>) -> Result<StepOutput, BackendError> {
        (**self).run(feed)
    }
}

impl<D: Device, T: TrainerProgram<D> + ?Sized> TrainerProgram<D> for Box<T> {
    fn run(&mut self, feed: Feed<D>) -> Result<StepOutput, BackendError> {
        (**self).run(feed)
    }
}
