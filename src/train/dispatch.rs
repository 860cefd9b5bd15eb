//! Role dispatch.

use super::{run_trainer, Backend, ParameterServer, Result, TrainConfig, TrainOutcome};
use crate::cluster::{ClusterConfig, ConfigError, Endpoint, TrainingRole};
use crate::data::Sample;
use crate::feed::DataFeeder;
use crate::model::{AdamConfig, StackedLstmConfig};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Everything one process needs to take part in a training job.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub cluster: ClusterConfig,
    pub model: StackedLstmConfig,
    pub optimizer: AdamConfig,
    pub train: TrainConfig,
}

impl JobConfig {
    /// Validates every section.
    pub fn validate(&self) -> Result<()> {
        self.cluster.validate()?;
        self.model.validate()?;
        self.train.validate()?;
        Ok(())
    }
}

/// What this process did.
#[derive(Clone, Debug, PartialEq)]
pub enum RoleOutcome {
    Trainer(TrainOutcome),
    /// The parameter server on `endpoint` ran until the job released it.
    Pserver { endpoint: Endpoint },
}

/// Builds the program on `backend` and runs the role named in `job.cluster`.
///
/// Parameter servers ignore `samples`.
///
/// # Errors
///
/// Configuration problems are reported before the backend is touched.
pub fn dispatch<B: Backend>(
    job: &JobConfig,
    backend: &mut B,
    samples: Vec<Sample>,
) -> Result<RoleOutcome> {
    job.validate()?;

    info!(
        role = %job.cluster.role,
        pservers = job.cluster.pserver_endpoints.len(),
        trainers = job.cluster.trainers,
        "building program"
    );
    backend.build(&job.model, &job.optimizer, &job.cluster)?;

    match job.cluster.role {
        TrainingRole::Pserver => {
            let endpoint = job
                .cluster
                .current_endpoint
                .clone()
                .ok_or(ConfigError::MissingServerEndpoint)?;
            info!(%endpoint, "starting parameter server");
            backend.pserver(&endpoint)?.serve()?;
            Ok(RoleOutcome::Pserver { endpoint })
        }
        TrainingRole::Trainer => {
            let mut program = backend.trainer()?;
            let feeder = DataFeeder::sentiment(backend.place());
            info!(samples = samples.len(), "starting trainer");
            let outcome = run_trainer(&mut program, samples, &feeder, &job.train)?;
            Ok(RoleOutcome::Trainer(outcome))
        }
    }
}
