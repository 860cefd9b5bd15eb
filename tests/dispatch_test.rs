use lod_rs::cluster::{ClusterConfig, ConfigError, Endpoint, TrainingRole};
use lod_rs::data::Sample;
use lod_rs::feed::{Feed, LABEL, WORDS};
use lod_rs::model::{AdamConfig, StackedLstmConfig};
use lod_rs::tensor::Cpu;
use lod_rs::train::{
    dispatch, Backend, BackendError, JobConfig, ParameterServer, RoleOutcome, StepOutput,
    TrainError, TrainOutcome, TrainerProgram,
};
use std::sync::{Arc, Mutex};

/// Records how the driver used it; every trainer step reports the same output.
#[derive(Default)]
struct MockBackend {
    built: usize,
    served: Vec<Endpoint>,
    step: StepOutput,
    fed_rows: Arc<Mutex<Vec<usize>>>,
}

struct MockTrainer {
    step: StepOutput,
    fed_rows: Arc<Mutex<Vec<usize>>>,
}

impl TrainerProgram<Cpu> for MockTrainer {
    fn run(&mut self, feed: Feed<Cpu>) -> Result<StepOutput, BackendError> {
        let words = feed.lod(WORDS).ok_or_else(|| BackendError::new("no words"))?;
        let label = feed.dense(LABEL).ok_or_else(|| BackendError::new("no label"))?;
        assert_eq!(words.num_sequences(), label.shape()[0]);
        self.fed_rows.lock().unwrap().push(words.num_sequences());
        Ok(self.step)
    }
}

struct MockServer;

impl ParameterServer for MockServer {
    fn serve(&mut self) -> Result<(), BackendError> {
        Ok(())
    }
}

impl Backend for MockBackend {
    type Place = Cpu;
    type Trainer = MockTrainer;
    type Server = MockServer;

    fn place(&self) -> Cpu {
        Cpu
    }

    fn build(
        &mut self,
        model: &StackedLstmConfig,
        _optimizer: &AdamConfig,
        _cluster: &ClusterConfig,
    ) -> Result<(), BackendError> {
        assert!(model.validate().is_ok());
        self.built += 1;
        Ok(())
    }

    fn trainer(&mut self) -> Result<MockTrainer, BackendError> {
        Ok(MockTrainer {
            step: self.step,
            fed_rows: Arc::clone(&self.fed_rows),
        })
    }

    fn pserver(&mut self, endpoint: &Endpoint) -> Result<MockServer, BackendError> {
        self.served.push(endpoint.clone());
        Ok(MockServer)
    }
}

fn samples(n: usize) -> Vec<Sample> {
    (0..n)
        .map(|i| Sample::new((0..(i % 7) as i64).collect(), (i % 2) as i64))
        .collect()
}

fn job(cluster: ClusterConfig) -> JobConfig {
    let mut job = JobConfig {
        cluster,
        model: StackedLstmConfig::new(100),
        ..JobConfig::default()
    };
    job.train.batch_size = 4;
    job.train.pass_num = 2;
    job.train.shuffle_buffer = 8;
    job.train.seed = Some(7);
    job
}

#[test]
fn test_trainer_role_runs_every_pass() {
    let mut backend = MockBackend {
        step: StepOutput {
            cost: 2.0,
            accuracy: 0.5,
        },
        ..MockBackend::default()
    };

    let outcome = dispatch(&job(ClusterConfig::default()), &mut backend, samples(10)).unwrap();

    assert_eq!(backend.built, 1);
    assert!(backend.served.is_empty());
    assert_eq!(*backend.fed_rows.lock().unwrap(), vec![4, 4, 2, 4, 4, 2]);
    match outcome {
        RoleOutcome::Trainer(TrainOutcome::Completed {
            passes,
            steps,
            pass_accuracy,
        }) => {
            assert_eq!(passes, 2);
            // 10 samples in batches of 4: 4 + 4 + 2, twice.
            assert_eq!(steps, 6);
            assert!((pass_accuracy - 0.5).abs() < 0.11);
        }
        other => panic!("expected a completed trainer, got {other:?}"),
    }
}

#[test]
fn test_trainer_role_stops_early() {
    let mut backend = MockBackend {
        step: StepOutput {
            cost: 0.5,
            accuracy: 0.9,
        },
        ..MockBackend::default()
    };

    let outcome = dispatch(&job(ClusterConfig::default()), &mut backend, samples(10)).unwrap();

    match outcome {
        RoleOutcome::Trainer(outcome) => {
            assert!(outcome.converged());
            assert_eq!(outcome.steps(), 1);
        }
        other => panic!("expected a trainer outcome, got {other:?}"),
    }
}

#[test]
fn test_pserver_role_serves_current_endpoint() {
    let cluster = ClusterConfig::from_lookup(|key: &str| match key {
        "PSERVERS" => Some("10.0.0.1:6174,10.0.0.2:6174".to_string()),
        "SERVER_ENDPOINT" => Some("10.0.0.2:6174".to_string()),
        "TRAINING_ROLE" => Some("PSERVER".to_string()),
        _ => None,
    })
    .unwrap();
    let mut backend = MockBackend::default();

    let outcome = dispatch(&job(cluster), &mut backend, Vec::new()).unwrap();

    let endpoint = Endpoint::new("10.0.0.2", 6174);
    assert_eq!(outcome, RoleOutcome::Pserver { endpoint: endpoint.clone() });
    assert_eq!(backend.served, vec![endpoint]);
    assert_eq!(backend.built, 1);
}

#[test]
fn test_pserver_without_endpoint_fails_before_build() {
    let cluster = ClusterConfig {
        role: TrainingRole::Pserver,
        ..ClusterConfig::default()
    };
    let mut backend = MockBackend::default();

    let err = dispatch(&job(cluster), &mut backend, Vec::new()).unwrap_err();

    assert!(matches!(
        err,
        TrainError::Config(ConfigError::MissingServerEndpoint)
    ));
    assert_eq!(backend.built, 0);
}

#[test]
fn test_negative_token_surfaces_as_feed_error() {
    let mut backend = MockBackend {
        step: StepOutput {
            cost: 2.0,
            accuracy: 0.5,
        },
        ..MockBackend::default()
    };
    let mut data = samples(3);
    data[1].words = vec![4, -1];

    let err = dispatch(&job(ClusterConfig::default()), &mut backend, data).unwrap_err();

    assert!(matches!(err, TrainError::Feed(_)));
}

#[test]
fn test_job_config_defaults_from_json() {
    let job: JobConfig = serde_json::from_str(r#"{"model": {"input_dim": 5147}}"#).unwrap();
    assert_eq!(job.model.input_dim, 5147);
    assert_eq!(job.model.stacked_num, 3);
    assert_eq!(job.train.batch_size, 100);
    assert_eq!(job.cluster.role, TrainingRole::Trainer);
    assert!(job.validate().is_ok());
}
