//! The trainer loop.

use super::{Result, StepOutput, TrainerProgram};
use crate::data::{DataError, DataLoader, Sample, WindowedShuffleSampler};
use crate::feed::DataFeeder;
use crate::metrics::Accuracy;
use crate::tensor::Device;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Stop as soon as one batch is both cheap and accurate enough.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EarlyStop {
    pub max_cost: f32,
    pub min_accuracy: f32,
}

impl Default for EarlyStop {
    fn default() -> Self {
        Self {
            max_cost: 1.0,
            min_accuracy: 0.8,
        }
    }
}

impl EarlyStop {
    /// `cost < max_cost && accuracy > min_accuracy`. Both bounds are strict.
    pub fn reached(&self, step: &StepOutput) -> bool {
        step.cost < self.max_cost && step.accuracy > self.min_accuracy
    }
}

/// Loop settings for the trainer role.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub batch_size: usize,
    pub pass_num: usize,
    /// Window of the shuffle reader, in samples.
    pub shuffle_buffer: usize,
    pub early_stop: EarlyStop,
    /// Base seed for shuffling; pass `p` uses `seed + p`. OS entropy when unset.
    pub seed: Option<u64>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            pass_num: 5,
            shuffle_buffer: 1000,
            early_stop: EarlyStop::default(),
            seed: None,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> std::result::Result<(), DataError> {
        if self.batch_size == 0 {
            return Err(DataError::ZeroBatchSize);
        }
        if self.shuffle_buffer == 0 {
            return Err(DataError::ZeroBufferSize);
        }
        Ok(())
    }

    fn sampler(&self, pass: usize) -> std::result::Result<WindowedShuffleSampler, DataError> {
        let sampler = WindowedShuffleSampler::new(self.shuffle_buffer)?;
        Ok(match self.seed {
            Some(seed) => sampler.with_seed(seed.wrapping_add(pass as u64)),
            None => sampler,
        })
    }
}

/// How the trainer loop ended.
#[derive(Clone, Debug, PartialEq)]
pub enum TrainOutcome {
    /// A batch met the early-stop rule.
    Converged {
        pass: usize,
        /// Steps run so far, counting the converging one.
        steps: usize,
        cost: f32,
        accuracy: f32,
        pass_accuracy: f32,
    },
    /// All passes ran without meeting the early-stop rule.
    Completed {
        passes: usize,
        steps: usize,
        /// Accuracy accumulated over the final pass.
        pass_accuracy: f32,
    },
}

impl TrainOutcome {
    pub fn converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }

    pub fn steps(&self) -> usize {
        match self {
            Self::Converged { steps, .. } | Self::Completed { steps, .. } => *steps,
        }
    }
}

/// Runs up to `config.pass_num` passes of `samples` through `program`.
///
/// Each pass resets the accuracy evaluator, reshuffles through a
/// `shuffle_buffer` window and feeds mini-batches of `batch_size`.
///
/// # Errors
///
/// Fails on an invalid `config`, on a sample that cannot be fed (e.g. negative
/// token ids), or when the program reports an error. Nothing is retried.
pub fn run_trainer<P, D>(
    program: &mut P,
    samples: Vec<Sample>,
    feeder: &DataFeeder<D>,
    config: &TrainConfig,
) -> Result<TrainOutcome>
where
    P: TrainerProgram<D> + ?Sized,
    D: Device,
{
    config.validate()?;

    let samples = Arc::new(samples);
    let mut accuracy = Accuracy::new();
    let mut steps = 0;

    for pass in 0..config.pass_num {
        accuracy.reset();

        let loader = DataLoader::<_, Sample>::new(Arc::clone(&samples), config.batch_size)?
            .with_sampler(config.sampler(pass)?)
            .with_collate(feeder.clone());

        for feed in loader.iter() {
            let feed = feed?;
            let batch_size = feed.batch_size();

            let step = program.run(feed)?;
            steps += 1;
            accuracy.update(step.accuracy, batch_size);
            let pass_accuracy = accuracy.eval();

            info!(
                pass,
                step = steps,
                cost = step.cost,
                acc = step.accuracy,
                pass_acc = pass_accuracy,
                "trained batch"
            );

            if config.early_stop.reached(&step) {
                info!(pass, steps, "early-stop criterion met");
                return Ok(TrainOutcome::Converged {
                    pass,
                    steps,
                    cost: step.cost,
                    accuracy: step.accuracy,
                    pass_accuracy,
                });
            }
        }

        info!(pass, pass_acc = accuracy.eval(), "pass finished");
    }

    Ok(TrainOutcome::Completed {
        passes: config.pass_num,
        steps,
        pass_accuracy: accuracy.eval(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{Feed, FeedError, LABEL, WORDS};
    use crate::tensor::Cpu;
    use crate::train::{BackendError, TrainError};

    /// Replays a scripted sequence of step outputs and records what it was fed.
    struct Scripted {
        outputs: Vec<StepOutput>,
        fed: Vec<(usize, Vec<usize>)>,
    }

    impl Scripted {
        fn new(outputs: Vec<StepOutput>) -> Self {
            Self {
                outputs,
                fed: Vec::new(),
            }
        }
    }

    impl TrainerProgram for Scripted {
        fn run(&mut self, feed: Feed) -> std::result::Result<StepOutput, BackendError> {
            let words = feed.lod(WORDS).ok_or_else(|| BackendError::new("no words"))?;
            let labels = feed.dense(LABEL).ok_or_else(|| BackendError::new("no label"))?;
            assert_eq!(words.num_sequences(), labels.rows());
            self.fed.push((feed.batch_size(), words.offsets().to_vec()));

            let i = (self.fed.len() - 1).min(self.outputs.len() - 1);
            Ok(self.outputs[i])
        }
    }

    fn samples(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| Sample::new(vec![i as i64; i % 4], (i % 2) as i64))
            .collect()
    }

    fn config(batch_size: usize, pass_num: usize) -> TrainConfig {
        TrainConfig {
            batch_size,
            pass_num,
            shuffle_buffer: 8,
            seed: Some(42),
            ..TrainConfig::default()
        }
    }

    fn step(cost: f32, accuracy: f32) -> StepOutput {
        StepOutput { cost, accuracy }
    }

    fn train<P: TrainerProgram>(
        program: &mut P,
        data: Vec<Sample>,
        config: &TrainConfig,
    ) -> Result<TrainOutcome> {
        run_trainer(program, data, &DataFeeder::sentiment(Cpu), config)
    }

    #[test]
    fn test_defaults() {
        let config = TrainConfig::default();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.pass_num, 5);
        assert_eq!(config.shuffle_buffer, 1000);
        assert_eq!(config.early_stop, EarlyStop { max_cost: 1.0, min_accuracy: 0.8 });
    }

    #[test]
    fn test_early_stop_is_strict() {
        let rule = EarlyStop::default();
        assert!(rule.reached(&step(0.99, 0.81)));
        assert!(!rule.reached(&step(1.0, 0.9)));
        assert!(!rule.reached(&step(0.5, 0.8)));
    }

    #[test]
    fn test_runs_all_passes() {
        let mut program = Scripted::new(vec![step(2.0, 0.5)]);
        let outcome = train(&mut program, samples(10), &config(4, 3)).unwrap();

        // 10 samples in batches of 4: 4, 4, 2 per pass.
        assert_eq!(
            outcome,
            TrainOutcome::Completed {
                passes: 3,
                steps: 9,
                pass_accuracy: 0.5,
            }
        );
        let sizes: Vec<usize> = program.fed.iter().map(|(n, _)| *n).collect();
        assert_eq!(sizes, vec![4, 4, 2, 4, 4, 2, 4, 4, 2]);
    }

    #[test]
    fn test_stops_early() {
        let mut program = Scripted::new(vec![step(3.0, 0.4), step(1.5, 0.7), step(0.6, 0.85)]);
        let outcome = train(&mut program, samples(20), &config(5, 5)).unwrap();

        assert!(outcome.converged());
        assert_eq!(outcome.steps(), 3);
        match outcome {
            TrainOutcome::Converged { pass, cost, .. } => {
                assert_eq!(pass, 0);
                assert_eq!(cost, 0.6);
            }
            other => panic!("expected convergence, got {other:?}"),
        }
        assert_eq!(program.fed.len(), 3);
    }

    #[test]
    fn test_offsets_match_batches() {
        let mut program = Scripted::new(vec![step(2.0, 0.0)]);
        train(&mut program, samples(12), &config(3, 1)).unwrap();

        for (n, offsets) in &program.fed {
            assert_eq!(offsets.len(), n + 1);
            assert_eq!(offsets[0], 0);
            assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
        }
        let total: usize = program.fed.iter().map(|(_, o)| o[o.len() - 1]).sum();
        let expected: usize = samples(12).iter().map(|s| s.words.len()).sum();
        assert_eq!(total, expected);
    }

    #[test]
    fn test_bad_sample_aborts() {
        let mut data = samples(4);
        data[2].words = vec![-7];
        let mut program = Scripted::new(vec![step(2.0, 0.0)]);
        let err = train(&mut program, data, &config(4, 1)).unwrap_err();
        assert!(matches!(err, TrainError::Feed(FeedError::Encode { .. })));
        assert!(program.fed.is_empty());
    }

    #[test]
    fn test_invalid_config() {
        let mut program = Scripted::new(vec![step(2.0, 0.0)]);
        let err = train(&mut program, samples(4), &config(0, 1)).unwrap_err();
        assert!(matches!(err, TrainError::Data(DataError::ZeroBatchSize)));
    }

    #[test]
    fn test_backend_error_propagates() {
        struct Failing;
        impl TrainerProgram for Failing {
            fn run(&mut self, _feed: Feed) -> std::result::Result<StepOutput, BackendError> {
                Err(BackendError::new("out of memory"))
            }
        }

        let err = train(&mut Failing, samples(4), &config(2, 1)).unwrap_err();
        assert!(matches!(err, TrainError::Backend(ref e) if e.message() == "out of memory"));
    }
}
