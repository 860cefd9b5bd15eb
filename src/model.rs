//! Declarative description of the stacked LSTM sentiment classifier.
//!
//! Nothing here runs a kernel. The config and its layer plan are what a
//! [`Backend`](crate::train::Backend) needs to build the network in its own
//! framework:
//!
//! ```text
//! words ─► embedding ─► fc₁ ─► lstm₁
//!                        └──────┴──► fc₂ ─► lstm₂ (reverse)
//!                                     └──────┴──► fc₃ ─► lstm₃
//!                                                  │       │
//!                                            max-pool  max-pool
//!                                                  └───┬───┘
//!                                                fc (softmax) ─► cross-entropy ─► mean
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("stacked_num must be odd, got {0}")]
    EvenStackDepth(usize),
    #[error("{0} must be greater than zero")]
    ZeroDim(&'static str),
}

/// Hyper-parameters of the stacked LSTM classifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackedLstmConfig {
    /// Vocabulary size (rows of the embedding table).
    pub input_dim: usize,
    pub class_dim: usize,
    pub emb_dim: usize,
    pub hid_dim: usize,
    /// Number of fc/lstm pairs. Must be odd so the last LSTM runs forward.
    pub stacked_num: usize,
}

impl Default for StackedLstmConfig {
    fn default() -> Self {
        Self {
            input_dim: 0,
            class_dim: 2,
            emb_dim: 128,
            hid_dim: 512,
            stacked_num: 3,
        }
    }
}

impl StackedLstmConfig {
    /// Default hyper-parameters for a vocabulary of `input_dim` words.
    pub fn new(input_dim: usize) -> Self {
        Self {
            input_dim,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        for (name, dim) in [
            ("input_dim", self.input_dim),
            ("class_dim", self.class_dim),
            ("emb_dim", self.emb_dim),
            ("hid_dim", self.hid_dim),
        ] {
            if dim == 0 {
                return Err(ModelError::ZeroDim(name));
            }
        }
        if self.stacked_num % 2 == 0 {
            return Err(ModelError::EvenStackDepth(self.stacked_num));
        }
        Ok(())
    }

    /// The layers of the network, in construction order.
    ///
    /// Layer inputs refer to earlier entries by index.
    pub fn layers(&self) -> Vec<Layer> {
        let mut layers = vec![
            Layer::Embedding {
                vocab: self.input_dim,
                dim: self.emb_dim,
            },
            Layer::Fc {
                inputs: vec![0],
                size: self.hid_dim,
                act: Activation::Linear,
            },
            Layer::Lstm {
                input: 1,
                size: self.hid_dim,
                is_reverse: false,
            },
        ];

        let (mut fc, mut lstm) = (1, 2);
        for i in 2..=self.stacked_num {
            layers.push(Layer::Fc {
                inputs: vec![fc, lstm],
                size: self.hid_dim,
                act: Activation::Linear,
            });
            fc = layers.len() - 1;
            layers.push(Layer::Lstm {
                input: fc,
                size: self.hid_dim,
                is_reverse: i % 2 == 0,
            });
            lstm = layers.len() - 1;
        }

        layers.push(Layer::SequencePool {
            input: fc,
            pool: PoolType::Max,
        });
        layers.push(Layer::SequencePool {
            input: lstm,
            pool: PoolType::Max,
        });
        let pooled = layers.len();
        layers.push(Layer::Fc {
            inputs: vec![pooled - 2, pooled - 1],
            size: self.class_dim,
            act: Activation::Softmax,
        });
        layers.push(Layer::CrossEntropy { input: pooled });
        layers.push(Layer::Mean { input: pooled + 1 });
        layers
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Linear,
    Softmax,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolType {
    Max,
    Average,
    Sum,
}

/// One node of the network's layer plan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Layer {
    /// Lookup table over the `words` input.
    Embedding { vocab: usize, dim: usize },
    Fc {
        inputs: Vec<usize>,
        size: usize,
        act: Activation,
    },
    /// Recurrence over each LoD sequence, optionally right to left.
    Lstm {
        input: usize,
        size: usize,
        is_reverse: bool,
    },
    /// Reduces each sequence to one row.
    SequencePool { input: usize, pool: PoolType },
    /// Per-sample loss against the `label` input.
    CrossEntropy { input: usize },
    Mean { input: usize },
}

/// Adam optimizer settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamConfig {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.002,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}
