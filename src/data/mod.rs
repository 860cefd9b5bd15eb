//! Data loading and batching utilities.
//!
//! This module turns a collection of labelled token sequences into mini-batches.
//!
//! # Components
//!
//! - **Dataset**: A trait for accessing individual samples by index.
//! - **Sampler**: A trait for determining the order of data access.
//! - **ShuffleBuffer**: A streaming reader that shuffles within a bounded window.
//! - **DataLoader**: An iterator that batches and collates data from a Dataset.

pub mod loader;
pub mod sampler;
pub mod shuffle;

pub use loader::{Collate, DataLoader, DefaultCollate};
pub use sampler::{RandomSampler, Sampler, SequentialSampler, WindowedShuffleSampler};
pub use shuffle::ShuffleBuffer;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Error type for data pipeline construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataError {
    #[error("batch size must be greater than zero")]
    ZeroBatchSize,
    #[error("shuffle buffer size must be greater than zero")]
    ZeroBufferSize,
}

/// One labelled training example: a tokenized sentence and its class.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub words: Vec<i64>,
    pub label: i64,
}

impl Sample {
    pub fn new(words: Vec<i64>, label: i64) -> Self {
        Self { words, label }
    }
}

/// A trait for accessing data items.
///
/// # Type Parameters
///
/// * `T`: The type of the data item returned by `get`.
pub trait Dataset<T>: Send + Sync {
    /// Returns the total number of items in the dataset.
    fn len(&self) -> usize;

    /// Returns `true` if the dataset is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the item at the given index.
    ///
    /// # Panics
    ///
    /// May panic if `index` is out of bounds.
    fn get(&self, index: usize) -> T;
}

impl<T: Clone + Send + Sync> Dataset<T> for Vec<T> {
    fn len(&self) -> usize {
        self.len()
    }

    fn get(&self, index: usize) -> T {
        self[index].clone()
    }
}

// Lets several loaders (e.g. one per pass) share one copy of the data.
impl<T, D: Dataset<T>> Dataset<T> for Arc<D> {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn get(&self, index: usize) -> T {
        (**self).get(index)
    }
}
