//! DataLoader implementation.

use super::{DataError, Dataset, RandomSampler, Sampler, SequentialSampler};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Trait for collating a list of items into a batch.
pub trait Collate<T> {
    /// The type of the batched output (e.g., a `Feed`, `Vec<T>`).
    type Output;

    /// Collates a vector of items into a single batch.
    fn collate(&self, batch: Vec<T>) -> Self::Output;
}

/// A default collator that just returns the `Vec<T>`.
pub struct DefaultCollate;

impl<T> Collate<T> for DefaultCollate {
    type Output = Vec<T>;

    fn collate(&self, batch: Vec<T>) -> Self::Output {
        batch
    }
}

/// Data loader.
///
/// Combines a dataset, a sampler and a collator, and provides an iterable over
/// mini-batches of the dataset.
///
/// # Type Parameters
///
/// * `D`: The dataset type.
/// * `T`: The item type returned by the dataset.
/// * `C`: The collator type (defaults to `DefaultCollate`).
pub struct DataLoader<D, T, C = DefaultCollate>
where
    D: Dataset<T>,
    C: Collate<T>,
{
    dataset: Arc<D>,
    batch_size: usize,
    sampler: Box<dyn Sampler>,
    collate: Arc<C>,
    drop_last: bool,
    _marker: PhantomData<T>,
}

impl<D, T> DataLoader<D, T, DefaultCollate>
where
    D: Dataset<T> + 'static,
{
    /// Creates a new DataLoader with default collation and sequential order.
    ///
    /// # Errors
    ///
    /// Returns `DataError::ZeroBatchSize` if `batch_size` is zero.
    pub fn new(dataset: D, batch_size: usize) -> Result<Self, DataError> {
        if batch_size == 0 {
            return Err(DataError::ZeroBatchSize);
        }
        Ok(Self {
            dataset: Arc::new(dataset),
            batch_size,
            sampler: Box::new(SequentialSampler),
            collate: Arc::new(DefaultCollate),
            drop_last: false,
            _marker: PhantomData,
        })
    }
}

impl<D, T, C> DataLoader<D, T, C>
where
    D: Dataset<T> + 'static,
    C: Collate<T>,
{
    /// Replaces the collator.
    pub fn with_collate<C2: Collate<T>>(self, collate: C2) -> DataLoader<D, T, C2> {
        DataLoader {
            dataset: self.dataset,
            batch_size: self.batch_size,
            sampler: self.sampler,
            collate: Arc::new(collate),
            drop_last: self.drop_last,
            _marker: PhantomData,
        }
    }

    /// Sets the sampler to use.
    pub fn with_sampler(mut self, sampler: impl Sampler + 'static) -> Self {
        self.sampler = Box::new(sampler);
        self
    }

    /// Sets whether to shuffle the data (uses `RandomSampler`).
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        if shuffle {
            self.sampler = Box::new(RandomSampler::new());
        } else {
            self.sampler = Box::new(SequentialSampler);
        }
        self
    }

    /// Sets whether to drop the last incomplete batch.
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches one pass over the dataset yields.
    pub fn num_batches(&self) -> usize {
        let len = self.dataset.len();
        if self.drop_last {
            len / self.batch_size
        } else {
            len.div_ceil(self.batch_size)
        }
    }

    /// Returns an iterator over one pass of the dataset.
    ///
    /// Each call draws a fresh visiting order from the sampler.
    pub fn iter(&self) -> DataLoaderIter<D, T, C> {
        let indices = self.sampler.sample(self.dataset.len());
        DataLoaderIter {
            dataset: self.dataset.clone(),
            collate: self.collate.clone(),
            indices,
            batch_size: self.batch_size,
            current_idx: 0,
            drop_last: self.drop_last,
            _marker: PhantomData,
        }
    }
}

impl<D, T, C> IntoIterator for DataLoader<D, T, C>
where
    D: Dataset<T> + 'static,
    C: Collate<T>,
{
    type Item = C::Output;
    type IntoIter = DataLoaderIter<D, T, C>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator for DataLoader.
pub struct DataLoaderIter<D, T, C>
where
    D: Dataset<T>,
    C: Collate<T>,
{
    dataset: Arc<D>,
    collate: Arc<C>,
    indices: Vec<usize>,
    batch_size: usize,
    current_idx: usize,
    drop_last: bool,
    _marker: PhantomData<T>,
}

impl<D, T, C> Iterator for DataLoaderIter<D, T, C>
where
    D: Dataset<T>,
    C: Collate<T>,
{
    type Item = C::Output;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_idx >= self.indices.len() {
            return None;
        }

        let remaining = self.indices.len() - self.current_idx;
        if self.drop_last && remaining < self.batch_size {
            debug!(remaining, "dropping incomplete last batch");
            self.current_idx = self.indices.len();
            return None;
        }

        let take = remaining.min(self.batch_size);
        let batch_indices = &self.indices[self.current_idx..self.current_idx + take];
        self.current_idx += take;

        let batch: Vec<T> = batch_indices
            .iter()
            .map(|&idx| self.dataset.get(idx))
            .collect();

        Some(self.collate.collate(batch))
    }
}
