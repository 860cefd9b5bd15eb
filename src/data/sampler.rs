//! Strategies for sampling indices from a dataset.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::num::NonZeroUsize;

use super::{DataError, ShuffleBuffer};

/// A trait for determining the order of data access.
pub trait Sampler: Send + Sync {
    /// Returns the visiting order for a dataset of length `len`.
    fn sample(&self, len: usize) -> Vec<usize>;
}

/// Samples elements sequentially, always in the same order.
pub struct SequentialSampler;

impl Sampler for SequentialSampler {
    fn sample(&self, len: usize) -> Vec<usize> {
        (0..len).collect()
    }
}

/// Samples elements randomly (without replacement).
///
/// With a seed, the permutation is reproducible across runs.
#[derive(Default)]
pub struct RandomSampler {
    seed: Option<u64>,
}

impl RandomSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }
}

impl Sampler for RandomSampler {
    fn sample(&self, len: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..len).collect();
        match self.seed {
            Some(seed) => indices.shuffle(&mut StdRng::seed_from_u64(seed)),
            None => indices.shuffle(&mut rand::rng()),
        }
        indices
    }
}

/// Visits indices through a [`ShuffleBuffer`] of `buf_size`.
///
/// An index never moves more than one window away from where it started.
pub struct WindowedShuffleSampler {
    buf_size: NonZeroUsize,
    seed: Option<u64>,
}

impl WindowedShuffleSampler {
    /// # Errors
    ///
    /// Returns `DataError::ZeroBufferSize` if `buf_size` is zero.
    pub fn new(buf_size: usize) -> Result<Self, DataError> {
        let buf_size = NonZeroUsize::new(buf_size).ok_or(DataError::ZeroBufferSize)?;
        Ok(Self {
            buf_size,
            seed: None,
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Sampler for WindowedShuffleSampler {
    fn sample(&self, len: usize) -> Vec<usize> {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        ShuffleBuffer::from_rng(0..len, self.buf_size, rng).collect()
    }
}
