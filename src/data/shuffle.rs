//! Windowed shuffling for streaming readers.
//!
//! A dataset that arrives as a stream cannot be permuted globally without
//! holding all of it in memory. `ShuffleBuffer` trades randomness for memory:
//! it reads `buf_size` items, shuffles them, hands them out, and repeats.
//! With `buf_size >= len` it is a full shuffle.

use super::DataError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::num::NonZeroUsize;

/// Iterator adaptor that shuffles its input within windows of `buf_size` items.
pub struct ShuffleBuffer<I: Iterator> {
    inner: I,
    buf_size: NonZeroUsize,
    buffer: Vec<I::Item>,
    rng: StdRng,
}

impl<I: Iterator> ShuffleBuffer<I> {
    /// Wraps `inner` with an OS-seeded shuffle window.
    ///
    /// # Errors
    ///
    /// Returns `DataError::ZeroBufferSize` if `buf_size` is zero.
    pub fn new(inner: I, buf_size: usize) -> Result<Self, DataError> {
        Self::with_rng(inner, buf_size, StdRng::from_os_rng())
    }

    /// Wraps `inner` with a reproducible shuffle window.
    pub fn with_seed(inner: I, buf_size: usize, seed: u64) -> Result<Self, DataError> {
        Self::with_rng(inner, buf_size, StdRng::seed_from_u64(seed))
    }

    fn with_rng(inner: I, buf_size: usize, rng: StdRng) -> Result<Self, DataError> {
        let buf_size = NonZeroUsize::new(buf_size).ok_or(DataError::ZeroBufferSize)?;
        Ok(Self::from_rng(inner, buf_size, rng))
    }

    pub(crate) fn from_rng(inner: I, buf_size: NonZeroUsize, rng: StdRng) -> Self {
        Self {
            inner,
            buf_size,
            buffer: Vec::with_capacity(buf_size.get()),
            rng,
        }
    }

    fn refill(&mut self) {
        self.buffer.extend(self.inner.by_ref().take(self.buf_size.get()));
        self.buffer.shuffle(&mut self.rng);
    }
}

impl<I: Iterator> Iterator for ShuffleBuffer<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() {
            self.refill();
        }
        self.buffer.pop()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (lo, hi) = self.inner.size_hint();
        let buffered = self.buffer.len();
        (
            lo.saturating_add(buffered),
            hi.and_then(|hi| hi.checked_add(buffered)),
        )
    }
}
