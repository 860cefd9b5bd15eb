//! The sequence batch encoder.

use super::{InvalidInput, Lod, LodTensor, Result};
use crate::tensor::{Device, Tensor, TensorElem};
use num_traits::PrimInt;
use rayon::prelude::*;
use tracing::debug;

/// Encodes a batch of token sequences into an `i64` LoD tensor placed on `place`.
///
/// Sequences keep their order, and so do the tokens inside each one. Empty
/// sequences become zero-length runs.
///
/// # Errors
///
/// Returns `LodError::InvalidInput` if the batch is empty or any token is
/// negative or does not fit in `i64`. The first offending token in batch order
/// is reported.
pub fn encode<S, I, D>(batch: &[S], place: D) -> Result<LodTensor<i64, D>>
where
    S: AsRef<[I]> + Sync,
    I: PrimInt + Sync,
    D: Device,
{
    if batch.is_empty() {
        return Err(InvalidInput::EmptyBatch.into());
    }

    if let Some(err) = batch
        .par_iter()
        .enumerate()
        .find_map_first(|(i, seq)| check_sequence(i, seq.as_ref()))
    {
        return Err(err.into());
    }

    let lod = Lod::from_lengths(batch.iter().map(|seq| seq.as_ref().len()));

    let mut values = Vec::with_capacity(lod.total_len());
    for seq in batch {
        values.extend(seq.as_ref().iter().filter_map(|tok| tok.to_i64()));
    }

    debug!(
        sequences = lod.num_sequences(),
        tokens = values.len(),
        device = place.name(),
        "encoded batch"
    );

    LodTensor::from_parts(Tensor::column(values, place), lod)
}

/// Splits the flat buffer back into owned sequences.
pub fn decode<T: TensorElem, D: Device>(tensor: &LodTensor<T, D>) -> Vec<Vec<T>> {
    tensor.sequences().map(<[T]>::to_vec).collect()
}

fn check_sequence<I: PrimInt>(sequence: usize, tokens: &[I]) -> Option<InvalidInput> {
    tokens
        .iter()
        .enumerate()
        .find_map(|(position, tok)| match tok.to_i64() {
            None => Some(InvalidInput::UnrepresentableToken { sequence, position }),
            Some(value) if value < 0 => Some(InvalidInput::NegativeToken {
                sequence,
                position,
                value,
            }),
            Some(_) => None,
        })
}
