//! Level-of-detail (LoD) tensors: padding-free batches of variable-length sequences.
//!
//! # The problem
//!
//! Sentences in a mini-batch have different lengths. Padding every sentence to
//! the longest one wastes memory and compute, and the recurrent layers then need
//! masks to ignore the padding. A LoD tensor avoids both: all tokens are stored
//! back to back in one column, and a separate **offset index** records where each
//! sequence starts and ends.
//!
//! ```text
//! batch   = [[], [1, 2], []]
//! values  = [1, 2]          (shape [2, 1])
//! offsets = [0, 0, 2, 2]    (sequence i is values[offsets[i]..offsets[i + 1]])
//! ```
//!
//! # Example
//!
//! ```rust
//! use lod_rs::lod::{decode, encode};
//! use lod_rs::tensor::Cpu;
//!
//! let batch = vec![vec![5u32, 6, 7], vec![], vec![8]];
//! let encoded = encode(&batch, Cpu).unwrap();
//!
//! assert_eq!(encoded.values().data(), &[5, 6, 7, 8]);
//! assert_eq!(encoded.offsets(), &[0, 3, 3, 4]);
//! assert_eq!(decode(&encoded), vec![vec![5, 6, 7], vec![], vec![8]]);
//! ```

use crate::tensor::{Cpu, Device, Tensor, TensorElem, TensorError};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;

pub mod encode;

pub use encode::{decode, encode};

/// Reasons a batch is refused before anything is written to the flat buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidInput {
    #[error("batch contains no sequences")]
    EmptyBatch,
    #[error("sequence {sequence}, position {position}: negative token id {value}")]
    NegativeToken {
        sequence: usize,
        position: usize,
        value: i64,
    },
    #[error("sequence {sequence}, position {position}: token id does not fit in i64")]
    UnrepresentableToken { sequence: usize, position: usize },
}

/// Error type for LoD construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LodError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInput),
    #[error("malformed lod: {0}")]
    MalformedLod(String),
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

pub type Result<T> = std::result::Result<T, LodError>;

/// A single-level offset index.
///
/// Always holds at least one element (`0`), is non-decreasing, and has one more
/// entry than there are sequences.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<usize>", into = "Vec<usize>")]
pub struct Lod {
    offsets: Vec<usize>,
}

impl Lod {
    /// Builds offsets by prefix-summing run lengths, left to right.
    pub fn from_lengths<I>(lengths: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        let lengths = lengths.into_iter();
        let mut offsets = Vec::with_capacity(lengths.size_hint().0 + 1);
        let mut cur_len = 0;
        offsets.push(cur_len);
        for len in lengths {
            cur_len += len;
            offsets.push(cur_len);
        }
        Self { offsets }
    }

    /// Validates externally supplied offsets.
    ///
    /// # Errors
    ///
    /// Returns `LodError::MalformedLod` if `offsets` is empty, does not start at
    /// zero, or ever decreases.
    pub fn from_offsets(offsets: Vec<usize>) -> Result<Self> {
        match offsets.first() {
            None => return Err(LodError::MalformedLod("offset index is empty".into())),
            Some(&first) if first != 0 => {
                return Err(LodError::MalformedLod(format!(
                    "offset index must start at 0, got {first}"
                )));
            }
            Some(_) => {}
        }

        if let Some(i) = offsets.windows(2).position(|w| w[1] < w[0]) {
            return Err(LodError::MalformedLod(format!(
                "offset index decreases at position {}: {} -> {}",
                i + 1,
                offsets[i],
                offsets[i + 1]
            )));
        }

        Ok(Self { offsets })
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn num_sequences(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Number of values the index spans (`offsets[last]`).
    pub fn total_len(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    /// Per-sequence run lengths, in order.
    pub fn lengths(&self) -> impl ExactSizeIterator<Item = usize> + '_ {
        self.offsets.windows(2).map(|w| w[1] - w[0])
    }

    /// Value range of sequence `i`, or `None` past the end.
    pub fn range(&self, i: usize) -> Option<Range<usize>> {
        let start = *self.offsets.get(i)?;
        let end = *self.offsets.get(i + 1)?;
        Some(start..end)
    }
}

impl TryFrom<Vec<usize>> for Lod {
    type Error = LodError;

    fn try_from(offsets: Vec<usize>) -> Result<Self> {
        Self::from_offsets(offsets)
    }
}

impl From<Lod> for Vec<usize> {
    fn from(lod: Lod) -> Self {
        lod.offsets
    }
}

/// A flat `[n, 1]` value column partitioned into sequences by a [`Lod`].
///
/// Built once per mini-batch and handed to the execution engine by value.
/// There is no mutating API: the only way to change an encoded batch is to
/// take it apart with [`LodTensor::into_parts`].
#[derive(Clone, Debug, PartialEq)]
pub struct LodTensor<T: TensorElem, D: Device = Cpu> {
    values: Tensor<T, 2, D>,
    lod: Lod,
}

impl<T: TensorElem, D: Device> LodTensor<T, D> {
    /// Pairs a value column with an offset index.
    ///
    /// # Errors
    ///
    /// - `LodError::Tensor` if `values` is not a single column.
    /// - `LodError::MalformedLod` if the index does not span exactly the rows of `values`.
    pub fn from_parts(values: Tensor<T, 2, D>, lod: Lod) -> Result<Self> {
        let [rows, cols] = *values.shape();
        if cols != 1 {
            return Err(TensorError::ShapeMismatch {
                expected: vec![rows, 1],
                got: vec![rows, cols],
            }
            .into());
        }
        if lod.total_len() != rows {
            return Err(LodError::MalformedLod(format!(
                "offset index spans {} values but the column has {rows} rows",
                lod.total_len()
            )));
        }
        Ok(Self { values, lod })
    }

    pub fn values(&self) -> &Tensor<T, 2, D> {
        &self.values
    }

    pub fn lod(&self) -> &Lod {
        &self.lod
    }

    pub fn offsets(&self) -> &[usize] {
        self.lod.offsets()
    }

    pub fn device(&self) -> &D {
        self.values.device()
    }

    /// Depth of the offset index. Encoded batches always carry one level.
    pub fn lod_level(&self) -> usize {
        1
    }

    pub fn num_sequences(&self) -> usize {
        self.lod.num_sequences()
    }

    /// The `i`-th sequence as a slice of the flat buffer.
    pub fn sequence(&self, i: usize) -> Option<&[T]> {
        self.lod.range(i).map(|r| &self.values.data()[r])
    }

    /// Iterates over all sequences in batch order.
    pub fn sequences(&self) -> impl ExactSizeIterator<Item = &[T]> + '_ {
        let data = self.values.data();
        self.lod.offsets().windows(2).map(move |w| &data[w[0]..w[1]])
    }

    pub fn into_parts(self) -> (Tensor<T, 2, D>, Lod) {
        (self.values, self.lod)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lod_from_lengths() {
        let lod = Lod::from_lengths([0, 2, 0]);
        assert_eq!(lod.offsets(), &[0, 0, 2, 2]);
        assert_eq!(lod.num_sequences(), 3);
        assert_eq!(lod.total_len(), 2);
        assert_eq!(lod.lengths().collect::<Vec<_>>(), vec![0, 2, 0]);
        assert_eq!(lod.range(1), Some(0..2));
        assert_eq!(lod.range(3), None);
    }

    #[test]
    fn test_lod_from_lengths_empty() {
        let lod = Lod::from_lengths(std::iter::empty());
        assert_eq!(lod.offsets(), &[0]);
        assert_eq!(lod.num_sequences(), 0);
    }

    #[test]
    fn test_lod_from_offsets_rejects_malformed() {
        assert!(Lod::from_offsets(vec![0, 3, 5]).is_ok());
        assert!(matches!(
            Lod::from_offsets(vec![]),
            Err(LodError::MalformedLod(_))
        ));
        assert!(matches!(
            Lod::from_offsets(vec![1, 3]),
            Err(LodError::MalformedLod(_))
        ));
        assert!(matches!(
            Lod::from_offsets(vec![0, 3, 2]),
            Err(LodError::MalformedLod(_))
        ));
    }

    #[test]
    fn test_lod_serde_validates() {
        let lod: Lod = serde_json::from_str("[0, 1, 4]").unwrap();
        assert_eq!(lod.offsets(), &[0, 1, 4]);
        assert_eq!(serde_json::to_string(&lod).unwrap(), "[0,1,4]");
        assert!(serde_json::from_str::<Lod>("[0, 4, 1]").is_err());
    }

    #[test]
    fn test_from_parts_checks_span() {
        let values = Tensor::column(vec![1i64, 2, 3], Cpu);
        let ok = LodTensor::from_parts(values.clone(), Lod::from_lengths([1, 2])).unwrap();
        assert_eq!(ok.sequence(1), Some(&[2i64, 3][..]));
        assert_eq!(ok.lod_level(), 1);

        let err = LodTensor::from_parts(values, Lod::from_lengths([1, 1]));
        assert!(matches!(err, Err(LodError::MalformedLod(_))));
    }

    #[test]
    fn test_from_parts_requires_column() {
        let values = Tensor::<i64, 2>::new(vec![1, 2, 3, 4], [2, 2]).unwrap();
        let err = LodTensor::from_parts(values, Lod::from_lengths([2]));
        assert!(matches!(err, Err(LodError::Tensor(_))));
    }
}
