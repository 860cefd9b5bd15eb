//! Turning a batch of samples into named inputs for one execution step.
//!
//! A [`DataFeeder`] is declared with an ordered list of [`FeedVar`]s. Slot `i`
//! of every sample is routed to feed variable `i`:
//!
//! - `lod_level == 1`: the slot is a token sequence; the column is encoded into
//!   a [`LodTensor`] with [`lod::encode`](crate::lod::encode).
//! - `lod_level == 0`: the slot is a fixed-size value (usually one label); the
//!   column becomes a dense `[batch, prod(shape)]` tensor.
//!
//! ```rust
//! use lod_rs::data::Sample;
//! use lod_rs::feed::DataFeeder;
//! use lod_rs::tensor::Cpu;
//!
//! let feeder = DataFeeder::sentiment(Cpu);
//! let batch = vec![Sample::new(vec![4, 8, 15], 1), Sample::new(vec![16], 0)];
//! let feed = feeder.feed(&batch).unwrap();
//!
//! assert_eq!(feed.lod("words").unwrap().offsets(), &[0, 3, 4]);
//! assert_eq!(feed.dense("label").unwrap().data(), &[1, 0]);
//! ```

use crate::data::{Collate, Sample};
use crate::lod::{self, InvalidInput, LodError, LodTensor};
use crate::tensor::{Cpu, Device, Tensor, TensorError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Name of the token-sequence input of the sentiment network.
pub const WORDS: &str = "words";
/// Name of the class-label input of the sentiment network.
pub const LABEL: &str = "label";

/// Error type for feeding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("feed list is empty")]
    EmptyFeedList,
    #[error("feed variable `{0}` is declared twice")]
    DuplicateVar(String),
    #[error("feed variable `{name}`: lod level {lod_level} is not supported (expected 0 or 1)")]
    UnsupportedLodLevel { name: String, lod_level: usize },
    #[error("feed variable `{name}`: shape {shape:?} has too many elements")]
    InvalidShape { name: String, shape: Vec<usize> },
    #[error("sample {sample} has no slot for feed variable `{name}`")]
    MissingSlot { name: String, sample: usize },
    #[error("sample {sample}: feed variable `{name}` expects {expected} value(s), got {got}")]
    SlotSizeMismatch {
        name: String,
        sample: usize,
        expected: usize,
        got: usize,
    },
    #[error("sample {sample}: feed variable `{name}` has negative value {value}")]
    NegativeValue {
        name: String,
        sample: usize,
        value: i64,
    },
    #[error("feed variable `{name}`: {source}")]
    Encode {
        name: String,
        #[source]
        source: LodError,
    },
    #[error(transparent)]
    Lod(#[from] LodError),
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

pub type Result<T> = std::result::Result<T, FeedError>;

/// Declaration of one named input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedVar {
    pub name: String,
    /// Per-sample shape for dense inputs. Ignored for sequence inputs.
    #[serde(default = "default_shape")]
    pub shape: Vec<usize>,
    #[serde(default)]
    pub lod_level: usize,
}

fn default_shape() -> Vec<usize> {
    vec![1]
}

impl FeedVar {
    /// A variable-length token-sequence input.
    pub fn sequence(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shape: default_shape(),
            lod_level: 1,
        }
    }

    /// A dense input with a fixed per-sample shape.
    pub fn dense(name: impl Into<String>, shape: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            shape,
            lod_level: 0,
        }
    }

    /// Values per sample, or `None` if the shape's product overflows.
    fn width(&self) -> Option<usize> {
        self.shape
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }

    fn checked_width(&self) -> Result<usize> {
        self.width().ok_or_else(|| FeedError::InvalidShape {
            name: self.name.clone(),
            shape: self.shape.clone(),
        })
    }
}

/// One slot of a sample, borrowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot<'a> {
    Sequence(&'a [i64]),
    Scalar(i64),
}

impl Slot<'_> {
    fn as_slice(&self) -> &[i64] {
        match self {
            Slot::Sequence(values) => *values,
            Slot::Scalar(value) => std::slice::from_ref(value),
        }
    }
}

/// Samples that expose their fields as positional slots.
pub trait AsSlots {
    fn slot(&self, index: usize) -> Option<Slot<'_>>;
}

impl AsSlots for Sample {
    fn slot(&self, index: usize) -> Option<Slot<'_>> {
        match index {
            0 => Some(Slot::Sequence(&self.words)),
            1 => Some(Slot::Scalar(self.label)),
            _ => None,
        }
    }
}

impl AsSlots for (Vec<i64>, i64) {
    fn slot(&self, index: usize) -> Option<Slot<'_>> {
        match index {
            0 => Some(Slot::Sequence(&self.0)),
            1 => Some(Slot::Scalar(self.1)),
            _ => None,
        }
    }
}

/// A fed input.
#[derive(Clone, Debug, PartialEq)]
pub enum FeedValue<D: Device = Cpu> {
    Lod(LodTensor<i64, D>),
    Dense(Tensor<i64, 2, D>),
}

/// Named inputs for one execution step.
///
/// Consumed by value by [`TrainerProgram::run`](crate::train::TrainerProgram::run).
#[derive(Clone, Debug, PartialEq)]
pub struct Feed<D: Device = Cpu> {
    values: BTreeMap<String, FeedValue<D>>,
    batch_size: usize,
}

impl<D: Device> Feed<D> {
    pub fn get(&self, name: &str) -> Option<&FeedValue<D>> {
        self.values.get(name)
    }

    /// The sequence input `name`, if it exists and is a LoD tensor.
    pub fn lod(&self, name: &str) -> Option<&LodTensor<i64, D>> {
        match self.values.get(name)? {
            FeedValue::Lod(t) => Some(t),
            FeedValue::Dense(_) => None,
        }
    }

    /// The dense input `name`, if it exists and is dense.
    pub fn dense(&self, name: &str) -> Option<&Tensor<i64, 2, D>> {
        match self.values.get(name)? {
            FeedValue::Dense(t) => Some(t),
            FeedValue::Lod(_) => None,
        }
    }

    /// Number of samples in the batch.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn into_values(self) -> BTreeMap<String, FeedValue<D>> {
        self.values
    }
}

/// Converts sample batches into [`Feed`]s placed on one device.
#[derive(Clone, Debug)]
pub struct DataFeeder<D: Device = Cpu> {
    feed_list: Vec<FeedVar>,
    place: D,
}

impl<D: Device> DataFeeder<D> {
    /// # Errors
    ///
    /// Rejects an empty feed list, duplicate names, lod levels other than 0 or 1
    /// and dense shapes whose element count overflows `usize`.
    pub fn new(feed_list: Vec<FeedVar>, place: D) -> Result<Self> {
        if feed_list.is_empty() {
            return Err(FeedError::EmptyFeedList);
        }
        for (i, var) in feed_list.iter().enumerate() {
            if var.lod_level > 1 {
                return Err(FeedError::UnsupportedLodLevel {
                    name: var.name.clone(),
                    lod_level: var.lod_level,
                });
            }
            if var.lod_level == 0 {
                var.checked_width()?;
            }
            if feed_list[..i].iter().any(|prev| prev.name == var.name) {
                return Err(FeedError::DuplicateVar(var.name.clone()));
            }
        }
        Ok(Self { feed_list, place })
    }

    /// The `words` (sequence) / `label` (dense, `[1]`) pair of the sentiment network.
    pub fn sentiment(place: D) -> Self {
        Self {
            feed_list: vec![FeedVar::sequence(WORDS), FeedVar::dense(LABEL, vec![1])],
            place,
        }
    }

    pub fn feed_list(&self) -> &[FeedVar] {
        &self.feed_list
    }

    pub fn place(&self) -> &D {
        &self.place
    }

    /// Builds the feed for one mini-batch.
    ///
    /// # Errors
    ///
    /// - `FeedError::Lod` with `InvalidInput::EmptyBatch` if `samples` is empty.
    /// - `FeedError::Encode` if a sequence column holds a negative token.
    /// - `FeedError::MissingSlot`, `SlotSizeMismatch` or `NegativeValue` for malformed samples.
    pub fn feed<S: AsSlots>(&self, samples: &[S]) -> Result<Feed<D>> {
        if samples.is_empty() {
            return Err(LodError::from(InvalidInput::EmptyBatch).into());
        }

        let mut values = BTreeMap::new();
        for (slot, var) in self.feed_list.iter().enumerate() {
            let column = samples
                .iter()
                .enumerate()
                .map(|(sample, s)| {
                    s.slot(slot).ok_or_else(|| FeedError::MissingSlot {
                        name: var.name.clone(),
                        sample,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let value = if var.lod_level == 1 {
                self.feed_sequences(var, &column)?
            } else {
                self.feed_dense(var, &column)?
            };
            values.insert(var.name.clone(), value);
        }

        Ok(Feed {
            values,
            batch_size: samples.len(),
        })
    }

    fn feed_sequences(&self, var: &FeedVar, column: &[Slot<'_>]) -> Result<FeedValue<D>> {
        let sequences: Vec<&[i64]> = column.iter().map(Slot::as_slice).collect();
        lod::encode(&sequences, self.place.clone())
            .map(FeedValue::Lod)
            .map_err(|source| FeedError::Encode {
                name: var.name.clone(),
                source,
            })
    }

    fn feed_dense(&self, var: &FeedVar, column: &[Slot<'_>]) -> Result<FeedValue<D>> {
        let width = var.checked_width()?;
        for (sample, slot) in column.iter().enumerate() {
            let values = slot.as_slice();
            if values.len() != width {
                return Err(FeedError::SlotSizeMismatch {
                    name: var.name.clone(),
                    sample,
                    expected: width,
                    got: values.len(),
                });
            }
            if let Some(&value) = values.iter().find(|&&v| v < 0) {
                return Err(FeedError::NegativeValue {
                    name: var.name.clone(),
                    sample,
                    value,
                });
            }
        }

        // Every slot now holds exactly `width` values.
        let data: Vec<i64> = column
            .iter()
            .flat_map(|slot| slot.as_slice().iter().copied())
            .collect();
        let tensor = Tensor::new_on(data, [column.len(), width], self.place.clone())?;
        Ok(FeedValue::Dense(tensor))
    }
}

/// Lets a [`DataLoader`](crate::data::DataLoader) yield feeds directly.
impl<D: Device, S: AsSlots> Collate<S> for DataFeeder<D> {
    type Output = Result<Feed<D>>;

    fn collate(&self, batch: Vec<S>) -> Self::Output {
        self.feed(&batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataLoader;
    use crate::tensor::Cuda;

    fn samples() -> Vec<Sample> {
        vec![
            Sample::new(vec![], 0),
            Sample::new(vec![1, 2], 1),
            Sample::new(vec![], 1),
        ]
    }

    #[test]
    fn test_sentiment_feed() {
        let feed = DataFeeder::sentiment(Cpu).feed(&samples()).unwrap();

        assert_eq!(feed.batch_size(), 3);
        assert_eq!(feed.names().collect::<Vec<_>>(), vec![LABEL, WORDS]);

        let words = feed.lod(WORDS).unwrap();
        assert_eq!(words.values().data(), &[1, 2]);
        assert_eq!(words.offsets(), &[0, 0, 2, 2]);

        let label = feed.dense(LABEL).unwrap();
        assert_eq!(label.shape(), &[3, 1]);
        assert_eq!(label.data(), &[0, 1, 1]);

        assert!(feed.dense(WORDS).is_none());
        assert!(feed.lod(LABEL).is_none());
    }

    #[test]
    fn test_feed_keeps_placement() {
        let feed = DataFeeder::sentiment(Cuda::new(0)).feed(&samples()).unwrap();
        assert_eq!(feed.lod(WORDS).unwrap().device(), &Cuda::new(0));
        assert_eq!(feed.dense(LABEL).unwrap().device(), &Cuda::new(0));
    }

    #[test]
    fn test_empty_batch_rejected() {
        let err = DataFeeder::sentiment(Cpu).feed::<Sample>(&[]).unwrap_err();
        assert_eq!(
            err,
            FeedError::Lod(LodError::InvalidInput(InvalidInput::EmptyBatch))
        );
    }

    #[test]
    fn test_negative_token_rejected() {
        let batch = vec![Sample::new(vec![3, -1], 0)];
        let err = DataFeeder::sentiment(Cpu).feed(&batch).unwrap_err();
        assert!(matches!(err, FeedError::Encode { ref name, .. } if name == WORDS));
    }

    #[test]
    fn test_negative_label_rejected() {
        let batch = vec![Sample::new(vec![3], 0), Sample::new(vec![4], -1)];
        let err = DataFeeder::sentiment(Cpu).feed(&batch).unwrap_err();
        assert_eq!(
            err,
            FeedError::NegativeValue {
                name: LABEL.to_string(),
                sample: 1,
                value: -1,
            }
        );
    }

    #[test]
    fn test_missing_slot() {
        let feeder = DataFeeder::new(
            vec![
                FeedVar::sequence("a"),
                FeedVar::dense("b", vec![1]),
                FeedVar::dense("c", vec![1]),
            ],
            Cpu,
        )
        .unwrap();
        let err = feeder.feed(&samples()).unwrap_err();
        assert_eq!(
            err,
            FeedError::MissingSlot {
                name: "c".to_string(),
                sample: 0,
            }
        );
    }

    #[test]
    fn test_dense_width_mismatch() {
        let feeder = DataFeeder::new(vec![FeedVar::dense("pair", vec![2])], Cpu).unwrap();
        let ok = feeder.feed(&[(vec![1i64, 2], 0i64)]).unwrap();
        assert_eq!(ok.dense("pair").unwrap().shape(), &[1, 2]);

        let err = feeder.feed(&[(vec![1i64, 2, 3], 0i64)]).unwrap_err();
        assert!(matches!(
            err,
            FeedError::SlotSizeMismatch {
                expected: 2,
                got: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_huge_dense_shape_is_a_size_mismatch() {
        let feeder = DataFeeder::new(
            vec![FeedVar::sequence(WORDS), FeedVar::dense(LABEL, vec![usize::MAX / 4])],
            Cpu,
        )
        .unwrap();
        let batch = vec![Sample::new(vec![1], 0); 100];

        let err = feeder.feed(&batch).unwrap_err();
        assert_eq!(
            err,
            FeedError::SlotSizeMismatch {
                name: LABEL.to_string(),
                sample: 0,
                expected: usize::MAX / 4,
                got: 1,
            }
        );
    }

    #[test]
    fn test_overflowing_dense_shape_rejected() {
        let err = DataFeeder::new(
            vec![FeedVar::sequence(WORDS), FeedVar::dense(LABEL, vec![usize::MAX, 2])],
            Cpu,
        )
        .unwrap_err();
        assert_eq!(
            err,
            FeedError::InvalidShape {
                name: LABEL.to_string(),
                shape: vec![usize::MAX, 2],
            }
        );

        // A sequence input ignores its shape.
        let mut words = FeedVar::sequence(WORDS);
        words.shape = vec![usize::MAX, 2];
        assert!(DataFeeder::new(vec![words], Cpu).is_ok());
    }

    #[test]
    fn test_invalid_feed_lists() {
        assert_eq!(
            DataFeeder::new(vec![], Cpu).unwrap_err(),
            FeedError::EmptyFeedList
        );
        assert_eq!(
            DataFeeder::new(vec![FeedVar::sequence("x"), FeedVar::sequence("x")], Cpu)
                .unwrap_err(),
            FeedError::DuplicateVar("x".to_string())
        );

        let mut nested = FeedVar::sequence("nested");
        nested.lod_level = 2;
        assert!(matches!(
            DataFeeder::new(vec![nested], Cpu).unwrap_err(),
            FeedError::UnsupportedLodLevel { lod_level: 2, .. }
        ));
    }

    #[test]
    fn test_loader_yields_feeds() {
        let loader = DataLoader::new(samples(), 2)
            .unwrap()
            .with_collate(DataFeeder::sentiment(Cpu));

        let feeds: Vec<Feed> = loader.iter().collect::<Result<_>>().unwrap();
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].batch_size(), 2);
        assert_eq!(feeds[1].lod(WORDS).unwrap().offsets(), &[0, 0]);
    }

    #[test]
    fn test_feed_var_serde_defaults() {
        let var: FeedVar = serde_json::from_str(r#"{ "name": "label" }"#).unwrap();
        assert_eq!(var, FeedVar::dense("label", vec![1]));
    }
}
