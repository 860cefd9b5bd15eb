//! Classification accuracy, per batch and accumulated over a pass.

use crate::tensor::{Device, Tensor, TensorElem, TensorError};

/// Accumulates correct/total counts across the batches of one pass.
///
/// ```rust
/// use lod_rs::metrics::Accuracy;
///
/// let mut acc = Accuracy::new();
/// acc.update(0.5, 4);  // 2 of 4
/// acc.update(1.0, 2);  // 2 of 2
/// assert!((acc.eval() - 4.0 / 6.0).abs() < 1e-6);
///
/// acc.reset();
/// assert_eq!(acc.eval(), 0.0);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Accuracy {
    correct: u64,
    total: u64,
}

impl Accuracy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a batch from its accuracy and size.
    ///
    /// The correct count is recovered as `round(accuracy * batch_size)`,
    /// clamped to the batch.
    pub fn update(&mut self, accuracy: f32, batch_size: usize) {
        let correct = (f64::from(accuracy) * batch_size as f64)
            .round()
            .clamp(0.0, batch_size as f64) as u64;
        self.update_counts(correct, batch_size as u64);
    }

    /// Records a batch from exact counts.
    pub fn update_counts(&mut self, correct: u64, total: u64) {
        self.correct += correct.min(total);
        self.total += total;
    }

    /// Pass accuracy so far; `0.0` before any batch.
    pub fn eval(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            (self.correct as f64 / self.total as f64) as f32
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn correct(&self) -> u64 {
        self.correct
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

/// Arg-max accuracy of a `[batch, classes]` prediction against `[batch, 1]` labels.
///
/// # Errors
///
/// Returns `TensorError::ShapeMismatch` if the row counts differ or `labels` is not a column.
pub fn batch_accuracy<T, D>(
    predictions: &Tensor<T, 2, D>,
    labels: &Tensor<i64, 2, D>,
) -> Result<f32, TensorError>
where
    T: TensorElem,
    D: Device,
{
    let [rows, classes] = *predictions.shape();
    if *labels.shape() != [rows, 1] {
        return Err(TensorError::ShapeMismatch {
            expected: vec![rows, 1],
            got: labels.shape().to_vec(),
        });
    }
    if rows == 0 {
        return Ok(0.0);
    }

    let correct = predictions
        .data()
        .chunks(classes.max(1))
        .zip(labels.data())
        .filter(|(row, label)| argmax(*row).is_some_and(|best| best as i64 == **label))
        .count();

    Ok(correct as f32 / rows as f32)
}

fn argmax<T: PartialOrd>(row: &[T]) -> Option<usize> {
    let mut best: Option<(usize, &T)> = None;
    for (i, v) in row.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}
