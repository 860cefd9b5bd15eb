//! Host tensors tagged with a placement.
//!
//! A `Tensor` here is the hand-off format between this crate and an execution
//! engine: a flat, row-major buffer plus a shape and a device tag. The tag says
//! *where the engine should materialise the data*; this crate never moves
//! bytes to an accelerator itself.
//!
//! ```rust
//! use lod_rs::tensor::{Cpu, Tensor};
//!
//! let t = Tensor::<i64, 2>::new(vec![1, 2, 3, 4, 5, 6], [2, 3]).unwrap();
//! assert_eq!(t.shape(), &[2, 3]);
//! assert_eq!(t.strides(), &[3, 1]);
//!
//! // A column vector, the layout used for flattened token ids.
//! let col = Tensor::column(vec![7i64, 8, 9], Cpu);
//! assert_eq!(col.shape(), &[3, 1]);
//! ```

use num_traits::{FromPrimitive, Num, NumAssign, ToPrimitive};
use std::fmt::Debug;
use thiserror::Error;

pub mod device;

pub use device::{Cpu, Cuda, Device};

/// Error type for Tensor operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    /// The shape of the data does not match the expected shape.
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    /// An index is out of bounds for the given shape.
    #[error("Index out of bounds: index {index:?} for shape {shape:?}")]
    IndexOutOfBounds {
        index: Vec<usize>,
        shape: Vec<usize>,
    },
}

pub type Result<T> = std::result::Result<T, TensorError>;

/// Trait bound for elements that can be stored in a Tensor.
///
/// `Send + Sync` lets encoded batches cross thread boundaries (e.g. to a
/// prefetching reader or a `rayon` pool).
pub trait TensorElem:
    Num + NumAssign + Copy + Clone + Debug + Send + Sync + FromPrimitive + ToPrimitive + PartialOrd
{
}

impl<T> TensorElem for T where
    T: Num
        + NumAssign
        + Copy
        + Clone
        + Debug
        + Send
        + Sync
        + FromPrimitive
        + ToPrimitive
        + PartialOrd
{
}

/// An N-dimensional, row-major tensor living in host memory.
///
/// # Generics
///
/// - `T`: The element type.
/// - `RANK`: The number of dimensions (const generic).
/// - `D`: The placement the consumer should run on (defaults to `Cpu`).
#[derive(Clone, PartialEq)]
pub struct Tensor<T, const RANK: usize, D: Device = Cpu>
where
    T: TensorElem,
{
    shape: [usize; RANK],
    strides: [usize; RANK],
    data: Vec<T>,
    device: D,
}

impl<T, const RANK: usize> Tensor<T, RANK, Cpu>
where
    T: TensorElem,
{
    /// Creates a new CPU tensor from a vector of data and a shape.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::ShapeMismatch` if the length of `data` does not match the product of `shape`.
    pub fn new(data: Vec<T>, shape: [usize; RANK]) -> Result<Self> {
        Self::new_on(data, shape, Cpu)
    }

    /// Creates a new CPU tensor filled with zeros.
    pub fn zeros(shape: [usize; RANK]) -> Self {
        let size: usize = shape.iter().product();
        Self {
            shape,
            strides: compute_strides(&shape),
            data: vec![T::zero(); size],
            device: Cpu,
        }
    }
}

impl<T, const RANK: usize, D: Device> Tensor<T, RANK, D>
where
    T: TensorElem,
{
    /// Creates a tensor placed on `device`.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::ShapeMismatch` if the length of `data` does not match the product of `shape`.
    pub fn new_on(data: Vec<T>, shape: [usize; RANK], device: D) -> Result<Self> {
        let size: usize = shape.iter().product();
        if data.len() != size {
            return Err(TensorError::ShapeMismatch {
                expected: vec![size],
                got: vec![data.len()],
            });
        }

        Ok(Self {
            shape,
            strides: compute_strides(&shape),
            data,
            device,
        })
    }

    /// Reshapes the tensor without copying its data.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::ShapeMismatch` if the element counts differ.
    pub fn reshape<const NEW_RANK: usize>(
        self,
        new_shape: [usize; NEW_RANK],
    ) -> Result<Tensor<T, NEW_RANK, D>> {
        let current_size: usize = self.shape.iter().product();
        let new_size: usize = new_shape.iter().product();

        if current_size != new_size {
            return Err(TensorError::ShapeMismatch {
                expected: vec![current_size],
                got: vec![new_size],
            });
        }

        Ok(Tensor {
            shape: new_shape,
            strides: compute_strides(&new_shape),
            data: self.data,
            device: self.device,
        })
    }

    /// Returns the element at a multi-dimensional index.
    pub fn get(&self, index: [usize; RANK]) -> Result<T> {
        let mut offset = 0;
        for (dim, (&i, &extent)) in index.iter().zip(self.shape.iter()).enumerate() {
            if i >= extent {
                return Err(TensorError::IndexOutOfBounds {
                    index: index.to_vec(),
                    shape: self.shape.to_vec(),
                });
            }
            offset += i * self.strides[dim];
        }
        Ok(self.data[offset])
    }

    pub fn shape(&self) -> &[usize; RANK] {
        &self.shape
    }

    pub fn strides(&self) -> &[usize; RANK] {
        &self.strides
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Consumes the tensor, returning the flat buffer.
    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Total number of elements.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl<T, D: Device> Tensor<T, 2, D>
where
    T: TensorElem,
{
    /// Wraps a flat buffer as an `[n, 1]` column on `device`.
    ///
    /// This cannot fail: the shape is derived from the buffer.
    pub fn column(data: Vec<T>, device: D) -> Self {
        let shape = [data.len(), 1];
        Self {
            shape,
            strides: compute_strides(&shape),
            data,
            device,
        }
    }

    /// Number of rows (the leading dimension).
    pub fn rows(&self) -> usize {
        self.shape[0]
    }
}

fn compute_strides<const RANK: usize>(shape: &[usize; RANK]) -> [usize; RANK] {
    let mut strides = [0; RANK];
    let mut stride = 1;
    for i in (0..RANK).rev() {
        strides[i] = stride;
        stride *= shape[i];
    }
    strides
}

impl<T, const RANK: usize, D: Device> Debug for Tensor<T, RANK, D>
where
    T: TensorElem,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("device", &self.device.name())
            .field("data_len", &self.data.len())
            .finish()
    }
}
