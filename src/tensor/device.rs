//! Placement tags.
//!
//! A `Device` names where the execution engine should put a tensor. Tensors in
//! this crate always live in host memory; the tag travels with them unchanged
//! so the consumer can upload to the right accelerator.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// A trait representing the placement of a Tensor.
pub trait Device: Clone + Debug + PartialEq + Send + Sync {
    /// Returns the name of the device.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lod_rs::tensor::{Cpu, Device};
    /// let device = Cpu;
    /// assert_eq!(device.name(), "CPU");
    /// ```
    fn name(&self) -> &'static str;
}

/// The host CPU. Default placement for all tensors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cpu;

impl Device for Cpu {
    fn name(&self) -> &'static str {
        "CPU"
    }
}

/// A CUDA device, identified by its ordinal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cuda {
    pub ordinal: usize,
}

impl Cuda {
    pub fn new(ordinal: usize) -> Self {
        Self { ordinal }
    }
}

impl Device for Cuda {
    fn name(&self) -> &'static str {
        "CUDA"
    }
}
