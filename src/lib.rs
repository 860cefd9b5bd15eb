//! # lod-rs
//!
//! `lod-rs` prepares variable-length token sequences for a padding-free,
//! batched sequence model and drives the training job around it.
//!
//! The centrepiece is the **level-of-detail (LoD) tensor**: a batch of
//! sentences stored as one flat `i64` column plus an offset index, so recurrent
//! layers can walk each sentence without padding or masks.
//!
//! ## Modules
//!
//! - [`mod@tensor`]: Host tensors tagged with a placement (`Cpu`, `Cuda`).
//! - [`lod`]: The sequence batch encoder and decoder.
//! - [`data`]: Datasets, samplers, a windowed shuffle reader and the batch loader.
//! - [`feed`]: Turns sample batches into named feeds (`words`, `label`).
//! - [`model`]: Hyper-parameters and layer plan of the stacked LSTM classifier.
//! - [`metrics`]: Batch and pass accuracy.
//! - [`cluster`]: Trainer / parameter-server topology.
//! - [`train`]: Backend seams, the trainer loop and role dispatch.
//!
//! ## Example
//!
//! ```rust
//! use lod_rs::lod;
//! use lod_rs::tensor::Cpu;
//!
//! let batch = vec![vec![], vec![1u32, 2], vec![]];
//! let encoded = lod::encode(&batch, Cpu).unwrap();
//!
//! assert_eq!(encoded.values().data(), &[1, 2]);
//! assert_eq!(encoded.values().shape(), &[2, 1]);
//! assert_eq!(encoded.offsets(), &[0, 0, 2, 2]);
//! ```

pub mod cluster;
pub mod data;
pub mod feed;
pub mod lod;
pub mod metrics;
pub mod model;
pub mod tensor;
pub mod train;

pub use lod::{decode, encode, Lod, LodError, LodTensor};
pub use tensor::{Cpu, Cuda, Device, Tensor, TensorElem, TensorError};
