//! # recurrent-cells-rs
//!
//! Single-timestep recurrent cell compute kernels: Elman RNN, GRU, and
//! LSTM, each with a hand-derived backward pass, wrapped in a thin
//! operator/context layer and a layer shell that owns the parameters.
//!
//! ## Overview
//!
//! Each cell type is a fixed computation over flat row-major weight
//! buffers and `[batch, features]` tensors. The forward kernel produces
//! the outputs plus the pre/post-activation cache tensors; the backward
//! kernel replays the gate chain in reverse from those caches, producing
//! input deltas and per-weight gradients. Batches execute sample-parallel
//! when allowed; results are identical either way.
//!
//! ## Architecture
//!
//! Data flows top-down for construction and bottom-up for computation:
//!
//! ```text
//! RecurrentLayer ── owns weights, caches, gradients
//!      │
//!      ▼
//!    Cell (RnnCell | GruCell | LstmCell) ── slot ordering, shape contract
//!      │
//!      ▼
//!    *CellOp / *CellGradOp ── slot validation, engine check, reduction
//!      │
//!      ▼
//!    kernels ── pure per-sample forward/backward math
//! ```
//!
//! ## Quick start
//!
//! ```
//! use recurrent_cells_rs::prelude::*;
//!
//! let config = RecurrentConfig::new(4, 2);
//! let mut layer = RecurrentLayer::rnn(config).unwrap();
//! layer.init_weights(&mut Constant(1.0));
//!
//! let x = Tensor::from_vec(vec![0.0, 1.0, 2.0, 3.0], 1, 4);
//! let out = layer.forward(&x).unwrap();
//! assert_eq!(out.shape(), [1, 2]);
//! ```
//!
//! ## Modules
//!
//! - [`tensor`] - batched dense buffers and dot/muladd primitives
//! - [`activation`] - shared stateless tanh/sigmoid transforms
//! - [`cells`] - the cell capability trait and its three implementations
//! - [`layer`] - the layer shell owning parameters and caches
//! - [`config`] - serializable, validated configuration
//! - [`error`] - error types with fail-fast shape/engine validation
//! - [`init`] - constant and Xavier weight initialization
//! - [`optim`] - gradient descent and Adagrad update rules
//! - [`loss`] - MSE loss and gradient
//! - [`parallel`] - sample-parallel execution primitive

#![warn(missing_docs)]
#![deny(unsafe_code)]
// Allow precision loss casts - acceptable in ML numerical code
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::needless_range_loop)]

pub mod activation;
pub mod cells;
pub mod config;
mod context;
pub mod error;
pub mod init;
mod kernels;
pub mod layer;
pub mod loss;
mod ops;
pub mod optim;
pub mod parallel;
pub mod tensor;

pub use activation::{Activation, ActivationKind, Sigmoid, Tanh};
pub use cells::{Cell, GruCell, LstmCell, RnnCell, SlotKind, SlotShape};
pub use config::{Engine, RecurrentConfig};
pub use context::{BackwardContext, ForwardContext};
pub use error::{CellError, Result};
pub use layer::{LayerState, RecurrentLayer};
pub use tensor::Tensor;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```
/// use recurrent_cells_rs::prelude::*;
/// ```
pub mod prelude {
    pub use crate::activation::{Activation, ActivationKind};
    pub use crate::cells::{Cell, GruCell, LstmCell, RnnCell, SlotKind, SlotShape};
    pub use crate::config::{Engine, RecurrentConfig};
    pub use crate::error::{CellError, Result};
    pub use crate::init::{Constant, WeightInit, Xavier};
    pub use crate::layer::{LayerState, RecurrentLayer};
    pub use crate::loss::{mse, mse_grad};
    pub use crate::optim::{Adagrad, GradientDescent, Optimizer};
    pub use crate::tensor::Tensor;
}
