//! The cell capability interface and its three implementations.
//!
//! A cell is a single-timestep recurrent computation unit. Concrete cells
//! declare their tensor-slot ordering and shape contract (used by the
//! surrounding layer for parameter bookkeeping and fan-in/fan-out
//! reporting), expose a human-readable type tag, and run the forward and
//! backward operators over a slot-ordered context.

pub(crate) mod gru;
pub(crate) mod lstm;
pub(crate) mod rnn;

pub use gru::GruCell;
pub use lstm::LstmCell;
pub use rnn::RnnCell;

use crate::context::{BackwardContext, ForwardContext};
use crate::error::Result;

/// Role of a tensor slot in a cell's input or output list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Per-sample input or output data.
    Data,
    /// Per-sample auxiliary state (prior hidden/cell state, caches).
    Aux,
    /// Trainable weight matrix.
    Weight,
    /// Trainable bias vector.
    Bias,
}

/// Logical shape of one slot: `width x height` (height 1 for vectors).
///
/// For weight slots the width is the fan-in and the height the fan-out,
/// mirroring how the layer reports them to initializers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotShape {
    /// Fan-in dimension.
    pub width: usize,
    /// Fan-out dimension.
    pub height: usize,
}

impl SlotShape {
    /// Vector slot of `n` elements.
    #[must_use]
    pub fn vector(n: usize) -> Self {
        Self {
            width: n,
            height: 1,
        }
    }

    /// Matrix slot of `width x height` elements.
    #[must_use]
    pub fn matrix(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Total element count.
    #[must_use]
    pub fn size(&self) -> usize {
        self.width * self.height
    }
}

/// Single-timestep recurrent computation unit.
pub trait Cell: Send + Sync {
    /// Slot kinds for the input list, in slot order.
    fn input_order(&self) -> Vec<SlotKind>;

    /// Slot kinds for the output list, in slot order.
    fn output_order(&self) -> Vec<SlotKind>;

    /// Shapes for the input slots, in slot order.
    fn in_shape(&self) -> Vec<SlotShape>;

    /// Shapes for the output slots, in slot order.
    fn out_shape(&self) -> Vec<SlotShape>;

    /// Fan-in of input slot `i`.
    fn fan_in_size(&self, i: usize) -> usize {
        self.in_shape()[i].width
    }

    /// Fan-out of input slot `i`.
    fn fan_out_size(&self, i: usize) -> usize {
        self.in_shape()[i].height
    }

    /// Human-readable cell type tag.
    fn kind(&self) -> &'static str;

    /// Runs the forward operator over the context.
    ///
    /// # Errors
    ///
    /// Fails on unsupported engines or slot/shape mismatches; the context
    /// is not modified in that case.
    fn forward(&self, ctx: ForwardContext<'_>) -> Result<()>;

    /// Runs the backward operator over the context.
    ///
    /// # Errors
    ///
    /// Fails on unsupported engines or slot/shape mismatches.
    fn backward(&self, ctx: BackwardContext<'_>) -> Result<()>;
}
