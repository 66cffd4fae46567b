//! Ordered-slot kernel contexts.
//!
//! The slot lists are the boundary with the generic layer-graph
//! collaborator: tensors arrive as an ordered sequence whose meaning is
//! fixed by each cell's `input_order`/`output_order`. The operator wrappers
//! are the only code that interprets slot positions; they immediately
//! convert the lists into strongly-typed kernel arguments so slot-order
//! mistakes cannot travel further than the wrapper.

use crate::config::Engine;
use crate::tensor::Tensor;

/// Context for a forward operator call.
pub struct ForwardContext<'a> {
    /// Input slots in the cell's declared order (data, prior state,
    /// weights, biases).
    pub in_data: &'a [&'a Tensor],
    /// Output slots in the cell's declared order (primary output, derived
    /// state, then cache tensors).
    pub out_data: &'a mut [Tensor],
    /// Selected compute engine.
    pub engine: Engine,
    /// Whether the kernel may partition the batch across threads.
    pub parallelize: bool,
}

/// Context for a backward (grad) operator call.
pub struct BackwardContext<'a> {
    /// The forward call's input slots, unchanged.
    pub in_data: &'a [&'a Tensor],
    /// The forward call's output slots, unchanged (cache tensors included).
    pub out_data: &'a [&'a Tensor],
    /// Incoming deltas, one per output slot; cache slots carry zeros.
    pub out_grads: &'a [&'a Tensor],
    /// Gradient targets, one per input slot. Data/state slots are
    /// per-sample `[batch, n]`; weight/bias slots are flat accumulators.
    /// All accumulation is `+=` onto buffers the caller zero-initialized.
    pub in_grads: &'a mut [Tensor],
    /// Selected compute engine.
    pub engine: Engine,
    /// Whether the kernel may partition the batch across threads.
    pub parallelize: bool,
}
