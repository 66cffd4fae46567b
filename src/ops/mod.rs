//! Operator wrappers around the cell kernels.
//!
//! Each cell type has a forward operator and a backward ("grad") operator.
//! The wrapper is the only code that interprets context slot positions: it
//! validates the engine and every slot shape before arithmetic begins,
//! zero-initializes the delta targets that must start from zero, converts
//! the slot lists into the kernels' strongly-typed arguments, dispatches
//! with the requested parallelism flag, and reduces per-sample weight
//! gradients into the flat accumulators on the way back out.

pub(crate) mod gru;
pub(crate) mod lstm;
pub(crate) mod rnn;

use crate::config::Engine;
use crate::error::{CellError, Result};
use crate::tensor::Tensor;

/// Only the portable scalar engine and its SIMD alias are implemented by
/// the recurrent operators; anything else is a fatal configuration error.
pub(crate) fn check_engine(engine: Engine) -> Result<()> {
    match engine {
        Engine::Internal | Engine::Simd => Ok(()),
        other => Err(CellError::UnsupportedEngine { engine: other }),
    }
}

pub(crate) fn check_slots(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(CellError::SlotCount {
            what,
            expected,
            actual,
        })
    }
}

/// Validates a tensor against `[batch, width]`; `batch == 0` matches any
/// batch (weight slots are single-row).
pub(crate) fn check_shape(
    tensor: &Tensor,
    batch: usize,
    width: usize,
    what: &'static str,
) -> Result<()> {
    let ok = (batch == 0 || tensor.batch() == batch) && tensor.width() == width;
    if ok {
        Ok(())
    } else {
        Err(CellError::ShapeMismatch {
            what,
            expected: [batch, width],
            actual: tensor.shape(),
        })
    }
}
