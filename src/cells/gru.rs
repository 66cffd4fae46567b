//! GRU cell.
//!
//! Update gate `z`, reset gate `r`, candidate `h~`; the primary output is
//! the next hidden state `z . h_prev + (1 - z) . h~`. The eight cache
//! slots exist so the backward operator can replay the gate chain without
//! recomputing the forward pass.

use crate::cells::{Cell, SlotKind, SlotShape};
use crate::config::RecurrentConfig;
use crate::context::{BackwardContext, ForwardContext};
use crate::error::Result;
use crate::kernels::gru::GruParams;
use crate::ops::gru::{GruCellGradOp, GruCellOp, GRU_OUTPUT_SLOTS};

/// GRU cell: owns the cell parameters and the forward/backward operators.
#[derive(Debug)]
pub struct GruCell {
    params: GruParams,
    fwd: GruCellOp,
    bwd: GruCellGradOp,
}

impl GruCell {
    /// Creates the cell from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the sizes are invalid.
    pub fn new(config: &RecurrentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            params: GruParams::from_config(config),
            fwd: GruCellOp,
            bwd: GruCellGradOp,
        })
    }
}

impl Cell for GruCell {
    fn input_order(&self) -> Vec<SlotKind> {
        let mut order = vec![
            SlotKind::Data, // x
            SlotKind::Aux,  // h(t-1)
            SlotKind::Weight,
            SlotKind::Weight,
            SlotKind::Weight,
            SlotKind::Weight,
            SlotKind::Weight,
            SlotKind::Weight,
        ];
        if self.params.has_bias {
            order.extend([SlotKind::Bias, SlotKind::Bias, SlotKind::Bias]);
        }
        order
    }

    fn output_order(&self) -> Vec<SlotKind> {
        let mut order = vec![SlotKind::Data]; // out == h(t)
        order.resize(GRU_OUTPUT_SLOTS, SlotKind::Aux); // cache tensors
        order
    }

    fn in_shape(&self) -> Vec<SlotShape> {
        let n = self.params.in_size;
        let m = self.params.out_size;
        let mut shapes = vec![
            SlotShape::vector(n),    // x
            SlotShape::vector(m),    // h(t-1)
            SlotShape::matrix(n, m), // W_x2z
            SlotShape::matrix(n, m), // W_x2r
            SlotShape::matrix(n, m), // W_x2h
            SlotShape::matrix(m, m), // W_hr2c
            SlotShape::matrix(m, m), // W_s2z
            SlotShape::matrix(m, m), // W_s2r
        ];
        if self.params.has_bias {
            shapes.extend([
                SlotShape::vector(m), // b_2z
                SlotShape::vector(m), // b_2r
                SlotShape::vector(m), // b_2h
            ]);
        }
        shapes
    }

    fn out_shape(&self) -> Vec<SlotShape> {
        vec![SlotShape::vector(self.params.out_size); GRU_OUTPUT_SLOTS]
    }

    fn kind(&self) -> &'static str {
        "gru-cell"
    }

    fn forward(&self, ctx: ForwardContext<'_>) -> Result<()> {
        self.fwd.compute(&self.params, ctx)
    }

    fn backward(&self, ctx: BackwardContext<'_>) -> Result<()> {
        self.bwd.compute(&self.params, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_counts_follow_bias_flag() {
        let with_bias = GruCell::new(&RecurrentConfig::new(3, 2)).unwrap();
        assert_eq!(with_bias.input_order().len(), 11);
        assert_eq!(with_bias.output_order().len(), 9);

        let config = RecurrentConfig::builder(3, 2).has_bias(false).build();
        let without = GruCell::new(&config).unwrap();
        assert_eq!(without.input_order().len(), 8);
    }
}
