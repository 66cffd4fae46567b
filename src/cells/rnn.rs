//! Elman RNN cell.
//!
//! ```text
//! y(t-1)    y(t)   > h(t) = act(b + W*h(t-1) + U*x(t))
//!   ^        ^     > y(t) = c + V*h(t)
//!   |V+c     | V+c
//! h(t-1) -> h(t)
//!   ^ +b W   ^ +b
//!   |U       |U
//! x(t-1)    x(t)
//! ```

use std::sync::Arc;

use crate::activation::Activation;
use crate::cells::{Cell, SlotKind, SlotShape};
use crate::config::RecurrentConfig;
use crate::context::{BackwardContext, ForwardContext};
use crate::error::Result;
use crate::kernels::rnn::RnnParams;
use crate::ops::rnn::{RnnCellGradOp, RnnCellOp};

/// RNN cell: owns the cell parameters and the forward/backward operators.
#[derive(Debug)]
pub struct RnnCell {
    params: RnnParams,
    fwd: RnnCellOp,
    bwd: RnnCellGradOp,
}

impl RnnCell {
    /// Creates the cell from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the sizes are invalid.
    pub fn new(config: &RecurrentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            params: RnnParams::from_config(config),
            fwd: RnnCellOp,
            bwd: RnnCellGradOp,
        })
    }

    /// Swaps the state activation. The object is stateless and shared.
    pub fn set_activation(&mut self, activation: Arc<dyn Activation>) {
        self.params.activation = activation;
    }
}

impl Cell for RnnCell {
    fn input_order(&self) -> Vec<SlotKind> {
        let mut order = vec![
            SlotKind::Data,   // x
            SlotKind::Aux,    // h(t-1)
            SlotKind::Weight, // U
            SlotKind::Weight, // W
            SlotKind::Weight, // V
        ];
        if self.params.has_bias {
            order.push(SlotKind::Bias); // b
            order.push(SlotKind::Bias); // c
        }
        order
    }

    fn output_order(&self) -> Vec<SlotKind> {
        vec![SlotKind::Data, SlotKind::Aux] // out, h(t)
    }

    fn in_shape(&self) -> Vec<SlotShape> {
        let n = self.params.in_size;
        let m = self.params.out_size;
        let mut shapes = vec![
            SlotShape::vector(n),    // x
            SlotShape::vector(m),    // h(t-1)
            SlotShape::matrix(n, m), // U
            SlotShape::matrix(m, m), // W
            SlotShape::matrix(m, m), // V
        ];
        if self.params.has_bias {
            shapes.push(SlotShape::vector(m)); // b
            shapes.push(SlotShape::vector(m)); // c
        }
        shapes
    }

    fn out_shape(&self) -> Vec<SlotShape> {
        let m = self.params.out_size;
        vec![SlotShape::vector(m), SlotShape::vector(m)]
    }

    fn kind(&self) -> &'static str {
        "recurrent-cell"
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
        let with_bias = RnnCell::new(&RecurrentConfig::new(4, 2)).unwrap();
        assert_eq!(with_bias.input_order().len(), 7);
        assert_eq!(with_bias.in_shape().len(), 7);

        let config = RecurrentConfig::builder(4, 2).has_bias(false).build();
        let without = RnnCell::new(&config).unwrap();
        assert_eq!(without.input_order().len(), 5);
        assert_eq!(without.output_order().len(), 2);
    }

    #[test]
    fn fan_sizes_come_from_slot_shapes() {
        let cell = RnnCell::new(&RecurrentConfig::new(4, 2)).unwrap();
        // U is in_size x out_size
        assert_eq!(cell.fan_in_size(2), 4);
        assert_eq!(cell.fan_out_size(2), 2);
        // W is out_size x out_size
        assert_eq!(cell.fan_in_size(3), 2);
    }
}
