//! LSTM cell.
//!
//! Four gates over the input and prior hidden state, a separate cell-state
//! line `c`, and three forward outputs: the output gate activation (the
//! primary output slot), the next hidden state, and the next cell state.

use crate::cells::{Cell, SlotKind, SlotShape};
use crate::config::RecurrentConfig;
use crate::context::{BackwardContext, ForwardContext};
use crate::error::Result;
use crate::kernels::lstm::LstmParams;
use crate::ops::lstm::{LstmCellGradOp, LstmCellOp, LSTM_OUTPUT_SLOTS};

/// LSTM cell: owns the cell parameters and the forward/backward operators.
#[derive(Debug)]
pub struct LstmCell {
    params: LstmParams,
    fwd: LstmCellOp,
    bwd: LstmCellGradOp,
}

impl LstmCell {
    /// Creates the cell from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the sizes are invalid.
    pub fn new(config: &RecurrentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            params: LstmParams::from_config(config),
            fwd: LstmCellOp,
            bwd: LstmCellGradOp,
        })
    }
}

impl Cell for LstmCell {
    fn input_order(&self) -> Vec<SlotKind> {
        let mut order = vec![
            SlotKind::Data, // x
            SlotKind::Aux,  // h(t-1)
            SlotKind::Aux,  // c(t-1)
        ];
        order.extend([SlotKind::Weight; 8]);
        if self.params.has_bias {
            order.extend([SlotKind::Bias; 4]);
        }
        order
    }

    fn output_order(&self) -> Vec<SlotKind> {
        let mut order = vec![
            SlotKind::Data, // out (o gate activation)
            SlotKind::Aux,  // h(t)
            SlotKind::Aux,  // c(t)
        ];
        order.resize(LSTM_OUTPUT_SLOTS, SlotKind::Aux); // cache tensors
        order
    }

    fn in_shape(&self) -> Vec<SlotShape> {
        let n = self.params.in_size;
        let m = self.params.out_size;
        let mut shapes = vec![
            SlotShape::vector(n), // x
            SlotShape::vector(m), // h(t-1)
            SlotShape::vector(m), // c(t-1)
        ];
        shapes.extend([SlotShape::matrix(n, m); 4]); // W_x2{i,f,c,o}
        shapes.extend([SlotShape::matrix(m, m); 4]); // W_h2{i,f,c,o}
        if self.params.has_bias {
            shapes.extend([SlotShape::vector(m); 4]); // b_2{i,f,c,o}
        }
        shapes
    }

    fn out_shape(&self) -> Vec<SlotShape> {
        vec![SlotShape::vector(self.params.out_size); LSTM_OUTPUT_SLOTS]
    }

    fn kind(&self) -> &'static str {
        "lstm-cell"
    }

    fn forward(&self, ctx: ForwardContext<'_>) -> Result<()> {
        self.fwd.compute(&self.params, ctx)
    }

    fn backward(&self, ctx: BackwardContext<'_>) -> Result<()> {
        self.bwd.compute(&self.params, ctx)
    }
}
