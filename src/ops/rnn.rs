//! RNN cell operators.
//!
//! Forward input slots: `[x, h_prev, U, W, V]` plus `[b, c]` when biased.
//! Output slots: `[out, h_next]`.

use crate::context::{BackwardContext, ForwardContext};
use crate::error::Result;
use crate::kernels::rnn::{
    rnn_cell_backward, rnn_cell_forward, RnnBackwardArgs, RnnForwardArgs, RnnGradSinks, RnnParams,
};
use crate::ops::{check_engine, check_shape, check_slots};
use crate::tensor::Tensor;

/// Number of input slots the RNN cell consumes.
pub(crate) fn rnn_input_slots(has_bias: bool) -> usize {
    if has_bias {
        7
    } else {
        5
    }
}

fn check_forward_inputs(params: &RnnParams, ctx_in: &[&Tensor]) -> Result<usize> {
    let n = params.in_size;
    let m = params.out_size;
    check_slots("rnn inputs", rnn_input_slots(params.has_bias), ctx_in.len())?;
    let batch = ctx_in[0].batch();
    check_shape(ctx_in[0], batch, n, "x")?;
    check_shape(ctx_in[1], batch, m, "h_prev")?;
    check_shape(ctx_in[2], 0, n * m, "U")?;
    check_shape(ctx_in[3], 0, m * m, "W")?;
    check_shape(ctx_in[4], 0, m * m, "V")?;
    if params.has_bias {
        check_shape(ctx_in[5], 0, m, "b")?;
        check_shape(ctx_in[6], 0, m, "c")?;
    }
    Ok(batch)
}

/// Forward operator.
#[derive(Debug, Default)]
pub(crate) struct RnnCellOp;

impl RnnCellOp {
    pub(crate) fn compute(&self, params: &RnnParams, ctx: ForwardContext<'_>) -> Result<()> {
        check_engine(ctx.engine)?;
        let batch = check_forward_inputs(params, ctx.in_data)?;
        check_slots("rnn outputs", 2, ctx.out_data.len())?;
        check_shape(&ctx.out_data[0], batch, params.out_size, "out")?;
        check_shape(&ctx.out_data[1], batch, params.out_size, "h_next")?;

        tracing::debug!(
            "rnn forward: engine={} batch={} parallel={}",
            ctx.engine,
            batch,
            ctx.parallelize
        );

        let args = RnnForwardArgs {
            x: ctx.in_data[0],
            h_prev: ctx.in_data[1],
            u: ctx.in_data[2].row(0),
            w: ctx.in_data[3].row(0),
            v: ctx.in_data[4].row(0),
            b: params.has_bias.then(|| ctx.in_data[5].row(0)),
            c: params.has_bias.then(|| ctx.in_data[6].row(0)),
        };

        let (out, rest) = ctx.out_data.split_at_mut(1);
        out[0].fill(0.0);
        rest[0].fill(0.0);
        rnn_cell_forward(&args, &mut out[0], &mut rest[0], params, ctx.parallelize);
        Ok(())
    }
}

/// Backward operator.
#[derive(Debug, Default)]
pub(crate) struct RnnCellGradOp;

impl RnnCellGradOp {
    pub(crate) fn compute(&self, params: &RnnParams, ctx: BackwardContext<'_>) -> Result<()> {
        check_engine(ctx.engine)?;
        let batch = check_forward_inputs(params, ctx.in_data)?;
        check_slots("rnn output grads", 2, ctx.out_grads.len())?;
        check_slots(
            "rnn input grads",
            rnn_input_slots(params.has_bias),
            ctx.in_grads.len(),
        )?;

        tracing::debug!(
            "rnn backward: engine={} batch={} parallel={}",
            ctx.engine,
            batch,
            ctx.parallelize
        );

        let args = RnnBackwardArgs {
            x: ctx.in_data[0],
            h_prev: ctx.in_data[1],
            u: ctx.in_data[2].row(0),
            w: ctx.in_data[3].row(0),
            v: ctx.in_data[4].row(0),
            h_next: ctx.out_data[1],
            d_out: ctx.out_grads[0],
            d_h_next: ctx.out_grads[1],
        };

        let mut grads = ctx.in_grads.iter_mut();
        let d_x = grads.next().expect("slot count checked");
        let d_h_prev = grads.next().expect("slot count checked");
        let du = grads.next().expect("slot count checked");
        let dw = grads.next().expect("slot count checked");
        let dv = grads.next().expect("slot count checked");
        let db = params.has_bias.then(|| grads.next().expect("slot count checked"));
        let dc = params.has_bias.then(|| grads.next().expect("slot count checked"));

        // Deltas flowing toward the previous layer start from zero; the
        // weight accumulators keep whatever the caller seeded them with.
        d_x.fill(0.0);
        d_h_prev.fill(0.0);

        let sinks = RnnGradSinks {
            d_x,
            d_h_prev,
            du: du.as_mut_slice(),
            dw: dw.as_mut_slice(),
            dv: dv.as_mut_slice(),
            db: db.map(|t| t.as_mut_slice()),
            dc: dc.map(|t| t.as_mut_slice()),
        };

        rnn_cell_backward(&args, sinks, params, ctx.parallelize);
        Ok(())
    }
}
