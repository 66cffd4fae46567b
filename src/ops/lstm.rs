//! LSTM cell operators.
//!
//! Forward input slots: `[x, h_prev, c_prev, W_x2i, W_x2f, W_x2c, W_x2o,
//! W_h2i, W_h2f, W_h2c, W_h2o]` plus the four biases when biased.
//! Output slots: `[out, h_next, c_next]` followed by the eight cache
//! tensors `[pre_i, pre_f, pre_z, pre_o, post_i, post_f, post_z, post_c]`.
//! The `out` slot carries the output gate's post-activation.

use crate::context::{BackwardContext, ForwardContext};
use crate::error::Result;
use crate::kernels::lstm::{
    lstm_cell_backward, lstm_cell_forward, LstmCacheRefs, LstmCacheSinks, LstmDeltaRefs,
    LstmGradSinks, LstmParams, LstmWeightRefs,
};
use crate::ops::{check_engine, check_shape, check_slots};
use crate::tensor::Tensor;

/// Number of input slots the LSTM cell consumes.
pub(crate) fn lstm_input_slots(has_bias: bool) -> usize {
    if has_bias {
        15
    } else {
        11
    }
}

/// Number of output slots (out, h_next, c_next, plus caches).
pub(crate) const LSTM_OUTPUT_SLOTS: usize = 11;

fn check_forward_inputs(params: &LstmParams, ctx_in: &[&Tensor]) -> Result<usize> {
    let n = params.in_size;
    let m = params.out_size;
    check_slots(
        "lstm inputs",
        lstm_input_slots(params.has_bias),
        ctx_in.len(),
    )?;
    let batch = ctx_in[0].batch();
    check_shape(ctx_in[0], batch, n, "x")?;
    check_shape(ctx_in[1], batch, m, "h_prev")?;
    check_shape(ctx_in[2], batch, m, "c_prev")?;
    for (idx, name) in [(3, "W_x2i"), (4, "W_x2f"), (5, "W_x2c"), (6, "W_x2o")] {
        check_shape(ctx_in[idx], 0, n * m, name)?;
    }
    for (idx, name) in [(7, "W_h2i"), (8, "W_h2f"), (9, "W_h2c"), (10, "W_h2o")] {
        check_shape(ctx_in[idx], 0, m * m, name)?;
    }
    if params.has_bias {
        for (idx, name) in [(11, "b_2i"), (12, "b_2f"), (13, "b_2c"), (14, "b_2o")] {
            check_shape(ctx_in[idx], 0, m, name)?;
        }
    }
    Ok(batch)
}

fn weight_refs<'a>(params: &LstmParams, ctx_in: &[&'a Tensor]) -> LstmWeightRefs<'a> {
    LstmWeightRefs {
        w_x2i: ctx_in[3].row(0),
        w_x2f: ctx_in[4].row(0),
        w_x2c: ctx_in[5].row(0),
        w_x2o: ctx_in[6].row(0),
        w_h2i: ctx_in[7].row(0),
        w_h2f: ctx_in[8].row(0),
        w_h2c: ctx_in[9].row(0),
        w_h2o: ctx_in[10].row(0),
        b_2i: params.has_bias.then(|| ctx_in[11].row(0)),
        b_2f: params.has_bias.then(|| ctx_in[12].row(0)),
        b_2c: params.has_bias.then(|| ctx_in[13].row(0)),
        b_2o: params.has_bias.then(|| ctx_in[14].row(0)),
    }
}

/// Forward operator.
#[derive(Debug, Default)]
pub(crate) struct LstmCellOp;

impl LstmCellOp {
    pub(crate) fn compute(&self, params: &LstmParams, ctx: ForwardContext<'_>) -> Result<()> {
        check_engine(ctx.engine)?;
        let batch = check_forward_inputs(params, ctx.in_data)?;
        check_slots("lstm outputs", LSTM_OUTPUT_SLOTS, ctx.out_data.len())?;
        for slot in ctx.out_data.iter() {
            check_shape(slot, batch, params.out_size, "lstm output")?;
        }

        tracing::debug!(
            "lstm forward: engine={} batch={} parallel={}",
            ctx.engine,
            batch,
            ctx.parallelize
        );

        let weights = weight_refs(params, ctx.in_data);

        for slot in ctx.out_data.iter_mut() {
            slot.fill(0.0);
        }
        let mut out_iter = ctx.out_data.iter_mut();
        let out = out_iter.next().expect("slot count checked");
        let h_next = out_iter.next().expect("slot count checked");
        let c_next = out_iter.next().expect("slot count checked");
        let caches = LstmCacheSinks {
            pre_i: out_iter.next().expect("slot count checked"),
            pre_f: out_iter.next().expect("slot count checked"),
            pre_z: out_iter.next().expect("slot count checked"),
            pre_o: out_iter.next().expect("slot count checked"),
            post_i: out_iter.next().expect("slot count checked"),
            post_f: out_iter.next().expect("slot count checked"),
            post_z: out_iter.next().expect("slot count checked"),
            post_c: out_iter.next().expect("slot count checked"),
        };

        lstm_cell_forward(
            ctx.in_data[0],
            ctx.in_data[1],
            ctx.in_data[2],
            &weights,
            out,
            h_next,
            c_next,
            caches,
            params,
            ctx.parallelize,
        );
        Ok(())
    }
}

/// Backward operator.
#[derive(Debug, Default)]
pub(crate) struct LstmCellGradOp;

impl LstmCellGradOp {
    pub(crate) fn compute(&self, params: &LstmParams, ctx: BackwardContext<'_>) -> Result<()> {
        check_engine(ctx.engine)?;
        let batch = check_forward_inputs(params, ctx.in_data)?;
        check_slots("lstm outputs", LSTM_OUTPUT_SLOTS, ctx.out_data.len())?;
        check_slots("lstm output grads", LSTM_OUTPUT_SLOTS, ctx.out_grads.len())?;
        check_slots(
            "lstm input grads",
            lstm_input_slots(params.has_bias),
            ctx.in_grads.len(),
        )?;

        tracing::debug!(
            "lstm backward: engine={} batch={} parallel={}",
            ctx.engine,
            batch,
            ctx.parallelize
        );

        let weights = weight_refs(params, ctx.in_data);
        let caches = LstmCacheRefs {
            post_o: ctx.out_data[0],
            c_next: ctx.out_data[2],
            pre_i: ctx.out_data[3],
            pre_f: ctx.out_data[4],
            pre_z: ctx.out_data[5],
            pre_o: ctx.out_data[6],
            post_i: ctx.out_data[7],
            post_f: ctx.out_data[8],
            post_z: ctx.out_data[9],
            post_c: ctx.out_data[10],
        };
        let deltas = LstmDeltaRefs {
            d_out: ctx.out_grads[0],
            d_h_next: ctx.out_grads[1],
            d_c_next: ctx.out_grads[2],
        };

        let mut grads = ctx.in_grads.iter_mut();
        let d_x = grads.next().expect("slot count checked");
        let d_h_prev = grads.next().expect("slot count checked");
        let d_c_prev = grads.next().expect("slot count checked");
        let dw_x2i = grads.next().expect("slot count checked");
        let dw_x2f = grads.next().expect("slot count checked");
        let dw_x2c = grads.next().expect("slot count checked");
        let dw_x2o = grads.next().expect("slot count checked");
        let dw_h2i = grads.next().expect("slot count checked");
        let dw_h2f = grads.next().expect("slot count checked");
        let dw_h2c = grads.next().expect("slot count checked");
        let dw_h2o = grads.next().expect("slot count checked");
        let db_2i = params.has_bias.then(|| grads.next().expect("slot count checked"));
        let db_2f = params.has_bias.then(|| grads.next().expect("slot count checked"));
        let db_2c = params.has_bias.then(|| grads.next().expect("slot count checked"));
        let db_2o = params.has_bias.then(|| grads.next().expect("slot count checked"));

        d_x.fill(0.0);
        d_h_prev.fill(0.0);
        d_c_prev.fill(0.0);

        let sinks = LstmGradSinks {
            d_x,
            d_h_prev,
            d_c_prev,
            dw_x2i: dw_x2i.as_mut_slice(),
            dw_x2f: dw_x2f.as_mut_slice(),
            dw_x2c: dw_x2c.as_mut_slice(),
            dw_x2o: dw_x2o.as_mut_slice(),
            dw_h2i: dw_h2i.as_mut_slice(),
            dw_h2f: dw_h2f.as_mut_slice(),
            dw_h2c: dw_h2c.as_mut_slice(),
            dw_h2o: dw_h2o.as_mut_slice(),
            db_2i: db_2i.map(|t| t.as_mut_slice()),
            db_2f: db_2f.map(|t| t.as_mut_slice()),
            db_2c: db_2c.map(|t| t.as_mut_slice()),
            db_2o: db_2o.map(|t| t.as_mut_slice()),
        };

        lstm_cell_backward(
            ctx.in_data[0],
            ctx.in_data[1],
            ctx.in_data[2],
            &weights,
            &caches,
            &deltas,
            sinks,
            params,
            ctx.parallelize,
        );
        Ok(())
    }
}
