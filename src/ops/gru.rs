//! GRU cell operators.
//!
//! Forward input slots: `[x, h_prev, W_x2z, W_x2r, W_x2h, W_hr2c, W_s2z,
//! W_s2r]` plus `[b_2z, b_2r, b_2h]` when biased. Output slots: `[out]`
//! followed by the eight cache tensors
//! `[post_h, post_r, post_z, pre_h, pre_r, hr, pre_z, z_neg]`.
//! For the GRU the primary output is the next hidden state, so a single
//! incoming delta (slot 0) drives the whole backward pass.

use crate::context::{BackwardContext, ForwardContext};
use crate::error::Result;
use crate::kernels::gru::{
    gru_cell_backward, gru_cell_forward, GruCacheRefs, GruCacheSinks, GruGradSinks, GruParams,
    GruWeightRefs,
};
use crate::ops::{check_engine, check_shape, check_slots};
use crate::tensor::Tensor;

/// Number of input slots the GRU cell consumes.
pub(crate) fn gru_input_slots(has_bias: bool) -> usize {
    if has_bias {
        11
    } else {
        8
    }
}

/// Number of output slots (primary output plus caches).
pub(crate) const GRU_OUTPUT_SLOTS: usize = 9;

fn check_forward_inputs(params: &GruParams, ctx_in: &[&Tensor]) -> Result<usize> {
    let n = params.in_size;
    let m = params.out_size;
    check_slots("gru inputs", gru_input_slots(params.has_bias), ctx_in.len())?;
    let batch = ctx_in[0].batch();
    check_shape(ctx_in[0], batch, n, "x")?;
    check_shape(ctx_in[1], batch, m, "h_prev")?;
    check_shape(ctx_in[2], 0, n * m, "W_x2z")?;
    check_shape(ctx_in[3], 0, n * m, "W_x2r")?;
    check_shape(ctx_in[4], 0, n * m, "W_x2h")?;
    check_shape(ctx_in[5], 0, m * m, "W_hr2c")?;
    check_shape(ctx_in[6], 0, m * m, "W_s2z")?;
    check_shape(ctx_in[7], 0, m * m, "W_s2r")?;
    if params.has_bias {
        check_shape(ctx_in[8], 0, m, "b_2z")?;
        check_shape(ctx_in[9], 0, m, "b_2r")?;
        check_shape(ctx_in[10], 0, m, "b_2h")?;
    }
    Ok(batch)
}

fn weight_refs<'a>(params: &GruParams, ctx_in: &[&'a Tensor]) -> GruWeightRefs<'a> {
    GruWeightRefs {
        w_x2z: ctx_in[2].row(0),
        w_x2r: ctx_in[3].row(0),
        w_x2h: ctx_in[4].row(0),
        w_hr2c: ctx_in[5].row(0),
        w_s2z: ctx_in[6].row(0),
        w_s2r: ctx_in[7].row(0),
        b_2z: params.has_bias.then(|| ctx_in[8].row(0)),
        b_2r: params.has_bias.then(|| ctx_in[9].row(0)),
        b_2h: params.has_bias.then(|| ctx_in[10].row(0)),
    }
}

/// Forward operator.
#[derive(Debug, Default)]
pub(crate) struct GruCellOp;

impl GruCellOp {
    pub(crate) fn compute(&self, params: &GruParams, ctx: ForwardContext<'_>) -> Result<()> {
        check_engine(ctx.engine)?;
        let batch = check_forward_inputs(params, ctx.in_data)?;
        check_slots("gru outputs", GRU_OUTPUT_SLOTS, ctx.out_data.len())?;
        for slot in ctx.out_data.iter() {
            check_shape(slot, batch, params.out_size, "gru output")?;
        }

        tracing::debug!(
            "gru forward: engine={} batch={} parallel={}",
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
        let caches = GruCacheSinks {
            post_h: out_iter.next().expect("slot count checked"),
            post_r: out_iter.next().expect("slot count checked"),
            post_z: out_iter.next().expect("slot count checked"),
            pre_h: out_iter.next().expect("slot count checked"),
            pre_r: out_iter.next().expect("slot count checked"),
            hr: out_iter.next().expect("slot count checked"),
            pre_z: out_iter.next().expect("slot count checked"),
            z_neg: out_iter.next().expect("slot count checked"),
        };

        gru_cell_forward(
            ctx.in_data[0],
            ctx.in_data[1],
            &weights,
            out,
            caches,
            params,
            ctx.parallelize,
        );
        Ok(())
    }
}

/// Backward operator.
#[derive(Debug, Default)]
pub(crate) struct GruCellGradOp;

impl GruCellGradOp {
    pub(crate) fn compute(&self, params: &GruParams, ctx: BackwardContext<'_>) -> Result<()> {
        check_engine(ctx.engine)?;
        let batch = check_forward_inputs(params, ctx.in_data)?;
        check_slots("gru outputs", GRU_OUTPUT_SLOTS, ctx.out_data.len())?;
        check_slots("gru output grads", GRU_OUTPUT_SLOTS, ctx.out_grads.len())?;
        check_slots(
            "gru input grads",
            gru_input_slots(params.has_bias),
            ctx.in_grads.len(),
        )?;

        tracing::debug!(
            "gru backward: engine={} batch={} parallel={}",
            ctx.engine,
            batch,
            ctx.parallelize
        );

        let weights = weight_refs(params, ctx.in_data);
        let caches = GruCacheRefs {
            post_h: ctx.out_data[1],
            post_r: ctx.out_data[2],
            post_z: ctx.out_data[3],
            pre_h: ctx.out_data[4],
            pre_r: ctx.out_data[5],
            hr: ctx.out_data[6],
            pre_z: ctx.out_data[7],
            z_neg: ctx.out_data[8],
        };

        let mut grads = ctx.in_grads.iter_mut();
        let d_x = grads.next().expect("slot count checked");
        let d_h_prev = grads.next().expect("slot count checked");
        let dw_x2z = grads.next().expect("slot count checked");
        let dw_x2r = grads.next().expect("slot count checked");
        let dw_x2h = grads.next().expect("slot count checked");
        let dw_hr2c = grads.next().expect("slot count checked");
        let dw_s2z = grads.next().expect("slot count checked");
        let dw_s2r = grads.next().expect("slot count checked");
        let db_2z = params.has_bias.then(|| grads.next().expect("slot count checked"));
        let db_2r = params.has_bias.then(|| grads.next().expect("slot count checked"));
        let db_2h = params.has_bias.then(|| grads.next().expect("slot count checked"));

        d_x.fill(0.0);
        d_h_prev.fill(0.0);

        let sinks = GruGradSinks {
            d_x,
            d_h_prev,
            dw_x2z: dw_x2z.as_mut_slice(),
            dw_x2r: dw_x2r.as_mut_slice(),
            dw_x2h: dw_x2h.as_mut_slice(),
            dw_hr2c: dw_hr2c.as_mut_slice(),
            dw_s2z: dw_s2z.as_mut_slice(),
            dw_s2r: dw_s2r.as_mut_slice(),
            db_2z: db_2z.map(|t| t.as_mut_slice()),
            db_2r: db_2r.map(|t| t.as_mut_slice()),
            db_2h: db_2h.map(|t| t.as_mut_slice()),
        };

        gru_cell_backward(
            ctx.in_data[0],
            ctx.in_data[1],
            &weights,
            &caches,
            ctx.out_grads[0],
            sinks,
            params,
            ctx.parallelize,
        );
        Ok(())
    }
}
