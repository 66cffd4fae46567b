//! Elman RNN cell kernel.
//!
//! Forward, per sample:
//!
//! ```text
//! pre_h[o]  = sum_i U[i,o]*x[i] + sum_o2 W[o2,o]*h_prev[o2] (+ b[o])
//! h_next    = act(pre_h)
//! out[o]    = sum_o2 V[o2,o]*h_next[o2] (+ c[o])
//! ```
//!
//! There is no nonlinearity on the output projection. Two weight roles:
//! state transition (`U`, `W`, `b`) and output projection (`V`, `c`).
//! All matrices are flat row-major, addressed `m[row * out_size + col]`
//! with the row indexing the source unit.

use std::sync::Arc;

use crate::activation::Activation;
use crate::config::RecurrentConfig;
use crate::kernels::accumulate;
use crate::parallel::map_samples;
use crate::tensor::{dot, muladd, Tensor};

/// Cell parameters fixed at construction.
#[derive(Debug, Clone)]
pub(crate) struct RnnParams {
    pub in_size: usize,
    pub out_size: usize,
    pub has_bias: bool,
    /// State activation; shared, stateless, reentrant.
    pub activation: Arc<dyn Activation>,
}

impl RnnParams {
    pub(crate) fn from_config(config: &RecurrentConfig) -> Self {
        Self {
            in_size: config.in_size,
            out_size: config.out_size,
            has_bias: config.has_bias,
            activation: config.activation.build(),
        }
    }
}

/// Forward inputs, one field per context slot.
pub(crate) struct RnnForwardArgs<'a> {
    pub x: &'a Tensor,
    pub h_prev: &'a Tensor,
    pub u: &'a [f32],
    pub w: &'a [f32],
    pub v: &'a [f32],
    pub b: Option<&'a [f32]>,
    pub c: Option<&'a [f32]>,
}

struct RnnSampleForward {
    out: Vec<f32>,
    h_next: Vec<f32>,
}

pub(crate) fn rnn_cell_forward(
    args: &RnnForwardArgs<'_>,
    out: &mut Tensor,
    h_next: &mut Tensor,
    params: &RnnParams,
    parallelize: bool,
) {
    let in_size = params.in_size;
    let out_size = params.out_size;
    let batch = args.x.batch();

    let results = map_samples(parallelize, batch, |sample| {
        let x = args.x.row(sample);
        let h_prev = args.h_prev.row(sample);

        let mut pre_h = vec![0.0_f32; out_size];
        for (o, pre) in pre_h.iter_mut().enumerate() {
            let mut acc = 0.0;
            // W * h(t-1)
            for (o2, &h) in h_prev.iter().enumerate() {
                acc += args.w[o2 * out_size + o] * h;
            }
            // U * x(t)
            for (i, &xi) in x.iter().enumerate().take(in_size) {
                acc += args.u[i * out_size + o] * xi;
            }
            if let Some(b) = args.b {
                acc += b[o];
            }
            *pre = acc;
        }

        let mut h_row = vec![0.0_f32; out_size];
        params.activation.forward(&pre_h, &mut h_row);

        // Output projection, V is out_size x out_size.
        let mut out_row = vec![0.0_f32; out_size];
        for (o, out_v) in out_row.iter_mut().enumerate() {
            let mut acc = 0.0;
            for (o2, &h) in h_row.iter().enumerate() {
                acc += args.v[o2 * out_size + o] * h;
            }
            if let Some(c) = args.c {
                acc += c[o];
            }
            *out_v = acc;
        }

        RnnSampleForward {
            out: out_row,
            h_next: h_row,
        }
    });

    for (sample, r) in results.into_iter().enumerate() {
        out.row_mut(sample).copy_from_slice(&r.out);
        h_next.row_mut(sample).copy_from_slice(&r.h_next);
    }
}

/// Backward inputs: the forward slots plus caches and incoming deltas.
pub(crate) struct RnnBackwardArgs<'a> {
    pub x: &'a Tensor,
    pub h_prev: &'a Tensor,
    pub u: &'a [f32],
    pub w: &'a [f32],
    pub v: &'a [f32],
    /// Cached post-activation state from the forward pass.
    pub h_next: &'a Tensor,
    /// Delta on the output slot.
    pub d_out: &'a Tensor,
    /// Delta on the next-state slot.
    pub d_h_next: &'a Tensor,
}

/// Gradient targets; all accumulation is `+=` onto zeroed buffers.
pub(crate) struct RnnGradSinks<'a> {
    pub d_x: &'a mut Tensor,
    pub d_h_prev: &'a mut Tensor,
    pub du: &'a mut [f32],
    pub dw: &'a mut [f32],
    pub dv: &'a mut [f32],
    pub db: Option<&'a mut [f32]>,
    pub dc: Option<&'a mut [f32]>,
}

struct RnnSampleGrads {
    d_x: Vec<f32>,
    d_h_prev: Vec<f32>,
    du: Vec<f32>,
    dw: Vec<f32>,
    dv: Vec<f32>,
    db: Option<Vec<f32>>,
    dc: Option<Vec<f32>>,
}

pub(crate) fn rnn_cell_backward(
    args: &RnnBackwardArgs<'_>,
    sinks: RnnGradSinks<'_>,
    params: &RnnParams,
    parallelize: bool,
) {
    let in_size = params.in_size;
    let out_size = params.out_size;
    let batch = args.x.batch();

    let partials = map_samples(parallelize, batch, |sample| {
        let x = args.x.row(sample);
        let h_prev = args.h_prev.row(sample);
        let h_next = args.h_next.row(sample);
        let d_out = args.d_out.row(sample);

        // Delta from the output head through V into the state.
        let mut state_delta = args.d_h_next.row(sample).to_vec();
        for (o, sd) in state_delta.iter_mut().enumerate() {
            *sd += dot(d_out, &args.v[o * out_size..(o + 1) * out_size]);
        }

        // Through the activation, using the cached post-activation state.
        params
            .activation
            .backward(h_next, h_next, &mut state_delta);

        // delta h(t) -W-> h(t-1)
        let mut d_h_prev = vec![0.0_f32; out_size];
        for (o, d) in d_h_prev.iter_mut().enumerate() {
            *d = dot(&state_delta, &args.w[o * out_size..(o + 1) * out_size]);
        }

        // delta h(t) -U-> x(t)
        let mut d_x = vec![0.0_f32; in_size];
        for (i, d) in d_x.iter_mut().enumerate() {
            *d = dot(&state_delta, &args.u[i * out_size..(i + 1) * out_size]);
        }

        // Weight gradients: outer products of delta and forward input.
        let mut dv = vec![0.0_f32; out_size * out_size];
        for (o, &h) in h_next.iter().enumerate() {
            muladd(d_out, h, &mut dv[o * out_size..(o + 1) * out_size]);
        }
        let mut dw = vec![0.0_f32; out_size * out_size];
        for (o, &h) in h_prev.iter().enumerate() {
            muladd(&state_delta, h, &mut dw[o * out_size..(o + 1) * out_size]);
        }
        let mut du = vec![0.0_f32; in_size * out_size];
        for (i, &xi) in x.iter().enumerate() {
            muladd(&state_delta, xi, &mut du[i * out_size..(i + 1) * out_size]);
        }

        let (db, dc) = if params.has_bias {
            (Some(state_delta.clone()), Some(d_out.to_vec()))
        } else {
            (None, None)
        };

        RnnSampleGrads {
            d_x,
            d_h_prev,
            du,
            dw,
            dv,
            db,
            dc,
        }
    });

    reduce(partials, sinks);
}

fn reduce(partials: Vec<RnnSampleGrads>, sinks: RnnGradSinks<'_>) {
    let RnnGradSinks {
        d_x,
        d_h_prev,
        du,
        dw,
        dv,
        mut db,
        mut dc,
    } = sinks;

    for (sample, p) in partials.into_iter().enumerate() {
        accumulate(d_x.row_mut(sample), &p.d_x);
        accumulate(d_h_prev.row_mut(sample), &p.d_h_prev);
        accumulate(du, &p.du);
        accumulate(dw, &p.dw);
        accumulate(dv, &p.dv);
        if let (Some(db), Some(src)) = (db.as_deref_mut(), p.db.as_deref()) {
            accumulate(db, src);
        }
        if let (Some(dc), Some(src)) = (dc.as_deref_mut(), p.dc.as_deref()) {
            accumulate(dc, src);
        }
    }
}
