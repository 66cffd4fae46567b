//! LSTM cell kernel.
//!
//! Gates, per sample:
//!
//! ```text
//! i = sigmoid(W_x2i*x + W_h2i*h_prev + b_2i)     (input)
//! f = sigmoid(W_x2f*x + W_h2f*h_prev + b_2f)     (forget)
//! z = tanh(W_x2c*x + W_h2c*h_prev + b_2c)        (candidate)
//! o = sigmoid(W_x2o*x + W_h2o*h_prev + b_2o)     (output)
//! c_next = f . c_prev + i . z
//! h_next = o . tanh(c_next)
//! ```
//!
//! The forward output slot carries the output gate's post-activation
//! directly; `h_next` is a separate derived tensor multiplying it by
//! `tanh(c_next)`. The backward pass walks the gates in the order
//! output, cell, input, candidate, forget.

use std::sync::Arc;

use crate::activation::Activation;
use crate::config::RecurrentConfig;
use crate::kernels::accumulate;
use crate::parallel::map_samples;
use crate::tensor::{dot, muladd, Tensor};

/// Cell parameters fixed at construction.
#[derive(Debug, Clone)]
pub(crate) struct LstmParams {
    pub in_size: usize,
    pub out_size: usize,
    pub has_bias: bool,
    /// Candidate and cell-state activation.
    pub tanh: Arc<dyn Activation>,
    /// Gate activation.
    pub sigmoid: Arc<dyn Activation>,
}

impl LstmParams {
    pub(crate) fn from_config(config: &RecurrentConfig) -> Self {
        Self {
            in_size: config.in_size,
            out_size: config.out_size,
            has_bias: config.has_bias,
            tanh: crate::activation::ActivationKind::Tanh.build(),
            sigmoid: crate::activation::ActivationKind::Sigmoid.build(),
        }
    }
}

/// The eight weight matrices, flat row-major with the row as the source
/// unit, plus the four optional biases.
pub(crate) struct LstmWeightRefs<'a> {
    pub w_x2i: &'a [f32],
    pub w_x2f: &'a [f32],
    pub w_x2c: &'a [f32],
    pub w_x2o: &'a [f32],
    pub w_h2i: &'a [f32],
    pub w_h2f: &'a [f32],
    pub w_h2c: &'a [f32],
    pub w_h2o: &'a [f32],
    pub b_2i: Option<&'a [f32]>,
    pub b_2f: Option<&'a [f32]>,
    pub b_2c: Option<&'a [f32]>,
    pub b_2o: Option<&'a [f32]>,
}

/// Cache tensors produced by forward and consumed unchanged by backward.
pub(crate) struct LstmCacheSinks<'a> {
    pub pre_i: &'a mut Tensor,
    pub pre_f: &'a mut Tensor,
    pub pre_z: &'a mut Tensor,
    pub pre_o: &'a mut Tensor,
    pub post_i: &'a mut Tensor,
    pub post_f: &'a mut Tensor,
    pub post_z: &'a mut Tensor,
    pub post_c: &'a mut Tensor,
}

struct LstmSampleForward {
    out: Vec<f32>,
    h_next: Vec<f32>,
    c_next: Vec<f32>,
    pre_i: Vec<f32>,
    pre_f: Vec<f32>,
    pre_z: Vec<f32>,
    pre_o: Vec<f32>,
    post_i: Vec<f32>,
    post_f: Vec<f32>,
    post_z: Vec<f32>,
    post_c: Vec<f32>,
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn lstm_cell_forward(
    x: &Tensor,
    h_prev: &Tensor,
    c_prev: &Tensor,
    weights: &LstmWeightRefs<'_>,
    out: &mut Tensor,
    h_next: &mut Tensor,
    c_next: &mut Tensor,
    caches: LstmCacheSinks<'_>,
    params: &LstmParams,
    parallelize: bool,
) {
    let in_size = params.in_size;
    let out_size = params.out_size;
    let batch = x.batch();

    let results = map_samples(parallelize, batch, |sample| {
        let x = x.row(sample);
        let h_prev = h_prev.row(sample);
        let c_prev = c_prev.row(sample);

        let mut pre_i = vec![0.0_f32; out_size];
        let mut pre_f = vec![0.0_f32; out_size];
        let mut pre_z = vec![0.0_f32; out_size];
        let mut pre_o = vec![0.0_f32; out_size];

        for o in 0..out_size {
            let mut i_ = 0.0;
            let mut f_ = 0.0;
            let mut z_ = 0.0;
            let mut o_ = 0.0;
            for (i, &xi) in x.iter().enumerate().take(in_size) {
                i_ += weights.w_x2i[i * out_size + o] * xi;
                f_ += weights.w_x2f[i * out_size + o] * xi;
                z_ += weights.w_x2c[i * out_size + o] * xi;
                o_ += weights.w_x2o[i * out_size + o] * xi;
            }
            for (o2, &h) in h_prev.iter().enumerate() {
                i_ += weights.w_h2i[o2 * out_size + o] * h;
                f_ += weights.w_h2f[o2 * out_size + o] * h;
                z_ += weights.w_h2c[o2 * out_size + o] * h;
                o_ += weights.w_h2o[o2 * out_size + o] * h;
            }
            if let Some(b) = weights.b_2i {
                i_ += b[o];
            }
            if let Some(b) = weights.b_2f {
                f_ += b[o];
            }
            if let Some(b) = weights.b_2c {
                z_ += b[o];
            }
            if let Some(b) = weights.b_2o {
                o_ += b[o];
            }
            pre_i[o] = i_;
            pre_f[o] = f_;
            pre_z[o] = z_;
            pre_o[o] = o_;
        }

        let mut post_i = vec![0.0_f32; out_size];
        let mut post_f = vec![0.0_f32; out_size];
        let mut post_z = vec![0.0_f32; out_size];
        // The output slot aliases the o gate's post-activation.
        let mut out_row = vec![0.0_f32; out_size];
        params.sigmoid.forward(&pre_i, &mut post_i);
        params.sigmoid.forward(&pre_f, &mut post_f);
        params.sigmoid.forward(&pre_o, &mut out_row);
        params.tanh.forward(&pre_z, &mut post_z);

        let mut c_row = vec![0.0_f32; out_size];
        for o in 0..out_size {
            c_row[o] = post_f[o] * c_prev[o] + post_i[o] * post_z[o];
        }
        let mut post_c = vec![0.0_f32; out_size];
        params.tanh.forward(&c_row, &mut post_c);

        let mut h_row = vec![0.0_f32; out_size];
        for o in 0..out_size {
            h_row[o] = out_row[o] * post_c[o];
        }

        LstmSampleForward {
            out: out_row,
            h_next: h_row,
            c_next: c_row,
            pre_i,
            pre_f,
            pre_z,
            pre_o,
            post_i,
            post_f,
            post_z,
            post_c,
        }
    });

    let LstmCacheSinks {
        pre_i,
        pre_f,
        pre_z,
        pre_o,
        post_i,
        post_f,
        post_z,
        post_c,
    } = caches;
    for (sample, r) in results.into_iter().enumerate() {
        out.row_mut(sample).copy_from_slice(&r.out);
        h_next.row_mut(sample).copy_from_slice(&r.h_next);
        c_next.row_mut(sample).copy_from_slice(&r.c_next);
        pre_i.row_mut(sample).copy_from_slice(&r.pre_i);
        pre_f.row_mut(sample).copy_from_slice(&r.pre_f);
        pre_z.row_mut(sample).copy_from_slice(&r.pre_z);
        pre_o.row_mut(sample).copy_from_slice(&r.pre_o);
        post_i.row_mut(sample).copy_from_slice(&r.post_i);
        post_f.row_mut(sample).copy_from_slice(&r.post_f);
        post_z.row_mut(sample).copy_from_slice(&r.post_z);
        post_c.row_mut(sample).copy_from_slice(&r.post_c);
    }
}

/// Cache tensors as read by the backward pass, plus the forward outputs.
pub(crate) struct LstmCacheRefs<'a> {
    /// Output gate post-activation (the forward output slot).
    pub post_o: &'a Tensor,
    pub c_next: &'a Tensor,
    pub pre_i: &'a Tensor,
    pub pre_f: &'a Tensor,
    pub pre_z: &'a Tensor,
    pub pre_o: &'a Tensor,
    pub post_i: &'a Tensor,
    pub post_f: &'a Tensor,
    pub post_z: &'a Tensor,
    pub post_c: &'a Tensor,
}

/// Incoming deltas for the three forward outputs.
pub(crate) struct LstmDeltaRefs<'a> {
    pub d_out: &'a Tensor,
    pub d_h_next: &'a Tensor,
    pub d_c_next: &'a Tensor,
}

/// Gradient targets; all accumulation is `+=` onto zeroed buffers.
pub(crate) struct LstmGradSinks<'a> {
    pub d_x: &'a mut Tensor,
    pub d_h_prev: &'a mut Tensor,
    pub d_c_prev: &'a mut Tensor,
    pub dw_x2i: &'a mut [f32],
    pub dw_x2f: &'a mut [f32],
    pub dw_x2c: &'a mut [f32],
    pub dw_x2o: &'a mut [f32],
    pub dw_h2i: &'a mut [f32],
    pub dw_h2f: &'a mut [f32],
    pub dw_h2c: &'a mut [f32],
    pub dw_h2o: &'a mut [f32],
    pub db_2i: Option<&'a mut [f32]>,
    pub db_2f: Option<&'a mut [f32]>,
    pub db_2c: Option<&'a mut [f32]>,
    pub db_2o: Option<&'a mut [f32]>,
}

struct LstmSampleGrads {
    d_x: Vec<f32>,
    d_h_prev: Vec<f32>,
    d_c_prev: Vec<f32>,
    dw_x2i: Vec<f32>,
    dw_x2f: Vec<f32>,
    dw_x2c: Vec<f32>,
    dw_x2o: Vec<f32>,
    dw_h2i: Vec<f32>,
    dw_h2f: Vec<f32>,
    dw_h2c: Vec<f32>,
    dw_h2o: Vec<f32>,
    db_2i: Option<Vec<f32>>,
    db_2f: Option<Vec<f32>>,
    db_2c: Option<Vec<f32>>,
    db_2o: Option<Vec<f32>>,
}

/// One gate's share of the backward pass: the activation-scaled delta in
/// `gate_delta` flows into the weight-gradient outer products, the bias
/// gradient, and the input/state deltas.
#[allow(clippy::too_many_arguments)]
fn backprop_gate(
    gate_delta: &[f32],
    x: &[f32],
    h_prev: &[f32],
    w_x: &[f32],
    w_h: &[f32],
    dw_x: &mut [f32],
    dw_h: &mut [f32],
    d_x: &mut [f32],
    d_h_prev: &mut [f32],
    out_size: usize,
) {
    for (i, &xi) in x.iter().enumerate() {
        muladd(gate_delta, xi, &mut dw_x[i * out_size..(i + 1) * out_size]);
        d_x[i] += dot(&w_x[i * out_size..(i + 1) * out_size], gate_delta);
    }
    for (o, &h) in h_prev.iter().enumerate() {
        muladd(gate_delta, h, &mut dw_h[o * out_size..(o + 1) * out_size]);
        d_h_prev[o] += dot(&w_h[o * out_size..(o + 1) * out_size], gate_delta);
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn lstm_cell_backward(
    x: &Tensor,
    h_prev: &Tensor,
    c_prev: &Tensor,
    weights: &LstmWeightRefs<'_>,
    caches: &LstmCacheRefs<'_>,
    deltas: &LstmDeltaRefs<'_>,
    sinks: LstmGradSinks<'_>,
    params: &LstmParams,
    parallelize: bool,
) {
    let in_size = params.in_size;
    let out_size = params.out_size;
    let batch = x.batch();

    let partials = map_samples(parallelize, batch, |sample| {
        let x = x.row(sample);
        let h_prev = h_prev.row(sample);
        let c_prev = c_prev.row(sample);
        let post_o = caches.post_o.row(sample);
        let c_next = caches.c_next.row(sample);
        let d_out = deltas.d_out.row(sample);
        let d_h_next = deltas.d_h_next.row(sample);
        let d_c_next = deltas.d_c_next.row(sample);

        let mut d_x = vec![0.0_f32; in_size];
        let mut d_h_prev = vec![0.0_f32; out_size];
        let mut d_c_prev = vec![0.0_f32; out_size];
        let mut dw_x2i = vec![0.0_f32; in_size * out_size];
        let mut dw_x2f = vec![0.0_f32; in_size * out_size];
        let mut dw_x2c = vec![0.0_f32; in_size * out_size];
        let mut dw_x2o = vec![0.0_f32; in_size * out_size];
        let mut dw_h2i = vec![0.0_f32; out_size * out_size];
        let mut dw_h2f = vec![0.0_f32; out_size * out_size];
        let mut dw_h2c = vec![0.0_f32; out_size * out_size];
        let mut dw_h2o = vec![0.0_f32; out_size * out_size];

        let mut aux1 = vec![0.0_f32; out_size];
        let mut aux2 = vec![0.0_f32; out_size];

        // ─── output gate ───
        // The out slot and h_next both reach o: d_o = d_out + d_h_next . tanh(c_next)
        for o in 0..out_size {
            aux1[o] = d_out[o] + d_h_next[o] * caches.post_c.row(sample)[o];
        }
        params
            .sigmoid
            .backward(caches.pre_o.row(sample), post_o, &mut aux1);
        let db_2o = params.has_bias.then(|| aux1.clone());
        backprop_gate(
            &aux1,
            x,
            h_prev,
            weights.w_x2o,
            weights.w_h2o,
            &mut dw_x2o,
            &mut dw_h2o,
            &mut d_x,
            &mut d_h_prev,
            out_size,
        );

        // ─── cell state ───
        // d_c = d_c_next + the h_next component through tanh(c_next)
        for o in 0..out_size {
            aux1[o] = d_h_next[o] * post_o[o];
        }
        params
            .tanh
            .backward(c_next, caches.post_c.row(sample), &mut aux1);
        for o in 0..out_size {
            aux1[o] += d_c_next[o];
            aux2[o] = aux1[o] * caches.post_z.row(sample)[o];
            d_c_prev[o] += aux1[o] * caches.post_f.row(sample)[o];
        }

        // ─── input gate ───
        params
            .sigmoid
            .backward(caches.pre_i.row(sample), caches.post_i.row(sample), &mut aux2);
        let db_2i = params.has_bias.then(|| aux2.clone());
        backprop_gate(
            &aux2,
            x,
            h_prev,
            weights.w_x2i,
            weights.w_h2i,
            &mut dw_x2i,
            &mut dw_h2i,
            &mut d_x,
            &mut d_h_prev,
            out_size,
        );

        // ─── candidate ───
        for o in 0..out_size {
            aux2[o] = aux1[o] * caches.post_i.row(sample)[o];
        }
        params
            .tanh
            .backward(caches.pre_z.row(sample), caches.post_z.row(sample), &mut aux2);
        let db_2c = params.has_bias.then(|| aux2.clone());
        backprop_gate(
            &aux2,
            x,
            h_prev,
            weights.w_x2c,
            weights.w_h2c,
            &mut dw_x2c,
            &mut dw_h2c,
            &mut d_x,
            &mut d_h_prev,
            out_size,
        );

        // ─── forget gate ───
        for o in 0..out_size {
            aux2[o] = aux1[o] * c_prev[o];
        }
        params
            .sigmoid
            .backward(caches.pre_f.row(sample), caches.post_f.row(sample), &mut aux2);
        let db_2f = params.has_bias.then(|| aux2.clone());
        backprop_gate(
            &aux2,
            x,
            h_prev,
            weights.w_x2f,
            weights.w_h2f,
            &mut dw_x2f,
            &mut dw_h2f,
            &mut d_x,
            &mut d_h_prev,
            out_size,
        );

        LstmSampleGrads {
            d_x,
            d_h_prev,
            d_c_prev,
            dw_x2i,
            dw_x2f,
            dw_x2c,
            dw_x2o,
            dw_h2i,
            dw_h2f,
            dw_h2c,
            dw_h2o,
            db_2i,
            db_2f,
            db_2c,
            db_2o,
        }
    });

    reduce(partials, sinks);
}

fn reduce(partials: Vec<LstmSampleGrads>, sinks: LstmGradSinks<'_>) {
    let LstmGradSinks {
        d_x,
        d_h_prev,
        d_c_prev,
        dw_x2i,
        dw_x2f,
        dw_x2c,
        dw_x2o,
        dw_h2i,
        dw_h2f,
        dw_h2c,
        dw_h2o,
        mut db_2i,
        mut db_2f,
        mut db_2c,
        mut db_2o,
    } = sinks;

    for (sample, p) in partials.into_iter().enumerate() {
        accumulate(d_x.row_mut(sample), &p.d_x);
        accumulate(d_h_prev.row_mut(sample), &p.d_h_prev);
        accumulate(d_c_prev.row_mut(sample), &p.d_c_prev);
        accumulate(dw_x2i, &p.dw_x2i);
        accumulate(dw_x2f, &p.dw_x2f);
        accumulate(dw_x2c, &p.dw_x2c);
        accumulate(dw_x2o, &p.dw_x2o);
        accumulate(dw_h2i, &p.dw_h2i);
        accumulate(dw_h2f, &p.dw_h2f);
        accumulate(dw_h2c, &p.dw_h2c);
        accumulate(dw_h2o, &p.dw_h2o);
        if let (Some(dst), Some(src)) = (db_2i.as_deref_mut(), p.db_2i.as_deref()) {
            accumulate(dst, src);
        }
        if let (Some(dst), Some(src)) = (db_2f.as_deref_mut(), p.db_2f.as_deref()) {
            accumulate(dst, src);
        }
        if let (Some(dst), Some(src)) = (db_2c.as_deref_mut(), p.db_2c.as_deref()) {
            accumulate(dst, src);
        }
        if let (Some(dst), Some(src)) = (db_2o.as_deref_mut(), p.db_2o.as_deref()) {
            accumulate(dst, src);
        }
    }
}
