//! GRU cell kernel.
//!
//! Gates, per sample:
//!
//! ```text
//! z   = sigmoid(W_x2z*x + W_s2z*h_prev + b_2z)          (update)
//! r   = sigmoid(W_x2r*x + W_s2r*h_prev + b_2r)          (reset)
//! h~  = tanh(W_x2h*x + W_hr2c*(r . h_prev) + b_2h)      (candidate)
//! out = z . h_prev + (1 - z) . h~
//! ```
//!
//! The candidate pre-activation is assembled in two passes: the x-driven
//! term (plus bias) first, then the reset-gated recurrent term added on
//! top, and only then the tanh. `W_hr2c` applies to the gated state
//! `hr = r . h_prev`, never to `h_prev` directly.

use std::sync::Arc;

use crate::activation::Activation;
use crate::config::RecurrentConfig;
use crate::kernels::accumulate;
use crate::parallel::map_samples;
use crate::tensor::{dot, muladd, Tensor};

/// Cell parameters fixed at construction.
#[derive(Debug, Clone)]
pub(crate) struct GruParams {
    pub in_size: usize,
    pub out_size: usize,
    pub has_bias: bool,
    /// Candidate activation.
    pub tanh: Arc<dyn Activation>,
    /// Gate activation.
    pub sigmoid: Arc<dyn Activation>,
}

impl GruParams {
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

/// The six weight matrices, flat row-major with the row as the source unit.
pub(crate) struct GruWeightRefs<'a> {
    pub w_x2z: &'a [f32],
    pub w_x2r: &'a [f32],
    pub w_x2h: &'a [f32],
    pub w_hr2c: &'a [f32],
    pub w_s2z: &'a [f32],
    pub w_s2r: &'a [f32],
    pub b_2z: Option<&'a [f32]>,
    pub b_2r: Option<&'a [f32]>,
    pub b_2h: Option<&'a [f32]>,
}

/// Cache tensors produced by forward and consumed unchanged by backward.
/// One slot per gate buffer, each `[batch, out_size]`.
pub(crate) struct GruCacheSinks<'a> {
    pub post_h: &'a mut Tensor,
    pub post_r: &'a mut Tensor,
    pub post_z: &'a mut Tensor,
    pub pre_h: &'a mut Tensor,
    pub pre_r: &'a mut Tensor,
    pub hr: &'a mut Tensor,
    pub pre_z: &'a mut Tensor,
    pub z_neg: &'a mut Tensor,
}

struct GruSampleForward {
    out: Vec<f32>,
    post_h: Vec<f32>,
    post_r: Vec<f32>,
    post_z: Vec<f32>,
    pre_h: Vec<f32>,
    pre_r: Vec<f32>,
    hr: Vec<f32>,
    pre_z: Vec<f32>,
    z_neg: Vec<f32>,
}

pub(crate) fn gru_cell_forward(
    x: &Tensor,
    h_prev: &Tensor,
    weights: &GruWeightRefs<'_>,
    out: &mut Tensor,
    caches: GruCacheSinks<'_>,
    params: &GruParams,
    parallelize: bool,
) {
    let in_size = params.in_size;
    let out_size = params.out_size;
    let batch = x.batch();

    let results = map_samples(parallelize, batch, |sample| {
        let x = x.row(sample);
        let h_prev = h_prev.row(sample);

        let mut pre_z = vec![0.0_f32; out_size];
        let mut pre_r = vec![0.0_f32; out_size];
        let mut pre_h = vec![0.0_f32; out_size];

        // First pass: x-driven terms for all three gates, h_prev-driven
        // terms for z and r, biases.
        for o in 0..out_size {
            let mut local_z = 0.0;
            let mut local_r = 0.0;
            let mut local_h = 0.0;
            for (i, &xi) in x.iter().enumerate().take(in_size) {
                local_z += weights.w_x2z[i * out_size + o] * xi;
                local_r += weights.w_x2r[i * out_size + o] * xi;
                local_h += weights.w_x2h[i * out_size + o] * xi;
            }
            for (o2, &h) in h_prev.iter().enumerate() {
                local_z += weights.w_s2z[o2 * out_size + o] * h;
                local_r += weights.w_s2r[o2 * out_size + o] * h;
            }
            if let Some(b) = weights.b_2z {
                local_z += b[o];
            }
            if let Some(b) = weights.b_2r {
                local_r += b[o];
            }
            if let Some(b) = weights.b_2h {
                local_h += b[o];
            }
            pre_z[o] = local_z;
            pre_r[o] = local_r;
            pre_h[o] = local_h;
        }

        let mut post_z = vec![0.0_f32; out_size];
        let mut post_r = vec![0.0_f32; out_size];
        params.sigmoid.forward(&pre_z, &mut post_z);
        params.sigmoid.forward(&pre_r, &mut post_r);

        // Second pass: the reset-gated recurrent term lands on top of the
        // x-driven candidate pre-activation before the nonlinearity.
        let mut out_row = vec![0.0_f32; out_size];
        let mut z_neg = vec![0.0_f32; out_size];
        let mut hr = vec![0.0_f32; out_size];
        for o in 0..out_size {
            out_row[o] = h_prev[o] * post_z[o];
            z_neg[o] = 1.0 - post_z[o];
            let gated = h_prev[o] * post_r[o];
            for (o2, pre) in pre_h.iter_mut().enumerate() {
                *pre += weights.w_hr2c[o * out_size + o2] * gated;
            }
            hr[o] = gated;
        }

        let mut post_h = vec![0.0_f32; out_size];
        params.tanh.forward(&pre_h, &mut post_h);
        for o in 0..out_size {
            out_row[o] += z_neg[o] * post_h[o];
        }

        GruSampleForward {
            out: out_row,
            post_h,
            post_r,
            post_z,
            pre_h,
            pre_r,
            hr,
            pre_z,
            z_neg,
        }
    });

    let GruCacheSinks {
        post_h,
        post_r,
        post_z,
        pre_h,
        pre_r,
        hr,
        pre_z,
        z_neg,
    } = caches;
    for (sample, r) in results.into_iter().enumerate() {
        out.row_mut(sample).copy_from_slice(&r.out);
        post_h.row_mut(sample).copy_from_slice(&r.post_h);
        post_r.row_mut(sample).copy_from_slice(&r.post_r);
        post_z.row_mut(sample).copy_from_slice(&r.post_z);
        pre_h.row_mut(sample).copy_from_slice(&r.pre_h);
        pre_r.row_mut(sample).copy_from_slice(&r.pre_r);
        hr.row_mut(sample).copy_from_slice(&r.hr);
        pre_z.row_mut(sample).copy_from_slice(&r.pre_z);
        z_neg.row_mut(sample).copy_from_slice(&r.z_neg);
    }
}

/// Cache tensors as read by the backward pass.
pub(crate) struct GruCacheRefs<'a> {
    pub post_h: &'a Tensor,
    pub post_r: &'a Tensor,
    pub post_z: &'a Tensor,
    pub pre_h: &'a Tensor,
    pub pre_r: &'a Tensor,
    pub hr: &'a Tensor,
    pub pre_z: &'a Tensor,
    pub z_neg: &'a Tensor,
}

/// Gradient targets; all accumulation is `+=` onto zeroed buffers.
pub(crate) struct GruGradSinks<'a> {
    pub d_x: &'a mut Tensor,
    pub d_h_prev: &'a mut Tensor,
    pub dw_x2z: &'a mut [f32],
    pub dw_x2r: &'a mut [f32],
    pub dw_x2h: &'a mut [f32],
    pub dw_hr2c: &'a mut [f32],
    pub dw_s2z: &'a mut [f32],
    pub dw_s2r: &'a mut [f32],
    pub db_2z: Option<&'a mut [f32]>,
    pub db_2r: Option<&'a mut [f32]>,
    pub db_2h: Option<&'a mut [f32]>,
}

struct GruSampleGrads {
    d_x: Vec<f32>,
    d_h_prev: Vec<f32>,
    dw_x2z: Vec<f32>,
    dw_x2r: Vec<f32>,
    dw_x2h: Vec<f32>,
    dw_hr2c: Vec<f32>,
    dw_s2z: Vec<f32>,
    dw_s2r: Vec<f32>,
    db_2z: Option<Vec<f32>>,
    db_2r: Option<Vec<f32>>,
    db_2h: Option<Vec<f32>>,
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn gru_cell_backward(
    x: &Tensor,
    h_prev: &Tensor,
    weights: &GruWeightRefs<'_>,
    caches: &GruCacheRefs<'_>,
    d_out: &Tensor,
    sinks: GruGradSinks<'_>,
    params: &GruParams,
    parallelize: bool,
) {
    let in_size = params.in_size;
    let out_size = params.out_size;
    let batch = x.batch();

    let partials = map_samples(parallelize, batch, |sample| {
        let x = x.row(sample);
        let h_prev = h_prev.row(sample);
        let d_out = d_out.row(sample);
        let post_h = caches.post_h.row(sample);
        let post_r = caches.post_r.row(sample);
        let post_z = caches.post_z.row(sample);
        let pre_h = caches.pre_h.row(sample);
        let pre_r = caches.pre_r.row(sample);
        let hr = caches.hr.row(sample);
        let pre_z = caches.pre_z.row(sample);
        let z_neg = caches.z_neg.row(sample);

        let mut d_x = vec![0.0_f32; in_size];
        let mut d_h_prev = vec![0.0_f32; out_size];
        let mut dw_x2z = vec![0.0_f32; in_size * out_size];
        let mut dw_x2r = vec![0.0_f32; in_size * out_size];
        let mut dw_x2h = vec![0.0_f32; in_size * out_size];
        let mut dw_hr2c = vec![0.0_f32; out_size * out_size];
        let mut dw_s2z = vec![0.0_f32; out_size * out_size];
        let mut dw_s2r = vec![0.0_f32; out_size * out_size];

        let mut aux = vec![0.0_f32; out_size];

        // ─── update gate ───
        // d_out -> d_h_prev (direct term via z), d_out -> dz
        for o in 0..out_size {
            d_h_prev[o] += d_out[o] * post_z[o];
            aux[o] = d_out[o] * (h_prev[o] - post_h[o]);
        }
        params.sigmoid.backward(pre_z, post_z, &mut aux);

        let db_2z = params.has_bias.then(|| aux.clone());
        for (i, &xi) in x.iter().enumerate() {
            d_x[i] += dot(&aux, &weights.w_x2z[i * out_size..(i + 1) * out_size]);
            muladd(&aux, xi, &mut dw_x2z[i * out_size..(i + 1) * out_size]);
        }
        for (o, &h) in h_prev.iter().enumerate() {
            d_h_prev[o] += dot(&aux, &weights.w_s2z[o * out_size..(o + 1) * out_size]);
            muladd(&aux, h, &mut dw_s2z[o * out_size..(o + 1) * out_size]);
        }

        // ─── candidate ───
        // d_out -> d(h~) via (1 - z), through the tanh
        for o in 0..out_size {
            aux[o] = d_out[o] * z_neg[o];
        }
        params.tanh.backward(pre_h, post_h, &mut aux);

        let db_2h = params.has_bias.then(|| aux.clone());
        for (i, &xi) in x.iter().enumerate() {
            d_x[i] += dot(&aux, &weights.w_x2h[i * out_size..(i + 1) * out_size]);
            muladd(&aux, xi, &mut dw_x2h[i * out_size..(i + 1) * out_size]);
        }
        for (o, &g) in hr.iter().enumerate() {
            muladd(&aux, g, &mut dw_hr2c[o * out_size..(o + 1) * out_size]);
        }

        // d(h~ pre) -> d(hr); separate buffer, aux is still being read
        let mut d_hr = vec![0.0_f32; out_size];
        for (o, d) in d_hr.iter_mut().enumerate() {
            *d = dot(&aux, &weights.w_hr2c[o * out_size..(o + 1) * out_size]);
        }

        // ─── reset gate ───
        // hr = r . h_prev splits into a d_h_prev term and dr
        for o in 0..out_size {
            d_h_prev[o] += d_hr[o] * post_r[o];
            aux[o] = d_hr[o] * h_prev[o];
        }
        params.sigmoid.backward(pre_r, post_r, &mut aux);

        let db_2r = params.has_bias.then(|| aux.clone());
        for (i, &xi) in x.iter().enumerate() {
            d_x[i] += dot(&aux, &weights.w_x2r[i * out_size..(i + 1) * out_size]);
            muladd(&aux, xi, &mut dw_x2r[i * out_size..(i + 1) * out_size]);
        }
        for (o, &h) in h_prev.iter().enumerate() {
            d_h_prev[o] += dot(&aux, &weights.w_s2r[o * out_size..(o + 1) * out_size]);
            muladd(&aux, h, &mut dw_s2r[o * out_size..(o + 1) * out_size]);
        }

        GruSampleGrads {
            d_x,
            d_h_prev,
            dw_x2z,
            dw_x2r,
            dw_x2h,
            dw_hr2c,
            dw_s2z,
            dw_s2r,
            db_2z,
            db_2r,
            db_2h,
        }
    });

    reduce(partials, sinks);
}

fn reduce(partials: Vec<GruSampleGrads>, sinks: GruGradSinks<'_>) {
    let GruGradSinks {
        d_x,
        d_h_prev,
        dw_x2z,
        dw_x2r,
        dw_x2h,
        dw_hr2c,
        dw_s2z,
        dw_s2r,
        mut db_2z,
        mut db_2r,
        mut db_2h,
    } = sinks;

    for (sample, p) in partials.into_iter().enumerate() {
        accumulate(d_x.row_mut(sample), &p.d_x);
        accumulate(d_h_prev.row_mut(sample), &p.d_h_prev);
        accumulate(dw_x2z, &p.dw_x2z);
        accumulate(dw_x2r, &p.dw_x2r);
        accumulate(dw_x2h, &p.dw_x2h);
        accumulate(dw_hr2c, &p.dw_hr2c);
        accumulate(dw_s2z, &p.dw_s2z);
        accumulate(dw_s2r, &p.dw_s2r);
        if let (Some(dst), Some(src)) = (db_2z.as_deref_mut(), p.db_2z.as_deref()) {
            accumulate(dst, src);
        }
        if let (Some(dst), Some(src)) = (db_2r.as_deref_mut(), p.db_2r.as_deref()) {
            accumulate(dst, src);
        }
        if let (Some(dst), Some(src)) = (db_2h.as_deref_mut(), p.db_2h.as_deref()) {
            accumulate(dst, src);
        }
    }
}
