//! Stateless activation functions shared across cells and threads.
//!
//! Each activation exposes the pair of transforms the kernels need: a
//! forward map from pre-activation to post-activation, and a backward map
//! that scales an incoming delta by the derivative. Both operate on whole
//! rows at a time. The objects carry no state, so a single `Arc` can be
//! shared by every gate of every cell without synchronization.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Elementwise activation with forward and backward transforms.
///
/// `backward` receives the cached pre- and post-activation rows from the
/// forward pass and scales `delta` in place by the derivative. The tanh and
/// sigmoid derivatives are both expressible from the post-activation alone,
/// which is why the kernels can cache `post_*` buffers and reuse them here.
pub trait Activation: Send + Sync + fmt::Debug {
    /// Writes `f(pre)` into `post`.
    fn forward(&self, pre: &[f32], post: &mut [f32]);

    /// Scales `delta` in place by `f'` evaluated from the cached rows.
    fn backward(&self, pre: &[f32], post: &[f32], delta: &mut [f32]);

    /// Human-readable tag.
    fn name(&self) -> &'static str;
}

/// Hyperbolic tangent. `f'(x) = 1 - f(x)^2`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Tanh;

impl Activation for Tanh {
    fn forward(&self, pre: &[f32], post: &mut [f32]) {
        for (p, &x) in post.iter_mut().zip(pre.iter()) {
            *p = x.tanh();
        }
    }

    fn backward(&self, _pre: &[f32], post: &[f32], delta: &mut [f32]) {
        for (d, &y) in delta.iter_mut().zip(post.iter()) {
            *d *= 1.0 - y * y;
        }
    }

    fn name(&self) -> &'static str {
        "tanh"
    }
}

/// Logistic sigmoid. `f'(x) = f(x) * (1 - f(x))`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sigmoid;

impl Activation for Sigmoid {
    fn forward(&self, pre: &[f32], post: &mut [f32]) {
        for (p, &x) in post.iter_mut().zip(pre.iter()) {
            *p = sigmoid(x);
        }
    }

    fn backward(&self, _pre: &[f32], post: &[f32], delta: &mut [f32]) {
        for (d, &y) in delta.iter_mut().zip(post.iter()) {
            *d *= y * (1.0 - y);
        }
    }

    fn name(&self) -> &'static str {
        "sigmoid"
    }
}

/// Numerically stable scalar sigmoid.
#[inline]
#[must_use]
pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Serializable activation selector used by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationKind {
    /// Hyperbolic tangent (default state activation).
    #[default]
    Tanh,
    /// Logistic sigmoid (gate activation).
    Sigmoid,
}

impl ActivationKind {
    /// Builds the shared activation object for this selector.
    #[must_use]
    pub fn build(self) -> Arc<dyn Activation> {
        match self {
            ActivationKind::Tanh => Arc::new(Tanh),
            ActivationKind::Sigmoid => Arc::new(Sigmoid),
        }
    }
}
