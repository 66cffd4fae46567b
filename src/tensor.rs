//! Dense batched tensor and the two inner-loop primitives the kernels use.
//!
//! A [`Tensor`] is a flat `Vec<f32>` with logical shape `[batch, width]`,
//! row-major. Weight matrices are stored as single-row tensors whose row is
//! the flat `[rows * cols]` buffer, addressed `w[row * cols + col]` at the
//! call sites. The kernels never index out of bounds: the operator wrappers
//! validate every shape before arithmetic begins.

use serde::{Deserialize, Serialize};

/// Batched dense buffer of `f32` with shape `[batch, width]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    data: Vec<f32>,
    batch: usize,
    width: usize,
}

impl Tensor {
    /// Creates a zero-filled tensor of shape `[batch, width]`.
    #[must_use]
    pub fn zeros(batch: usize, width: usize) -> Self {
        Self {
            data: vec![0.0; batch * width],
            batch,
            width,
        }
    }

    /// Creates a tensor from a flat buffer.
    ///
    /// # Panics
    ///
    /// Panics if `data.len() != batch * width`; tensors are always
    /// constructed from buffers the caller just sized.
    #[must_use]
    pub fn from_vec(data: Vec<f32>, batch: usize, width: usize) -> Self {
        assert_eq!(data.len(), batch * width, "tensor buffer/shape mismatch");
        Self { data, batch, width }
    }

    /// Single-row tensor wrapping a flat weight buffer.
    #[must_use]
    pub fn from_flat(data: Vec<f32>) -> Self {
        let width = data.len();
        Self {
            data,
            batch: 1,
            width,
        }
    }

    /// Number of sample rows.
    #[must_use]
    pub fn batch(&self) -> usize {
        self.batch
    }

    /// Number of features per row.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Logical shape as `[batch, width]`.
    #[must_use]
    pub fn shape(&self) -> [usize; 2] {
        [self.batch, self.width]
    }

    /// Row view for one sample.
    #[must_use]
    pub fn row(&self, sample: usize) -> &[f32] {
        let start = sample * self.width;
        &self.data[start..start + self.width]
    }

    /// Mutable row view for one sample.
    pub fn row_mut(&mut self, sample: usize) -> &mut [f32] {
        let start = sample * self.width;
        &mut self.data[start..start + self.width]
    }

    /// Whole buffer as a flat slice.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Whole buffer as a flat mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Fills every element with `value`.
    pub fn fill(&mut self, value: f32) {
        self.data.iter_mut().for_each(|v| *v = value);
    }
}

/// Dot product of two equal-length slices.
#[inline]
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum()
}

/// Multiply-accumulate: `dst[i] += src[i] * factor`.
#[inline]
pub fn muladd(src: &[f32], factor: f32, dst: &mut [f32]) {
    debug_assert_eq!(src.len(), dst.len());
    for (d, &s) in dst.iter_mut().zip(src.iter()) {
        *d += s * factor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_disjoint_views() {
        let mut t = Tensor::zeros(3, 4);
        t.row_mut(1).copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(t.row(0), &[0.0; 4]);
        assert_eq!(t.row(1), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(t.row(2), &[0.0; 4]);
    }

    #[test]
    fn dot_and_muladd() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0];
        assert_eq!(dot(&a, &b), 32.0);

        let mut dst = [1.0, 1.0, 1.0];
        muladd(&a, 2.0, &mut dst);
        assert_eq!(dst, [3.0, 5.0, 7.0]);
    }

    #[test]
    fn serde_round_trip() {
        let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], 2, 2);
        let json = serde_json::to_string(&t).unwrap();
        let back: Tensor = serde_json::from_str(&json).unwrap();
        assert_eq!(t, back);
    }
}
