//! Mean-squared-error loss and its gradient.
//!
//! The convention matches between [`mse`] and [`mse_grad`]: the loss is
//! averaged over samples and features, and the gradient tensor is scaled
//! accordingly, so a finite-difference estimate of `mse` agrees with a
//! backward pass fed `mse_grad`.

use crate::tensor::Tensor;

/// Mean squared error averaged over the whole `[batch, width]` tensor.
#[must_use]
pub fn mse(pred: &Tensor, target: &Tensor) -> f32 {
    assert_eq!(pred.shape(), target.shape(), "mse shape mismatch");
    let count = (pred.batch() * pred.width()) as f32;
    let sum: f32 = pred
        .as_slice()
        .iter()
        .zip(target.as_slice().iter())
        .map(|(&p, &t)| (p - t) * (p - t))
        .sum();
    sum / count
}

/// Gradient of [`mse`] with respect to the prediction.
#[must_use]
pub fn mse_grad(pred: &Tensor, target: &Tensor) -> Tensor {
    assert_eq!(pred.shape(), target.shape(), "mse shape mismatch");
    let count = (pred.batch() * pred.width()) as f32;
    let data: Vec<f32> = pred
        .as_slice()
        .iter()
        .zip(target.as_slice().iter())
        .map(|(&p, &t)| 2.0 * (p - t) / count)
        .collect();
    Tensor::from_vec(data, pred.batch(), pred.width())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_for_perfect_prediction() {
        let t = Tensor::from_vec(vec![1.0, 2.0], 1, 2);
        assert_eq!(mse(&t, &t), 0.0);
    }

    #[test]
    fn grad_points_toward_target() {
        let pred = Tensor::from_vec(vec![1.0, 0.0], 1, 2);
        let target = Tensor::from_vec(vec![0.0, 0.0], 1, 2);
        let g = mse_grad(&pred, &target);
        assert!(g.as_slice()[0] > 0.0);
        assert_eq!(g.as_slice()[1], 0.0);
    }

    #[test]
    fn grad_matches_finite_difference() {
        let mut pred = Tensor::from_vec(vec![0.3, -0.8, 1.2], 1, 3);
        let target = Tensor::from_vec(vec![0.5, 0.1, -0.4], 1, 3);
        let g = mse_grad(&pred, &target);

        let eps = 1e-3;
        for j in 0..3 {
            let orig = pred.as_slice()[j];
            pred.as_mut_slice()[j] = orig + eps;
            let plus = mse(&pred, &target);
            pred.as_mut_slice()[j] = orig - eps;
            let minus = mse(&pred, &target);
            pred.as_mut_slice()[j] = orig;

            let numeric = (plus - minus) / (2.0 * eps);
            assert!((g.as_slice()[j] - numeric).abs() < 1e-3);
        }
    }
}
