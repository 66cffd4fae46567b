//! Shared helpers: random tensors and the central-finite-difference
//! gradient harness that serves as the correctness oracle for every cell.
#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use recurrent_cells_rs::prelude::*;

/// Uniform random tensor in `[-1, 1)`.
pub fn random_tensor(rng: &mut StdRng, batch: usize, width: usize) -> Tensor {
    let data: Vec<f32> = (0..batch * width)
        .map(|_| rng.random_range(-1.0..1.0))
        .collect();
    Tensor::from_vec(data, batch, width)
}

/// Deterministic rng for a test.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

fn loss_for(layer: &mut RecurrentLayer, x: &Tensor, state: &[Tensor], target: &Tensor) -> f32 {
    let out = layer.forward_with_state(x, state).expect("forward");
    mse(&out, target)
}

fn assert_close(analytic: f32, numeric: f32, tol: f32, context: &str) {
    let scale = analytic.abs().max(numeric.abs()).max(1.0);
    assert!(
        (analytic - numeric).abs() <= tol * scale,
        "{context}: analytic {analytic} vs finite-difference {numeric}"
    );
}

/// Checks every weight, bias, input, and prior-state element of `layer`
/// against a central-finite-difference estimate of the MSE loss.
///
/// `state` supplies the prior hidden (and cell) state; a nonzero state is
/// what exercises the recurrent weight paths, which all vanish from a zero
/// start.
pub fn check_gradients(layer: &mut RecurrentLayer, x: &Tensor, state: &[Tensor], target: &Tensor) {
    let eps = 1e-2_f32;
    let tol = 1e-2_f32;

    // Analytic pass.
    let out = layer.forward_with_state(x, state).expect("forward");
    let d_out = mse_grad(&out, target);
    let d_x = layer.backward(&d_out).expect("backward");
    let analytic: Vec<Vec<f32>> = layer
        .gradients()
        .iter()
        .map(|g| g.as_slice().to_vec())
        .collect();
    let d_state: Vec<Tensor> = layer.state_gradients().to_vec();

    // Every weight and bias element.
    for p in 0..analytic.len() {
        for j in 0..analytic[p].len() {
            let orig = layer.parameters()[p].as_slice()[j];

            layer.parameters_mut()[p].as_mut_slice()[j] = orig + eps;
            let plus = loss_for(layer, x, state, target);
            layer.parameters_mut()[p].as_mut_slice()[j] = orig - eps;
            let minus = loss_for(layer, x, state, target);
            layer.parameters_mut()[p].as_mut_slice()[j] = orig;

            let numeric = (plus - minus) / (2.0 * eps);
            assert_close(
                analytic[p][j],
                numeric,
                tol,
                &format!("param slot {p} element {j}"),
            );
        }
    }

    // Every input element.
    let mut x_pert = x.clone();
    for sample in 0..x.batch() {
        for j in 0..x.width() {
            let orig = x_pert.row(sample)[j];

            x_pert.row_mut(sample)[j] = orig + eps;
            let plus = loss_for(layer, &x_pert, state, target);
            x_pert.row_mut(sample)[j] = orig - eps;
            let minus = loss_for(layer, &x_pert, state, target);
            x_pert.row_mut(sample)[j] = orig;

            let numeric = (plus - minus) / (2.0 * eps);
            assert_close(
                d_x.row(sample)[j],
                numeric,
                tol,
                &format!("input sample {sample} element {j}"),
            );
        }
    }

    // Every prior-state element.
    let mut state_pert = state.to_vec();
    for slot in 0..state_pert.len() {
        for sample in 0..state_pert[slot].batch() {
            for j in 0..state_pert[slot].width() {
                let orig = state_pert[slot].row(sample)[j];

                state_pert[slot].row_mut(sample)[j] = orig + eps;
                let plus = loss_for(layer, x, &state_pert, target);
                state_pert[slot].row_mut(sample)[j] = orig - eps;
                let minus = loss_for(layer, x, &state_pert, target);
                state_pert[slot].row_mut(sample)[j] = orig;

                let numeric = (plus - minus) / (2.0 * eps);
                assert_close(
                    d_state[slot].row(sample)[j],
                    numeric,
                    tol,
                    &format!("state slot {slot} sample {sample} element {j}"),
                );
            }
        }
    }
}

/// Trains `layer` on a fixed two-example dataset with per-sample updates
/// and asserts each prediction lands within `tol` of its target.
pub fn train_to_convergence(
    layer: &mut RecurrentLayer,
    optimizer: &mut dyn Optimizer,
    samples: &[(Tensor, Tensor)],
    epochs: usize,
    tol: f32,
) {
    for _ in 0..epochs {
        for (x, target) in samples {
            let out = layer.forward(x).expect("forward");
            let d_out = mse_grad(&out, target);
            layer.backward(&d_out).expect("backward");
            layer.apply_gradients(optimizer);
        }
    }

    for (x, target) in samples {
        let predicted = layer.forward(x).expect("forward");
        for (o, (&p, &t)) in predicted
            .as_slice()
            .iter()
            .zip(target.as_slice().iter())
            .enumerate()
        {
            assert!(
                (p - t).abs() < tol,
                "output {o}: predicted {p}, target {t}"
            );
        }
    }
}
