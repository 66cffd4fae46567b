//! LSTM cell and layer tests.

mod common;

use common::{random_tensor, seeded_rng};
use recurrent_cells_rs::prelude::*;

/// Targets for the three forward outputs: out, h_next, c_next.
struct LstmTargets {
    out: Tensor,
    h_next: Tensor,
    c_next: Tensor,
}

/// Loss over all three outputs. The out slot alone only reaches the output
/// gate; summing over h_next and c_next drives every gate and the c_prev
/// path.
fn lstm_loss(
    layer: &mut RecurrentLayer,
    x: &Tensor,
    state: &[Tensor],
    targets: &LstmTargets,
) -> f32 {
    let out = layer.forward_with_state(x, state).unwrap();
    let h_next = layer.output_slot(1).unwrap().clone();
    let c_next = layer.output_slot(2).unwrap().clone();
    mse(&out, &targets.out) + mse(&h_next, &targets.h_next) + mse(&c_next, &targets.c_next)
}

fn assert_close(analytic: f32, numeric: f32, context: &str) {
    let scale = analytic.abs().max(numeric.abs()).max(1.0);
    assert!(
        (analytic - numeric).abs() <= 1e-2 * scale,
        "{context}: analytic {analytic} vs finite-difference {numeric}"
    );
}

/// Central-finite-difference check of every weight, bias, input, and
/// prior-state element against the analytic backward pass, with deltas
/// flowing through all three output slots.
fn check_lstm_gradients(
    layer: &mut RecurrentLayer,
    x: &Tensor,
    state: &[Tensor],
    targets: &LstmTargets,
) {
    let eps = 1e-2_f32;
    let batch = x.batch();

    let out = layer.forward_with_state(x, state).unwrap();
    let h_next = layer.output_slot(1).unwrap().clone();
    let c_next = layer.output_slot(2).unwrap().clone();

    let mut out_grads: Vec<Tensor> = layer
        .out_shape()
        .iter()
        .map(|shape| Tensor::zeros(batch, shape.size()))
        .collect();
    out_grads[0] = mse_grad(&out, &targets.out);
    out_grads[1] = mse_grad(&h_next, &targets.h_next);
    out_grads[2] = mse_grad(&c_next, &targets.c_next);
    let d_x = layer.backward_slots(out_grads).unwrap();
    let analytic: Vec<Vec<f32>> = layer
        .gradients()
        .iter()
        .map(|g| g.as_slice().to_vec())
        .collect();
    let d_state: Vec<Tensor> = layer.state_gradients().to_vec();

    for p in 0..analytic.len() {
        for j in 0..analytic[p].len() {
            let orig = layer.parameters()[p].as_slice()[j];
            layer.parameters_mut()[p].as_mut_slice()[j] = orig + eps;
            let plus = lstm_loss(layer, x, state, targets);
            layer.parameters_mut()[p].as_mut_slice()[j] = orig - eps;
            let minus = lstm_loss(layer, x, state, targets);
            layer.parameters_mut()[p].as_mut_slice()[j] = orig;
            let numeric = (plus - minus) / (2.0 * eps);
            assert_close(analytic[p][j], numeric, &format!("param slot {p} element {j}"));
        }
    }

    let mut x_pert = x.clone();
    for sample in 0..batch {
        for j in 0..x.width() {
            let orig = x_pert.row(sample)[j];
            x_pert.row_mut(sample)[j] = orig + eps;
            let plus = lstm_loss(layer, &x_pert, state, targets);
            x_pert.row_mut(sample)[j] = orig - eps;
            let minus = lstm_loss(layer, &x_pert, state, targets);
            x_pert.row_mut(sample)[j] = orig;
            let numeric = (plus - minus) / (2.0 * eps);
            assert_close(
                d_x.row(sample)[j],
                numeric,
                &format!("input sample {sample} element {j}"),
            );
        }
    }

    let mut state_pert = state.to_vec();
    for slot in 0..state_pert.len() {
        for sample in 0..batch {
            for j in 0..state_pert[slot].width() {
                let orig = state_pert[slot].row(sample)[j];
                state_pert[slot].row_mut(sample)[j] = orig + eps;
                let plus = lstm_loss(layer, x, &state_pert, targets);
                state_pert[slot].row_mut(sample)[j] = orig - eps;
                let minus = lstm_loss(layer, x, &state_pert, targets);
                state_pert[slot].row_mut(sample)[j] = orig;
                let numeric = (plus - minus) / (2.0 * eps);
                assert_close(
                    d_state[slot].row(sample)[j],
                    numeric,
                    &format!("state slot {slot} sample {sample} element {j}"),
                );
            }
        }
    }
}

#[test]
fn slot_contract() {
    let layer = RecurrentLayer::lstm(RecurrentConfig::new(3, 2)).unwrap();
    assert_eq!(layer.in_channels(), 15); // x, h, c, eight weights, four biases
    assert_eq!(layer.kind(), "lstm-cell");

    let config = RecurrentConfig::builder(3, 2).has_bias(false).build();
    let no_bias = RecurrentLayer::lstm(config).unwrap();
    assert_eq!(no_bias.in_channels(), 11);
}

#[test]
fn output_slot_is_the_gate_activation() {
    // The primary output is sigma(pre_o), so it lies in (0, 1); the hidden
    // state is that gate times tanh(c_next).
    let mut layer = RecurrentLayer::lstm(RecurrentConfig::new(4, 3)).unwrap();
    layer.init_weights(&mut Xavier::from_seed(1));

    let mut rng = seeded_rng(2);
    let x = random_tensor(&mut rng, 4, 4);
    let out = layer.forward(&x).unwrap();
    assert!(out.as_slice().iter().all(|&v| v > 0.0 && v < 1.0));

    let h_next = layer.output_slot(1).unwrap().clone();
    let c_next = layer.output_slot(2).unwrap().clone();
    for sample in 0..4 {
        for o in 0..3 {
            let expected = out.row(sample)[o] * c_next.row(sample)[o].tanh();
            assert!((h_next.row(sample)[o] - expected).abs() < 1e-6);
        }
    }
}

#[test]
fn zero_state_cell_update_is_input_times_candidate() {
    // With c_prev = 0 the forget path contributes nothing:
    // c_next = post_i . post_z exactly.
    let mut layer = RecurrentLayer::lstm(RecurrentConfig::new(3, 2)).unwrap();
    layer.init_weights(&mut Xavier::from_seed(5));

    let mut rng = seeded_rng(6);
    let x = random_tensor(&mut rng, 2, 3);
    layer.forward(&x).unwrap();

    let c_next = layer.output_slot(2).unwrap().clone();
    let post_i = layer.output_slot(7).unwrap().clone();
    let post_z = layer.output_slot(9).unwrap().clone();
    for sample in 0..2 {
        for o in 0..2 {
            let expected = post_i.row(sample)[o] * post_z.row(sample)[o];
            assert!((c_next.row(sample)[o] - expected).abs() < 1e-6);
        }
    }
}

#[test]
fn bias_disabled_equals_zero_bias() {
    let mut with_bias = RecurrentLayer::lstm(RecurrentConfig::new(4, 3)).unwrap();
    let config = RecurrentConfig::builder(4, 3).has_bias(false).build();
    let mut without = RecurrentLayer::lstm(config).unwrap();
    with_bias.init_weights(&mut Xavier::from_seed(11));
    without.init_weights(&mut Xavier::from_seed(11));

    let mut rng = seeded_rng(12);
    let x = random_tensor(&mut rng, 3, 4);
    assert_eq!(
        with_bias.forward(&x).unwrap().as_slice(),
        without.forward(&x).unwrap().as_slice()
    );
}

#[test]
fn parallel_matches_serial() {
    let mut serial = RecurrentLayer::lstm(RecurrentConfig::new(6, 4)).unwrap();
    let parallel_cfg = RecurrentConfig::builder(6, 4).parallelize(true).build();
    let mut parallel = RecurrentLayer::lstm(parallel_cfg).unwrap();
    serial.init_weights(&mut Xavier::from_seed(21));
    parallel.init_weights(&mut Xavier::from_seed(21));

    let mut rng = seeded_rng(22);
    let x = random_tensor(&mut rng, 16, 6);
    let target = random_tensor(&mut rng, 16, 4);

    let out_s = serial.forward(&x).unwrap();
    let out_p = parallel.forward(&x).unwrap();
    assert_eq!(out_s.as_slice(), out_p.as_slice());

    let d_out = mse_grad(&out_s, &target);
    let dx_s = serial.backward(&d_out).unwrap();
    let dx_p = parallel.backward(&d_out).unwrap();
    assert_eq!(dx_s.as_slice(), dx_p.as_slice());
    for (gs, gp) in serial.gradients().iter().zip(parallel.gradients().iter()) {
        assert_eq!(gs.as_slice(), gp.as_slice());
    }
}

#[test]
fn gpu_engine_is_rejected() {
    let config = RecurrentConfig::builder(3, 2).engine(Engine::Gpu).build();
    let mut layer = RecurrentLayer::lstm(config).unwrap();
    let x = Tensor::zeros(1, 3);
    assert!(matches!(
        layer.forward(&x),
        Err(CellError::UnsupportedEngine { engine: Engine::Gpu })
    ));
}

#[test]
fn gradient_check() {
    let mut layer = RecurrentLayer::lstm(RecurrentConfig::new(5, 4)).unwrap();
    layer.init_weights(&mut Xavier::from_seed(31));
    layer.init_bias(&mut Xavier::from_seed(32));

    let mut rng = seeded_rng(33);
    let x = random_tensor(&mut rng, 3, 5);
    // Nonzero prior hidden and cell state: drives the recurrent weight
    // paths and the forget-gate contribution.
    let h0 = random_tensor(&mut rng, 3, 4);
    let c0 = random_tensor(&mut rng, 3, 4);
    let targets = LstmTargets {
        out: random_tensor(&mut rng, 3, 4),
        h_next: random_tensor(&mut rng, 3, 4),
        c_next: random_tensor(&mut rng, 3, 4),
    };
    check_lstm_gradients(&mut layer, &x, &[h0, c0], &targets);
}

#[test]
fn gradient_check_without_bias() {
    let config = RecurrentConfig::builder(4, 3).has_bias(false).build();
    let mut layer = RecurrentLayer::lstm(config).unwrap();
    layer.init_weights(&mut Xavier::from_seed(41));

    let mut rng = seeded_rng(42);
    let x = random_tensor(&mut rng, 2, 4);
    let h0 = random_tensor(&mut rng, 2, 3);
    let c0 = random_tensor(&mut rng, 2, 3);
    let targets = LstmTargets {
        out: random_tensor(&mut rng, 2, 3),
        h_next: random_tensor(&mut rng, 2, 3),
        c_next: random_tensor(&mut rng, 2, 3),
    };
    check_lstm_gradients(&mut layer, &x, &[h0, c0], &targets);
}

#[test]
fn state_round_trip_preserves_outputs() {
    let mut l1 = RecurrentLayer::lstm(RecurrentConfig::new(5, 5)).unwrap();
    let mut l2 = RecurrentLayer::lstm(RecurrentConfig::new(5, 5)).unwrap();
    l1.init_weights(&mut Xavier::from_seed(51));
    l2.init_weights(&mut Xavier::from_seed(52));

    let json = serde_json::to_string(&l1.export_state()).unwrap();
    let state: LayerState = serde_json::from_str(&json).unwrap();
    l2.import_state(&state).unwrap();

    let mut rng = seeded_rng(53);
    let x = random_tensor(&mut rng, 2, 5);
    assert_eq!(
        l1.forward(&x).unwrap().as_slice(),
        l2.forward(&x).unwrap().as_slice()
    );
}
