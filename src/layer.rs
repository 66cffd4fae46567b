//! The recurrent layer shell.
//!
//! `RecurrentLayer` adapts one [`Cell`] to the generic layer contract: it
//! owns the weight and bias tensors sized from the cell's shape contract,
//! allocates the per-call cache tensors, zeroes every gradient accumulator
//! before a backward pass, and exposes the weight state for persistence.
//! The `reset_state` and `seq_len` configuration is accepted and stored for
//! the surrounding training loop; the single-timestep core always starts
//! from a zero hidden state, so neither changes kernel behavior yet.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cells::{Cell, GruCell, LstmCell, RnnCell, SlotKind, SlotShape};
use crate::config::RecurrentConfig;
use crate::context::{BackwardContext, ForwardContext};
use crate::error::{CellError, Result};
use crate::init::WeightInit;
use crate::optim::Optimizer;
use crate::tensor::Tensor;

/// One trainable parameter slot (weight or bias) owned by the layer.
#[derive(Debug)]
struct ParamSlot {
    /// Position in the cell's input slot order.
    index: usize,
    kind: SlotKind,
    shape: SlotShape,
    tensor: Tensor,
    grad: Tensor,
}

/// Tensors retained between one forward call and its matching backward.
#[derive(Debug)]
struct ForwardState {
    x: Tensor,
    /// Prior state fed to the forward pass, one tensor per aux input slot.
    aux_in: Vec<Tensor>,
    /// All output slots, caches included.
    out_data: Vec<Tensor>,
}

/// A cell wrapped in the generic layer contract.
pub struct RecurrentLayer {
    cell: Box<dyn Cell>,
    config: RecurrentConfig,
    params: Vec<ParamSlot>,
    state: Option<ForwardState>,
    /// Deltas for the aux input slots (prior hidden/cell state) from the
    /// last backward pass.
    aux_grads: Vec<Tensor>,
}

impl RecurrentLayer {
    /// Wraps a cell. Weight and bias tensors are allocated zeroed from the
    /// cell's shape contract; call [`init_weights`](Self::init_weights)
    /// before training.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid.
    pub fn new(cell: Box<dyn Cell>, config: RecurrentConfig) -> Result<Self> {
        config.validate()?;
        let order = cell.input_order();
        let shapes = cell.in_shape();
        let params = order
            .iter()
            .zip(shapes.iter())
            .enumerate()
            .filter(|(_, (kind, _))| matches!(kind, SlotKind::Weight | SlotKind::Bias))
            .map(|(index, (&kind, &shape))| ParamSlot {
                index,
                kind,
                shape,
                tensor: Tensor::zeros(1, shape.size()),
                grad: Tensor::zeros(1, shape.size()),
            })
            .collect();

        tracing::debug!(
            "recurrent layer: cell={} in_slots={} engine={}",
            cell.kind(),
            order.len(),
            config.engine
        );

        Ok(Self {
            cell,
            config,
            params,
            state: None,
            aux_grads: Vec::new(),
        })
    }

    /// Layer around an RNN cell.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid.
    pub fn rnn(config: RecurrentConfig) -> Result<Self> {
        let cell = RnnCell::new(&config)?;
        Self::new(Box::new(cell), config)
    }

    /// Layer around a GRU cell.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid.
    pub fn gru(config: RecurrentConfig) -> Result<Self> {
        let cell = GruCell::new(&config)?;
        Self::new(Box::new(cell), config)
    }

    /// Layer around an LSTM cell.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid.
    pub fn lstm(config: RecurrentConfig) -> Result<Self> {
        let cell = LstmCell::new(&config)?;
        Self::new(Box::new(cell), config)
    }

    /// Number of input tensor slots the cell consumes.
    #[must_use]
    pub fn in_channels(&self) -> usize {
        self.cell.input_order().len()
    }

    /// Input feature count.
    #[must_use]
    pub fn in_size(&self) -> usize {
        self.config.in_size
    }

    /// Output feature count.
    #[must_use]
    pub fn out_size(&self) -> usize {
        self.config.out_size
    }

    /// The cell's type tag.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.cell.kind()
    }

    /// Shape contract of the wrapped cell, forwarded verbatim.
    #[must_use]
    pub fn in_shape(&self) -> Vec<SlotShape> {
        self.cell.in_shape()
    }

    /// Shape contract of the wrapped cell, forwarded verbatim.
    #[must_use]
    pub fn out_shape(&self) -> Vec<SlotShape> {
        self.cell.out_shape()
    }

    /// The layer configuration.
    #[must_use]
    pub fn config(&self) -> &RecurrentConfig {
        &self.config
    }

    /// Initializes every weight slot.
    pub fn init_weights(&mut self, init: &mut dyn WeightInit) {
        for slot in &mut self.params {
            if slot.kind == SlotKind::Weight {
                init.initialize(slot.shape.width, slot.shape.height, slot.tensor.as_mut_slice());
            }
        }
    }

    /// Initializes every bias slot.
    pub fn init_bias(&mut self, init: &mut dyn WeightInit) {
        for slot in &mut self.params {
            if slot.kind == SlotKind::Bias {
                init.initialize(slot.shape.width, slot.shape.height, slot.tensor.as_mut_slice());
            }
        }
    }

    /// Runs the cell forward from a zero prior state and returns the
    /// primary output.
    ///
    /// State carry across timesteps belongs to the excluded
    /// sequence-unrolling collaborator, so each call starts fresh. The
    /// call retains the inputs and all output slots for the matching
    /// backward pass.
    ///
    /// # Errors
    ///
    /// Fails on engine or shape mismatches.
    pub fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        self.forward_with_state(x, &[])
    }

    /// Runs the cell forward from an explicit prior state.
    ///
    /// `state` supplies one tensor per aux input slot, in slot order: the
    /// prior hidden state, plus the prior cell state for the LSTM. An
    /// empty slice means zero state.
    ///
    /// # Errors
    ///
    /// Fails on engine or shape mismatches, or a wrong state slot count.
    pub fn forward_with_state(&mut self, x: &Tensor, state: &[Tensor]) -> Result<Tensor> {
        let batch = x.batch();
        let order = self.cell.input_order();
        let shapes = self.cell.in_shape();

        let aux_shapes: Vec<SlotShape> = order
            .iter()
            .zip(shapes.iter())
            .filter(|(kind, _)| **kind == SlotKind::Aux)
            .map(|(_, &shape)| shape)
            .collect();
        if !state.is_empty() && state.len() != aux_shapes.len() {
            return Err(CellError::SlotCount {
                what: "prior state",
                expected: aux_shapes.len(),
                actual: state.len(),
            });
        }
        let aux_in: Vec<Tensor> = if state.is_empty() {
            aux_shapes
                .iter()
                .map(|shape| Tensor::zeros(batch, shape.size()))
                .collect()
        } else {
            state.to_vec()
        };

        let mut out_data: Vec<Tensor> = self
            .cell
            .out_shape()
            .iter()
            .map(|shape| Tensor::zeros(batch, shape.size()))
            .collect();

        let in_refs = assemble_inputs(&order, x, &aux_in, &self.params);
        let ctx = ForwardContext {
            in_data: &in_refs,
            out_data: &mut out_data,
            engine: self.config.engine,
            parallelize: self.config.parallelize,
        };
        self.cell.forward(ctx)?;
        drop(in_refs);

        let out = out_data[0].clone();
        self.state = Some(ForwardState {
            x: x.clone(),
            aux_in,
            out_data,
        });
        Ok(out)
    }

    /// Runs the cell backward from the delta on the primary output slot.
    ///
    /// Deltas on every other output slot (derived state, caches) are zero;
    /// use [`backward_slots`](Self::backward_slots) when a downstream
    /// consumer produced deltas for the derived state outputs too.
    ///
    /// # Errors
    ///
    /// Fails if no forward pass is pending or on engine/shape mismatches.
    pub fn backward(&mut self, d_out: &Tensor) -> Result<Tensor> {
        let state = self.state.as_ref().ok_or_else(|| CellError::Config {
            detail: "backward called without a pending forward pass".to_string(),
        })?;
        let batch = state.x.batch();
        let mut out_grads: Vec<Tensor> = self
            .cell
            .out_shape()
            .iter()
            .map(|shape| Tensor::zeros(batch, shape.size()))
            .collect();
        out_grads[0] = d_out.clone();
        self.backward_slots(out_grads)
    }

    /// Runs the cell backward from deltas on every output slot.
    ///
    /// Zeroes every gradient accumulator, feeds the retained forward
    /// tensors and caches to the grad operator, stores the reduced weight
    /// and bias gradients and the prior-state deltas, and returns the
    /// input delta `[batch, in_size]`.
    ///
    /// # Errors
    ///
    /// Fails if no forward pass is pending or on engine/shape mismatches.
    pub fn backward_slots(&mut self, out_grads: Vec<Tensor>) -> Result<Tensor> {
        let state = self.state.as_ref().ok_or_else(|| CellError::Config {
            detail: "backward called without a pending forward pass".to_string(),
        })?;
        let batch = state.x.batch();
        let out_shapes = self.cell.out_shape();
        if out_grads.len() != out_shapes.len() {
            return Err(CellError::SlotCount {
                what: "output grads",
                expected: out_shapes.len(),
                actual: out_grads.len(),
            });
        }
        for (grad, shape) in out_grads.iter().zip(out_shapes.iter()) {
            if grad.shape() != [batch, shape.size()] {
                return Err(CellError::ShapeMismatch {
                    what: "output grad",
                    expected: [batch, shape.size()],
                    actual: grad.shape(),
                });
            }
        }

        let order = self.cell.input_order();
        let in_shapes = self.cell.in_shape();

        // Gradient targets, one per input slot, all starting from zero.
        let mut in_grads: Vec<Tensor> = order
            .iter()
            .zip(in_shapes.iter())
            .map(|(kind, shape)| match kind {
                SlotKind::Data | SlotKind::Aux => Tensor::zeros(batch, shape.size()),
                SlotKind::Weight | SlotKind::Bias => Tensor::zeros(1, shape.size()),
            })
            .collect();

        let in_refs = assemble_inputs(&order, &state.x, &state.aux_in, &self.params);
        let out_refs: Vec<&Tensor> = state.out_data.iter().collect();
        let out_grad_refs: Vec<&Tensor> = out_grads.iter().collect();
        let ctx = BackwardContext {
            in_data: &in_refs,
            out_data: &out_refs,
            out_grads: &out_grad_refs,
            in_grads: &mut in_grads,
            engine: self.config.engine,
            parallelize: self.config.parallelize,
        };
        self.cell.backward(ctx)?;
        drop(in_refs);
        drop(out_refs);
        drop(out_grad_refs);

        for slot in &mut self.params {
            slot.grad = in_grads[slot.index].clone();
        }
        self.aux_grads = order
            .iter()
            .enumerate()
            .filter(|(_, kind)| **kind == SlotKind::Aux)
            .map(|(i, _)| in_grads[i].clone())
            .collect();
        Ok(in_grads.swap_remove(0))
    }

    /// Deltas for the prior-state inputs (`h_prev` and, for the LSTM,
    /// `c_prev`) from the last backward pass, in aux slot order.
    #[must_use]
    pub fn state_gradients(&self) -> &[Tensor] {
        &self.aux_grads
    }

    /// Applies one optimizer step to every weight and bias slot.
    pub fn apply_gradients(&mut self, optimizer: &mut dyn Optimizer) {
        for (key, slot) in self.params.iter_mut().enumerate() {
            let grad = slot.grad.row(0).to_vec();
            optimizer.update(key, &grad, slot.tensor.as_mut_slice());
        }
    }

    /// All weight and bias tensors, in slot order.
    #[must_use]
    pub fn parameters(&self) -> Vec<&Tensor> {
        self.params.iter().map(|slot| &slot.tensor).collect()
    }

    /// Mutable access to the weight and bias tensors, in slot order.
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.params.iter_mut().map(|slot| &mut slot.tensor).collect()
    }

    /// Gradients matching [`parameters`](Self::parameters), valid after a
    /// backward pass.
    #[must_use]
    pub fn gradients(&self) -> Vec<&Tensor> {
        self.params.iter().map(|slot| &slot.grad).collect()
    }

    /// One retained output slot from the last forward pass (for example
    /// `h_next` or a cache tensor).
    #[must_use]
    pub fn output_slot(&self, i: usize) -> Option<&Tensor> {
        self.state.as_ref().and_then(|s| s.out_data.get(i))
    }

    /// Serializable weight state. Caches and gradients are transient and
    /// never persisted.
    #[must_use]
    pub fn export_state(&self) -> LayerState {
        LayerState {
            kind: self.cell.kind().to_string(),
            weights: self.params.iter().map(|slot| slot.tensor.clone()).collect(),
        }
    }

    /// Restores weight state exported from a layer of identical shape.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the cell kind or any tensor shape
    /// disagrees.
    pub fn import_state(&mut self, state: &LayerState) -> Result<()> {
        if state.kind != self.cell.kind() {
            return Err(CellError::Config {
                detail: format!(
                    "state is for a {} cell, this layer holds a {}",
                    state.kind,
                    self.cell.kind()
                ),
            });
        }
        if state.weights.len() != self.params.len() {
            return Err(CellError::Config {
                detail: format!(
                    "state has {} parameter tensors, expected {}",
                    state.weights.len(),
                    self.params.len()
                ),
            });
        }
        for (slot, tensor) in self.params.iter_mut().zip(state.weights.iter()) {
            if tensor.shape() != slot.tensor.shape() {
                return Err(CellError::Config {
                    detail: format!(
                        "parameter shape {:?} does not match expected {:?}",
                        tensor.shape(),
                        slot.tensor.shape()
                    ),
                });
            }
            slot.tensor = tensor.clone();
        }
        Ok(())
    }

    /// Writes the weight state to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error on serialization or I/O failure.
    pub fn save_state<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path.as_ref()).map_err(|e| CellError::Config {
            detail: format!("failed to create state file: {e}"),
        })?;
        serde_json::to_writer(std::io::BufWriter::new(file), &self.export_state()).map_err(|e| {
            CellError::Config {
                detail: format!("failed to serialize state: {e}"),
            }
        })
    }

    /// Restores the weight state from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error on I/O, parse, or shape failure.
    pub fn load_state<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let file = std::fs::File::open(path.as_ref()).map_err(|e| CellError::Config {
            detail: format!("failed to open state file: {e}"),
        })?;
        let state: LayerState =
            serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| {
                CellError::Config {
                    detail: format!("failed to parse state file: {e}"),
                }
            })?;
        self.import_state(&state)
    }
}

/// Persisted layer state: weight and bias tensors only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerState {
    /// Cell type tag the state belongs to.
    pub kind: String,
    /// Weight and bias tensors in slot order.
    pub weights: Vec<Tensor>,
}

/// Builds the slot-ordered input list: data from the caller, aux slots from
/// the per-call prior-state tensors, weights and biases from the layer's
/// storage.
fn assemble_inputs<'a>(
    order: &[SlotKind],
    x: &'a Tensor,
    aux_in: &'a [Tensor],
    params: &'a [ParamSlot],
) -> Vec<&'a Tensor> {
    let mut aux_iter = aux_in.iter();
    let mut param_iter = params.iter();
    order
        .iter()
        .map(|kind| match kind {
            SlotKind::Data => x,
            SlotKind::Aux => aux_iter.next().expect("aux slot count matches order"),
            SlotKind::Weight | SlotKind::Bias => {
                &param_iter.next().expect("param slot count matches order").tensor
            }
        })
        .collect()
}
