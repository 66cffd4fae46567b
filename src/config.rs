//! Configuration for recurrent cells and the layer shell.
//!
//! Configuration is serializable (TOML files round-trip through serde),
//! validated at construction time, and defaulted so that
//! `RecurrentConfig::new(in_size, out_size)` works out of the box.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::activation::ActivationKind;
use crate::error::{CellError, Result};

/// Compute engine executing a kernel.
///
/// The recurrent operators implement the portable scalar path; `Simd` is
/// accepted as an alias for it so configurations written for the vectorized
/// backend keep working. Any other engine is rejected at dispatch with
/// [`CellError::UnsupportedEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Portable scalar kernels.
    #[default]
    Internal,
    /// SIMD-accelerated kernels; dispatches to the same recurrent kernels
    /// as `Internal`.
    Simd,
    /// GPU backend. Present on the configuration surface for the layer
    /// graph's sake; no recurrent operator implements it.
    Gpu,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Engine::Internal => "internal",
            Engine::Simd => "simd",
            Engine::Gpu => "gpu",
        };
        f.write_str(name)
    }
}

/// Configuration for one recurrent cell and its enclosing layer.
///
/// | Parameter | Default | Description |
/// |-----------|---------|-------------|
/// | `has_bias` | `true` | include bias terms |
/// | `activation` | `tanh` | state activation (RNN; gates are fixed) |
/// | `engine` | `internal` | compute engine |
/// | `parallelize` | `false` | allow sample-parallel kernel execution |
/// | `reset_state` | `true` | reset hidden state between sequences |
/// | `seq_len` | `1` | sequence length seen by the layer graph |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrentConfig {
    /// Number of input features per sample.
    pub in_size: usize,

    /// Number of output features (hidden units) per sample.
    pub out_size: usize,

    /// Whether the cell carries bias terms.
    #[serde(default = "default_has_bias")]
    pub has_bias: bool,

    /// State activation for the RNN cell. GRU and LSTM gates use their
    /// fixed sigmoid/tanh pairing regardless of this setting.
    #[serde(default)]
    pub activation: ActivationKind,

    /// Compute engine used by the operators.
    #[serde(default)]
    pub engine: Engine,

    /// Whether kernels may partition the batch across worker threads.
    /// Advisory; results are identical either way.
    #[serde(default)]
    pub parallelize: bool,

    /// Whether hidden state resets between independent input sequences.
    ///
    /// Accepted and stored for the surrounding training loop; the
    /// single-timestep core does not yet carry state across timesteps, so
    /// this flag does not change kernel behavior.
    #[serde(default = "default_reset_state")]
    pub reset_state: bool,

    /// Sequence length declared to the layer graph.
    ///
    /// Accepted and stored; multi-timestep unrolling is not implemented in
    /// this core.
    #[serde(default = "default_seq_len")]
    pub seq_len: usize,
}

fn default_has_bias() -> bool {
    true
}
fn default_reset_state() -> bool {
    true
}
fn default_seq_len() -> usize {
    1
}

impl RecurrentConfig {
    /// Creates a configuration with defaults for everything but the sizes.
    #[must_use]
    pub fn new(in_size: usize, out_size: usize) -> Self {
        Self {
            in_size,
            out_size,
            has_bias: default_has_bias(),
            activation: ActivationKind::default(),
            engine: Engine::default(),
            parallelize: false,
            reset_state: default_reset_state(),
            seq_len: default_seq_len(),
        }
    }

    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder(in_size: usize, out_size: usize) -> RecurrentConfigBuilder {
        RecurrentConfigBuilder {
            config: Self::new(in_size, out_size),
        }
    }

    /// Checks the configuration for validity.
    ///
    /// # Errors
    ///
    /// Returns [`CellError::Config`] if any size is zero.
    pub fn validate(&self) -> Result<()> {
        if self.in_size == 0 {
            return Err(CellError::Config {
                detail: "in_size must be >= 1".to_string(),
            });
        }
        if self.out_size == 0 {
            return Err(CellError::Config {
                detail: "out_size must be >= 1".to_string(),
            });
        }
        if self.seq_len == 0 {
            return Err(CellError::Config {
                detail: "seq_len must be >= 1".to_string(),
            });
        }
        Ok(())
    }

    /// Loads a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`CellError::Config`] if the file cannot be read or parsed,
    /// or if the parsed configuration fails validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| CellError::Config {
            detail: format!("failed to read config file: {e}"),
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| CellError::Config {
            detail: format!("failed to parse config file: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`CellError::Config`] if serialization or file I/O fails.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| CellError::Config {
            detail: format!("failed to serialize config: {e}"),
        })?;
        std::fs::write(path.as_ref(), content).map_err(|e| CellError::Config {
            detail: format!("failed to write config file: {e}"),
        })
    }
}

/// Builder for [`RecurrentConfig`].
#[derive(Debug)]
pub struct RecurrentConfigBuilder {
    config: RecurrentConfig,
}

impl RecurrentConfigBuilder {
    /// Sets whether the cell carries bias terms.
    #[must_use]
    pub fn has_bias(mut self, has_bias: bool) -> Self {
        self.config.has_bias = has_bias;
        self
    }

    /// Sets the RNN state activation.
    #[must_use]
    pub fn activation(mut self, activation: ActivationKind) -> Self {
        self.config.activation = activation;
        self
    }

    /// Sets the compute engine.
    #[must_use]
    pub fn engine(mut self, engine: Engine) -> Self {
        self.config.engine = engine;
        self
    }

    /// Allows or forbids sample-parallel kernel execution.
    #[must_use]
    pub fn parallelize(mut self, parallelize: bool) -> Self {
        self.config.parallelize = parallelize;
        self
    }

    /// Sets the state-reset flag consumed by the surrounding training loop.
    #[must_use]
    pub fn reset_state(mut self, reset_state: bool) -> Self {
        self.config.reset_state = reset_state;
        self
    }

    /// Sets the declared sequence length.
    #[must_use]
    pub fn seq_len(mut self, seq_len: usize) -> Self {
        self.config.seq_len = seq_len;
        self
    }

    /// Finishes the builder.
    #[must_use]
    pub fn build(self) -> RecurrentConfig {
        self.config
    }
}
