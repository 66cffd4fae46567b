//! Error types for the recurrent cell kernels.
//!
//! The kernels are pure computation: there is no retry logic at this layer.
//! Every error is raised before arithmetic begins, either because the caller
//! selected a compute engine the kernel does not implement, or because a
//! tensor arrived with dimensions that disagree with the cell's declared
//! `in_size`/`out_size`. Recovery (reducing batch size, switching engines)
//! belongs to the calling layer, not here.

use thiserror::Error;

use crate::config::Engine;

/// Errors raised by cell construction, operator dispatch, and kernel entry.
#[derive(Debug, Error)]
pub enum CellError {
    /// The requested compute engine is not implemented by this operator.
    ///
    /// Fatal configuration error: the enclosing operation must abort. The
    /// message names the offending engine so misconfigured deployments are
    /// diagnosable from the log alone.
    #[error("unsupported engine: {engine} (this operator implements internal and simd only)")]
    UnsupportedEngine {
        /// The engine the caller selected.
        engine: Engine,
    },

    /// A tensor's dimensions disagree with the declared cell geometry.
    ///
    /// Detected at operator entry, before any arithmetic; out-of-bounds
    /// indexing is never an acceptable failure mode.
    #[error("shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Which tensor slot failed validation.
        what: &'static str,
        /// Expected `[batch, width]` (0 batch = any).
        expected: [usize; 2],
        /// Actual `[batch, width]`.
        actual: [usize; 2],
    },

    /// The kernel context carried the wrong number of tensor slots.
    #[error("wrong slot count for {what}: expected {expected}, got {actual}")]
    SlotCount {
        /// Which slot list failed validation.
        what: &'static str,
        /// Slot count the cell declares.
        expected: usize,
        /// Slot count the context supplied.
        actual: usize,
    },

    /// Invalid construction parameters or configuration file failure.
    #[error("configuration error: {detail}")]
    Config {
        /// Description of the configuration issue.
        detail: String,
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CellError>;
