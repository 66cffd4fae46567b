//! Portable recurrent cell kernels.
//!
//! Pure numeric functions computing one timestep forward pass and its
//! gradient for a batch of samples. Each kernel takes strongly-typed
//! argument structs (built by the operator wrappers from the slot-ordered
//! context), runs a per-sample body under [`crate::parallel::map_samples`],
//! and scatters or reduces the per-sample results. Weight buffers are
//! read-only for the whole call; every sample's writes land in its own
//! result struct, so the parallel body needs no synchronization.

pub(crate) mod gru;
pub(crate) mod lstm;
pub(crate) mod rnn;

/// Elementwise `dst[i] += src[i]`, the per-batch gradient reduction step.
#[inline]
pub(crate) fn accumulate(dst: &mut [f32], src: &[f32]) {
    debug_assert_eq!(dst.len(), src.len());
    for (d, &s) in dst.iter_mut().zip(src.iter()) {
        *d += s;
    }
}
