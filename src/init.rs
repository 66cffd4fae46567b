//! Weight initialization strategies.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Fills a parameter buffer given its fan-in and fan-out.
pub trait WeightInit {
    /// Initializes `data` for a slot with the given fan dimensions.
    fn initialize(&mut self, fan_in: usize, fan_out: usize, data: &mut [f32]);
}

/// Fills every element with a constant.
#[derive(Debug, Clone, Copy)]
pub struct Constant(pub f32);

impl WeightInit for Constant {
    fn initialize(&mut self, _fan_in: usize, _fan_out: usize, data: &mut [f32]) {
        data.iter_mut().for_each(|v| *v = self.0);
    }
}

/// Xavier/Glorot uniform initialization:
/// `U(-s, s)` with `s = sqrt(6 / (fan_in + fan_out))`.
#[derive(Debug)]
pub struct Xavier {
    rng: StdRng,
}

impl Xavier {
    /// Xavier initializer seeded from the OS.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic Xavier initializer for reproducible runs.
    #[must_use]
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for Xavier {
    fn default() -> Self {
        Self::new()
    }
}

impl WeightInit for Xavier {
    fn initialize(&mut self, fan_in: usize, fan_out: usize, data: &mut [f32]) {
        let scale = (6.0 / (fan_in + fan_out) as f32).sqrt();
        for v in data.iter_mut() {
            *v = self.rng.random_range(-scale..scale);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_fills() {
        let mut buf = [0.0_f32; 6];
        Constant(1.5).initialize(3, 2, &mut buf);
        assert!(buf.iter().all(|&v| v == 1.5));
    }

    #[test]
    fn xavier_stays_in_range() {
        let mut buf = [0.0_f32; 200];
        let mut init = Xavier::from_seed(7);
        init.initialize(10, 10, &mut buf);
        let scale = (6.0_f32 / 20.0).sqrt();
        assert!(buf.iter().all(|&v| v.abs() <= scale));
        assert!(buf.iter().any(|&v| v != 0.0));
    }

    #[test]
    fn seeded_xavier_is_reproducible() {
        let mut a = [0.0_f32; 16];
        let mut b = [0.0_f32; 16];
        Xavier::from_seed(42).initialize(4, 4, &mut a);
        Xavier::from_seed(42).initialize(4, 4, &mut b);
        assert_eq!(a, b);
    }
}
