//! Fixed lateral inhibition for topological map modules.
//!
//! A map module replaces the uniform `CROSS`/`DOWN` veto with a kernel over
//! ring distance: nearby V-units inhibit weakly (or excite) and distant ones
//! inhibit strongly, which orders winners around the ring.
//!
//! ```text
//! sigma     = (-4/n) * ln((0.01 + exp(-n/4)) / (n + 1))
//! k[i][j]   = (n + 1) * exp(-sigma * d(i,j)^2 / n) - n - 1 + DOWN
//! ```

use ndarray::Array2;

use crate::utils::{map_sigma, ring_distance};

#[derive(Debug, Clone, PartialEq)]
pub struct MapKernel {
    weights: Array2<f32>,
}

impl MapKernel {
    /// Kernel for a ring of `size` units with self-inhibition `down`.
    pub fn new(size: usize, down: f32) -> Self {
        let n = size as f32;
        let sigma = map_sigma(size);
        let weights = Array2::from_shape_fn((size, size), |(i, j)| {
            let d = ring_distance(i, j, size) as f32;
            (n + 1.0) * (-sigma * d * d / n).exp() - n - 1.0 + down
        });
        Self { weights }
    }

    pub fn size(&self) -> usize {
        self.weights.nrows()
    }

    pub fn weights(&self) -> &Array2<f32> {
        &self.weights
    }

    /// Lateral input into R-unit `i` from the V-layer.
    #[inline]
    pub fn lateral(&self, i: usize, v: &[f32]) -> f32 {
        self.weights
            .row(i)
            .iter()
            .zip(v)
            .map(|(k, x)| k * x)
            .sum()
    }
}
