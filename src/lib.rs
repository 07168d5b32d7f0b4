//! # CALM (Categorizing And Learning Module) networks
//!
//! A simulator for modular neural networks built from CALM modules: small
//! competitive groups of units that settle on one winning node per input
//! category and learn their incoming weights with a Grossberg-style rule
//! whose rate rises while the module is still undecided.
//!
//! ## Overview
//!
//! Each module pairs `n` representation (R) units with `n` veto (V) units and
//! one arousal (A) and one external (E) unit. R units compete through the V
//! layer; the A unit measures the competition and, through E, both injects
//! noise into R and raises the learning rate. Once a single R unit dominates,
//! the module has converged on a winner.
//!
//! Variants:
//! - **map** modules replace the single-V competition with a Gaussian
//!   inhibition kernel over a ring of units, giving topologically ordered
//!   categories;
//! - **feedback** modules accept a supervisory category per pattern;
//! - CALM modules can grow or prune a unit when their accumulated potentials
//!   show one unit is overloaded or idle.
//!
//! ## Structure
//!
//! - [`core`]: units, weights, connections, modules, parameters, errors
//! - [`network`]: module ownership, stepping, winners, resets, resizing
//! - [`training`]: train/test loops and trace recording
//! - [`data`]: text formats for networks, parameters, patterns and feedback
//! - [`checkpoint`]: weight dumps and JSON checkpoints
//! - [`utils`]: numeric helpers
//! - [`rng`]: the seedable random source

pub mod checkpoint;
pub mod core;
pub mod data;
pub mod network;
pub mod rng;
pub mod training;
pub mod utils;

pub use crate::core::{
    CalmError, CalmResult, LinkMode, Module, ModuleKind, Param, Parameters, ResetFlags,
};
pub use network::{Committed, Network, PatternOrder};
pub use rng::SimRng;
pub use training::{EpochSummary, JsonlRecorder, NullRecorder, Recorder, Simulator};

/// Which per-pattern series the [`Simulator`] reports to its recorder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RecordFlags {
    /// Summed weight change of each pattern presentation
    pub wt_change: bool,
    /// Total R and V activation at the end of each presentation
    pub activation: bool,
    /// Mean learning rate over processing modules
    pub learning_rate: bool,
    /// Snapshot of every weight matrix at the end of each epoch
    pub weights: bool,
}

/// Run settings for a simulation.
///
/// Used by [`Simulator`] for every train and test loop.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Config {
    pub runs: usize,
    pub epochs: usize,
    /// Steps per pattern presentation
    pub iterations: usize,
    pub order: PatternOrder,
    /// Stop a presentation as soon as every module has a winner
    pub conv_stop: bool,
    pub seed: Option<u64>,
    pub record: RecordFlags,
    /// Let modules resize after every k-th epoch
    pub resize_every: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            runs: 1,
            epochs: 50,
            iterations: 100,
            order: PatternOrder::Permuted,
            conv_stop: false,
            seed: None,
            record: RecordFlags::default(),
            resize_every: None,
        }
    }
}

impl Config {
    /// Generator for run `run`: seeded from `seed + run` when a seed is set.
    pub fn rng_for_run(&self, run: usize) -> SimRng {
        match self.seed {
            Some(s) => SimRng::seeded(s.wrapping_add(run as u64)),
            None => SimRng::from_entropy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let c = Config::default();
        assert_eq!(c.runs, 1);
        assert_eq!(c.epochs, 50);
        assert_eq!(c.iterations, 100);
        assert_eq!(c.order, PatternOrder::Permuted);
        assert!(!c.conv_stop);
        assert!(c.resize_every.is_none());
    }

    #[test]
    fn test_config_serde() {
        let c = Config {
            seed: Some(7),
            resize_every: Some(2),
            ..Config::default()
        };
        let text = serde_json::to_string(&c).unwrap();
        let back: Config = serde_json::from_str(&text).unwrap();
        assert_eq!(c, back);
    }
}
