//! Training and test loops over a [`Network`], plus per-pattern recording.
//!
//! A [`Simulator`] owns the network, the run settings and a [`Recorder`].
//! Every pattern presentation starts from reset activations and runs for
//! `config.iterations` steps, or until every processing module has a winner
//! when `config.conv_stop` is set.

pub mod recorder;

use tracing::debug;

use crate::core::{CalmError, CalmResult, ResetFlags};
use crate::network::{Network, PatternOrder};
use crate::Config;

pub use recorder::{JsonlRecorder, MemoryRecorder, NullRecorder, Recorder};

/// Summary of one pass through the pattern file.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    pub epoch: usize,
    /// Sum of all weight changes over the epoch
    pub wt_change: f32,
    /// Patterns for which every processing module ended with a winner
    pub converged: usize,
    /// Distinct winners per processing module
    pub committed: Vec<usize>,
    /// Whether any module grew or shrank after the epoch
    pub resized: bool,
}

pub struct Simulator {
    net: Network,
    config: Config,
    recorder: Box<dyn Recorder>,
}

impl Simulator {
    pub fn new(net: Network, config: Config) -> Self {
        Self {
            net,
            config,
            recorder: Box::new(NullRecorder),
        }
    }

    pub fn with_recorder(mut self, recorder: Box<dyn Recorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn network(&self) -> &Network {
        &self.net
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.net
    }

    pub fn into_network(self) -> Network {
        self.net
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn set_iterations(&mut self, iterations: usize) {
        self.config.iterations = iterations;
    }

    /// Learn one externally supplied input vector spread over all input
    /// modules. Winners are recorded in pattern slot 0.
    pub fn train_single(&mut self, epoch: usize, input: &[f32]) -> CalmResult<bool> {
        self.net.reset(ResetFlags::ACT | ResetFlags::WIN);
        self.net.reset_wt_change_sum();
        self.net.set_input_stream(input)?;
        let converged = self.iterate(0, true);
        self.record_pattern(epoch, 0);
        Ok(converged)
    }

    /// One learning pass through the loaded patterns in presentation order.
    ///
    /// # Errors
    ///
    /// `PatternsNotLoaded` if no pattern set is installed.
    pub fn train_file(&mut self, epoch: usize) -> CalmResult<EpochSummary> {
        if self.net.patterns().is_none() {
            return Err(CalmError::PatternsNotLoaded);
        }
        let supervised = self.net.feedback_module().is_some() && self.net.feedback_list().is_some();
        self.net.reset(ResetFlags::WIN);

        let mut wt_change = 0.0;
        let mut converged = 0;
        for p in 0..self.net.num_patterns() {
            self.net.reset(ResetFlags::ACT);
            self.net.reset_wt_change_sum();
            self.net.set_input(p)?;
            if supervised {
                self.net.set_feedback(p)?;
            }
            if self.iterate(p, true) {
                converged += 1;
            }
            wt_change += self.net.wt_change_sum();
            self.record_pattern(epoch, p);
        }
        if self.config.record.weights {
            self.record_weights(epoch);
        }

        Ok(EpochSummary {
            epoch,
            wt_change,
            converged,
            committed: self.net.committed().iter().map(|c| c.distinct).collect(),
            resized: false,
        })
    }

    /// Classify one externally supplied input vector without learning.
    pub fn test_single(&mut self, input: &[f32]) -> CalmResult<bool> {
        self.net.reset(ResetFlags::ACT | ResetFlags::WIN);
        self.net.set_input_stream(input)?;
        Ok(self.iterate(0, false))
    }

    /// Let the network settle from zero input, driven only by clamped units.
    pub fn test_clamped(&mut self, use_noise: bool) -> bool {
        self.net.reset(ResetFlags::ACT | ResetFlags::WIN);
        self.net.reset_inputs();
        let mut converged = false;
        for t in 0..self.config.iterations {
            self.net.test_with_noise(use_noise);
            converged = self.net.collect_winners(0, t);
            if converged && self.config.conv_stop {
                break;
            }
        }
        converged
    }

    /// Test every loaded pattern; returns how many converged.
    pub fn test_file(&mut self) -> CalmResult<usize> {
        if self.net.patterns().is_none() {
            return Err(CalmError::PatternsNotLoaded);
        }
        self.net.reset(ResetFlags::WIN);
        let mut converged = 0;
        for p in 0..self.net.num_patterns() {
            self.net.reset(ResetFlags::ACT);
            self.net.set_input(p)?;
            if self.iterate(p, false) {
                converged += 1;
            }
            debug!(
                pattern = p,
                winners = ?self.current_winners(),
                "tested"
            );
        }
        Ok(converged)
    }

    /// A single inference step for caller-driven loops. Returns `true` when
    /// the caller should stop: all modules converged and `conv_stop` is set.
    pub fn test_step(&mut self, iteration: usize, use_noise: bool) -> bool {
        self.net.test_with_noise(use_noise);
        let converged = self.net.collect_winners(0, iteration);
        converged && self.config.conv_stop
    }

    /// Train for `config.epochs` epochs. Patterns are reshuffled before each
    /// epoch in permuted order; with `config.resize_every = Some(k)` modules
    /// are allowed to resize after every epoch divisible by `k`.
    pub fn run_epochs(&mut self) -> CalmResult<Vec<EpochSummary>> {
        let mut summaries = Vec::with_capacity(self.config.epochs);
        for epoch in 0..self.config.epochs {
            if self.config.order == PatternOrder::Permuted {
                self.net.permute_patterns();
            }
            let mut summary = self.train_file(epoch)?;
            if let Some(k) = self.config.resize_every.filter(|&k| k > 0) {
                if epoch % k == 0 {
                    summary.resized = self.net.resize_modules();
                }
            }
            summaries.push(summary);
        }
        Ok(summaries)
    }

    /// Test the pattern file in file order, then restore the configured
    /// presentation order.
    pub fn test_file_linear(&mut self) -> CalmResult<usize> {
        self.net.set_pattern_order(PatternOrder::Linear);
        let result = self.test_file();
        self.net.set_pattern_order(self.config.order);
        result
    }

    fn iterate(&mut self, p: usize, learn: bool) -> bool {
        let mut converged = false;
        for t in 0..self.config.iterations {
            if learn {
                self.net.learn();
            } else {
                self.net.test();
            }
            converged = self.net.collect_winners(p, t);
            if converged && self.config.conv_stop {
                break;
            }
        }
        converged
    }

    fn current_winners(&self) -> Vec<Option<usize>> {
        let net = &self.net;
        (net.num_inputs()..net.num_modules())
            .map(|i| net.winner(i))
            .collect()
    }

    fn record_pattern(&mut self, epoch: usize, p: usize) {
        let flags = self.config.record;
        if flags.wt_change {
            self.recorder
                .record_scalar("wt_change", epoch, p, self.net.wt_change_sum());
        }
        if flags.activation {
            self.recorder
                .record_scalar("activation", epoch, p, self.net.sum_activation(None));
        }
        if flags.learning_rate {
            self.recorder
                .record_scalar("learning_rate", epoch, p, self.net.mean_learning_rate());
        }
    }

    fn record_weights(&mut self, epoch: usize) {
        let net = &self.net;
        for m in &net.modules()[net.num_inputs()..] {
            for c in m.incoming() {
                let rows: Vec<Vec<f32>> = c
                    .weights()
                    .rows()
                    .into_iter()
                    .map(|r| r.iter().map(|w| w.value()).collect())
                    .collect();
                self.recorder
                    .record_weights(epoch, m.name(), net.module(c.source()).name(), &rows);
            }
        }
    }
}
