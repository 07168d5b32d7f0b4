//! Weighted links between module R-layers.
//!
//! A connection owns a `(to_size, from_size)` matrix of [`Weight`]s and reads
//! its source module through an [`Afferent`] snapshot taken at the start of
//! the network step, so it never observes activations committed later in the
//! same step.
//!
//! # Learning rule
//!
//! For target unit `i` with activation `a_i`, background input `b_i` (the sum
//! of all of the target's weighted inputs into `i`) and source activation
//! `x_j`:
//! ```text
//! dw_ij = mu * a_i * ((Lmax - w_ij) * x_j - L * (w_ij - Lmin) * (b_i - w_ij * x_j))
//! ```

use ndarray::{s, Array2, Axis};
use ndarray_rand::RandomExt;
use rand::distributions::Uniform;

use super::params::{Param, Parameters};
use super::weight::Weight;
use crate::rng::SimRng;

/// How a connection reads its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    /// Committed R activations of the current step.
    Immediate,
    /// Delayed R activations, re-read once every `n` clock ticks.
    Delayed(usize),
}

/// Which side of a connection a pruned node sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The destination module lost a unit: drop a row.
    To,
    /// The source module lost a unit: drop a column.
    From,
}

/// What a connection may observe of its source module during one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Afferent {
    pub current: Vec<f32>,
    pub delayed: Vec<f32>,
    /// The source is a feedback module with an active supervisory signal.
    pub feedback_active: bool,
}

#[derive(Debug, Clone)]
pub struct Connection {
    source: usize,
    mode: LinkMode,
    clock: usize,
    cached: Vec<f32>,
    weights: Array2<Weight>,
}

impl Connection {
    /// Create a connection from module `source` with every weight at `init`.
    pub fn new(source: usize, to_size: usize, from_size: usize, mode: LinkMode, init: f32) -> Self {
        Self {
            source,
            mode,
            clock: 0,
            cached: vec![0.0; to_size],
            weights: Array2::from_elem((to_size, from_size), Weight::new(init)),
        }
    }

    /// Index of the source module in the network.
    #[inline]
    pub fn source(&self) -> usize {
        self.source
    }

    #[inline]
    pub fn mode(&self) -> LinkMode {
        self.mode
    }

    /// Delay in ticks; zero for immediate links.
    #[inline]
    pub fn delay(&self) -> usize {
        match self.mode {
            LinkMode::Immediate => 0,
            LinkMode::Delayed(d) => d,
        }
    }

    #[inline]
    pub fn clock(&self) -> usize {
        self.clock
    }

    /// `(to_size, from_size)`
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        self.weights.dim()
    }

    pub fn weights(&self) -> &Array2<Weight> {
        &self.weights
    }

    /// Plain weight values.
    pub fn weight_values(&self) -> Array2<f32> {
        self.weights.mapv(|w| w.value())
    }

    #[inline]
    pub fn weight(&self, to: usize, from: usize) -> f32 {
        self.weights[[to, from]].value()
    }

    pub fn set_weight(&mut self, to: usize, from: usize, value: f32) {
        self.weights[[to, from]].set(value);
    }

    /// Whether a delayed link reads its source on this tick.
    #[inline]
    fn due(&self) -> bool {
        match self.mode {
            LinkMode::Immediate => true,
            LinkMode::Delayed(d) => self.clock == d,
        }
    }

    #[inline]
    fn dot(&self, to: usize, acts: &[f32]) -> f32 {
        self.weights
            .row(to)
            .iter()
            .zip(acts)
            .map(|(w, &a)| w.value() * a)
            .sum()
    }

    /// Weighted input into target unit `to`.
    ///
    /// Delayed links recompute from the delayed activations only when the
    /// clock equals the delay and return the cached sum otherwise.
    pub fn weighted_activation(&mut self, to: usize, src: &Afferent) -> f32 {
        match self.mode {
            LinkMode::Immediate => self.dot(to, &src.current),
            LinkMode::Delayed(_) => {
                if self.due() {
                    self.cached[to] = self.dot(to, &src.delayed);
                }
                self.cached[to]
            }
        }
    }

    /// Apply the learning rule to row `to` and return the summed deltas.
    ///
    /// `act` is the target unit's committed activation and `back` its summed
    /// input over all incoming connections. A delayed link only learns on
    /// the tick it reads its source.
    pub fn learn(
        &mut self,
        to: usize,
        act: f32,
        mu: f32,
        back: f32,
        src: &Afferent,
        params: &Parameters,
    ) -> f32 {
        if !self.due() {
            return 0.0;
        }
        let inputs = match self.mode {
            LinkMode::Immediate => &src.current,
            LinkMode::Delayed(_) => &src.delayed,
        };
        let mu = if src.feedback_active {
            mu * params[Param::FBw]
        } else {
            mu
        };
        let lmax = params[Param::KLmax];
        let lmin = params[Param::KLmin];
        let l = params[Param::LL];

        let mut dw_sum = 0.0;
        for (w, &x) in self.weights.row_mut(to).iter_mut().zip(inputs) {
            let v = w.value();
            let dw = mu * act * ((lmax - v) * x - l * (v - lmin) * (back - v * x));
            dw_sum += dw;
            w.apply(dw, lmin, lmax);
        }
        dw_sum
    }

    /// Advance the internal clock, wrapping to 1 past the delay.
    pub fn tick_clock(&mut self) {
        self.clock += 1;
        if self.clock > self.delay() {
            self.clock = 1;
        }
    }

    /// Restart the clock and forget the cached delayed input.
    pub fn reset_time(&mut self) {
        self.clock = 0;
        self.cached.iter_mut().for_each(|c| *c = 0.0);
    }

    pub fn reset_weights(&mut self, value: f32) {
        self.weights.iter_mut().for_each(|w| w.reset(value));
    }

    /// Sum of the last recorded change of every weight.
    pub fn sum_weight_changes(&self) -> f32 {
        self.weights.iter().map(Weight::change).sum()
    }

    fn weight_range(&self) -> Option<(f32, f32)> {
        self.weights.iter().map(Weight::value).fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }

    /// Rebuild the weight matrix for new endpoint sizes.
    ///
    /// Without a `node` the new matrix is filled uniformly within the range
    /// of the existing weights and the overlapping sub-rectangle is copied
    /// over. With a `node` the matrix is zeroed and every old row (for
    /// [`Side::To`]) or column (for [`Side::From`]) except `node` is copied,
    /// compacted. The delayed cache always restarts at zero.
    pub fn resize(
        &mut self,
        from_size: usize,
        to_size: usize,
        node: Option<usize>,
        side: Side,
        rng: &mut SimRng,
    ) {
        let shape = (to_size, from_size);
        let mut next = match node {
            None => match self.weight_range() {
                Some((lo, hi)) if hi > lo => {
                    Array2::<f32>::random_using(shape, Uniform::new(lo, hi), rng).mapv(Weight::new)
                }
                Some((lo, _)) => Array2::from_elem(shape, Weight::new(lo)),
                None => Array2::from_elem(shape, Weight::default()),
            },
            Some(_) => Array2::from_elem(shape, Weight::default()),
        };

        let kept = match node {
            None => self.weights.view().to_owned(),
            Some(n) => {
                let (rows, cols) = self.weights.dim();
                let (axis, len) = match side {
                    Side::To => (Axis(0), rows),
                    Side::From => (Axis(1), cols),
                };
                let keep: Vec<usize> = (0..len).filter(|&k| k != n).collect();
                self.weights.select(axis, &keep)
            }
        };
        let rows = kept.nrows().min(to_size);
        let cols = kept.ncols().min(from_size);
        next.slice_mut(s![..rows, ..cols])
            .assign(&kept.slice(s![..rows, ..cols]));

        self.weights = next;
        self.cached = vec![0.0; to_size];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn afferent(current: &[f32], delayed: &[f32]) -> Afferent {
        Afferent {
            current: current.to_vec(),
            delayed: delayed.to_vec(),
            feedback_active: false,
        }
    }

    #[test]
    fn test_immediate_weighted_sum() {
        let mut c = Connection::new(0, 2, 3, LinkMode::Immediate, 0.5);
        c.set_weight(1, 2, 1.0);
        let src = afferent(&[1.0, 0.0, 0.4], &[0.0; 3]);
        assert_abs_diff_eq!(c.weighted_activation(0, &src), 0.7, epsilon = 1e-6);
        assert_abs_diff_eq!(c.weighted_activation(1, &src), 0.9, epsilon = 1e-6);
    }

    #[test]
    fn test_delayed_reads_only_when_due() {
        let mut c = Connection::new(0, 1, 2, LinkMode::Delayed(2), 1.0);
        let src = afferent(&[1.0, 1.0], &[0.25, 0.25]);
        // clock 0: not due, cache empty
        assert_eq!(c.weighted_activation(0, &src), 0.0);
        c.tick_clock();
        c.tick_clock();
        assert_eq!(c.clock(), 2);
        assert_abs_diff_eq!(c.weighted_activation(0, &src), 0.5, epsilon = 1e-6);
        c.tick_clock();
        assert_eq!(c.clock(), 1);
        let changed = afferent(&[1.0, 1.0], &[1.0, 1.0]);
        assert_abs_diff_eq!(c.weighted_activation(0, &changed), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_clock_wraps_and_resets() {
        let mut c = Connection::new(0, 1, 1, LinkMode::Delayed(3), 0.5);
        let clocks: Vec<usize> = (0..7)
            .map(|_| {
                c.tick_clock();
                c.clock()
            })
            .collect();
        assert_eq!(clocks, vec![1, 2, 3, 1, 2, 3, 1]);
        c.reset_time();
        assert_eq!(c.clock(), 0);
    }

    #[test]
    fn test_learning_stays_in_bounds() {
        let params = Parameters::default();
        let mut c = Connection::new(0, 2, 3, LinkMode::Immediate, 0.6);
        let src = afferent(&[1.0, 0.0, 0.9], &[0.0; 3]);
        for _ in 0..500 {
            let back = c.weighted_activation(0, &src);
            c.learn(0, 1.0, 5.0, back, &src, &params);
        }
        for w in c.weights().iter() {
            assert!((0.0..=1.0).contains(&w.value()));
        }
    }

    #[test]
    fn test_learning_matches_rule() {
        let params = Parameters::default();
        let mut c = Connection::new(0, 1, 1, LinkMode::Immediate, 0.6);
        let src = afferent(&[1.0], &[0.0]);
        let dw = c.learn(0, 0.5, 0.1, 0.6, &src, &params);
        // 0.1 * 0.5 * ((1 - 0.6) * 1 - 1 * 0.6 * (0.6 - 0.6))
        assert_abs_diff_eq!(dw, 0.02, epsilon = 1e-6);
        assert_abs_diff_eq!(c.weight(0, 0), 0.62, epsilon = 1e-6);
    }

    #[test]
    fn test_feedback_source_boosts_learning_once() {
        let params = Parameters::default();
        let mut plain = Connection::new(0, 1, 2, LinkMode::Immediate, 0.5);
        let mut boosted = plain.clone();
        let src = afferent(&[1.0, 1.0], &[0.0; 2]);
        let fb = Afferent {
            feedback_active: true,
            ..src.clone()
        };
        let a = plain.learn(0, 0.5, 0.01, 1.0, &src, &params);
        let b = boosted.learn(0, 0.5, 0.01, 1.0, &fb, &params);
        assert_abs_diff_eq!(b, a * params[Param::FBw], epsilon = 1e-6);
    }

    #[test]
    fn test_grow_preserves_and_fills_within_range() {
        let mut rng = SimRng::seeded(3);
        let mut c = Connection::new(0, 2, 2, LinkMode::Immediate, 0.5);
        c.set_weight(0, 0, 0.2);
        c.set_weight(1, 1, 0.8);
        c.resize(2, 3, None, Side::To, &mut rng);
        assert_eq!(c.shape(), (3, 2));
        assert_eq!(c.weight(0, 0), 0.2);
        assert_eq!(c.weight(1, 1), 0.8);
        for j in 0..2 {
            let w = c.weight(2, j);
            assert!((0.2..0.8).contains(&w));
        }
    }

    #[test]
    fn test_grow_flat_range_fills_constant() {
        let mut rng = SimRng::seeded(3);
        let mut c = Connection::new(0, 2, 2, LinkMode::Immediate, 0.6);
        c.resize(3, 2, None, Side::From, &mut rng);
        assert_eq!(c.shape(), (2, 3));
        assert!(c.weights().iter().all(|w| w.value() == 0.6));
    }

    #[test]
    fn test_prune_drops_row_or_column() {
        let mut rng = SimRng::seeded(3);
        let mut c = Connection::new(0, 3, 3, LinkMode::Immediate, 0.0);
        for i in 0..3 {
            for j in 0..3 {
                c.set_weight(i, j, (i * 10 + j) as f32);
            }
        }
        let mut rows = c.clone();
        rows.resize(3, 2, Some(1), Side::To, &mut rng);
        assert_eq!(rows.shape(), (2, 3));
        assert_eq!(rows.weight(1, 2), 22.0);

        c.resize(2, 3, Some(0), Side::From, &mut rng);
        assert_eq!(c.shape(), (3, 2));
        assert_eq!(c.weight(0, 0), 1.0);
        assert_eq!(c.weight(2, 1), 22.0);
    }
}
