//! CALM modules.
//!
//! A module holds `size` matched R/V pairs, one arousal (A) unit, one
//! noise-gain (E) unit and the connections that feed its R-layer. The
//! variants differ only in their lateral term and supervisory input:
//!
//! | Variant    | R lateral input                      | extra drive            |
//! |------------|--------------------------------------|------------------------|
//! | `Calm`     | `CROSS * (ΣV - V_i) + DOWN * V_i`    | E noise                |
//! | `Map`      | `Σ_j k[i][j] * V_j`                  | E noise                |
//! | `Feedback` | as `Calm`                            | target bias when set   |
//! | `Input`    | none, activations are set externally |                        |

use tracing::debug;

use super::connection::{Afferent, Connection, LinkMode, Side};
use super::feedback::FeedbackSignal;
use super::map::MapKernel;
use super::params::{Param, Parameters};
use super::unit::{RUnit, Unit, VUnit};
use super::{ModuleKind, ResetFlags};
use crate::rng::SimRng;
use crate::utils::gaussian_learning_rate;

/// How a step drives the R-layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drive {
    /// E noise, potential tracking and weight learning.
    Learn,
    /// Deterministic inference.
    Test,
    /// Inference with E noise, used with clamped units.
    TestNoisy,
}

impl Drive {
    #[inline]
    fn noisy(self) -> bool {
        matches!(self, Drive::Learn | Drive::TestNoisy)
    }
}

/// Outcome of [`Module::needs_resizing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeAction {
    Grow,
    Prune(usize),
}

#[derive(Debug, Clone)]
pub enum Variant {
    Input,
    Calm,
    Map(MapKernel),
    Feedback(FeedbackSignal),
}

#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    variant: Variant,
    r: Vec<RUnit>,
    v: Vec<VUnit>,
    a: Unit,
    e: Unit,
    incoming: Vec<Connection>,
    winner: Option<usize>,
    conv_time: Option<usize>,
    mu: f32,
}

impl Module {
    pub fn new(name: impl Into<String>, kind: ModuleKind, size: usize, params: &Parameters) -> Self {
        let variant = match kind {
            ModuleKind::Input => Variant::Input,
            ModuleKind::Calm => Variant::Calm,
            ModuleKind::Map => Variant::Map(MapKernel::new(size, params[Param::Down])),
            ModuleKind::Feedback => Variant::Feedback(FeedbackSignal::default()),
        };
        Self {
            name: name.into(),
            variant,
            r: vec![RUnit::default(); size],
            v: vec![VUnit::default(); size],
            a: Unit::default(),
            e: Unit::default(),
            incoming: Vec::new(),
            winner: None,
            conv_time: None,
            mu: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ModuleKind {
        match self.variant {
            Variant::Input => ModuleKind::Input,
            Variant::Calm => ModuleKind::Calm,
            Variant::Map(_) => ModuleKind::Map,
            Variant::Feedback(_) => ModuleKind::Feedback,
        }
    }

    pub fn variant(&self) -> &Variant {
        &self.variant
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.r.len()
    }

    pub fn r(&self) -> &[RUnit] {
        &self.r
    }

    pub fn v(&self) -> &[VUnit] {
        &self.v
    }

    pub fn a(&self) -> &Unit {
        &self.a
    }

    pub fn e(&self) -> &Unit {
        &self.e
    }

    pub fn incoming(&self) -> &[Connection] {
        &self.incoming
    }

    pub fn incoming_mut(&mut self) -> &mut [Connection] {
        &mut self.incoming
    }

    pub fn winner(&self) -> Option<usize> {
        self.winner
    }

    pub fn conv_time(&self) -> Option<usize> {
        self.conv_time
    }

    /// Learning rate used by the last weight update.
    pub fn learning_rate(&self) -> f32 {
        self.mu
    }

    pub fn potentials(&self) -> Vec<f32> {
        self.r.iter().map(|r| r.potential).collect()
    }

    /// Number of learning steps folded into each potential.
    pub fn potential_counts(&self) -> Vec<u32> {
        self.r.iter().map(|r| r.count).collect()
    }

    /// Overwrite potentials and their step counts, unit by unit.
    pub fn restore_potentials(&mut self, potentials: &[f32], counts: &[u32]) {
        for ((r, &p), &n) in self.r.iter_mut().zip(potentials).zip(counts) {
            r.potential = p;
            r.count = n;
        }
    }

    /// Add an incoming connection from module `source` of size `from_size`.
    pub fn connect(&mut self, source: usize, from_size: usize, mode: LinkMode, params: &Parameters) {
        self.incoming.push(Connection::new(
            source,
            self.size(),
            from_size,
            mode,
            params[Param::InitWt],
        ));
    }

    /// Snapshot of what outgoing connections may read this step.
    pub fn afferent(&self) -> Afferent {
        Afferent {
            current: self.r.iter().map(RUnit::current).collect(),
            delayed: self.r.iter().map(|r| r.delay).collect(),
            feedback_active: self.feedback().is_some(),
        }
    }

    /// Active supervisory target of a feedback module.
    pub fn feedback(&self) -> Option<usize> {
        match &self.variant {
            Variant::Feedback(s) => s.target(),
            _ => None,
        }
    }

    /// Set or clear the supervisory target. Returns `false` for modules that
    /// are not feedback modules.
    pub fn set_feedback(&mut self, target: Option<usize>) -> bool {
        match &mut self.variant {
            Variant::Feedback(s) => {
                s.set(target);
                true
            }
            _ => false,
        }
    }

    /// Rebuild the map kernel after `DOWN` or `SIGMA` changed.
    pub fn refresh_kernel(&mut self, params: &Parameters) {
        if let Variant::Map(kernel) = &mut self.variant {
            *kernel = MapKernel::new(self.r.len(), params[Param::Down]);
        }
    }

    /// Compute new activations for every unit from committed state.
    ///
    /// `sources` holds one snapshot per network module, indexed like the
    /// network's module list.
    pub fn update_activation(
        &mut self,
        drive: Drive,
        params: &Parameters,
        sources: &[Afferent],
        rng: &mut SimRng,
    ) {
        if matches!(self.variant, Variant::Input) {
            return;
        }
        let k_a = params[Param::KA];
        let cross = params[Param::Cross];
        let down = params[Param::Down];
        let v_acts: Vec<f32> = self.v.iter().map(VUnit::current).collect();
        let total_v: f32 = v_acts.iter().sum();
        let total_r: f32 = self.r.iter().map(RUnit::current).sum();
        let noise_gain = params[Param::Er] * self.e.current;
        let gain = self.e.current;

        let signal = match (&self.variant, drive) {
            (Variant::Feedback(s), Drive::Learn) if s.is_active() => Some(*s),
            _ => None,
        };

        for i in 0..self.r.len() {
            if self.r[i].is_clamped() {
                if drive == Drive::Learn {
                    self.r[i].accumulate_potential(gain);
                }
                continue;
            }
            let mut x: f32 = self
                .incoming
                .iter_mut()
                .map(|c| c.weighted_activation(i, &sources[c.source()]))
                .sum();
            x += match &self.variant {
                Variant::Map(kernel) => kernel.lateral(i, &v_acts),
                _ => cross * (total_v - v_acts[i]) + down * v_acts[i],
            };
            match signal.and_then(|s| s.bias(i, params)) {
                Some(bias) => x += bias,
                None if drive.noisy() => x += rng.uniform() * noise_gain,
                None => {}
            }
            self.r[i].update(x, k_a);
            if drive == Drive::Learn {
                self.r[i].accumulate_potential(gain);
            }
        }

        let up = params[Param::Up];
        let flat = params[Param::Flat];
        for (i, v) in self.v.iter_mut().enumerate() {
            let mut x = up * self.r[i].current() + flat * (total_v - v_acts[i]);
            if let Some(bias) = signal.and_then(|s| s.bias(i, params)) {
                x += bias;
            }
            v.update(x, k_a);
        }

        self.a
            .update(params[Param::High] * total_v + params[Param::Low] * total_r, k_a);
        self.e.update(params[Param::Ae] * self.a.current, k_a);
    }

    /// Apply the learning rule to every incoming connection and return the
    /// summed weight change.
    pub fn update_weights(&mut self, params: &Parameters, sources: &[Afferent]) -> f32 {
        let mut mu = gaussian_learning_rate(
            self.e.current,
            params[Param::DL],
            params[Param::WmueL],
            params[Param::GL],
            params[Param::GW],
        );
        if let Variant::Feedback(s) = &self.variant {
            mu = s.scale_learning_rate(mu, params);
        }
        self.mu = mu;

        let mut dw_sum = 0.0;
        for i in 0..self.r.len() {
            let back: f32 = self
                .incoming
                .iter_mut()
                .map(|c| c.weighted_activation(i, &sources[c.source()]))
                .sum();
            let act = self.r[i].current();
            for c in self.incoming.iter_mut() {
                let src = &sources[c.source()];
                dw_sum += c.learn(i, act, mu, back, src, params);
            }
        }
        dw_sum
    }

    /// Commit new activations.
    pub fn swap(&mut self) {
        self.r.iter_mut().for_each(RUnit::swap);
        self.v.iter_mut().for_each(VUnit::swap);
        self.a.swap();
        self.e.swap();
    }

    /// Check for a single converged node at iteration `t`.
    ///
    /// Exactly one unit at or above `LOWCRIT` that also reaches `HIGHCRIT`
    /// becomes the winner; a new winner records `t` as its convergence
    /// time. More than one (or no) candidate clears the winner. Map modules
    /// judge the V-layer, all others the R-layer.
    pub fn conv_check(&mut self, t: usize, params: &Parameters) -> Option<usize> {
        let low = params[Param::LowCrit];
        let high = params[Param::HighCrit];
        let acts: Vec<f32> = match self.variant {
            Variant::Map(_) => self.v.iter().map(VUnit::current).collect(),
            _ => self.r.iter().map(RUnit::current).collect(),
        };
        let mut candidates = acts.iter().enumerate().filter(|&(_, &a)| a >= low);
        match (candidates.next(), candidates.next()) {
            (Some((i, &a)), None) => {
                if a >= high && self.winner != Some(i) {
                    self.winner = Some(i);
                    self.conv_time = Some(t);
                }
            }
            _ => {
                self.winner = None;
                self.conv_time = None;
            }
        }
        self.winner
    }

    /// Decide whether potentials call for growth or pruning.
    ///
    /// Growth needs the best potential to lead the runner-up by at least
    /// `P_G` percent, where the runner-up is the best potential strictly
    /// below the maximum; pruning picks the last unit below `P_S`. When both
    /// signals are present nothing happens, and a module of size 2 is never
    /// pruned.
    pub fn needs_resizing(&self, params: &Parameters) -> Option<ResizeAction> {
        let mut max = 0.0f32;
        let mut next = 0.0f32;
        let mut prune = None;
        for (i, r) in self.r.iter().enumerate() {
            let p = r.potential;
            if p > max {
                next = max;
                max = p;
            } else if p > next && p < max {
                next = p;
            }
            if p < params[Param::PS] {
                prune = Some(i);
            }
        }
        let grow = max > 0.0 && (max - next) / max * 100.0 >= params[Param::PG];

        let action = match (grow, prune) {
            (true, Some(_)) => None,
            (_, Some(node)) if self.size() > 2 => Some(ResizeAction::Prune(node)),
            (true, None) => Some(ResizeAction::Grow),
            _ => None,
        };
        if action.is_some() {
            debug!(module = %self.name, max, next, potentials = ?self.potentials(), "resize signal");
        }
        action
    }

    /// Change the module to `new_size` units.
    ///
    /// Without a `node`, the first `min(old, new)` units keep their full
    /// state and new units start at rest. With a `node`, that unit is
    /// dropped and the rest are compacted. Incoming connections are resized
    /// on their destination side. Returns `false` (and changes nothing) for
    /// sizes below 2.
    pub fn resize(
        &mut self,
        new_size: usize,
        node: Option<usize>,
        params: &Parameters,
        rng: &mut SimRng,
    ) -> bool {
        if new_size < 2 {
            return false;
        }
        let keep = |k: &usize| node != Some(*k);
        let mut r: Vec<RUnit> = (0..self.r.len())
            .filter(keep)
            .map(|k| self.r[k])
            .collect();
        let mut v: Vec<VUnit> = (0..self.v.len())
            .filter(keep)
            .map(|k| self.v[k])
            .collect();
        r.resize(new_size, RUnit::default());
        v.resize(new_size, VUnit::default());
        self.r = r;
        self.v = v;

        for c in self.incoming.iter_mut() {
            let (_, from) = c.shape();
            c.resize(from, new_size, node, Side::To, rng);
        }
        self.refresh_kernel(params);
        if self.winner.is_some_and(|w| w >= new_size || node.is_some()) {
            self.winner = None;
            self.conv_time = None;
        }
        true
    }

    /// Resize the source side of every connection from module `source`.
    pub fn resize_from(
        &mut self,
        source: usize,
        new_from: usize,
        node: Option<usize>,
        rng: &mut SimRng,
    ) {
        let to = self.size();
        for c in self.incoming.iter_mut().filter(|c| c.source() == source) {
            c.resize(new_from, to, node, Side::From, rng);
        }
    }

    /// Reset according to `flags`.
    ///
    /// `ACT` clears activations (keeping the last R value as the delayed
    /// copy unless `TIME` is also set), clears the winner and ticks every
    /// incoming clock. `WT` reinitializes weights to `INITWT` and clears
    /// potentials. `TIME` restarts clocks and forgets delayed activations.
    /// Clamped units are left alone.
    pub fn reset(&mut self, flags: ResetFlags, params: &Parameters) {
        if flags.contains(ResetFlags::ACT) {
            let keep_delay = !flags.contains(ResetFlags::TIME);
            for r in self.r.iter_mut() {
                if keep_delay {
                    r.reset_activation();
                } else {
                    r.reset_time();
                }
            }
            self.v.iter_mut().for_each(VUnit::reset);
            self.a.reset();
            self.e.reset();
            self.winner = None;
            self.conv_time = None;
            self.incoming.iter_mut().for_each(Connection::tick_clock);
        }
        if flags.contains(ResetFlags::WIN) {
            self.winner = None;
            self.conv_time = None;
        }
        if flags.contains(ResetFlags::WT) {
            let init = params[Param::InitWt];
            self.incoming.iter_mut().for_each(|c| c.reset_weights(init));
            self.r.iter_mut().for_each(RUnit::reset_potential);
        }
        if flags.contains(ResetFlags::TIME) {
            self.incoming.iter_mut().for_each(Connection::reset_time);
            self.r.iter_mut().for_each(RUnit::reset_time);
        }
    }

    /// Zero the activations and delayed copies of an input module.
    pub fn reset_input(&mut self) {
        self.r.iter_mut().for_each(RUnit::reset_input);
    }

    pub fn update_time_delay(&mut self) {
        self.r.iter_mut().for_each(RUnit::update_time_delay);
    }

    /// Present external activations to the R-layer.
    pub fn set_input(&mut self, values: &[f32]) {
        for (r, &x) in self.r.iter_mut().zip(values) {
            r.set_input(x);
        }
    }

    /// Clamp both units of pair `node` to `value`.
    pub fn clamp_unit(&mut self, node: usize, value: f32) {
        self.r[node].clamp(value);
        self.v[node].clamp(value);
    }

    pub fn unclamp_unit(&mut self, node: usize) {
        self.r[node].unclamp();
        self.v[node].unclamp();
    }

    pub fn is_clamped(&self, node: usize) -> bool {
        self.r[node].is_clamped()
    }

    pub fn sum_r(&self) -> f32 {
        self.r.iter().map(RUnit::current).sum()
    }

    pub fn sum_v(&self) -> f32 {
        self.v.iter().map(VUnit::current).sum()
    }

    pub fn sum_weight_changes(&self) -> f32 {
        self.incoming.iter().map(Connection::sum_weight_changes).sum()
    }
}
