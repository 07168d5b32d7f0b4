//! Network orchestration.
//!
//! A [`Network`] owns its modules (input modules first, then processing
//! modules), the parameter vector, the loaded patterns, and the per-pattern
//! winner and convergence-time tables. One [`Network::learn`] or
//! [`Network::test`] call is one synchronous time step across all
//! processing modules.

use ndarray::{s, Array2};
use rand::seq::SliceRandom;
use std::fmt;
use tracing::info;

use crate::core::{
    Afferent, CalmError, CalmResult, Drive, LinkMode, Module, ModuleKind, Param, Parameters,
    ResetFlags, ResizeAction,
};
use crate::data::patterns::PatternSet;
use crate::data::topology::{LinkSpec, ModuleSpec, Topology};
use crate::rng::SimRng;
use crate::utils::{distinct_winners, ring_ordered};

/// Order in which a pattern file is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum PatternOrder {
    Linear,
    #[default]
    Permuted,
}

#[derive(Debug, Clone)]
pub struct Network {
    params: Parameters,
    modules: Vec<Module>,
    num_inputs: usize,
    patterns: Option<PatternSet>,
    feedback: Option<Vec<Option<usize>>>,
    order: PatternOrder,
    permutation: Vec<usize>,
    winners: Array2<Option<usize>>,
    conv_times: Array2<Option<usize>>,
    wt_change_sum: f32,
    rng: SimRng,
}

impl Network {
    pub fn new(params: Parameters, rng: SimRng) -> Self {
        Self {
            params,
            modules: Vec::new(),
            num_inputs: 0,
            patterns: None,
            feedback: None,
            order: PatternOrder::default(),
            permutation: Vec::new(),
            winners: Array2::from_elem((0, 0), None),
            conv_times: Array2::from_elem((0, 0), None),
            wt_change_sum: 0.0,
            rng,
        }
    }

    /// Build a network from a parsed description.
    ///
    /// # Errors
    ///
    /// Fails on duplicate or unknown module names, misplaced input modules,
    /// processing modules smaller than 2, or links into input modules.
    pub fn from_topology(topology: &Topology, params: Parameters, rng: SimRng) -> CalmResult<Self> {
        let mut net = Network::new(params, rng);
        for m in &topology.modules {
            net.add_module(&m.name, m.kind, m.size)?;
        }
        for link in &topology.links {
            net.connect(&link.to, &link.from, link.mode)?;
        }
        Ok(net)
    }

    /// Append a module and return its index.
    pub fn add_module(&mut self, name: &str, kind: ModuleKind, size: usize) -> CalmResult<usize> {
        if self.modules.iter().any(|m| m.name() == name) {
            return Err(CalmError::InvalidTopology(format!(
                "duplicate module name '{name}'"
            )));
        }
        match kind {
            ModuleKind::Input => {
                if self.modules.len() > self.num_inputs {
                    return Err(CalmError::InvalidTopology(format!(
                        "input module '{name}' declared after processing modules"
                    )));
                }
                if size == 0 {
                    return Err(CalmError::InvalidTopology(format!(
                        "input module '{name}' has no units"
                    )));
                }
                if self.patterns.is_some() {
                    return Err(CalmError::InvalidTopology(format!(
                        "input module '{name}' added after patterns were loaded"
                    )));
                }
                self.num_inputs += 1;
            }
            _ if size < 2 => {
                return Err(CalmError::InvalidTopology(format!(
                    "module '{name}' needs at least 2 units, got {size}"
                )));
            }
            _ => {}
        }
        self.modules.push(Module::new(name, kind, size, &self.params));
        if kind != ModuleKind::Input {
            self.grow_tables();
        }
        Ok(self.modules.len() - 1)
    }

    /// Give the winner tables a row for every processing module, keeping
    /// the recorded entries.
    fn grow_tables(&mut self) {
        let (rows, cols) = self.winners.dim();
        let shape = (self.num_processing(), cols);
        let mut winners = Array2::from_elem(shape, None);
        let mut conv_times = Array2::from_elem(shape, None);
        winners
            .slice_mut(s![..rows, ..])
            .assign(&self.winners);
        conv_times
            .slice_mut(s![..rows, ..])
            .assign(&self.conv_times);
        self.winners = winners;
        self.conv_times = conv_times;
    }

    /// Add a link from module `from` into module `to`.
    pub fn connect(&mut self, to: &str, from: &str, mode: LinkMode) -> CalmResult<()> {
        let to_idx = self.module_index(to)?;
        let from_idx = self.module_index(from)?;
        if to_idx < self.num_inputs {
            return Err(CalmError::InvalidTopology(format!(
                "input module '{to}' cannot receive connections"
            )));
        }
        if mode == LinkMode::Delayed(0) {
            return Err(CalmError::InvalidTopology(format!(
                "delay link {from} -> {to} needs a delay of at least 1"
            )));
        }
        let from_size = self.modules[from_idx].size();
        let params = &self.params;
        self.modules[to_idx].connect(from_idx, from_size, mode, params);
        Ok(())
    }

    /// Current network description, with live module sizes.
    pub fn topology(&self) -> Topology {
        let modules = self
            .modules
            .iter()
            .map(|m| ModuleSpec {
                name: m.name().to_string(),
                kind: m.kind(),
                size: m.size(),
            })
            .collect();
        let links = self
            .modules
            .iter()
            .flat_map(|m| {
                m.incoming().iter().map(move |c| LinkSpec {
                    to: m.name().to_string(),
                    from: self.modules[c.source()].name().to_string(),
                    mode: c.mode(),
                })
            })
            .collect();
        Topology { modules, links }
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn parameter(&self, p: Param) -> f32 {
        self.params[p]
    }

    /// Set one parameter. Map kernels are rebuilt when `SIGMA` or `DOWN`
    /// changes.
    pub fn set_parameter(&mut self, p: Param, value: f32) {
        self.params.set(p, value);
        if matches!(p, Param::Sigma | Param::Down) {
            self.refresh_kernels();
        }
    }

    pub fn set_parameters(&mut self, params: Parameters) {
        self.params = params;
        self.refresh_kernels();
    }

    fn refresh_kernels(&mut self) {
        let params = &self.params;
        self.modules
            .iter_mut()
            .for_each(|m| m.refresh_kernel(params));
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn module(&self, idx: usize) -> &Module {
        &self.modules[idx]
    }

    pub fn module_mut(&mut self, idx: usize) -> &mut Module {
        &mut self.modules[idx]
    }

    pub fn module_index(&self, name: &str) -> CalmResult<usize> {
        self.modules
            .iter()
            .position(|m| m.name() == name)
            .ok_or_else(|| CalmError::UnknownModule(name.to_string()))
    }

    pub fn num_modules(&self) -> usize {
        self.modules.len()
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    pub fn num_processing(&self) -> usize {
        self.modules.len() - self.num_inputs
    }

    // -- patterns -----------------------------------------------------------

    /// Install a pattern set, replacing any previous one.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` unless there is one matrix per input module whose
    /// width matches that module's size. Nothing changes on error.
    pub fn load_patterns(&mut self, patterns: PatternSet) -> CalmResult<()> {
        if patterns.num_modules() != self.num_inputs {
            return Err(CalmError::ShapeMismatch(format!(
                "{} pattern blocks for {} input modules",
                patterns.num_modules(),
                self.num_inputs
            )));
        }
        for (m, module) in self.modules[..self.num_inputs].iter().enumerate() {
            if patterns.width(m) != module.size() {
                return Err(CalmError::ShapeMismatch(format!(
                    "patterns for '{}' have width {}, module has {} units",
                    module.name(),
                    patterns.width(m),
                    module.size()
                )));
            }
        }
        let n = patterns.num_patterns();
        self.patterns = Some(patterns);
        self.feedback = None;
        self.init_tables(n);
        Ok(())
    }

    /// Switch to online mode: a single zeroed pattern slot, fed through
    /// [`Network::set_input_stream`] or [`Network::set_module_input`].
    pub fn online_patterns(&mut self) {
        let widths: Vec<usize> = self.modules[..self.num_inputs]
            .iter()
            .map(Module::size)
            .collect();
        self.patterns = Some(PatternSet::zeros(1, &widths));
        self.feedback = None;
        self.init_tables(1);
        self.permutation = vec![0];
    }

    fn init_tables(&mut self, num_patterns: usize) {
        let shape = (self.num_processing(), num_patterns);
        self.winners = Array2::from_elem(shape, None);
        self.conv_times = Array2::from_elem(shape, None);
        self.permutation = (0..num_patterns).collect();
    }

    pub fn patterns(&self) -> Option<&PatternSet> {
        self.patterns.as_ref()
    }

    pub fn num_patterns(&self) -> usize {
        self.patterns.as_ref().map_or(0, PatternSet::num_patterns)
    }

    /// Install one category per pattern (`None` for unsupervised patterns).
    ///
    /// # Errors
    ///
    /// `NoFeedbackModule` without a feedback module, `PatternsNotLoaded`
    /// before patterns, `FeedbackCountMismatch` on a length mismatch.
    pub fn load_feedback(&mut self, list: Vec<Option<usize>>) -> CalmResult<()> {
        self.feedback_module().ok_or(CalmError::NoFeedbackModule)?;
        let expected = self
            .patterns
            .as_ref()
            .ok_or(CalmError::PatternsNotLoaded)?
            .num_patterns();
        if list.len() != expected {
            return Err(CalmError::FeedbackCountMismatch {
                expected,
                found: list.len(),
            });
        }
        self.feedback = Some(list);
        Ok(())
    }

    pub fn feedback_list(&self) -> Option<&[Option<usize>]> {
        self.feedback.as_deref()
    }

    /// Index of the first feedback module.
    pub fn feedback_module(&self) -> Option<usize> {
        self.modules
            .iter()
            .position(|m| m.kind() == ModuleKind::Feedback)
    }

    pub fn pattern_order(&self) -> PatternOrder {
        self.order
    }

    pub fn set_pattern_order(&mut self, order: PatternOrder) {
        self.order = order;
        match order {
            PatternOrder::Linear => {
                self.permutation = (0..self.permutation.len()).collect();
            }
            PatternOrder::Permuted => self.permute_patterns(),
        }
    }

    /// Shuffle the presentation order with the network's generator.
    pub fn permute_patterns(&mut self) {
        self.permutation.shuffle(&mut self.rng);
    }

    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    fn pattern_slot(&self, p_idx: usize) -> CalmResult<usize> {
        self.permutation.get(p_idx).copied().ok_or_else(|| {
            CalmError::ShapeMismatch(format!(
                "pattern {p_idx} out of range ({} loaded)",
                self.permutation.len()
            ))
        })
    }

    /// Present pattern `p_idx` (in presentation order) to the input modules.
    pub fn set_input(&mut self, p_idx: usize) -> CalmResult<()> {
        let slot = self.pattern_slot(p_idx)?;
        let patterns = self.patterns.as_ref().ok_or(CalmError::PatternsNotLoaded)?;
        for (m, module) in self.modules[..self.num_inputs].iter_mut().enumerate() {
            module.set_input(&patterns.pattern(m, slot).to_vec());
        }
        Ok(())
    }

    /// Present raw activations to one input module.
    pub fn set_module_input(&mut self, idx: usize, values: &[f32]) -> CalmResult<()> {
        let module = self
            .modules
            .get_mut(idx)
            .filter(|m| m.kind() == ModuleKind::Input)
            .ok_or_else(|| CalmError::InvalidTopology(format!("module {idx} is not an input module")))?;
        if values.len() != module.size() {
            return Err(CalmError::ShapeMismatch(format!(
                "{} values for '{}' with {} units",
                values.len(),
                module.name(),
                module.size()
            )));
        }
        module.set_input(values);
        Ok(())
    }

    /// Spread one flat vector over all input modules in order.
    pub fn set_input_stream(&mut self, values: &[f32]) -> CalmResult<()> {
        let total: usize = self.modules[..self.num_inputs].iter().map(Module::size).sum();
        if values.len() != total {
            return Err(CalmError::ShapeMismatch(format!(
                "{} values for {total} input units",
                values.len()
            )));
        }
        let mut rest = values;
        for module in self.modules[..self.num_inputs].iter_mut() {
            let (head, tail) = rest.split_at(module.size());
            module.set_input(head);
            rest = tail;
        }
        Ok(())
    }

    /// Apply the feedback category of pattern `p_idx` to the feedback module.
    pub fn set_feedback(&mut self, p_idx: usize) -> CalmResult<()> {
        let fb = self.feedback_module().ok_or(CalmError::NoFeedbackModule)?;
        let slot = self.pattern_slot(p_idx)?;
        let list = self.feedback.as_ref().ok_or(CalmError::PatternsNotLoaded)?;
        let target = list.get(slot).copied().flatten();
        self.modules[fb].set_feedback(target);
        Ok(())
    }

    /// Set the feedback module's category directly.
    pub fn set_online_feedback(&mut self, target: Option<usize>) -> CalmResult<()> {
        let fb = self.feedback_module().ok_or(CalmError::NoFeedbackModule)?;
        self.modules[fb].set_feedback(target);
        Ok(())
    }

    // -- stepping -----------------------------------------------------------

    /// One learning step: activations, weights, then swap.
    pub fn learn(&mut self) {
        self.step(Drive::Learn);
    }

    /// One noise-free inference step.
    pub fn test(&mut self) {
        self.step(Drive::Test);
    }

    /// One inference step, with E noise if `use_noise`.
    pub fn test_with_noise(&mut self, use_noise: bool) {
        self.step(if use_noise { Drive::TestNoisy } else { Drive::Test });
    }

    fn step(&mut self, drive: Drive) {
        let sources: Vec<Afferent> = self.modules.iter().map(Module::afferent).collect();
        let first = self.num_inputs;
        let Self {
            modules,
            params,
            rng,
            wt_change_sum,
            ..
        } = self;
        for m in modules[first..].iter_mut() {
            m.update_activation(drive, params, &sources, rng);
        }
        if drive == Drive::Learn {
            for m in modules[first..].iter_mut() {
                *wt_change_sum += m.update_weights(params, &sources);
            }
        }
        for m in modules[first..].iter_mut() {
            m.swap();
        }
    }

    /// Run the convergence check of every processing module at iteration
    /// `t` and record winners for pattern `p_idx`. Returns `true` only if
    /// every processing module has a winner.
    pub fn collect_winners(&mut self, p_idx: usize, t: usize) -> bool {
        let slot = self.permutation.get(p_idx).copied().unwrap_or(p_idx);
        let record = slot < self.winners.ncols();
        let mut converged = true;
        let first = self.num_inputs;
        let rows = self.winners.nrows();
        for (row, m) in self.modules[first..].iter_mut().enumerate() {
            match m.conv_check(t, &self.params) {
                Some(w) if record && row < rows => {
                    self.winners[[row, slot]] = Some(w);
                    self.conv_times[[row, slot]] = m.conv_time();
                }
                Some(_) => {}
                None => converged = false,
            }
        }
        converged
    }

    /// Current winner of module `idx`; `None` also for unknown modules.
    pub fn winner(&self, idx: usize) -> Option<usize> {
        self.modules.get(idx).and_then(Module::winner)
    }

    /// Winners per processing module (rows) and pattern (columns).
    pub fn winners(&self) -> &Array2<Option<usize>> {
        &self.winners
    }

    pub fn conv_times(&self) -> &Array2<Option<usize>> {
        &self.conv_times
    }

    pub fn winner_table(&self) -> WinnerTable<'_> {
        WinnerTable { net: self }
    }

    /// Distinct winning nodes per processing module over the pattern set.
    pub fn committed(&self) -> Vec<Committed> {
        self.modules[self.num_inputs..]
            .iter()
            .zip(self.winners.rows())
            .map(|(m, row)| {
                let column: Vec<Option<usize>> = row.to_vec();
                Committed {
                    module: m.name().to_string(),
                    distinct: distinct_winners(&column),
                    ordered: (m.kind() == ModuleKind::Map).then(|| ring_ordered(&column)),
                }
            })
            .collect()
    }

    // -- resetting ----------------------------------------------------------

    /// Reset processing modules according to `flags`. `TIME` also clears
    /// input modules; `WIN` also clears the winner tables.
    pub fn reset(&mut self, flags: ResetFlags) {
        if flags.contains(ResetFlags::TIME) {
            self.modules[..self.num_inputs]
                .iter_mut()
                .for_each(Module::reset_input);
        }
        let params = &self.params;
        for m in self.modules[self.num_inputs..].iter_mut() {
            m.reset(flags, params);
        }
        if flags.contains(ResetFlags::WIN) {
            self.winners.fill(None);
            self.conv_times.fill(None);
        }
    }

    /// Zero the activations of the input modules only.
    pub fn reset_inputs(&mut self) {
        self.modules[..self.num_inputs]
            .iter_mut()
            .for_each(Module::reset_input);
    }

    /// Copy every processing unit's activation into its delayed slot.
    pub fn update_time_delay(&mut self) {
        self.modules[self.num_inputs..]
            .iter_mut()
            .for_each(Module::update_time_delay);
    }

    // -- resizing -----------------------------------------------------------

    /// Let every CALM module grow or shrink according to its potentials.
    /// Map and feedback modules never resize themselves. Returns whether
    /// any module changed size.
    pub fn resize_modules(&mut self) -> bool {
        let mut resized = false;
        for idx in self.num_inputs..self.modules.len() {
            if matches!(
                self.modules[idx].kind(),
                ModuleKind::Map | ModuleKind::Feedback
            ) {
                continue;
            }
            if let Some(action) = self.modules[idx].needs_resizing(&self.params) {
                resized |= self.apply_resize(idx, action);
            }
        }
        resized
    }

    /// Resize one module if its potentials call for it. Map modules are
    /// exempt.
    pub fn resize_module(&mut self, idx: usize) -> CalmResult<bool> {
        self.check_module(idx)?;
        if idx < self.num_inputs || self.modules[idx].kind() == ModuleKind::Map {
            return Ok(false);
        }
        Ok(match self.modules[idx].needs_resizing(&self.params) {
            Some(action) => self.apply_resize(idx, action),
            None => false,
        })
    }

    /// Force module `idx` to `new_size` units, keeping the first units.
    pub fn resize_module_to(&mut self, idx: usize, new_size: usize) -> CalmResult<()> {
        if idx < self.num_inputs || idx >= self.modules.len() {
            return Err(CalmError::InvalidTopology(format!(
                "module {idx} is not a processing module"
            )));
        }
        if new_size < 2 {
            return Err(CalmError::InvalidTopology(format!(
                "module '{}' needs at least 2 units, got {new_size}",
                self.modules[idx].name()
            )));
        }
        self.resize_to(idx, new_size, None);
        info!(module = %self.modules[idx].name(), size = new_size, "resized");
        Ok(())
    }

    fn apply_resize(&mut self, idx: usize, action: ResizeAction) -> bool {
        let size = self.modules[idx].size();
        let (new_size, node) = match action {
            ResizeAction::Grow => (size + 1, None),
            ResizeAction::Prune(n) => (size - 1, Some(n)),
        };
        if new_size < 2 {
            return false;
        }
        self.resize_to(idx, new_size, node);
        let name = self.modules[idx].name();
        match node {
            None => info!("{name} +1 -> {new_size}"),
            Some(n) => info!("{name} -1 @ {n} -> {new_size}"),
        }
        true
    }

    /// Resize every dependent connection first, then the module itself.
    fn resize_to(&mut self, idx: usize, new_size: usize, node: Option<usize>) {
        let Self {
            modules,
            params,
            rng,
            num_inputs,
            ..
        } = self;
        for m in modules[*num_inputs..].iter_mut() {
            m.resize_from(idx, new_size, node, rng);
        }
        modules[idx].resize(new_size, node, params, rng);
    }

    // -- clamping and summaries ---------------------------------------------

    fn check_module(&self, idx: usize) -> CalmResult<()> {
        if idx >= self.modules.len() {
            return Err(CalmError::InvalidIndex {
                what: "module",
                index: idx,
                len: self.modules.len(),
            });
        }
        Ok(())
    }

    fn check_unit(&self, idx: usize, node: usize) -> CalmResult<()> {
        self.check_module(idx)?;
        let len = self.modules[idx].size();
        if node >= len {
            return Err(CalmError::InvalidIndex {
                what: "unit",
                index: node,
                len,
            });
        }
        Ok(())
    }

    /// Fix R and V of pair `node` in module `idx` at `value`.
    pub fn clamp_unit(&mut self, idx: usize, node: usize, value: f32) -> CalmResult<()> {
        self.check_unit(idx, node)?;
        self.modules[idx].clamp_unit(node, value);
        Ok(())
    }

    pub fn unclamp_unit(&mut self, idx: usize, node: usize) -> CalmResult<()> {
        self.check_unit(idx, node)?;
        self.modules[idx].unclamp_unit(node);
        Ok(())
    }

    pub fn is_clamped(&self, idx: usize, node: usize) -> bool {
        self.check_unit(idx, node).is_ok() && self.modules[idx].is_clamped(node)
    }

    fn processing(&self, idx: Option<usize>) -> &[Module] {
        match idx {
            Some(i) => std::slice::from_ref(&self.modules[i]),
            None => &self.modules[self.num_inputs..],
        }
    }

    /// Total R and V activation of one module, or of all processing modules.
    pub fn sum_activation(&self, idx: Option<usize>) -> f32 {
        self.sum_activation_r(idx) + self.sum_activation_v(idx)
    }

    pub fn sum_activation_r(&self, idx: Option<usize>) -> f32 {
        self.processing(idx).iter().map(Module::sum_r).sum()
    }

    pub fn sum_activation_v(&self, idx: Option<usize>) -> f32 {
        self.processing(idx).iter().map(Module::sum_v).sum()
    }

    /// Mean of the processing modules' last learning rates.
    pub fn mean_learning_rate(&self) -> f32 {
        let procs = self.processing(None);
        if procs.is_empty() {
            return 0.0;
        }
        procs.iter().map(Module::learning_rate).sum::<f32>() / procs.len() as f32
    }

    /// Weight change accumulated since the last reset of the sum.
    pub fn wt_change_sum(&self) -> f32 {
        self.wt_change_sum
    }

    pub fn reset_wt_change_sum(&mut self) {
        self.wt_change_sum = 0.0;
    }

    /// Largest module size in the network.
    pub fn max_module_size(&self) -> usize {
        self.modules.iter().map(Module::size).max().unwrap_or(0)
    }
}

/// Number of distinct winners of one processing module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    pub module: String,
    pub distinct: usize,
    /// For map modules: whether winners step around the ring in order.
    pub ordered: Option<bool>,
}

impl fmt::Display for Committed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.module, self.distinct)?;
        match self.ordered {
            Some(true) => write!(f, " OK"),
            Some(false) => write!(f, " NG"),
            None => Ok(()),
        }
    }
}

/// Text rendering of the winner table, one row per pattern, `*` for no
/// winner.
pub struct WinnerTable<'a> {
    net: &'a Network,
}

impl fmt::Display for WinnerTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let net = self.net;
        let width = net.max_module_size().to_string().len().max(1) + 1;
        write!(f, "   ")?;
        for m in &net.modules[net.num_inputs..] {
            write!(f, "{} ", m.name())?;
        }
        writeln!(f)?;
        for (p, col) in net.winners.columns().into_iter().enumerate() {
            write!(f, "{p}: ")?;
            for w in col.iter() {
                match w {
                    Some(node) => write!(f, "{node:<width$}")?,
                    None => write!(f, "{:<width$}", "*")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_net(seed: u64) -> Network {
        let mut net = Network::new(Parameters::default(), SimRng::seeded(seed));
        net.add_module("pat", ModuleKind::Input, 3).unwrap();
        net.add_module("cat", ModuleKind::Calm, 2).unwrap();
        net.connect("cat", "pat", LinkMode::Immediate).unwrap();
        net
    }

    fn patterns() -> PatternSet {
        PatternSet::new(vec![ndarray::array![
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0]
        ]])
        .unwrap()
    }

    #[test]
    fn test_topology_validation() {
        let mut net = small_net(1);
        assert!(matches!(
            net.add_module("pat", ModuleKind::Calm, 2),
            Err(CalmError::InvalidTopology(_))
        ));
        assert!(net.add_module("late", ModuleKind::Input, 2).is_err());
        assert!(net.add_module("tiny", ModuleKind::Calm, 1).is_err());
        assert!(matches!(
            net.connect("cat", "nope", LinkMode::Immediate),
            Err(CalmError::UnknownModule(_))
        ));
        assert!(net.connect("pat", "cat", LinkMode::Immediate).is_err());
        assert!(net.connect("cat", "pat", LinkMode::Delayed(0)).is_err());
    }

    #[test]
    fn test_load_patterns_checks_width() {
        let mut net = small_net(1);
        let bad = PatternSet::new(vec![ndarray::array![[1.0, 0.0]]]).unwrap();
        assert!(net.load_patterns(bad).is_err());
        assert!(net.patterns().is_none());
        net.load_patterns(patterns()).unwrap();
        assert_eq!(net.num_patterns(), 3);
        assert_eq!(net.winners().dim(), (1, 3));
    }

    #[test]
    fn test_feedback_errors() {
        let mut net = small_net(1);
        assert!(matches!(
            net.load_feedback(vec![None]),
            Err(CalmError::NoFeedbackModule)
        ));
        net.add_module("fb", ModuleKind::Feedback, 3).unwrap();
        assert!(matches!(
            net.load_feedback(vec![None]),
            Err(CalmError::PatternsNotLoaded)
        ));
        net.load_patterns(patterns()).unwrap();
        assert!(matches!(
            net.load_feedback(vec![Some(0)]),
            Err(CalmError::FeedbackCountMismatch { expected: 3, found: 1 })
        ));
        net.load_feedback(vec![Some(0), Some(1), None]).unwrap();
        net.set_pattern_order(PatternOrder::Linear);
        net.set_feedback(1).unwrap();
        assert_eq!(net.module(2).feedback(), Some(1));
        net.set_feedback(2).unwrap();
        assert_eq!(net.module(2).feedback(), None);
    }

    #[test]
    fn test_set_input_follows_permutation() {
        let mut net = small_net(4);
        net.load_patterns(patterns()).unwrap();
        net.set_pattern_order(PatternOrder::Permuted);
        let slot = net.permutation()[0];
        net.set_input(0).unwrap();
        let r: Vec<f32> = net.module(0).r().iter().map(|u| u.current()).collect();
        assert_eq!(r[slot], 1.0);
        assert_eq!(r.iter().sum::<f32>(), 1.0);
        assert!(net.set_input(3).is_err());
    }

    #[test]
    fn test_input_stream_and_module_input() {
        let mut net = small_net(1);
        assert!(net.set_input_stream(&[1.0, 0.0]).is_err());
        net.set_input_stream(&[0.0, 1.0, 0.0]).unwrap();
        assert_eq!(net.module(0).r()[1].current(), 1.0);
        assert!(net.set_module_input(1, &[1.0, 0.0]).is_err());
        assert!(net.set_module_input(0, &[1.0]).is_err());
        net.set_module_input(0, &[0.5, 0.5, 0.5]).unwrap();
        assert_eq!(net.module(0).r()[1].delay, 1.0);
    }

    #[test]
    fn test_collect_winners_records_slot() {
        let mut net = small_net(1);
        net.load_patterns(patterns()).unwrap();
        net.set_pattern_order(PatternOrder::Linear);
        net.clamp_unit(1, 1, 0.8).unwrap();
        assert!(net.collect_winners(2, 7));
        assert_eq!(net.winners()[[0, 2]], Some(1));
        assert_eq!(net.conv_times()[[0, 2]], Some(7));
        net.reset(ResetFlags::WIN);
        assert_eq!(net.winners()[[0, 2]], None);
    }

    #[test]
    fn test_add_module_after_loading_grows_tables() {
        let mut net = small_net(1);
        net.load_patterns(patterns()).unwrap();
        net.clamp_unit(1, 0, 0.9).unwrap();
        net.collect_winners(0, 2);
        net.add_module("top", ModuleKind::Calm, 2).unwrap();
        net.connect("top", "cat", LinkMode::Immediate).unwrap();
        assert_eq!(net.winners().dim(), (2, 3));
        let slot = net.permutation()[0];
        assert_eq!(net.winners()[[0, slot]], Some(0));

        net.clamp_unit(2, 1, 0.9).unwrap();
        assert!(net.collect_winners(1, 3));
        assert_eq!(net.winners()[[1, net.permutation()[1]]], Some(1));
        assert!(net.add_module("late", ModuleKind::Input, 2).is_err());
    }

    #[test]
    fn test_out_of_range_indices_are_errors() {
        let mut net = small_net(1);
        assert!(matches!(
            net.clamp_unit(5, 0, 0.5),
            Err(CalmError::InvalidIndex { what: "module", index: 5, len: 2 })
        ));
        assert!(matches!(
            net.clamp_unit(1, 2, 0.5),
            Err(CalmError::InvalidIndex { what: "unit", index: 2, len: 2 })
        ));
        assert!(net.unclamp_unit(1, 9).is_err());
        assert!(!net.is_clamped(1, 9));
        assert!(net.resize_module(7).is_err());
        assert_eq!(net.winner(7), None);
    }

    #[test]
    fn test_forced_resize_updates_dependents() {
        let mut net = small_net(1);
        net.add_module("top", ModuleKind::Calm, 2).unwrap();
        net.connect("top", "cat", LinkMode::Immediate).unwrap();
        net.resize_module_to(1, 4).unwrap();
        assert_eq!(net.module(1).size(), 4);
        assert_eq!(net.module(1).incoming()[0].shape(), (4, 3));
        assert_eq!(net.module(2).incoming()[0].shape(), (2, 4));
        assert!(net.resize_module_to(1, 1).is_err());
        assert!(net.resize_module_to(0, 3).is_err());
    }

    #[test]
    fn test_topology_write_back() {
        let mut net = small_net(1);
        net.resize_module_to(1, 3).unwrap();
        let topo = net.topology();
        assert_eq!(topo.modules[1].size, 3);
        assert_eq!(topo.links.len(), 1);
        assert_eq!(topo.links[0].from, "pat");
    }

    #[test]
    fn test_winner_table_and_committed() {
        let mut net = small_net(1);
        net.load_patterns(patterns()).unwrap();
        net.set_pattern_order(PatternOrder::Linear);
        net.clamp_unit(1, 0, 0.9).unwrap();
        net.collect_winners(0, 1);
        let text = net.winner_table().to_string();
        assert!(text.contains("cat"));
        assert!(text.contains("0: 0"));
        assert!(text.contains("1: *"));
        let committed = net.committed();
        assert_eq!(committed[0].distinct, 1);
        assert_eq!(committed[0].to_string(), "cat: 1");
    }
}
