//! Growing, pruning and pattern-order behavior.

use approx::assert_abs_diff_eq;
use calm::data::PatternSet;
use calm::{LinkMode, ModuleKind, Network, Param, Parameters, PatternOrder, ResetFlags, SimRng};
use ndarray::{array, Array2};

/// `inp(2) -> hid(3) -> top(2)`.
fn chain(seed: u64) -> Network {
    let mut net = Network::new(Parameters::default(), SimRng::seeded(seed));
    net.add_module("inp", ModuleKind::Input, 2).unwrap();
    net.add_module("hid", ModuleKind::Calm, 3).unwrap();
    net.add_module("top", ModuleKind::Calm, 2).unwrap();
    net.connect("hid", "inp", LinkMode::Immediate).unwrap();
    net.connect("top", "hid", LinkMode::Immediate).unwrap();
    net.load_patterns(PatternSet::new(vec![array![[1.0, 0.0], [0.0, 1.0]]]).unwrap())
        .unwrap();
    net
}

fn present(net: &mut Network, p: usize, iterations: usize) {
    net.reset(ResetFlags::ACT);
    net.set_input(p).unwrap();
    for t in 0..iterations {
        net.learn();
        net.collect_winners(p, t);
    }
}

#[test]
fn test_idle_units_are_pruned_down_to_two() {
    let mut net = chain(1);
    // zero potentials everywhere: the last idle unit goes
    assert!(net.resize_modules());
    assert_eq!(net.module(1).size(), 2);
    assert_eq!(net.module(1).incoming()[0].shape(), (2, 2));
    assert_eq!(net.module(2).incoming()[0].shape(), (2, 2));

    // no module drops below two units
    assert!(!net.resize_modules());
    assert_eq!(net.module(1).size(), 2);
    assert_eq!(net.module(2).size(), 2);
}

#[test]
fn test_prune_drops_the_right_column() {
    let mut net = chain(2);
    net.module_mut(2).incoming_mut()[0].set_weight(0, 0, 0.1);
    net.module_mut(2).incoming_mut()[0].set_weight(0, 1, 0.2);
    net.module_mut(2).incoming_mut()[0].set_weight(1, 0, 0.3);
    net.module_mut(2).incoming_mut()[0].set_weight(1, 1, 0.4);
    // only hid resizes: top has two units and cannot prune
    assert!(net.resize_modules());
    let w = net.module(2).incoming()[0].weight_values();
    assert_eq!(w, array![[0.1f32, 0.2], [0.3, 0.4]]);
}

#[test]
fn test_growth_keeps_existing_state() {
    let mut net = chain(3);
    net.set_parameter(Param::PS, -1.0);
    net.set_parameter(Param::PG, 0.0);
    present(&mut net, 0, 20);

    let r_before: Vec<f32> = net.module(1).r().iter().map(|r| r.current()).collect();
    let pot_before = net.module(1).potentials();
    let w_before = net.module(1).incoming()[0].weight_values();
    assert!(pot_before.iter().any(|&p| p > 0.0));

    assert!(net.resize_module(1).unwrap());
    let hid = net.module(1);
    assert_eq!(hid.size(), 4);
    for i in 0..3 {
        assert_abs_diff_eq!(hid.r()[i].current(), r_before[i]);
        assert_abs_diff_eq!(hid.potentials()[i], pot_before[i]);
    }
    assert_abs_diff_eq!(hid.r()[3].current(), 0.0);

    let w = hid.incoming()[0].weight_values();
    assert_eq!(w.dim(), (4, 2));
    assert_eq!(w.slice(ndarray::s![..3, ..]), w_before);
    let (lo, hi) = w_before
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    assert!(w.row(3).iter().all(|&v| v >= lo && v <= hi));
    assert_eq!(net.module(2).incoming()[0].shape(), (2, 4));
}

#[test]
fn test_grow_and_prune_signals_cancel() {
    let mut net = chain(4);
    // 0.6 leads the runner-up by more than P_G, and unit 1 sits below P_S
    net.module_mut(1)
        .restore_potentials(&[0.6, 0.00001, 0.25], &[10, 10, 10]);
    assert!(!net.resize_module(1).unwrap());
    assert!(!net.resize_modules());
    assert_eq!(net.module(1).size(), 3);

    // without the idle unit the same gap grows the module
    net.module_mut(1)
        .restore_potentials(&[0.6, 0.2, 0.25], &[10, 10, 10]);
    assert!(net.resize_module(1).unwrap());
    assert_eq!(net.module(1).size(), 4);
}

#[test]
fn test_map_modules_never_resize() {
    let mut net = Network::new(Parameters::default(), SimRng::seeded(1));
    net.add_module("inp", ModuleKind::Input, 2).unwrap();
    net.add_module("ring", ModuleKind::Map, 5).unwrap();
    net.connect("ring", "inp", LinkMode::Immediate).unwrap();
    assert!(!net.resize_modules());
    assert!(!net.resize_module(1).unwrap());
    assert_eq!(net.module(1).size(), 5);
}

#[test]
fn test_forced_resize() {
    let mut net = chain(5);
    net.resize_module_to(2, 5).unwrap();
    assert_eq!(net.module(2).size(), 5);
    assert_eq!(net.module(2).incoming()[0].shape(), (5, 3));
    assert!(net.resize_module_to(2, 1).is_err());
    assert!(net.resize_module_to(0, 4).is_err());
    assert_eq!(net.module(2).size(), 5);
}

#[test]
fn test_resized_network_still_runs() {
    let mut net = chain(6);
    net.resize_module_to(1, 6).unwrap();
    net.reset(ResetFlags::WIN);
    assert_eq!(net.winners().dim(), (2, 2));
    present(&mut net, 0, 30);
    present(&mut net, 1, 30);
    let topology = net.topology();
    assert_eq!(topology.modules[1].size, 6);
}

fn ten_patterns(seed: u64) -> Network {
    let mut net = Network::new(Parameters::default(), SimRng::seeded(seed));
    net.add_module("inp", ModuleKind::Input, 1).unwrap();
    net.add_module("cat", ModuleKind::Calm, 2).unwrap();
    net.connect("cat", "inp", LinkMode::Immediate).unwrap();
    net.load_patterns(PatternSet::new(vec![Array2::zeros((10, 1))]).unwrap())
        .unwrap();
    net
}

#[test]
fn test_permutation_is_bijection() {
    let mut net = ten_patterns(13);
    assert_eq!(net.permutation(), (0..10).collect::<Vec<_>>().as_slice());

    for _ in 0..5 {
        net.permute_patterns();
        let mut seen = net.permutation().to_vec();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    net.set_pattern_order(PatternOrder::Linear);
    assert_eq!(net.pattern_order(), PatternOrder::Linear);
    assert_eq!(net.permutation(), (0..10).collect::<Vec<_>>().as_slice());
}

#[test]
fn test_permutation_depends_on_seed() {
    let order = |seed| {
        let mut net = ten_patterns(seed);
        net.permute_patterns();
        net.permutation().to_vec()
    };
    assert_eq!(order(3), order(3));
    let orders: Vec<Vec<usize>> = (1..=4).map(order).collect();
    assert!(orders.iter().any(|o| *o != orders[0]));
    assert!(orders.iter().any(|o| *o != (0..10).collect::<Vec<_>>()));
}
