//! CALM simulation runner.
//!
//! Builds a network from a `.net` description, trains it on a pattern file
//! for a number of epochs, then tests every pattern in file order and prints
//! the winner table and the committed-node report. Per-pattern traces can be
//! written as JSONL.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::{fmt, EnvFilter};

use calm::checkpoint::{load_checkpoint, load_weights, save_checkpoint, save_weights};
use calm::data::{load_feedback, load_parameters, load_patterns, load_topology};
use calm::{
    CalmResult, Config, JsonlRecorder, ModuleKind, Network, PatternOrder, RecordFlags,
    ResetFlags, Simulator,
};

#[derive(Parser, Debug)]
#[command(name = "calm", about = "Train and test a modular CALM network")]
struct Args {
    /// Network description (.net)
    #[arg(long)]
    net: PathBuf,

    /// Pattern file (.pat)
    #[arg(long)]
    pat: PathBuf,

    /// Parameter file (.par); canonical defaults if omitted
    #[arg(long)]
    par: Option<PathBuf>,

    /// Feedback file (.fb) for the feedback module
    #[arg(long)]
    fb: Option<PathBuf>,

    #[arg(long, default_value_t = 1)]
    runs: usize,

    #[arg(long, default_value_t = 50)]
    epochs: usize,

    /// Steps per pattern presentation
    #[arg(long, default_value_t = 100)]
    iterations: usize,

    /// Present patterns in file order instead of reshuffling each epoch
    #[arg(long, default_value_t = false)]
    linear: bool,

    /// Stop a presentation once every module has a winner
    #[arg(long, default_value_t = false)]
    conv_stop: bool,

    #[arg(long)]
    seed: Option<u64>,

    /// Let modules grow or prune after every N-th epoch
    #[arg(long)]
    resize_every: Option<usize>,

    /// Start from a weight dump instead of INITWT
    #[arg(long)]
    weights_in: Option<PathBuf>,

    /// Write the final weights as a text dump
    #[arg(long)]
    weights_out: Option<PathBuf>,

    /// Resume from a JSON checkpoint (overrides --net and --par)
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Write a JSON checkpoint after each run
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Write the network description, with the sizes reached, after each run
    #[arg(long)]
    net_out: Option<PathBuf>,

    /// Per-pattern trace file (JSONL)
    #[arg(long)]
    metrics_file: Option<PathBuf>,

    /// Record summed weight change per pattern
    #[arg(long, default_value_t = false)]
    record_wt: bool,

    /// Record total activation per pattern
    #[arg(long, default_value_t = false)]
    record_act: bool,

    /// Record mean learning rate per pattern
    #[arg(long, default_value_t = false)]
    record_mu: bool,

    /// Record weight matrices after every epoch
    #[arg(long, default_value_t = false)]
    record_weights: bool,
}

impl Args {
    fn config(&self) -> Config {
        Config {
            runs: self.runs,
            epochs: self.epochs,
            iterations: self.iterations,
            order: if self.linear {
                PatternOrder::Linear
            } else {
                PatternOrder::Permuted
            },
            conv_stop: self.conv_stop,
            seed: self.seed,
            record: RecordFlags {
                wt_change: self.record_wt,
                activation: self.record_act,
                learning_rate: self.record_mu,
                weights: self.record_weights,
            },
            resize_every: self.resize_every,
        }
    }
}

fn main() {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn build_network(args: &Args, config: &Config, run: usize) -> CalmResult<Network> {
    let rng = config.rng_for_run(run);
    let mut net = match &args.resume {
        Some(path) => {
            let (data, net) = load_checkpoint(path, rng)?;
            eprintln!("Resumed from {} (epoch {})", path.display(), data.epoch);
            net
        }
        None => {
            let topology = load_topology(&args.net)?;
            let params = match &args.par {
                Some(p) => load_parameters(p)?,
                None => Default::default(),
            };
            Network::from_topology(&topology, params, rng)?
        }
    };

    let widths: Vec<usize> = net.modules()[..net.num_inputs()]
        .iter()
        .map(|m| m.size())
        .collect();
    net.load_patterns(load_patterns(&args.pat, &widths)?)?;
    if let Some(fb) = &args.fb {
        net.load_feedback(load_feedback(fb)?)?;
    }
    net.set_pattern_order(config.order);
    if let Some(w) = &args.weights_in {
        load_weights(&mut net, w)?;
    }
    Ok(net)
}

fn run(args: &Args) -> CalmResult<()> {
    let config = args.config();
    eprintln!(
        "runs={} epochs={} iterations={} order={:?} conv_stop={}",
        config.runs, config.epochs, config.iterations, config.order, config.conv_stop
    );

    for run in 0..config.runs {
        let net = build_network(args, &config, run)?;
        if run == 0 {
            let kinds: Vec<String> = net
                .modules()
                .iter()
                .map(|m| format!("{}:{}({})", m.name(), m.kind(), m.size()))
                .collect();
            eprintln!("Network: {}", kinds.join(" "));
            eprintln!("Patterns: {}", net.num_patterns());
        }

        let mut sim = Simulator::new(net, config.clone());
        if let Some(path) = &args.metrics_file {
            sim = sim.with_recorder(Box::new(JsonlRecorder::open(path)?));
        }
        sim.network_mut().reset(ResetFlags::TIME | ResetFlags::WIN);

        println!("\nRUN {run}");
        let start = Instant::now();
        let summaries = sim.run_epochs()?;
        for s in &summaries {
            eprintln!(
                "Epoch {:>4} | dW: {:>10.5} | converged: {}/{} | committed: {:?}{}",
                s.epoch,
                s.wt_change,
                s.converged,
                sim.network().num_patterns(),
                s.committed,
                if s.resized { " | resized" } else { "" }
            );
        }

        sim.network_mut().reset(ResetFlags::TIME | ResetFlags::WIN);
        let converged = sim.test_file_linear()?;
        let net = sim.network();
        println!("\nTESTING ({converged}/{} converged)", net.num_patterns());
        print!("{}", net.winner_table());
        println!("\nCOMMITTED");
        for c in net.committed() {
            println!("{c}");
        }
        let sizes: Vec<String> = net
            .modules()
            .iter()
            .filter(|m| m.kind() != ModuleKind::Input)
            .map(|m| format!("{}: {}", m.name(), m.size()))
            .collect();
        println!("\nSIZES\n{}", sizes.join("\n"));
        eprintln!("Run {run} took {:.2?}", start.elapsed());

        if let Some(path) = &args.weights_out {
            save_weights(net, &per_run(path, run, config.runs))?;
        }
        if let Some(path) = &args.checkpoint {
            save_checkpoint(net, &per_run(path, run, config.runs), config.epochs)?;
        }
        if let Some(path) = &args.net_out {
            net.topology().save(&per_run(path, run, config.runs))?;
        }
    }
    Ok(())
}

/// `path` itself for a single run, `stem_<run>.ext` otherwise.
fn per_run(path: &Path, run: usize, runs: usize) -> PathBuf {
    if runs <= 1 {
        return path.to_path_buf();
    }
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("out");
    let name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_{run}.{ext}"),
        None => format!("{stem}_{run}"),
    };
    path.with_file_name(name)
}
