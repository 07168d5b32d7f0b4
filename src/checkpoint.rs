//! Weight persistence.
//!
//! Two forms are supported:
//!
//! - A human-readable weight dump: for every processing module and every
//!   incoming connection, a `# <to> <- <from>` header followed by one row of
//!   weights per target unit. Restoring requires a network of identical
//!   topology; only the total number of weights is checked.
//! - A JSON checkpoint bundling the network description, parameters and
//!   weights, from which a complete network can be rebuilt.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use crate::core::{CalmError, CalmResult, Parameters};
use crate::data::Topology;
use crate::network::Network;
use crate::rng::SimRng;

/// Write every incoming weight matrix of every processing module.
pub fn write_weights<W: Write>(net: &Network, out: &mut W) -> CalmResult<()> {
    for m in &net.modules()[net.num_inputs()..] {
        for c in m.incoming() {
            writeln!(out, "# {} <- {}", m.name(), net.module(c.source()).name())?;
            for row in c.weights().rows() {
                let line: Vec<String> = row.iter().map(|w| w.value().to_string()).collect();
                writeln!(out, "{}", line.join(" "))?;
            }
        }
    }
    Ok(())
}

pub fn save_weights(net: &Network, path: &Path) -> CalmResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    write_weights(net, &mut file)?;
    file.flush()?;
    Ok(())
}

/// Restore weights from dump text. Lines that are blank or start with `#`,
/// `S` or `T` are headers and are skipped.
///
/// # Errors
///
/// `Parse` on a non-numeric value, `ShapeMismatch` if the number of values
/// differs from the number of weights in `net`. `net` is unchanged on error.
pub fn read_weights(net: &mut Network, text: &str) -> CalmResult<()> {
    let mut values = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim_start();
        if line.is_empty() || line.starts_with(['#', 'S', 'T']) {
            continue;
        }
        for tok in line.split_whitespace() {
            let v: f32 = tok.parse().map_err(|_| CalmError::Parse {
                line: n + 1,
                msg: format!("expected weight, found '{tok}'"),
            })?;
            values.push(v);
        }
    }

    let expected: usize = net.modules()[net.num_inputs()..]
        .iter()
        .flat_map(|m| m.incoming())
        .map(|c| c.shape().0 * c.shape().1)
        .sum();
    if values.len() != expected {
        return Err(CalmError::ShapeMismatch(format!(
            "weight dump holds {} values, network has {expected} weights",
            values.len()
        )));
    }

    let mut it = values.into_iter();
    for idx in net.num_inputs()..net.num_modules() {
        for c in net.module_mut(idx).incoming_mut() {
            let (rows, cols) = c.shape();
            for i in 0..rows {
                for j in 0..cols {
                    if let Some(v) = it.next() {
                        c.set_weight(i, j, v);
                    }
                }
            }
        }
    }
    Ok(())
}

pub fn load_weights(net: &mut Network, path: &Path) -> CalmResult<()> {
    read_weights(net, &std::fs::read_to_string(path)?)
}

/// Serializable network snapshot.
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckpointData {
    /// Network description in `.net` form, with live module sizes.
    pub topology: String,
    pub params: Parameters,
    /// Weight matrices of every connection, in module then connection order.
    pub weights: Vec<Vec<Vec<f32>>>,
    /// Epoch at which this checkpoint was saved.
    pub epoch: usize,
    /// R-unit potentials per module, so resizing picks up where it stopped.
    #[serde(default)]
    pub potentials: Vec<Vec<f32>>,
    #[serde(default)]
    pub potential_counts: Vec<Vec<u32>>,
}

fn array2_to_vecs(arr: &Array2<f32>) -> Vec<Vec<f32>> {
    arr.rows().into_iter().map(|row| row.to_vec()).collect()
}

/// Save a JSON checkpoint of `net`.
pub fn save_checkpoint(net: &Network, path: &Path, epoch: usize) -> CalmResult<()> {
    let weights = net
        .modules()
        .iter()
        .flat_map(|m| m.incoming())
        .map(|c| array2_to_vecs(&c.weight_values()))
        .collect();
    let data = CheckpointData {
        topology: net.topology().to_string(),
        params: net.params().clone(),
        weights,
        epoch,
        potentials: net.modules().iter().map(|m| m.potentials()).collect(),
        potential_counts: net.modules().iter().map(|m| m.potential_counts()).collect(),
    };
    let json = serde_json::to_string_pretty(&data)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json)?;
    Ok(())
}

/// Rebuild a network from a JSON checkpoint.
///
/// # Errors
///
/// Fails if the file cannot be read or parsed, or if the stored weights do
/// not fit the stored topology.
pub fn load_checkpoint(path: &Path, rng: SimRng) -> CalmResult<(CheckpointData, Network)> {
    let json = std::fs::read_to_string(path)?;
    let data: CheckpointData = serde_json::from_str(&json)?;
    let topology: Topology = data.topology.parse()?;
    let mut net = Network::from_topology(&topology, data.params.clone(), rng)?;

    let mut stored = data.weights.iter();
    for idx in 0..net.num_modules() {
        for c in net.module_mut(idx).incoming_mut() {
            let matrix = stored.next().ok_or_else(|| {
                CalmError::ShapeMismatch("checkpoint holds too few weight matrices".into())
            })?;
            let (rows, cols) = c.shape();
            if matrix.len() != rows || matrix.iter().any(|r| r.len() != cols) {
                return Err(CalmError::ShapeMismatch(format!(
                    "stored matrix does not match connection of shape {rows}x{cols}"
                )));
            }
            for (i, row) in matrix.iter().enumerate() {
                for (j, &v) in row.iter().enumerate() {
                    c.set_weight(i, j, v);
                }
            }
        }
    }
    if stored.next().is_some() {
        return Err(CalmError::ShapeMismatch(
            "checkpoint holds more weight matrices than connections".into(),
        ));
    }
    for (idx, (p, n)) in data
        .potentials
        .iter()
        .zip(&data.potential_counts)
        .enumerate()
        .take(net.num_modules())
    {
        net.module_mut(idx).restore_potentials(p, n);
    }
    Ok((data, net))
}
