//! Sinks for per-pattern simulation traces.
//!
//! The simulator reports scalar series (weight-change sum, total activation,
//! mean learning rate) and optional weight snapshots to a [`Recorder`]. A
//! failing sink never stops a simulation: errors are logged and dropped.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::warn;

use crate::core::CalmResult;

pub trait Recorder {
    /// One value of a named series at `(epoch, pattern)`.
    fn record_scalar(&mut self, name: &str, epoch: usize, pattern: usize, value: f32);

    /// Snapshot of one weight matrix `to <- from`, given row by row.
    fn record_weights(&mut self, epoch: usize, to: &str, from: &str, rows: &[Vec<f32>]);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRecorder;

impl Recorder for NullRecorder {
    fn record_scalar(&mut self, _name: &str, _epoch: usize, _pattern: usize, _value: f32) {}

    fn record_weights(&mut self, _epoch: usize, _to: &str, _from: &str, _rows: &[Vec<f32>]) {}
}

/// Appends one JSON object per event to a file.
pub struct JsonlRecorder {
    out: BufWriter<File>,
}

impl JsonlRecorder {
    /// Open `path` for appending, creating parent directories as needed.
    pub fn open(path: &Path) -> CalmResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }

    fn emit(&mut self, event: serde_json::Value) {
        if let Err(e) = writeln!(self.out, "{event}") {
            warn!(error = %e, "failed to write metrics event");
        }
    }
}

impl Recorder for JsonlRecorder {
    fn record_scalar(&mut self, name: &str, epoch: usize, pattern: usize, value: f32) {
        self.emit(serde_json::json!({
            "type": name,
            "epoch": epoch,
            "pattern": pattern,
            "value": value,
        }));
    }

    fn record_weights(&mut self, epoch: usize, to: &str, from: &str, rows: &[Vec<f32>]) {
        self.emit(serde_json::json!({
            "type": "weights",
            "epoch": epoch,
            "to": to,
            "from": from,
            "rows": rows,
        }));
    }
}

impl Drop for JsonlRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.out.flush() {
            warn!(error = %e, "failed to flush metrics file");
        }
    }
}

/// Keeps every scalar in memory; handy in tests and for summaries.
#[derive(Debug, Default, Clone)]
pub struct MemoryRecorder {
    pub scalars: Vec<(String, usize, usize, f32)>,
    pub snapshots: usize,
}

impl MemoryRecorder {
    /// Values of one series, in recording order.
    pub fn series(&self, name: &str) -> Vec<f32> {
        self.scalars
            .iter()
            .filter(|(n, ..)| n == name)
            .map(|&(_, _, _, v)| v)
            .collect()
    }
}

impl Recorder for MemoryRecorder {
    fn record_scalar(&mut self, name: &str, epoch: usize, pattern: usize, value: f32) {
        self.scalars.push((name.to_string(), epoch, pattern, value));
    }

    fn record_weights(&mut self, _epoch: usize, _to: &str, _from: &str, _rows: &[Vec<f32>]) {
        self.snapshots += 1;
    }
}
