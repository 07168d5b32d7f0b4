//! Pattern sets and the small numeric file formats.
//!
//! - `.pat`: the pattern count, then for each input module in network
//!   order a `count x size` block of activations.
//! - `.fb`: the pattern count, then one category per pattern (`-1` for
//!   none).
//! - `.par`: the 27 parameters in [`Param`](crate::core::Param) order.

use ndarray::{Array2, ArrayView1};
use std::path::Path;

use super::Tokens;
use crate::core::{CalmError, CalmResult, Param, Parameters};

/// One `num_patterns x width` matrix per input module.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternSet {
    blocks: Vec<Array2<f32>>,
}

impl PatternSet {
    /// # Errors
    ///
    /// `ShapeMismatch` if the blocks disagree on the number of patterns.
    pub fn new(blocks: Vec<Array2<f32>>) -> CalmResult<Self> {
        if let Some(first) = blocks.first() {
            let n = first.nrows();
            if let Some(bad) = blocks.iter().find(|b| b.nrows() != n) {
                return Err(CalmError::ShapeMismatch(format!(
                    "pattern blocks hold {} and {} patterns",
                    n,
                    bad.nrows()
                )));
            }
        }
        Ok(Self { blocks })
    }

    /// `num_patterns` all-zero patterns for modules of the given widths.
    pub fn zeros(num_patterns: usize, widths: &[usize]) -> Self {
        Self {
            blocks: widths
                .iter()
                .map(|&w| Array2::zeros((num_patterns, w)))
                .collect(),
        }
    }

    /// Parse `.pat` text for input modules of the given widths.
    pub fn parse(text: &str, widths: &[usize]) -> CalmResult<Self> {
        let mut t = Tokens::new(text);
        let n: usize = t.parse("number of patterns")?;
        let mut blocks = Vec::with_capacity(widths.len());
        for &w in widths {
            let mut values = Vec::with_capacity(n * w);
            for _ in 0..n * w {
                values.push(t.parse::<f32>("pattern value")?);
            }
            let block = Array2::from_shape_vec((n, w), values)
                .map_err(|e| CalmError::ShapeMismatch(e.to_string()))?;
            blocks.push(block);
        }
        Self::new(blocks)
    }

    pub fn num_patterns(&self) -> usize {
        self.blocks.first().map_or(0, Array2::nrows)
    }

    pub fn num_modules(&self) -> usize {
        self.blocks.len()
    }

    /// Number of values per pattern for input module `m`.
    pub fn width(&self, m: usize) -> usize {
        self.blocks[m].ncols()
    }

    pub fn pattern(&self, m: usize, p: usize) -> ArrayView1<'_, f32> {
        self.blocks[m].row(p)
    }

    pub fn block(&self, m: usize) -> &Array2<f32> {
        &self.blocks[m]
    }
}

/// Read a `.pat` file for input modules of the given widths.
pub fn load_patterns(path: &Path, widths: &[usize]) -> CalmResult<PatternSet> {
    PatternSet::parse(&std::fs::read_to_string(path)?, widths)
}

/// Parse `.fb` text into one optional category per pattern.
pub fn parse_feedback(text: &str) -> CalmResult<Vec<Option<usize>>> {
    let mut t = Tokens::new(text);
    let n: usize = t.parse("number of patterns")?;
    (0..n)
        .map(|_| {
            let v: i64 = t.parse("feedback category")?;
            Ok(usize::try_from(v).ok())
        })
        .collect()
}

pub fn load_feedback(path: &Path) -> CalmResult<Vec<Option<usize>>> {
    parse_feedback(&std::fs::read_to_string(path)?)
}

/// Parse `.par` text.
pub fn parse_parameters(text: &str) -> CalmResult<Parameters> {
    let mut t = Tokens::new(text);
    let mut params = Parameters::default();
    for p in Param::ALL {
        params.set(p, t.parse(p.name())?);
    }
    Ok(params)
}

pub fn load_parameters(path: &Path) -> CalmResult<Parameters> {
    parse_parameters(&std::fs::read_to_string(path)?)
}
