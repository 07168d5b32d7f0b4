//! Core CALM simulation engine.
//!
//! This module provides the building blocks of a CALM network:
//! - Saturating unit dynamics for the R, V, A and E roles
//! - Bounded weights and the Grossberg learning rule
//! - Immediate and time-delayed connections with resize-with-migration
//! - Modules with competitive R/V dynamics, convergence detection and
//!   potential-driven growth and pruning
//!
//! ## Step protocol
//!
//! A network step is synchronous. Every module first computes its new
//! activations from the committed state of the previous step, then learns,
//! and only then commits:
//! ```text
//! for m in modules: m.update_activation()   // reads *.current only
//! for m in modules: m.update_weights()
//! for m in modules: m.swap()                // new -> current
//! ```

pub mod connection;
pub mod feedback;
pub mod map;
pub mod module;
pub mod params;
pub mod unit;
pub mod weight;

pub use connection::{Afferent, Connection, LinkMode, Side};
pub use map::MapKernel;
pub use module::{Drive, Module, ResizeAction, Variant};
pub use params::{Param, Parameters};
pub use unit::{RUnit, Unit, VUnit};
pub use weight::Weight;

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;
use thiserror::Error;

/// Error type for CALM operations.
///
/// Only setup-time problems are errors. Simulation-time non-events, such as a
/// module without a winner or a refused shrink, are reported as `Option` or
/// `bool` values.
#[derive(Debug, Error)]
pub enum CalmError {
    /// A topology or API call referenced a module name that does not exist
    #[error("unknown module: {0}")]
    UnknownModule(String),
    /// Feedback was requested but the network has no feedback module
    #[error("network has no feedback module")]
    NoFeedbackModule,
    /// Feedback list length does not match the loaded pattern count
    #[error("feedback list has {found} entries, expected {expected}")]
    FeedbackCountMismatch { expected: usize, found: usize },
    /// A pattern-driven call was made before patterns were loaded
    #[error("no patterns loaded")]
    PatternsNotLoaded,
    /// Shape mismatch between supplied data and the network
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    /// A module or unit index outside the network
    #[error("{what} index {index} out of range ({len} available)")]
    InvalidIndex {
        what: &'static str,
        index: usize,
        len: usize,
    },
    /// Malformed network description
    #[error("invalid topology: {0}")]
    InvalidTopology(String),
    /// Malformed text input
    #[error("parse error at line {line}: {msg}")]
    Parse { line: usize, msg: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type CalmResult<T> = Result<T, CalmError>;

/// Composable reset selector.
///
/// ```
/// use calm::ResetFlags;
/// let flags = ResetFlags::ACT | ResetFlags::WIN;
/// assert!(flags.contains(ResetFlags::WIN));
/// assert!(!flags.contains(ResetFlags::WT));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ResetFlags(u8);

impl ResetFlags {
    pub const NONE: ResetFlags = ResetFlags(0);
    /// Clear activations and tick delayed-connection clocks
    pub const ACT: ResetFlags = ResetFlags(1);
    /// Reinitialize weights and R-unit potentials
    pub const WT: ResetFlags = ResetFlags(2);
    /// Clear winners and convergence times
    pub const WIN: ResetFlags = ResetFlags(4);
    /// Restart time-delay bookkeeping
    pub const TIME: ResetFlags = ResetFlags(8);
    pub const ALL: ResetFlags = ResetFlags(15);

    pub fn contains(self, other: ResetFlags) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn from_bits(bits: u8) -> Self {
        ResetFlags(bits & Self::ALL.0)
    }
}

impl BitOr for ResetFlags {
    type Output = ResetFlags;

    fn bitor(self, rhs: ResetFlags) -> ResetFlags {
        ResetFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for ResetFlags {
    fn bitor_assign(&mut self, rhs: ResetFlags) {
        self.0 |= rhs.0;
    }
}

/// Module role as it appears in a network description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    Input,
    Calm,
    Map,
    Feedback,
}

impl ModuleKind {
    /// Token used in `.net` files.
    pub fn name(self) -> &'static str {
        match self {
            ModuleKind::Input => "input",
            ModuleKind::Calm => "calm",
            ModuleKind::Map => "map",
            ModuleKind::Feedback => "fb",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModuleKind {
    type Err = CalmError;

    fn from_str(s: &str) -> CalmResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "input" | "inp" => Ok(ModuleKind::Input),
            "calm" => Ok(ModuleKind::Calm),
            "map" => Ok(ModuleKind::Map),
            "fb" | "feedback" => Ok(ModuleKind::Feedback),
            other => Err(CalmError::InvalidTopology(format!(
                "unknown module type '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_flags_compose() {
        let mut flags = ResetFlags::ACT;
        flags |= ResetFlags::TIME;
        assert!(flags.contains(ResetFlags::ACT));
        assert!(flags.contains(ResetFlags::TIME));
        assert!(!flags.contains(ResetFlags::WT));
        assert!(!flags.contains(ResetFlags::NONE));
        assert_eq!(flags.bits(), 9);
        assert_eq!(ResetFlags::from_bits(0xff), ResetFlags::ALL);
    }

    #[test]
    fn test_module_kind_tokens() {
        for kind in [
            ModuleKind::Input,
            ModuleKind::Calm,
            ModuleKind::Map,
            ModuleKind::Feedback,
        ] {
            assert_eq!(kind.name().parse::<ModuleKind>().unwrap(), kind);
        }
        assert_eq!("CALM".parse::<ModuleKind>().unwrap(), ModuleKind::Calm);
        assert!("sigmoid".parse::<ModuleKind>().is_err());
    }

    #[test]
    fn test_error_messages() {
        let err = CalmError::FeedbackCountMismatch {
            expected: 4,
            found: 3,
        };
        assert_eq!(err.to_string(), "feedback list has 3 entries, expected 4");
        let err = CalmError::UnknownModule("cat".into());
        assert_eq!(err.to_string(), "unknown module: cat");
    }
}
