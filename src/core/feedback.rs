//! Supervisory signal for feedback modules.
//!
//! While a target category is set, the module's R and V units receive a
//! fixed push toward that node (`+ER * F_Ba`) and away from every other node
//! (`-ER * F_Ba`) in place of E-unit noise, and the module's own learning
//! rate is divided by `F_Bw`. Connections leaving the module learn `F_Bw`
//! times faster in turn (see [`Connection::learn`](super::Connection::learn)).

use super::params::{Param, Parameters};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedbackSignal {
    target: Option<usize>,
}

impl FeedbackSignal {
    #[inline]
    pub fn target(&self) -> Option<usize> {
        self.target
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.target.is_some()
    }

    pub fn set(&mut self, target: Option<usize>) {
        self.target = target;
    }

    /// Bias into unit `i`, if a target is set.
    #[inline]
    pub fn bias(&self, i: usize, params: &Parameters) -> Option<f32> {
        let push = params[Param::Er] * params[Param::FBa];
        self.target.map(|t| if i == t { push } else { -push })
    }

    /// The module's own learning rate under the current signal.
    #[inline]
    pub fn scale_learning_rate(&self, mu: f32, params: &Parameters) -> f32 {
        if self.is_active() {
            mu / params[Param::FBw]
        } else {
            mu
        }
    }
}
