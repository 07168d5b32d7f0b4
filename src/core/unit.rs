//! Activation-bearing units.
//!
//! Every role shares [`Unit::update`]; the roles differ only in how the
//! module computes their net input. A and E are plain [`Unit`]s.

use crate::utils::saturating_update;

/// Committed and proposed activation of one node.
///
/// `current` only advances through [`Unit::swap`], which keeps a network
/// step synchronous.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Unit {
    pub current: f32,
    pub new: f32,
}

impl Unit {
    /// Propose a new activation from net input `x` with decay `k_a`.
    #[inline]
    pub fn update(&mut self, x: f32, k_a: f32) {
        self.new = saturating_update(self.current, x, k_a);
    }

    #[inline]
    pub fn swap(&mut self) {
        self.current = self.new;
    }

    #[inline]
    pub fn reset(&mut self) {
        self.current = 0.0;
        self.new = 0.0;
    }
}

/// Representation unit.
///
/// Besides its activation it keeps the copy read by delayed connections and
/// a long-run potential used for growth and pruning decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RUnit {
    pub act: Unit,
    pub delay: f32,
    pub potential: f32,
    pub count: u32,
    clamped: bool,
}

impl RUnit {
    #[inline]
    pub fn current(&self) -> f32 {
        self.act.current
    }

    #[inline]
    pub fn is_clamped(&self) -> bool {
        self.clamped
    }

    /// Fix the activation (current, new and delayed) at `value`.
    pub fn clamp(&mut self, value: f32) {
        self.clamped = true;
        self.act.current = value;
        self.act.new = value;
        self.delay = value;
    }

    pub fn unclamp(&mut self) {
        self.clamped = false;
    }

    #[inline]
    pub fn update(&mut self, x: f32, k_a: f32) {
        if !self.clamped {
            self.act.update(x, k_a);
        }
    }

    #[inline]
    pub fn swap(&mut self) {
        if !self.clamped {
            self.act.swap();
        }
    }

    /// Fold the proposed activation, gated by `gain`, into the running
    /// average `potential`.
    pub fn accumulate_potential(&mut self, gain: f32) {
        let n = self.count as f32;
        self.potential = (self.potential * n + self.act.new * gain) / (n + 1.0);
        self.count += 1;
    }

    pub fn reset_potential(&mut self) {
        self.potential = 0.0;
        self.count = 0;
    }

    /// Start a new presentation: remember the last activation for delayed
    /// links, then clear.
    pub fn reset_activation(&mut self) {
        if self.clamped {
            return;
        }
        self.delay = self.act.current;
        self.act.reset();
    }

    /// Forget the delayed copy along with the activation.
    pub fn reset_time(&mut self) {
        if self.clamped {
            return;
        }
        self.delay = 0.0;
        self.act.reset();
    }

    /// Zero the activation and delayed copy of an input unit.
    pub fn reset_input(&mut self) {
        if self.clamped {
            return;
        }
        self.delay = 0.0;
        self.act.current = 0.0;
    }

    /// Copy the committed activation into the delayed slot.
    pub fn update_time_delay(&mut self) {
        if !self.clamped {
            self.delay = self.act.current;
        }
    }

    /// Present an external input: the previous value becomes the delayed
    /// copy.
    pub fn set_input(&mut self, value: f32) {
        if self.clamped {
            return;
        }
        self.delay = self.act.current;
        self.act.current = value;
    }
}

/// Veto unit paired 1:1 with an [`RUnit`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VUnit {
    pub act: Unit,
    clamped: bool,
}

impl VUnit {
    #[inline]
    pub fn current(&self) -> f32 {
        self.act.current
    }

    #[inline]
    pub fn is_clamped(&self) -> bool {
        self.clamped
    }

    pub fn clamp(&mut self, value: f32) {
        self.clamped = true;
        self.act.current = value;
        self.act.new = value;
    }

    pub fn unclamp(&mut self) {
        self.clamped = false;
    }

    #[inline]
    pub fn update(&mut self, x: f32, k_a: f32) {
        if !self.clamped {
            self.act.update(x, k_a);
        }
    }

    #[inline]
    pub fn swap(&mut self) {
        if !self.clamped {
            self.act.swap();
        }
    }

    pub fn reset(&mut self) {
        if !self.clamped {
            self.act.reset();
        }
    }
}
