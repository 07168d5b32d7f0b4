//! Bounded connection weight.

use serde::{Deserialize, Serialize};

/// A single connection strength with the last applied change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Weight {
    value: f32,
    change: f32,
    clamped: bool,
}

impl Weight {
    pub fn new(value: f32) -> Self {
        Self {
            value,
            change: 0.0,
            clamped: false,
        }
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Delta recorded by the last [`Weight::apply`].
    #[inline]
    pub fn change(&self) -> f32 {
        self.change
    }

    #[inline]
    pub fn is_clamped(&self) -> bool {
        self.clamped
    }

    /// Record `dw` and move the value by it, clamped to `[min, max]`.
    /// A clamped weight records the delta but keeps its value.
    #[inline]
    pub fn apply(&mut self, dw: f32, min: f32, max: f32) {
        self.change = dw;
        if !self.clamped {
            self.value = (self.value + dw).min(max).max(min);
        }
    }

    /// Overwrite the value directly, as when restoring saved weights.
    pub fn set(&mut self, value: f32) {
        self.value = value;
    }

    /// Reinitialize to `value` and forget the last change.
    pub fn reset(&mut self, value: f32) {
        self.value = value;
        self.change = 0.0;
    }

    pub fn clamp(&mut self) {
        self.clamped = true;
    }

    pub fn unclamp(&mut self) {
        self.clamped = false;
    }
}
