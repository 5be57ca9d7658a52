//! Adaptive block-window sizing for chunked log queries.
//!
//! Grows the window by 25% after every accepted query and halves it
//! when the provider rejects a window as too large. The step always
//! stays inside `[min_step, max_step]`.

use serde::Deserialize;

/// Growth factor applied after a successful window, as a ratio.
const GROWTH_NUM: u64 = 5;
const GROWTH_DEN: u64 = 4;

/// Window sizing bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct StepBounds {
    pub initial: u64,
    pub min: u64,
    pub max: u64,
}

impl Default for StepBounds {
    fn default() -> Self {
        Self {
            initial: 2000,
            min: 25,
            max: 10_000,
        }
    }
}

impl StepBounds {
    /// Whether `1 <= min <= initial <= max`.
    pub const fn is_valid(&self) -> bool {
        self.min >= 1 && self.min <= self.initial && self.initial <= self.max
    }
}

/// Current window size for a chunked scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepController {
    step: u64,
    bounds: StepBounds,
}

impl StepController {
    /// Start at `bounds.initial`, clamped into `[min, max]`.
    pub fn new(bounds: StepBounds) -> Self {
        let min = bounds.min.max(1);
        let max = bounds.max.max(min);
        let bounds = StepBounds {
            initial: bounds.initial.clamp(min, max),
            min,
            max,
        };
        Self {
            step: bounds.initial,
            bounds,
        }
    }

    pub const fn step(&self) -> u64 {
        self.step
    }

    /// Inclusive window starting at `start`, capped at `to_block`.
    pub fn window(&self, start: u64, to_block: u64) -> (u64, u64) {
        let end = start.saturating_add(self.step - 1).min(to_block);
        (start, end)
    }

    /// Grow by 25% after an accepted window, capped at `max`.
    pub fn grow(&mut self) {
        let grown = self.step.saturating_mul(GROWTH_NUM) / GROWTH_DEN;
        self.step = grown.max(self.step + 1).min(self.bounds.max);
    }

    /// Halve after a rejected window, floored at `min`.
    ///
    /// Returns `false` when the step was already at the floor.
    pub fn shrink(&mut self) -> bool {
        let before = self.step;
        self.step = (self.step / 2).max(self.bounds.min);
        self.step < before
    }
}
