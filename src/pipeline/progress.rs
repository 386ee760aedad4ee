//! Progress fractions for the event stream

/// Run initialized
pub const PROGRESS_INIT: f64 = 0.1;

/// Invoice parsed
pub const PROGRESS_PARSED: f64 = 0.4;

/// Validation finished
pub const PROGRESS_VALIDATED: f64 = 0.7;

/// Report text ready, about to persist
pub const PROGRESS_SAVING: f64 = 0.9;

/// Report persisted
pub const PROGRESS_DONE: f64 = 1.0;

/// Half-open `[start, end)` range a stage's sub-steps are spread across
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressBand {
    pub start: f64,
    pub end: f64,
}

impl ProgressBand {
    pub const PARSE: ProgressBand = ProgressBand::new(0.2, 0.4);
    pub const VALIDATE: ProgressBand = ProgressBand::new(0.5, 0.7);
    pub const REPORT: ProgressBand = ProgressBand::new(0.8, 0.9);

    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Position of step `index` out of `count`, strictly below `end`
    pub fn at(&self, index: usize, count: usize) -> f64 {
        if count == 0 {
            return self.start;
        }
        let index = index.min(count - 1);
        self.start + (self.end - self.start) * (index as f64 / count as f64)
    }
}

/// Never lets reported progress move backwards
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressTracker {
    current: f64,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move to `value` unless that would go backwards; returns the value to report
    pub fn advance(&mut self, value: f64) -> f64 {
        let clamped = value.clamp(0.0, 1.0);
        if clamped > self.current {
            self.current = clamped;
        }
        self.current
    }

    pub fn current(&self) -> f64 {
        self.current
    }
}
