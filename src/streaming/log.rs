//! Per-run cumulative log
//!
//! Lines are stamped `[HH:MM:SS]` in local time and only ever appended, so the
//! text returned by each `append` is a prefix of every later one.

use chrono::Local;

#[derive(Debug, Clone, Default)]
pub struct RunLog {
    lines: Vec<String>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a timestamped line and return the full log text
    pub fn append(&mut self, message: impl AsRef<str>) -> String {
        let stamp = Local::now().format("%H:%M:%S");
        self.lines.push(format!("[{}] {}", stamp, message.as_ref()));
        self.text()
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
