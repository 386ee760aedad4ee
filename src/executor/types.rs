//! Task executor types
//!
//! Inputs, outputs and progress steps exchanged between the orchestrator and
//! a stage executor. Executors only return values; they never touch
//! orchestrator state.

use crate::errors::{PipelineError, Result};
use crate::types::ParsedInvoice;
use crate::validation::ComplianceReport;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Most sub-progress steps kept from one executor call
pub const MAX_STEP_UPDATES: usize = 32;

/// Default preview length for step output
pub const DEFAULT_PREVIEW_CHARS: usize = 100;

/// Default per-stage timeout
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(300);

/// Pipeline stage, bound to exactly one executor invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Parse,
    Validate,
    Report,
}

impl Stage {
    pub fn display_name(&self) -> &'static str {
        match self {
            Stage::Parse => "Parse",
            Stage::Validate => "Validate",
            Stage::Report => "Report",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// One sub-progress step reported by an executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepUpdate {
    pub description: String,
    pub output_preview: Option<String>,
}

impl StepUpdate {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            output_preview: None,
        }
    }

    /// Attach step output, truncated to `preview_chars` characters
    pub fn with_output(mut self, output: &str, preview_chars: usize) -> Self {
        self.output_preview = Some(truncate_preview(output, preview_chars));
        self
    }
}

/// Truncate on a character boundary, marking the cut with `...`
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    let flattened: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() <= max_chars {
        return flattened;
    }
    let mut cut: String = flattened.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}

/// Bounded, append-only list of steps for one executor call
#[derive(Debug, Clone)]
pub struct StepTrace {
    steps: Vec<StepUpdate>,
    preview_chars: usize,
}

impl StepTrace {
    pub fn new(preview_chars: usize) -> Self {
        Self {
            steps: Vec::new(),
            preview_chars,
        }
    }

    /// Record a step; ignored once `MAX_STEP_UPDATES` is reached
    pub fn step(&mut self, description: impl Into<String>) {
        self.push(StepUpdate::new(description));
    }

    /// Record a step with an output preview
    pub fn step_with_output(&mut self, description: impl Into<String>, output: &str) {
        let update = StepUpdate::new(description).with_output(output, self.preview_chars);
        self.push(update);
    }

    fn push(&mut self, update: StepUpdate) {
        if self.steps.len() < MAX_STEP_UPDATES {
            self.steps.push(update);
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn into_steps(self) -> Vec<StepUpdate> {
        self.steps
    }
}

/// Explicit per-run context handed to every executor call
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub run_id: Uuid,
    pub stage_timeout: Duration,
    pub preview_chars: usize,
}

impl Default for TaskContext {
    fn default() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }
}

impl TaskContext {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            ..Default::default()
        }
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn with_preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = chars;
        self
    }

    /// Fresh step trace using this run's preview length
    pub fn trace(&self) -> StepTrace {
        StepTrace::new(self.preview_chars)
    }
}

/// Result of the Validate stage
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    /// Deterministic rule engine output; always present
    pub report: ComplianceReport,

    /// Optional narrative from a reasoning collaborator
    pub analysis: Option<String>,
}

impl ValidationOutcome {
    pub fn new(report: ComplianceReport) -> Self {
        Self {
            report,
            analysis: None,
        }
    }

    pub fn with_analysis(mut self, analysis: impl Into<String>) -> Self {
        self.analysis = Some(analysis.into());
        self
    }
}

/// Per-stage executor input
#[derive(Debug, Clone)]
pub enum TaskInput {
    Parse {
        raw: String,
    },
    Validate {
        invoice: Arc<ParsedInvoice>,
    },
    /// `validation` is `None` on the low-confidence branch
    Report {
        invoice: Arc<ParsedInvoice>,
        validation: Option<ValidationOutcome>,
    },
}

impl TaskInput {
    pub fn stage(&self) -> Stage {
        match self {
            TaskInput::Parse { .. } => Stage::Parse,
            TaskInput::Validate { .. } => Stage::Validate,
            TaskInput::Report { .. } => Stage::Report,
        }
    }
}

/// Parse stage output: up to two candidate results
#[derive(Debug, Clone, Default)]
pub struct ParseOutput {
    /// Raw invoice mapping, preferred when present
    pub json: Option<Value>,

    /// Pre-typed result, used only when `json` is absent or unusable
    pub structured: Option<ParsedInvoice>,

    /// Executor-derived confidence overriding the payload's own
    pub confidence: Option<u8>,
}

impl ParseOutput {
    pub fn from_json(json: Value) -> Self {
        Self {
            json: Some(json),
            ..Default::default()
        }
    }

    pub fn from_structured(invoice: ParsedInvoice) -> Self {
        Self {
            structured: Some(invoice),
            ..Default::default()
        }
    }

    pub fn with_confidence(mut self, confidence: u8) -> Self {
        self.confidence = Some(confidence.min(100));
        self
    }

    /// Pick one invoice: `json` first, then `structured`; neither is `ParseFailed`
    pub fn resolve(self) -> Result<ParsedInvoice> {
        let mut rejected = None;

        let invoice = match self.json {
            Some(json) => match ParsedInvoice::from_value(json) {
                Ok(invoice) => Some(invoice),
                Err(e) => {
                    rejected = Some(e.to_string());
                    None
                }
            },
            None => None,
        };

        let mut invoice = match invoice.or(self.structured) {
            Some(invoice) => invoice,
            None => {
                let reason = rejected.unwrap_or_else(|| "no structured result".to_string());
                return Err(PipelineError::ParseFailed(reason));
            }
        };

        if let Some(confidence) = self.confidence {
            invoice.confidence = confidence;
        }
        Ok(invoice)
    }
}

/// Per-stage executor output
#[derive(Debug, Clone)]
pub enum TaskOutput {
    Parsed(ParseOutput),
    Validated(ValidationOutcome),
    Report(String),
}

impl TaskOutput {
    pub fn stage(&self) -> Stage {
        match self {
            TaskOutput::Parsed(_) => Stage::Parse,
            TaskOutput::Validated(_) => Stage::Validate,
            TaskOutput::Report(_) => Stage::Report,
        }
    }
}

/// Terminal result of one executor call plus the steps it reported
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub output: TaskOutput,
    pub steps: Vec<StepUpdate>,
}

impl TaskOutcome {
    pub fn new(output: TaskOutput) -> Self {
        Self {
            output,
            steps: Vec::new(),
        }
    }

    pub fn with_trace(mut self, trace: StepTrace) -> Self {
        self.steps = trace.into_steps();
        self
    }
}
