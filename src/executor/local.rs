//! Deterministic executors
//!
//! Run without any model: the parse stage lifts the first JSON object out of
//! the raw content or, failing that, reads it as a CSV invoice. Validation is
//! the rule engine alone and reports come from the text templates.

use crate::document::invoice_from_csv;
use crate::errors::{PipelineError, Result};
use crate::executor::types::{
    ParseOutput, Stage, TaskContext, TaskInput, TaskOutcome, TaskOutput, ValidationOutcome,
};
use crate::executor::TaskExecutor;
use crate::report::render_report;
use crate::streaming::extract_first_object;
use crate::types::ParsedInvoice;
use crate::validation::{ComplianceEngine, RuleCategory};
use async_trait::async_trait;
use tracing::debug;

fn unexpected_input(stage: Stage, input: &TaskInput) -> PipelineError {
    PipelineError::executor(
        stage.display_name(),
        format!("unexpected {} input", input.stage()),
    )
}

/// Confidence from field coverage, for payloads that carry none
pub fn coverage_confidence(invoice: &ParsedInvoice) -> u8 {
    let (filled, total) = invoice.coverage();
    if total == 0 {
        return 0;
    }
    ((filled as f64 / total as f64) * 100.0).round() as u8
}

/// Parses raw content that embeds an invoice JSON object or is a CSV invoice
#[derive(Debug, Clone, Default)]
pub struct StructuredParseExecutor;

impl StructuredParseExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TaskExecutor for StructuredParseExecutor {
    fn stage(&self) -> Stage {
        Stage::Parse
    }

    fn name(&self) -> &str {
        "structured-parser"
    }

    async fn execute(&self, ctx: &TaskContext, input: TaskInput) -> Result<TaskOutcome> {
        let raw = match input {
            TaskInput::Parse { raw } => raw,
            other => return Err(unexpected_input(Stage::Parse, &other)),
        };

        let mut trace = ctx.trace();
        trace.step(format!("Scanning {} characters of raw content", raw.chars().count()));

        let json = if let Some(json) = extract_first_object(&raw) {
            trace.step_with_output("Located invoice object", &json.to_string());
            json
        } else if let Some(json) = invoice_from_csv(&raw) {
            let rows = json["line_items"].as_array().map_or(0, Vec::len);
            trace.step_with_output(format!("Read CSV invoice with {} line items", rows), &json.to_string());
            json
        } else {
            trace.step("No invoice object found in raw content");
            return Ok(TaskOutcome::new(TaskOutput::Parsed(ParseOutput::default())).with_trace(trace));
        };

        let mut output = ParseOutput::from_json(json.clone());
        let carries_confidence = json.get("confidence").is_some_and(|c| !c.is_null());
        if !carries_confidence {
            // Shape errors surface later through ParseOutput::resolve
            if let Ok(invoice) = ParsedInvoice::from_value(json) {
                let confidence = coverage_confidence(&invoice);
                debug!(confidence, "Confidence derived from field coverage");
                trace.step(format!("Confidence from field coverage: {}%", confidence));
                output = output.with_confidence(confidence);
            }
        }

        Ok(TaskOutcome::new(TaskOutput::Parsed(output)).with_trace(trace))
    }
}

/// Validation by the compliance rule engine alone
#[derive(Debug, Clone, Default)]
pub struct RuleValidateExecutor {
    engine: ComplianceEngine,
}

impl RuleValidateExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskExecutor for RuleValidateExecutor {
    fn stage(&self) -> Stage {
        Stage::Validate
    }

    fn name(&self) -> &str {
        "rule-engine"
    }

    async fn execute(&self, ctx: &TaskContext, input: TaskInput) -> Result<TaskOutcome> {
        let invoice = match input {
            TaskInput::Validate { invoice } => invoice,
            other => return Err(unexpected_input(Stage::Validate, &other)),
        };

        let mut trace = ctx.trace();
        let report = self.engine.evaluate(&invoice);
        category_steps(&mut trace, &report);

        Ok(TaskOutcome::new(TaskOutput::Validated(ValidationOutcome::new(report))).with_trace(trace))
    }
}

/// One step per category with its pass count
pub(crate) fn category_steps(
    trace: &mut crate::executor::types::StepTrace,
    report: &crate::validation::ComplianceReport,
) {
    if let Some(error) = &report.error {
        trace.step(format!("Rule engine degraded: {}", error));
        return;
    }
    for category in RuleCategory::ALL {
        let results: Vec<_> = report.category(category).collect();
        let passed = results.iter().filter(|r| r.passed()).count();
        trace.step(format!(
            "{}: {}/{} checks passed",
            category.label(),
            passed,
            results.len()
        ));
    }
}

/// Renders reports from the text templates
#[derive(Debug, Clone, Default)]
pub struct TemplateReportExecutor;

impl TemplateReportExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TaskExecutor for TemplateReportExecutor {
    fn stage(&self) -> Stage {
        Stage::Report
    }

    fn name(&self) -> &str {
        "template-reporter"
    }

    async fn execute(&self, ctx: &TaskContext, input: TaskInput) -> Result<TaskOutcome> {
        let (invoice, validation) = match input {
            TaskInput::Report { invoice, validation } => (invoice, validation),
            other => return Err(unexpected_input(Stage::Report, &other)),
        };

        let mut trace = ctx.trace();
        trace.step(if validation.is_some() {
            "Rendering compliance report"
        } else {
            "Rendering data quality report"
        });

        let text = render_report(&invoice, validation.as_ref());
        trace.step_with_output("Report rendered", &text);

        Ok(TaskOutcome::new(TaskOutput::Report(text)).with_trace(trace))
    }
}
