//! Model-backed executors over a shared Ollama client
//!
//! Parse asks the model for the invoice as JSON; validate runs the rule engine
//! first and asks the model to explain the result; report asks the model to
//! write the final text.

use crate::errors::{PipelineError, Result};
use crate::executor::local::category_steps;
use crate::executor::types::{
    ParseOutput, Stage, TaskContext, TaskInput, TaskOutcome, TaskOutput, ValidationOutcome,
};
use crate::executor::TaskExecutor;
use crate::streaming::{extract_first_object, OllamaClient};
use crate::types::ParsedInvoice;
use crate::validation::ComplianceEngine;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

const PARSE_PROMPT: &str = r#"You are an invoice document parser for Indian GST invoices.
Extract the invoice below into a single JSON object with exactly these keys:
invoice_number, invoice_date,
vendor {name, gstin}, buyer {name, gstin},
line_items [{description, hsn_sac, quantity, unit, rate, amount}],
subtotal, cgst_rate, cgst_amount, sgst_rate, sgst_amount, igst_rate, igst_amount,
total_tax, total_amount,
confidence (integer 0-100: how sure you are the extraction is complete and correct).
Use numbers for numeric fields and null for anything not present. Reply with the JSON object only.

INVOICE:
"#;

const VALIDATE_PROMPT: &str = r#"You are a tax compliance reviewer. A rule engine has already checked the invoice below.
Explain the failed checks, note anything the engine could not verify (checks with low confidence),
and list concrete follow-ups. Be brief and factual; do not change the engine's verdicts.
"#;

const REPORT_PROMPT: &str = r#"You are writing the final invoice validation report for an accounts payable team.
Write a plain-text report with sections: Summary, Invoice Details, Compliance Findings, Recommendation.
"#;

const LOW_CONFIDENCE_NOTE: &str = "Validation results: None. Parse confidence was too low to validate. \
Write a data quality report instead: list what is missing or doubtful and what the submitter should fix.";

fn unexpected_input(stage: Stage, input: &TaskInput) -> PipelineError {
    PipelineError::executor(
        stage.display_name(),
        format!("unexpected {} input", input.stage()),
    )
}

fn invoice_json(invoice: &ParsedInvoice) -> String {
    serde_json::to_string_pretty(&invoice.to_value()).unwrap_or_else(|_| "{}".to_string())
}

/// Model-driven field extraction
#[derive(Debug, Clone)]
pub struct LlmParseExecutor {
    client: Arc<OllamaClient>,
}

impl LlmParseExecutor {
    pub fn new(client: Arc<OllamaClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TaskExecutor for LlmParseExecutor {
    fn stage(&self) -> Stage {
        Stage::Parse
    }

    fn name(&self) -> &str {
        "ollama-parser"
    }

    async fn execute(&self, ctx: &TaskContext, input: TaskInput) -> Result<TaskOutcome> {
        let raw = match input {
            TaskInput::Parse { raw } => raw,
            other => return Err(unexpected_input(Stage::Parse, &other)),
        };

        let mut trace = ctx.trace();
        trace.step_with_output("Processing: extract invoice fields", &raw);

        let response = self.client.generate(format!("{}{}", PARSE_PROMPT, raw)).await?;
        debug!(model = self.client.model(), chars = response.len(), "Parse response received");
        trace.step_with_output("Output", &response);

        let output = match extract_first_object(&response) {
            Some(json) => ParseOutput::from_json(json),
            None => {
                warn!("Model reply carried no JSON object");
                ParseOutput::default()
            }
        };

        Ok(TaskOutcome::new(TaskOutput::Parsed(output)).with_trace(trace))
    }
}

/// Rule engine verdicts plus a model-written analysis
#[derive(Debug, Clone)]
pub struct LlmValidateExecutor {
    client: Arc<OllamaClient>,
    engine: ComplianceEngine,
}

impl LlmValidateExecutor {
    pub fn new(client: Arc<OllamaClient>) -> Self {
        Self {
            client,
            engine: ComplianceEngine::new(),
        }
    }
}

#[async_trait]
impl TaskExecutor for LlmValidateExecutor {
    fn stage(&self) -> Stage {
        Stage::Validate
    }

    fn name(&self) -> &str {
        "ollama-validator"
    }

    async fn execute(&self, ctx: &TaskContext, input: TaskInput) -> Result<TaskOutcome> {
        let invoice = match input {
            TaskInput::Validate { invoice } => invoice,
            other => return Err(unexpected_input(Stage::Validate, &other)),
        };

        let mut trace = ctx.trace();
        let report = self.engine.evaluate(&invoice);
        category_steps(&mut trace, &report);

        let prompt = format!(
            "{}\nINVOICE:\n{}\n\nRULE ENGINE RESULT:\n{}\n",
            VALIDATE_PROMPT,
            invoice_json(&invoice),
            report.to_json_pretty()
        );
        let analysis = self.client.generate(prompt).await?;
        trace.step_with_output("Output", &analysis);

        let outcome = ValidationOutcome::new(report).with_analysis(analysis.trim());
        Ok(TaskOutcome::new(TaskOutput::Validated(outcome)).with_trace(trace))
    }
}

/// Model-written final report
#[derive(Debug, Clone)]
pub struct LlmReportExecutor {
    client: Arc<OllamaClient>,
}

impl LlmReportExecutor {
    pub fn new(client: Arc<OllamaClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TaskExecutor for LlmReportExecutor {
    fn stage(&self) -> Stage {
        Stage::Report
    }

    fn name(&self) -> &str {
        "ollama-reporter"
    }

    async fn execute(&self, ctx: &TaskContext, input: TaskInput) -> Result<TaskOutcome> {
        let (invoice, validation) = match input {
            TaskInput::Report { invoice, validation } => (invoice, validation),
            other => return Err(unexpected_input(Stage::Report, &other)),
        };

        let mut trace = ctx.trace();
        let validation_text = match &validation {
            Some(outcome) => {
                let mut text = outcome.report.to_json_pretty();
                if let Some(analysis) = &outcome.analysis {
                    text.push_str("\n\nReviewer analysis:\n");
                    text.push_str(analysis);
                }
                text
            }
            None => LOW_CONFIDENCE_NOTE.to_string(),
        };

        let prompt = format!(
            "{}\nPARSED INVOICE:\n{}\n\nVALIDATION RESULTS:\n{}\n",
            REPORT_PROMPT,
            invoice_json(&invoice),
            validation_text
        );
        trace.step("Processing: write final report");

        let report = self.client.generate(prompt).await?;
        trace.step_with_output("Output", &report);

        Ok(TaskOutcome::new(TaskOutput::Report(report.trim().to_string())).with_trace(trace))
    }
}
