//! Task executors
//!
//! One executor per stage. The orchestrator sees nothing beyond the
//! `TaskExecutor` contract; whether a stage is answered by a model or by
//! deterministic code is decided when the `ExecutorSet` is built.

pub mod llm;
pub mod local;
pub mod types;

pub use llm::{LlmParseExecutor, LlmReportExecutor, LlmValidateExecutor};
pub use local::{RuleValidateExecutor, StructuredParseExecutor, TemplateReportExecutor};
pub use types::{
    truncate_preview, ParseOutput, Stage, StepTrace, StepUpdate, TaskContext, TaskInput,
    TaskOutcome, TaskOutput, ValidationOutcome, MAX_STEP_UPDATES,
};

use crate::cli::config::{Backend, Config};
use crate::errors::{PipelineError, Result};
use crate::streaming::{GenerateOptions, OllamaClient};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// A unit of work bound to one pipeline stage
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Stage this executor serves
    fn stage(&self) -> Stage;

    /// Short name for logs
    fn name(&self) -> &str;

    /// Run to completion, returning the result and the steps taken
    async fn execute(&self, ctx: &TaskContext, input: TaskInput) -> Result<TaskOutcome>;
}

/// Run an executor under the stage timeout and check its output shape
pub async fn execute_bounded(
    executor: &dyn TaskExecutor,
    ctx: &TaskContext,
    input: TaskInput,
) -> Result<TaskOutcome> {
    let stage = input.stage();
    debug!(stage = %stage, executor = executor.name(), "Executor started");

    let mut outcome = tokio::time::timeout(ctx.stage_timeout, executor.execute(ctx, input))
        .await
        .map_err(|_| PipelineError::Timeout {
            stage: stage.display_name().to_string(),
            duration_ms: ctx.stage_timeout.as_millis() as u64,
        })??;

    if outcome.output.stage() != stage {
        return Err(PipelineError::executor(
            stage.display_name(),
            format!(
                "{} returned {} output",
                executor.name(),
                outcome.output.stage()
            ),
        ));
    }

    outcome.steps.truncate(MAX_STEP_UPDATES);
    debug!(stage = %stage, steps = outcome.steps.len(), "Executor finished");
    Ok(outcome)
}

/// The three executors a pipeline run needs
#[derive(Clone)]
pub struct ExecutorSet {
    pub parse: Arc<dyn TaskExecutor>,
    pub validate: Arc<dyn TaskExecutor>,
    pub report: Arc<dyn TaskExecutor>,
}

impl ExecutorSet {
    pub fn new(
        parse: Arc<dyn TaskExecutor>,
        validate: Arc<dyn TaskExecutor>,
        report: Arc<dyn TaskExecutor>,
    ) -> Self {
        Self {
            parse,
            validate,
            report,
        }
    }

    /// Deterministic executors, no model required
    pub fn local() -> Self {
        Self::new(
            Arc::new(StructuredParseExecutor::new()),
            Arc::new(RuleValidateExecutor::new()),
            Arc::new(TemplateReportExecutor::new()),
        )
    }

    /// Model-backed executors sharing one client
    pub fn ollama(client: OllamaClient) -> Self {
        let client = Arc::new(client);
        Self::new(
            Arc::new(LlmParseExecutor::new(client.clone())),
            Arc::new(LlmValidateExecutor::new(client.clone())),
            Arc::new(LlmReportExecutor::new(client)),
        )
    }

    /// Build the set the configuration asks for
    pub fn from_config(config: &Config) -> Result<Self> {
        match config.llm.backend {
            Backend::Local => Ok(Self::local()),
            Backend::Ollama => {
                let client = OllamaClient::with_config(&config.ollama_url(), &config.llm.model)?
                    .with_options(GenerateOptions {
                        temperature: config.llm.temperature,
                        max_tokens: config.llm.max_tokens,
                    });
                Ok(Self::ollama(client))
            }
        }
    }

    /// Executor for a stage
    pub fn for_stage(&self, stage: Stage) -> &dyn TaskExecutor {
        match stage {
            Stage::Parse => self.parse.as_ref(),
            Stage::Validate => self.validate.as_ref(),
            Stage::Report => self.report.as_ref(),
        }
    }
}

impl std::fmt::Debug for ExecutorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorSet")
            .field("parse", &self.parse.name())
            .field("validate", &self.validate.name())
            .field("report", &self.report.name())
            .finish()
    }
}
