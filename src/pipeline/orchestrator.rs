//! Pipeline orchestrator
//!
//! Drives Parse → (Validate →) Report for one raw document, relaying every
//! executor step into the event stream. Branching after Parse is decided by
//! the parse confidence against `confidence_threshold`.
//!
//! Cancellation: the consumer closing or dropping its receiver aborts the run
//! at the next emission point, or immediately while an executor is running.

use crate::cli::config::{Config, DEFAULT_CONFIDENCE_THRESHOLD};
use crate::errors::{ErrorKind, PipelineError, Result};
use crate::executor::types::{DEFAULT_PREVIEW_CHARS, DEFAULT_STAGE_TIMEOUT};
use crate::executor::{
    execute_bounded, ExecutorSet, Stage, StepUpdate, TaskContext, TaskInput, TaskOutput,
    ValidationOutcome,
};
use crate::pipeline::progress::{
    ProgressBand, ProgressTracker, PROGRESS_DONE, PROGRESS_INIT, PROGRESS_PARSED,
    PROGRESS_SAVING, PROGRESS_VALIDATED,
};
use crate::pipeline::state::{PipelineState, StageEvent};
use crate::report::{FileReportStore, ReportStore};
use crate::streaming::{event_channel, EventReceiver, EventSender, PipelineEvent, RunLog};
use crate::types::ParsedInvoice;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Orchestrator settings
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Parse confidence at or above which validation runs
    pub confidence_threshold: u8,

    /// Per-executor timeout
    pub stage_timeout: Duration,

    /// Step output preview length
    pub preview_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            confidence_threshold: config.pipeline.confidence_threshold,
            stage_timeout: config.stage_timeout(),
            preview_chars: config.pipeline.preview_chars,
        }
    }
}

/// How a run ended, for callers that need more than the event stream
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub final_state: PipelineState,

    /// Every state entered, in order, starting with `Init`
    pub visited: Vec<PipelineState>,

    pub report_path: Option<PathBuf>,

    /// Parse confidence, once known
    pub confidence: Option<u8>,

    /// Failure message and class when `final_state` is `Failed`
    pub failure: Option<(ErrorKind, String)>,
}

impl RunSummary {
    pub fn succeeded(&self) -> bool {
        self.final_state == PipelineState::Done
    }

    pub fn visited(&self, state: PipelineState) -> bool {
        self.visited.contains(&state)
    }
}

/// Main pipeline orchestrator
#[derive(Clone)]
pub struct PipelineOrchestrator {
    executors: ExecutorSet,
    store: Arc<dyn ReportStore>,
    config: PipelineConfig,
}

impl PipelineOrchestrator {
    pub fn new(executors: ExecutorSet, store: Arc<dyn ReportStore>, config: PipelineConfig) -> Self {
        Self {
            executors,
            store,
            config,
        }
    }

    /// Executors, report directory and settings from a loaded configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            ExecutorSet::from_config(config)?,
            Arc::new(FileReportStore::new(config.reports_dir())),
            PipelineConfig::from(config),
        ))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run on a background task; events arrive on the returned receiver
    pub fn spawn(&self, raw: String) -> EventReceiver {
        self.spawn_with_handle(raw).0
    }

    /// Like `spawn`, also handing back the task's summary
    pub fn spawn_with_handle(&self, raw: String) -> (EventReceiver, JoinHandle<Result<RunSummary>>) {
        let (tx, rx) = event_channel();
        let orchestrator = self.clone();
        let handle = tokio::spawn(async move { orchestrator.run(raw, tx).await });
        (rx, handle)
    }

    /// Drive one run to completion, emitting into `tx`.
    ///
    /// Pipeline failures end in `Failed` with exactly one failure event and
    /// still return `Ok`; `Err(Cancelled)` means the consumer went away.
    pub async fn run(&self, raw: String, tx: EventSender) -> Result<RunSummary> {
        let ctx = TaskContext::new(Uuid::new_v4())
            .with_stage_timeout(self.config.stage_timeout)
            .with_preview_chars(self.config.preview_chars);
        let span = info_span!("pipeline_run", run_id = %ctx.run_id);

        async move {
            let mut run = Run::new(ctx, tx);
            info!(raw_chars = raw.len(), "Pipeline run started");

            match self.drive(&mut run, raw).await {
                Ok(()) => {
                    info!(confidence = ?run.confidence, "Pipeline run complete");
                    Ok(run.summary(None))
                }
                Err(PipelineError::Cancelled) => {
                    warn!(state = ?run.state, "Consumer went away; run cancelled");
                    Err(PipelineError::Cancelled)
                }
                Err(e) => run.fail(e).await,
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, run: &mut Run, raw: String) -> Result<()> {
        run.emit(PROGRESS_INIT, "🤖 Initializing pipeline...").await?;
        run.transition(StageEvent::Start)?;

        // Parse
        let executor = self.executors.for_stage(Stage::Parse);
        run.emit(
            ProgressBand::PARSE.start,
            format!("📝 Starting {} stage ({})...", Stage::Parse, executor.name()),
        )
        .await?;
        let outcome = run
            .execute(executor, TaskInput::Parse { raw })
            .await?;
        run.relay_steps(ProgressBand::PARSE, &outcome.steps).await?;

        let parsed = match outcome.output {
            TaskOutput::Parsed(parsed) => parsed,
            other => return Err(unexpected_output(Stage::Parse, &other)),
        };
        let invoice = Arc::new(parsed.resolve()?);
        let confidence = invoice.confidence;
        run.confidence = Some(confidence);
        run.structured_data = Some(invoice.to_value());
        info!(confidence, "Invoice parsed");
        run.emit(
            PROGRESS_PARSED,
            format!("✅ Parsing complete - Confidence: {}%", confidence),
        )
        .await?;

        // Branch
        let validation = if confidence < self.config.confidence_threshold {
            run.transition(StageEvent::ParsedLowConfidence)?;
            run.emit(
                PROGRESS_PARSED,
                "⚠️ Low confidence → Generating data quality report",
            )
            .await?;
            None
        } else {
            run.transition(StageEvent::ParsedHighConfidence)?;
            run.emit(PROGRESS_PARSED, "✅ High confidence → Running validation")
                .await?;
            let outcome = self.validate(run, invoice.clone()).await?;
            run.transition(StageEvent::ValidationComplete)?;
            Some(outcome)
        };

        // Report
        let report = self.report(run, invoice, validation).await?;
        run.emit_report(PROGRESS_SAVING, "💾 Saving report...", &report)
            .await?;

        let path = run.cancellable(self.store.save(&report)).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        run.report_path = Some(path);
        run.transition(StageEvent::ReportSaved)?;

        run.emit_report(PROGRESS_DONE, format!("✅ Report saved: {}", filename), &report)
            .await?;
        run.emit_report(PROGRESS_DONE, "🎉 Validation complete!", &report)
            .await?;
        Ok(())
    }

    async fn validate(&self, run: &mut Run, invoice: Arc<ParsedInvoice>) -> Result<ValidationOutcome> {
        let executor = self.executors.for_stage(Stage::Validate);
        run.emit(
            ProgressBand::VALIDATE.start,
            format!("🔍 Starting {} stage ({})...", Stage::Validate, executor.name()),
        )
        .await?;

        let outcome = run
            .execute(executor, TaskInput::Validate { invoice })
            .await?;
        run.relay_steps(ProgressBand::VALIDATE, &outcome.steps).await?;

        let validation = match outcome.output {
            TaskOutput::Validated(validation) => validation,
            other => return Err(unexpected_output(Stage::Validate, &other)),
        };

        let score = validation.report.overall_compliance_score;
        match &validation.report.error {
            Some(err) => {
                warn!(error = %err, "Validation produced a degraded report");
                run.emit(
                    PROGRESS_VALIDATED,
                    format!("⚠️ Validation complete - rule engine error: {}", err),
                )
                .await?;
            }
            None => {
                info!(score, failed = validation.report.failed_checks(), "Validation complete");
                run.emit(
                    PROGRESS_VALIDATED,
                    format!("✅ Validation complete - Compliance score: {}%", score),
                )
                .await?;
            }
        }
        Ok(validation)
    }

    async fn report(
        &self,
        run: &mut Run,
        invoice: Arc<ParsedInvoice>,
        validation: Option<ValidationOutcome>,
    ) -> Result<String> {
        let executor = self.executors.for_stage(Stage::Report);
        run.emit(
            ProgressBand::REPORT.start,
            format!("📊 Starting {} stage ({})...", Stage::Report, executor.name()),
        )
        .await?;

        let outcome = run
            .execute(
                executor,
                TaskInput::Report { invoice, validation },
            )
            .await?;
        run.relay_steps(ProgressBand::REPORT, &outcome.steps).await?;

        match outcome.output {
            TaskOutput::Report(text) if !text.trim().is_empty() => Ok(text),
            TaskOutput::Report(_) => Err(PipelineError::executor(
                Stage::Report.display_name(),
                "executor returned an empty report",
            )),
            other => Err(unexpected_output(Stage::Report, &other)),
        }
    }
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("executors", &self.executors)
            .field("config", &self.config)
            .finish()
    }
}

fn unexpected_output(stage: Stage, output: &TaskOutput) -> PipelineError {
    PipelineError::executor(
        stage.display_name(),
        format!("unexpected {} output", output.stage()),
    )
}

/// Mutable state of one in-flight run
struct Run {
    ctx: TaskContext,
    tx: EventSender,
    state: PipelineState,
    visited: Vec<PipelineState>,
    log: RunLog,
    progress: ProgressTracker,
    structured_data: Option<Value>,
    confidence: Option<u8>,
    report_path: Option<PathBuf>,
}

impl Run {
    fn new(ctx: TaskContext, tx: EventSender) -> Self {
        Self {
            ctx,
            tx,
            state: PipelineState::Init,
            visited: vec![PipelineState::Init],
            log: RunLog::new(),
            progress: ProgressTracker::new(),
            structured_data: None,
            confidence: None,
            report_path: None,
        }
    }

    fn transition(&mut self, event: StageEvent) -> Result<()> {
        let next = self.state.transition(event)?;
        debug!(from = ?self.state, to = ?next, "State transition");
        self.state = next;
        self.visited.push(next);
        Ok(())
    }

    async fn send(&mut self, progress: f64, message: &str, report: Option<String>) -> Result<()> {
        let progress = self.progress.advance(progress);
        let log = self.log.append(message);
        let event = PipelineEvent::new(progress, log)
            .with_structured_data(self.structured_data.clone())
            .with_report(report);
        self.tx.emit(event).await
    }

    async fn emit(&mut self, progress: f64, message: impl AsRef<str>) -> Result<()> {
        self.send(progress, message.as_ref(), None).await
    }

    async fn emit_report(
        &mut self,
        progress: f64,
        message: impl AsRef<str>,
        report: &str,
    ) -> Result<()> {
        self.send(progress, message.as_ref(), Some(report.to_string()))
            .await
    }

    /// Await `fut` unless the consumer goes away first
    async fn cancellable<T>(&self, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            _ = self.tx.closed() => Err(PipelineError::Cancelled),
            result = fut => result,
        }
    }

    async fn execute(
        &self,
        executor: &dyn crate::executor::TaskExecutor,
        input: TaskInput,
    ) -> Result<crate::executor::TaskOutcome> {
        self.cancellable(execute_bounded(executor, &self.ctx, input))
            .await
    }

    /// Re-emit executor steps spread across `band`
    async fn relay_steps(&mut self, band: ProgressBand, steps: &[StepUpdate]) -> Result<()> {
        for (idx, step) in steps.iter().enumerate() {
            let progress = band.at(idx, steps.len());
            self.emit(progress, format!("🔄 {}", step.description)).await?;
            if let Some(preview) = &step.output_preview {
                self.emit(progress, format!("📝 Output: {}", preview)).await?;
            }
        }
        Ok(())
    }

    /// Enter `Failed` and emit the single failure event
    async fn fail(mut self, err: PipelineError) -> Result<RunSummary> {
        error!(error = %err, state = ?self.state, "Validation failed");

        if let Err(transition_err) = self.transition(StageEvent::Fail) {
            warn!(error = %transition_err, "Failure raised from a terminal state");
            self.state = PipelineState::Failed;
            self.visited.push(PipelineState::Failed);
        }

        let progress = self.progress.current();
        let message = format!("❌ ERROR: {}", err);
        let report = format!("Validation failed: {}", err);
        self.send(progress, &message, Some(report)).await?;

        Ok(self.summary(Some((err.kind(), err.to_string()))))
    }

    fn summary(self, failure: Option<(ErrorKind, String)>) -> RunSummary {
        RunSummary {
            run_id: self.ctx.run_id,
            final_state: self.state,
            visited: self.visited,
            report_path: self.report_path,
            confidence: self.confidence,
            failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{StepTrace, TaskExecutor, TaskOutcome};
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    fn orchestrator(dir: &TempDir) -> PipelineOrchestrator {
        PipelineOrchestrator::new(
            ExecutorSet::local(),
            Arc::new(FileReportStore::new(dir.path())),
            PipelineConfig::default(),
        )
    }

    fn raw_invoice(confidence: u8) -> String {
        json!({
            "invoice_number": "INV-100",
            "vendor": {"name": "Acme", "gstin": "27AAAAA0000A1Z5"},
            "line_items": [{"description": "Widget", "quantity": 2, "rate": 100, "amount": 200}],
            "subtotal": 200,
            "total_amount": 236,
            "confidence": confidence
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_high_confidence_run() {
        let dir = TempDir::new().unwrap();
        let (tx, rx) = event_channel();
        let orch = orchestrator(&dir);

        let handle = tokio::spawn(async move { orch.run(raw_invoice(90), tx).await });
        let events = rx.collect().await;
        let summary = handle.await.unwrap().unwrap();

        assert!(summary.succeeded());
        assert!(summary.visited(PipelineState::Validating));
        assert!(!summary.visited(PipelineState::ReportingLowConfidence));
        assert_eq!(summary.confidence, Some(90));

        let last = events.last().unwrap();
        assert_eq!(last.progress, 1.0);
        assert!(last.has_report());
        assert!(last.log.ends_with("🎉 Validation complete!"));
        assert!(summary.report_path.unwrap().exists());
    }

    #[tokio::test]
    async fn test_structured_data_persists_after_parse() {
        let dir = TempDir::new().unwrap();
        let events = orchestrator(&dir).spawn(raw_invoice(90)).collect().await;

        let first_with_data = events
            .iter()
            .position(|e| e.structured_data.is_some())
            .unwrap();
        assert_eq!(events[first_with_data].progress, PROGRESS_PARSED);
        assert!(events[first_with_data..]
            .iter()
            .all(|e| e.structured_data.is_some()));
    }

    struct ExplodingReport;

    #[async_trait]
    impl TaskExecutor for ExplodingReport {
        fn stage(&self) -> Stage {
            Stage::Report
        }

        fn name(&self) -> &str {
            "exploding"
        }

        async fn execute(&self, ctx: &TaskContext, _input: TaskInput) -> Result<TaskOutcome> {
            let mut trace: StepTrace = ctx.trace();
            trace.step("about to fail");
            Err(PipelineError::executor("Report", "printer on fire"))
        }
    }

    #[tokio::test]
    async fn test_executor_error_emits_single_failure_event() {
        let dir = TempDir::new().unwrap();
        let local = ExecutorSet::local();
        let orch = PipelineOrchestrator::new(
            ExecutorSet::new(local.parse, local.validate, Arc::new(ExplodingReport)),
            Arc::new(FileReportStore::new(dir.path())),
            PipelineConfig::default(),
        );

        let (rx, handle) = orch.spawn_with_handle(raw_invoice(95));
        let events = rx.collect().await;
        let summary = handle.await.unwrap().unwrap();

        assert_eq!(summary.final_state, PipelineState::Failed);
        assert_eq!(summary.failure.as_ref().unwrap().0, ErrorKind::ExecutorError);

        let failures: Vec<_> = events
            .iter()
            .filter(|e| {
                e.report
                    .as_deref()
                    .is_some_and(|r| r.starts_with("Validation failed:"))
            })
            .collect();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].latest_line().contains("❌ ERROR: Report executor failed: printer on fire"));
        assert!(std::ptr::eq(failures[0], events.last().unwrap()));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_pipeline_config_from_config() {
        let mut config = Config::default();
        config.pipeline.confidence_threshold = 55;
        config.pipeline.stage_timeout_secs = 12;
        let pipeline = PipelineConfig::from(&config);
        assert_eq!(pipeline.confidence_threshold, 55);
        assert_eq!(pipeline.stage_timeout, Duration::from_secs(12));
    }
}
