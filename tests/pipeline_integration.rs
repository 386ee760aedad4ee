//! End-to-end pipeline runs with scripted executors

use async_trait::async_trait;
use invoice_validator::executor::{
    ExecutorSet, ParseOutput, RuleValidateExecutor, Stage, StepTrace, TaskContext, TaskExecutor,
    TaskInput, TaskOutcome, TaskOutput, TemplateReportExecutor, ValidationOutcome,
};
use invoice_validator::pipeline::PipelineConfig;
use invoice_validator::report::FileReportStore;
use invoice_validator::streaming::event_channel;
use invoice_validator::{
    ComplianceEngine, ErrorKind, ParsedInvoice, PipelineError, PipelineEvent, PipelineOrchestrator,
    PipelineState, Result,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Parse executor answering with a fixed confidence
struct FixedParse {
    confidence: u8,
}

#[async_trait]
impl TaskExecutor for FixedParse {
    fn stage(&self) -> Stage {
        Stage::Parse
    }

    fn name(&self) -> &str {
        "fixed-parse"
    }

    async fn execute(&self, ctx: &TaskContext, _input: TaskInput) -> Result<TaskOutcome> {
        let mut trace: StepTrace = ctx.trace();
        trace.step_with_output("Reading invoice text", "INV-7 Acme Traders");
        let json = json!({
            "invoice_number": "INV-7",
            "invoice_date": "2024-03-09",
            "vendor": {"name": "Acme Traders", "gstin": "27AAAAA0000A1Z5"},
            "buyer": {"name": "Globex"},
            "line_items": [
                {"description": "Widget", "quantity": 2, "rate": 150, "amount": 300}
            ],
            "subtotal": 300,
            "total_amount": 354
        });
        Ok(TaskOutcome::new(TaskOutput::Parsed(
            ParseOutput::from_json(json).with_confidence(self.confidence),
        ))
        .with_trace(trace))
    }
}

/// Parse executor handing over a pre-typed invoice the rule engine cannot evaluate
struct NonFiniteParse;

#[async_trait]
impl TaskExecutor for NonFiniteParse {
    fn stage(&self) -> Stage {
        Stage::Parse
    }

    fn name(&self) -> &str {
        "non-finite-parse"
    }

    async fn execute(&self, _ctx: &TaskContext, _input: TaskInput) -> Result<TaskOutcome> {
        let invoice = ParsedInvoice {
            invoice_number: Some("INV-NAN".to_string()),
            subtotal: f64::NAN,
            ..Default::default()
        };
        Ok(TaskOutcome::new(TaskOutput::Parsed(
            ParseOutput::from_structured(invoice).with_confidence(90),
        )))
    }
}

/// Parse executor that finds nothing
struct EmptyParse;

#[async_trait]
impl TaskExecutor for EmptyParse {
    fn stage(&self) -> Stage {
        Stage::Parse
    }

    fn name(&self) -> &str {
        "empty-parse"
    }

    async fn execute(&self, _ctx: &TaskContext, _input: TaskInput) -> Result<TaskOutcome> {
        Ok(TaskOutcome::new(TaskOutput::Parsed(ParseOutput::default())))
    }
}

/// Validate executor counting its invocations
#[derive(Default)]
struct CountingValidate {
    calls: AtomicUsize,
}

#[async_trait]
impl TaskExecutor for CountingValidate {
    fn stage(&self) -> Stage {
        Stage::Validate
    }

    fn name(&self) -> &str {
        "counting-validate"
    }

    async fn execute(&self, _ctx: &TaskContext, input: TaskInput) -> Result<TaskOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match input {
            TaskInput::Validate { invoice } => {
                let report = ComplianceEngine::new().evaluate(&invoice);
                Ok(TaskOutcome::new(TaskOutput::Validated(ValidationOutcome::new(
                    report,
                ))))
            }
            _ => Err(PipelineError::executor("Validate", "wrong input")),
        }
    }
}

/// Executor that never finishes on its own
struct Stalled(Stage);

#[async_trait]
impl TaskExecutor for Stalled {
    fn stage(&self) -> Stage {
        self.0
    }

    fn name(&self) -> &str {
        "stalled"
    }

    async fn execute(&self, _ctx: &TaskContext, _input: TaskInput) -> Result<TaskOutcome> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(PipelineError::executor(self.0.display_name(), "woke up"))
    }
}

/// Report executor returning whitespace
struct BlankReport;

#[async_trait]
impl TaskExecutor for BlankReport {
    fn stage(&self) -> Stage {
        Stage::Report
    }

    fn name(&self) -> &str {
        "blank-report"
    }

    async fn execute(&self, _ctx: &TaskContext, _input: TaskInput) -> Result<TaskOutcome> {
        Ok(TaskOutcome::new(TaskOutput::Report("  \n".to_string())))
    }
}

fn orchestrator(
    dir: &TempDir,
    parse: Arc<dyn TaskExecutor>,
    validate: Arc<dyn TaskExecutor>,
    report: Arc<dyn TaskExecutor>,
    config: PipelineConfig,
) -> PipelineOrchestrator {
    PipelineOrchestrator::new(
        ExecutorSet::new(parse, validate, report),
        Arc::new(FileReportStore::new(dir.path())),
        config,
    )
}

fn assert_stream_shape(events: &[PipelineEvent]) {
    assert!(!events.is_empty());
    for pair in events.windows(2) {
        assert!(
            pair[1].progress >= pair[0].progress,
            "progress went backwards: {} -> {}",
            pair[0].progress,
            pair[1].progress
        );
        assert!(
            pair[1].log.starts_with(&pair[0].log),
            "log was rewritten between events"
        );
    }
}

fn saved_reports(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path()).map(|d| d.count()).unwrap_or(0)
}

#[tokio::test]
async fn test_low_confidence_skips_validation() {
    let dir = TempDir::new().unwrap();
    let validate = Arc::new(CountingValidate::default());
    let orch = orchestrator(
        &dir,
        Arc::new(FixedParse { confidence: 69 }),
        validate.clone(),
        Arc::new(TemplateReportExecutor::new()),
        PipelineConfig::default(),
    );

    let (rx, handle) = orch.spawn_with_handle("raw".to_string());
    let events = rx.collect().await;
    let summary = handle.await.unwrap().unwrap();

    assert_eq!(validate.calls.load(Ordering::SeqCst), 0);
    assert!(summary.succeeded());
    assert!(summary.visited(PipelineState::ReportingLowConfidence));
    assert!(!summary.visited(PipelineState::Validating));
    assert_eq!(summary.confidence, Some(69));

    assert_stream_shape(&events);
    let last = events.last().unwrap();
    assert_eq!(last.progress, 1.0);
    assert!(last.log.contains("⚠️ Low confidence → Generating data quality report"));
    assert!(!last.log.contains("🔍 Starting Validate stage"));
    assert!(!last.report.as_deref().unwrap().trim().is_empty());
    assert_eq!(saved_reports(&dir), 1);
}

#[tokio::test]
async fn test_threshold_confidence_runs_validation() {
    let dir = TempDir::new().unwrap();
    let validate = Arc::new(CountingValidate::default());
    let orch = orchestrator(
        &dir,
        Arc::new(FixedParse { confidence: 70 }),
        validate.clone(),
        Arc::new(TemplateReportExecutor::new()),
        PipelineConfig::default(),
    );

    let (rx, handle) = orch.spawn_with_handle("raw".to_string());
    let events = rx.collect().await;
    let summary = handle.await.unwrap().unwrap();

    assert_eq!(validate.calls.load(Ordering::SeqCst), 1);
    assert_eq!(summary.final_state, PipelineState::Done);
    assert_eq!(
        summary.visited,
        vec![
            PipelineState::Init,
            PipelineState::Parsing,
            PipelineState::Validating,
            PipelineState::Reporting,
            PipelineState::Done,
        ]
    );

    assert_stream_shape(&events);
    let last = events.last().unwrap();
    assert_eq!(last.progress, 1.0);
    assert!(last.log.contains("✅ High confidence → Running validation"));
    assert!(last.log.contains("✅ Validation complete - Compliance score:"));
    assert!(last.log.ends_with("🎉 Validation complete!"));

    let saved = std::fs::read_to_string(summary.report_path.unwrap()).unwrap();
    assert_eq!(&saved, last.report.as_ref().unwrap());
}

#[tokio::test]
async fn test_executor_steps_are_relayed() {
    let dir = TempDir::new().unwrap();
    let orch = orchestrator(
        &dir,
        Arc::new(FixedParse { confidence: 95 }),
        Arc::new(CountingValidate::default()),
        Arc::new(TemplateReportExecutor::new()),
        PipelineConfig::default(),
    );

    let events = orch.spawn("raw".to_string()).collect().await;
    let log = &events.last().unwrap().log;

    assert!(log.contains("🔄 Reading invoice text"));
    assert!(log.contains("📝 Output: INV-7 Acme Traders"));
}

#[tokio::test]
async fn test_missing_parse_result_fails_once() {
    let dir = TempDir::new().unwrap();
    let orch = orchestrator(
        &dir,
        Arc::new(EmptyParse),
        Arc::new(CountingValidate::default()),
        Arc::new(TemplateReportExecutor::new()),
        PipelineConfig::default(),
    );

    let (rx, handle) = orch.spawn_with_handle("raw".to_string());
    let events = rx.collect().await;
    let summary = handle.await.unwrap().unwrap();

    assert_eq!(summary.final_state, PipelineState::Failed);
    let (kind, _) = summary.failure.as_ref().unwrap();
    assert_eq!(*kind, ErrorKind::ParseFailed);

    assert_stream_shape(&events);
    let failures = events
        .iter()
        .filter(|e| e.latest_line().contains("❌ ERROR:"))
        .count();
    assert_eq!(failures, 1);
    assert!(events
        .last()
        .unwrap()
        .report
        .as_deref()
        .unwrap()
        .starts_with("Validation failed:"));
    assert_eq!(saved_reports(&dir), 0);
}

#[tokio::test]
async fn test_stage_timeout_is_executor_error() {
    let dir = TempDir::new().unwrap();
    let config = PipelineConfig {
        stage_timeout: Duration::from_millis(100),
        ..PipelineConfig::default()
    };
    let orch = orchestrator(
        &dir,
        Arc::new(FixedParse { confidence: 90 }),
        Arc::new(Stalled(Stage::Validate)),
        Arc::new(TemplateReportExecutor::new()),
        config,
    );

    let (rx, handle) = orch.spawn_with_handle("raw".to_string());
    let events = rx.collect().await;
    let summary = handle.await.unwrap().unwrap();

    assert_eq!(summary.final_state, PipelineState::Failed);
    let (kind, message) = summary.failure.unwrap();
    assert_eq!(kind, ErrorKind::ExecutorError);
    assert!(message.contains("timed out"));
    assert!(events.last().unwrap().latest_line().contains("❌ ERROR:"));
}

#[tokio::test]
async fn test_blank_report_rejected() {
    let dir = TempDir::new().unwrap();
    let orch = orchestrator(
        &dir,
        Arc::new(FixedParse { confidence: 90 }),
        Arc::new(CountingValidate::default()),
        Arc::new(BlankReport),
        PipelineConfig::default(),
    );

    let summary = {
        let (rx, handle) = orch.spawn_with_handle("raw".to_string());
        rx.collect().await;
        handle.await.unwrap().unwrap()
    };

    assert_eq!(summary.final_state, PipelineState::Failed);
    assert_eq!(summary.failure.unwrap().0, ErrorKind::ExecutorError);
    assert!(summary.report_path.is_none());
    assert_eq!(saved_reports(&dir), 0);
}

#[tokio::test]
async fn test_consumer_drop_cancels_run() {
    let dir = TempDir::new().unwrap();
    let orch = orchestrator(
        &dir,
        Arc::new(Stalled(Stage::Parse)),
        Arc::new(CountingValidate::default()),
        Arc::new(TemplateReportExecutor::new()),
        PipelineConfig::default(),
    );

    let (tx, mut rx) = event_channel();
    let handle = tokio::spawn(async move { orch.run("raw".to_string(), tx).await });

    let first = rx.recv().await.unwrap();
    assert!(first.log.contains("Initializing pipeline"));
    drop(rx);

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("run did not stop after the consumer left")
        .unwrap();
    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert_eq!(saved_reports(&dir), 0);
}

#[tokio::test]
async fn test_receiver_close_cancels_run() {
    let dir = TempDir::new().unwrap();
    let orch = orchestrator(
        &dir,
        Arc::new(FixedParse { confidence: 90 }),
        Arc::new(Stalled(Stage::Validate)),
        Arc::new(TemplateReportExecutor::new()),
        PipelineConfig::default(),
    );

    let (mut rx, handle) = orch.spawn_with_handle("raw".to_string());
    while let Some(event) = rx.recv().await {
        if event.latest_line().contains("Starting Validate stage") {
            rx.close();
            break;
        }
    }

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("run did not stop after the receiver closed")
        .unwrap();
    assert!(matches!(result, Err(PipelineError::Cancelled)));
}

#[tokio::test]
async fn test_local_backend_end_to_end() {
    let dir = TempDir::new().unwrap();
    let orch = PipelineOrchestrator::new(
        ExecutorSet::local(),
        Arc::new(FileReportStore::new(dir.path())),
        PipelineConfig::default(),
    );
    let raw = json!({
        "invoice_number": "INV-2024-001",
        "invoice_date": "2024-01-15",
        "vendor": {"name": "Acme", "gstin": "27AAAAA0000A1Z5"},
        "buyer": {"name": "Globex", "gstin": "29BBBBB1111B1Z6"},
        "line_items": [
            {"description": "Consulting", "quantity": 10, "rate": 1500, "amount": 15000}
        ],
        "subtotal": 15000,
        "cgst_rate": 9, "cgst_amount": 1350,
        "sgst_rate": 9, "sgst_amount": 1350,
        "total_tax": 2700,
        "total_amount": 17700
    })
    .to_string();

    let (rx, handle) = orch.spawn_with_handle(raw);
    let events = rx.collect().await;
    let summary = handle.await.unwrap().unwrap();

    assert!(summary.succeeded());
    assert!(summary.visited(PipelineState::Validating));
    assert_stream_shape(&events);

    let data = events.last().unwrap().structured_data.as_ref().unwrap();
    assert_eq!(data["invoice_number"], "INV-2024-001");
    assert_eq!(data["vendor"]["gstin"], "27AAAAA0000A1Z5");
}

#[tokio::test]
async fn test_rule_engine_error_degrades_but_completes() {
    let dir = TempDir::new().unwrap();
    let orch = orchestrator(
        &dir,
        Arc::new(NonFiniteParse),
        Arc::new(RuleValidateExecutor::new()),
        Arc::new(TemplateReportExecutor::new()),
        PipelineConfig::default(),
    );

    let (rx, handle) = orch.spawn_with_handle("raw".to_string());
    let events = rx.collect().await;
    let summary = handle.await.unwrap().unwrap();

    assert_eq!(summary.final_state, PipelineState::Done);
    assert!(summary.failure.is_none());
    assert!(summary.visited(PipelineState::Reporting));

    assert_stream_shape(&events);
    let last = events.last().unwrap();
    assert!(last
        .log
        .contains("⚠️ Validation complete - rule engine error: Rule engine error: non-finite value in subtotal"));
    assert!(!last.log.contains("❌ ERROR:"));

    let saved = std::fs::read_to_string(summary.report_path.unwrap()).unwrap();
    assert!(saved.contains("Rule engine error"));
}

#[tokio::test]
async fn test_local_backend_reads_csv_invoice() {
    let dir = TempDir::new().unwrap();
    let orch = PipelineOrchestrator::new(
        ExecutorSet::local(),
        Arc::new(FileReportStore::new(dir.path())),
        PipelineConfig::default(),
    );
    let raw = "invoice_number,invoice_date,vendor_name,vendor_gstin,buyer_name,description,quantity,rate,amount,subtotal,total_amount\n\
               INV-1,2024-03-09,Acme,27AAAAA0000A1Z5,Globex,Widget,2,100,200,350,413\n\
               ,,,,,Gadget,1,150,150,,"
        .to_string();

    let (rx, handle) = orch.spawn_with_handle(raw);
    let events = rx.collect().await;
    let summary = handle.await.unwrap().unwrap();

    assert!(summary.succeeded(), "{:?}", summary.failure);
    assert_eq!(summary.confidence, Some(100));
    assert!(summary.visited(PipelineState::Validating));

    let data = events.last().unwrap().structured_data.as_ref().unwrap();
    assert_eq!(data["invoice_number"], "INV-1");
    assert_eq!(data["line_items"].as_array().unwrap().len(), 2);
    assert!(events.last().unwrap().log.contains("Compliance score: 100%"));
}
