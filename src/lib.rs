//! invoice-validator: staged, streaming invoice compliance checks
//!
//! An invoice's raw text moves through Parse, a confidence gate, Validate
//! and Report. Each stage is delegated to a pluggable `TaskExecutor`; the
//! orchestrator streams cumulative `PipelineEvent`s to the consumer and
//! writes the final report to disk.

pub mod cli;
pub mod document;
pub mod errors;
pub mod executor;
pub mod logging;
pub mod pipeline;
pub mod report;
pub mod streaming;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use errors::{ErrorKind, PipelineError, Result};
pub use executor::{ExecutorSet, TaskExecutor};
pub use pipeline::{PipelineOrchestrator, PipelineState, RunSummary};
pub use streaming::PipelineEvent;
pub use types::ParsedInvoice;
pub use validation::{ComplianceEngine, ComplianceReport};
