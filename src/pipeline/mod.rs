//! Staged invoice pipeline
//!
//! State machine, progress bands and the orchestrator that streams
//! `PipelineEvent`s while running Parse, Validate and Report.

pub mod orchestrator;
pub mod progress;
pub mod state;

pub use orchestrator::{PipelineConfig, PipelineOrchestrator, RunSummary};
pub use progress::{ProgressBand, ProgressTracker};
pub use state::{PipelineState, StageEvent};
