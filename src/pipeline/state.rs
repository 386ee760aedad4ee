//! Pipeline state machine
//!
//! ```text
//! Init → Parsing → Validating → Reporting → Done
//!                ↘ ReportingLowConfidence ↗
//! any non-terminal state → Failed
//! ```
//!
//! Every change goes through `transition`; anything off these edges is an
//! `InvalidTransition`.

use crate::errors::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Pipeline run states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    /// Run created, nothing emitted yet
    Init,

    /// Parse executor running
    Parsing,

    /// High-confidence branch: rule engine running
    Validating,

    /// Report executor running with validation results
    Reporting,

    /// Report executor running without validation results
    ReportingLowConfidence,

    /// Report persisted (terminal)
    Done,

    /// Run aborted by an error (terminal)
    Failed,
}

/// Events that drive the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    Start,
    ParsedHighConfidence,
    ParsedLowConfidence,
    ValidationComplete,
    ReportSaved,
    Fail,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// Valid transitions (8 edges):
    /// 1. Init                   → Parsing                (Start)
    /// 2. Parsing                → Validating             (ParsedHighConfidence)
    /// 3. Parsing                → ReportingLowConfidence (ParsedLowConfidence)
    /// 4. Validating             → Reporting              (ValidationComplete)
    /// 5. Reporting              → Done                   (ReportSaved)
    /// 6. ReportingLowConfidence → Done                   (ReportSaved)
    /// 7. non-terminal           → Failed                 (Fail)
    /// 8. terminal states accept nothing
    pub fn transition(&self, event: StageEvent) -> Result<PipelineState> {
        use PipelineState::*;
        use StageEvent::*;

        let next = match (self, event) {
            (Init, Start) => Parsing,
            (Parsing, ParsedHighConfidence) => Validating,
            (Parsing, ParsedLowConfidence) => ReportingLowConfidence,
            (Validating, ValidationComplete) => Reporting,
            (Reporting, ReportSaved) | (ReportingLowConfidence, ReportSaved) => Done,
            (state, Fail) if !state.is_terminal() => Failed,

            (from, event) => {
                return Err(PipelineError::InvalidTransition {
                    from: format!("{:?}", from),
                    to: format!("(via {:?})", event),
                    reason: format!("{:?} accepts only {:?}", from, from.valid_events()),
                });
            }
        };

        Ok(next)
    }

    /// Events accepted in this state
    pub fn valid_events(&self) -> Vec<StageEvent> {
        use PipelineState::*;
        use StageEvent::*;

        match self {
            Init => vec![Start, Fail],
            Parsing => vec![ParsedHighConfidence, ParsedLowConfidence, Fail],
            Validating => vec![ValidationComplete, Fail],
            Reporting | ReportingLowConfidence => vec![ReportSaved, Fail],
            Done | Failed => vec![],
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PipelineState::Init => "Initializing",
            PipelineState::Parsing => "Parsing",
            PipelineState::Validating => "Validating",
            PipelineState::Reporting => "Reporting",
            PipelineState::ReportingLowConfidence => "Reporting (low confidence)",
            PipelineState::Done => "Done",
            PipelineState::Failed => "Failed",
        }
    }
}
