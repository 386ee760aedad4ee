//! Compliance rule engine
//! Evaluates a parsed invoice against independent rule categories (A-E)
//! and aggregates them into a single compliance score

pub mod types;
pub mod engine;

pub use types::{
    compliance_score, CheckId, ComplianceReport, Evaluation, RuleCategory, RuleResult, RuleStatus,
};
pub use engine::{is_valid_gstin_format, ComplianceEngine};
