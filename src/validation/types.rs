//! Compliance rule engine type definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Pass,
    Fail,
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleStatus::Pass => write!(f, "pass"),
            RuleStatus::Fail => write!(f, "fail"),
        }
    }
}

/// Independent rule categories, evaluated in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleCategory {
    DocumentAuthenticity,
    GstCompliance,
    ArithmeticAccuracy,
    TdsCompliance,
    PolicyRules,
}

impl RuleCategory {
    /// All categories in evaluation order
    pub const ALL: [RuleCategory; 5] = [
        RuleCategory::DocumentAuthenticity,
        RuleCategory::GstCompliance,
        RuleCategory::ArithmeticAccuracy,
        RuleCategory::TdsCompliance,
        RuleCategory::PolicyRules,
    ];

    /// Label carried in `RuleResult::category`
    pub fn label(&self) -> &'static str {
        match self {
            RuleCategory::DocumentAuthenticity => "Category A - Document Authenticity",
            RuleCategory::GstCompliance => "Category B - GST Compliance",
            RuleCategory::ArithmeticAccuracy => "Category C - Arithmetic & Calculation Accuracy",
            RuleCategory::TdsCompliance => "Category D - TDS Compliance",
            RuleCategory::PolicyRules => "Category E - Policy & Business Rules",
        }
    }
}

/// How a check reaches its verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// Verdict computed from the invoice itself
    Evaluated,

    /// No data source is wired in yet; the check reports a fixed,
    /// depressed confidence instead of a real signal
    NotYetImplemented { confidence: u8 },
}

/// Every check the engine knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckId {
    A1InvoiceNumber,
    A2DuplicateInvoice,
    B1GstinFormat,
    B2GstinStatus,
    C1LineItemArithmetic,
    C2SubtotalMatch,
    D1TdsApplicability,
    D2TdsSection,
    E1PurchaseOrderTolerance,
    E2ContractPeriod,
}

impl CheckId {
    /// Category this check belongs to
    pub fn category(&self) -> RuleCategory {
        match self {
            CheckId::A1InvoiceNumber | CheckId::A2DuplicateInvoice => {
                RuleCategory::DocumentAuthenticity
            }
            CheckId::B1GstinFormat | CheckId::B2GstinStatus => RuleCategory::GstCompliance,
            CheckId::C1LineItemArithmetic | CheckId::C2SubtotalMatch => {
                RuleCategory::ArithmeticAccuracy
            }
            CheckId::D1TdsApplicability | CheckId::D2TdsSection => RuleCategory::TdsCompliance,
            CheckId::E1PurchaseOrderTolerance | CheckId::E2ContractPeriod => {
                RuleCategory::PolicyRules
            }
        }
    }

    /// Text carried in `RuleResult::details`
    pub fn details(&self) -> &'static str {
        match self {
            CheckId::A1InvoiceNumber => "A1 Invoice number format validation",
            CheckId::A2DuplicateInvoice => "A2 Duplicate invoice detection across vendors",
            CheckId::B1GstinFormat => "B1 GSTIN format validation (15-character alphanumeric)",
            CheckId::B2GstinStatus => "B2 GSTIN active / suspended status verification",
            CheckId::C1LineItemArithmetic => "C1 Line item validation quantity X rate = amount",
            CheckId::C2SubtotalMatch => "C2 Subtotal equals sum of line item amounts",
            CheckId::D1TdsApplicability => {
                "D1 TDS applicability determination based on vendor nature"
            }
            CheckId::D2TdsSection => {
                "D2 Correct TDS section identification (194C / 194J / 194H etc.)"
            }
            CheckId::E1PurchaseOrderTolerance => "E1 Invoice amount within PO tolerance (±5%)",
            CheckId::E2ContractPeriod => "E2 Invoice date within active contract period",
        }
    }

    /// Whether the check is real or a placeholder awaiting an integration
    pub fn evaluation(&self) -> Evaluation {
        match self {
            // Duplicate lookup needs an invoice database
            CheckId::A2DuplicateInvoice => Evaluation::NotYetImplemented { confidence: 70 },
            // Mirrors B1's verdict; no GST registry call
            CheckId::B2GstinStatus => Evaluation::NotYetImplemented { confidence: 60 },
            CheckId::D1TdsApplicability => Evaluation::NotYetImplemented { confidence: 70 },
            // Needs vendor classification data
            CheckId::D2TdsSection => Evaluation::NotYetImplemented { confidence: 60 },
            CheckId::E1PurchaseOrderTolerance | CheckId::E2ContractPeriod => {
                Evaluation::NotYetImplemented { confidence: 50 }
            }
            _ => Evaluation::Evaluated,
        }
    }

    /// Fixed confidence of a placeholder check
    pub fn placeholder_confidence(&self) -> Option<u8> {
        match self.evaluation() {
            Evaluation::NotYetImplemented { confidence } => Some(confidence),
            Evaluation::Evaluated => None,
        }
    }

    /// Placeholder checks only ever report their capped confidence
    pub fn is_placeholder(&self) -> bool {
        self.placeholder_confidence().is_some()
    }
}

/// Result of one check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleResult {
    pub category: String,
    pub details: String,
    pub status: RuleStatus,
    pub failures: Vec<String>,
    pub confidence: u8,
}

impl RuleResult {
    /// Passing result
    pub fn pass(check: CheckId, confidence: u8) -> Self {
        Self {
            category: check.category().label().to_string(),
            details: check.details().to_string(),
            status: RuleStatus::Pass,
            failures: Vec::new(),
            confidence,
        }
    }

    /// Failing result with human-readable reasons
    pub fn fail(check: CheckId, failures: Vec<String>, confidence: u8) -> Self {
        Self {
            category: check.category().label().to_string(),
            details: check.details().to_string(),
            status: RuleStatus::Fail,
            failures,
            confidence,
        }
    }

    /// Result for a placeholder check, at its fixed confidence
    pub fn placeholder(check: CheckId) -> Self {
        Self::pass(check, check.placeholder_confidence().unwrap_or(100))
    }

    pub fn passed(&self) -> bool {
        self.status == RuleStatus::Pass
    }
}

/// Ordered check results plus the aggregate score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub category_results: Vec<RuleResult>,

    /// 0-100
    pub overall_compliance_score: u8,

    /// Set only when the engine itself failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComplianceReport {
    /// Aggregate a list of results into a report
    pub fn from_results(category_results: Vec<RuleResult>) -> Self {
        let overall_compliance_score = compliance_score(&category_results);
        Self {
            category_results,
            overall_compliance_score,
            error: None,
        }
    }

    /// Zero-score report carrying the engine error
    pub fn degraded(error: impl Into<String>) -> Self {
        Self {
            category_results: Vec::new(),
            overall_compliance_score: 0,
            error: Some(error.into()),
        }
    }

    pub fn total_checks(&self) -> usize {
        self.category_results.len()
    }

    pub fn failed_checks(&self) -> usize {
        self.category_results.iter().filter(|r| !r.passed()).count()
    }

    /// Failing results in evaluation order
    pub fn failures(&self) -> impl Iterator<Item = &RuleResult> {
        self.category_results.iter().filter(|r| !r.passed())
    }

    /// Results for one category
    pub fn category(&self, category: RuleCategory) -> impl Iterator<Item = &RuleResult> {
        self.category_results
            .iter()
            .filter(move |r| r.category == category.label())
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }

    /// Pretty JSON, the shape handed to report writers
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// `round(100 * passed / total)`, 0 when there are no checks
pub fn compliance_score(results: &[RuleResult]) -> u8 {
    let total = results.len();
    if total == 0 {
        return 0;
    }
    let passed = results.iter().filter(|r| r.passed()).count();
    ((passed as f64 / total as f64) * 100.0).round() as u8
}
