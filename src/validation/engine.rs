//! Compliance rule engine
//!
//! Pure function from a parsed invoice to an ordered list of rule results.
//! Every category runs unconditionally; a failure in one never short-circuits
//! the others. Engine faults never escape: they become a zero-score report
//! with `error` set.

use crate::errors::{PipelineError, Result};
use crate::types::ParsedInvoice;
use crate::validation::types::{CheckId, ComplianceReport, RuleResult};
use serde_json::Value;
use tracing::debug;

/// Absolute tolerance for money comparisons
pub const AMOUNT_TOLERANCE: f64 = 0.01;

/// Invoice total above which TDS would normally apply
pub const TDS_THRESHOLD: f64 = 30_000.0;

/// Required GSTIN length
pub const GSTIN_LENGTH: usize = 15;

/// Stateless compliance rule engine, safe to share across runs
#[derive(Debug, Clone, Copy, Default)]
pub struct ComplianceEngine;

impl ComplianceEngine {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate an invoice. Never fails.
    pub fn evaluate(&self, invoice: &ParsedInvoice) -> ComplianceReport {
        match self.try_evaluate(invoice) {
            Ok(report) => {
                debug!(
                    total = report.total_checks(),
                    failed = report.failed_checks(),
                    score = report.overall_compliance_score,
                    "Compliance evaluation complete"
                );
                report
            }
            Err(e) => {
                tracing::error!(error = %e, "Compliance evaluation failed");
                ComplianceReport::degraded(e.to_string())
            }
        }
    }

    /// Evaluate a ParsedInvoice-shaped mapping; coercion happens before evaluation
    pub fn evaluate_value(&self, value: Value) -> ComplianceReport {
        match ParsedInvoice::from_value(value) {
            Ok(invoice) => self.evaluate(&invoice),
            Err(e) => {
                tracing::error!(error = %e, "Invoice mapping rejected by rule engine");
                ComplianceReport::degraded(e.to_string())
            }
        }
    }

    fn try_evaluate(&self, invoice: &ParsedInvoice) -> Result<ComplianceReport> {
        ensure_finite(invoice)?;

        let mut results = Vec::with_capacity(10);
        results.extend(document_authenticity(invoice));
        results.extend(gst_compliance(invoice));
        results.extend(arithmetic_accuracy(invoice));
        results.extend(tds_compliance(invoice));
        results.extend(policy_rules(invoice));

        Ok(ComplianceReport::from_results(results))
    }
}

/// Format-only GSTIN check: exactly 15 ASCII alphanumeric characters
pub fn is_valid_gstin_format(gstin: &str) -> bool {
    gstin.chars().count() == GSTIN_LENGTH && gstin.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Round half away from zero to two decimals
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Reject NaN/inf anywhere a rule reads a number
fn ensure_finite(invoice: &ParsedInvoice) -> Result<()> {
    let headline = [
        ("subtotal", invoice.subtotal),
        ("cgst_rate", invoice.cgst_rate),
        ("cgst_amount", invoice.cgst_amount),
        ("sgst_rate", invoice.sgst_rate),
        ("sgst_amount", invoice.sgst_amount),
        ("igst_rate", invoice.igst_rate),
        ("igst_amount", invoice.igst_amount),
        ("total_tax", invoice.total_tax),
        ("total_amount", invoice.total_amount),
    ];
    for (field, value) in headline {
        if !value.is_finite() {
            return Err(PipelineError::RuleEngineError(format!(
                "non-finite value in {}",
                field
            )));
        }
    }

    for (idx, item) in invoice.line_items.iter().enumerate() {
        for (field, value) in [
            ("quantity", item.quantity),
            ("rate", item.rate),
            ("amount", item.amount),
        ] {
            if !value.is_finite() {
                return Err(PipelineError::RuleEngineError(format!(
                    "non-finite value in line {} {}",
                    idx + 1,
                    field
                )));
            }
        }
    }

    Ok(())
}

/// Category A
fn document_authenticity(invoice: &ParsedInvoice) -> Vec<RuleResult> {
    let number_present = invoice
        .invoice_number
        .as_deref()
        .is_some_and(|n| !n.is_empty());

    let a1 = if number_present {
        RuleResult::pass(CheckId::A1InvoiceNumber, 100)
    } else {
        RuleResult::fail(
            CheckId::A1InvoiceNumber,
            vec!["Invoice number missing or invalid".to_string()],
            0,
        )
    };

    vec![a1, RuleResult::placeholder(CheckId::A2DuplicateInvoice)]
}

/// Category B
fn gst_compliance(invoice: &ParsedInvoice) -> Vec<RuleResult> {
    let gstin_valid = invoice
        .vendor
        .gstin
        .as_deref()
        .is_some_and(is_valid_gstin_format);

    if gstin_valid {
        vec![
            RuleResult::pass(CheckId::B1GstinFormat, 100),
            RuleResult::placeholder(CheckId::B2GstinStatus),
        ]
    } else {
        // B2 has no registry to ask, so it inherits B1's verdict at its capped confidence
        let b2_confidence = CheckId::B2GstinStatus.placeholder_confidence().unwrap_or(0);
        vec![
            RuleResult::fail(
                CheckId::B1GstinFormat,
                vec!["Invalid or missing GSTIN format".to_string()],
                0,
            ),
            RuleResult::fail(
                CheckId::B2GstinStatus,
                vec!["Cannot verify GSTIN status".to_string()],
                b2_confidence,
            ),
        ]
    }
}

/// Category C
fn arithmetic_accuracy(invoice: &ParsedInvoice) -> Vec<RuleResult> {
    let mismatches: Vec<String> = invoice
        .line_items
        .iter()
        .enumerate()
        .filter_map(|(idx, item)| {
            let expected = round2(item.quantity * item.rate);
            let actual = round2(item.amount);
            if (expected - actual).abs() > AMOUNT_TOLERANCE {
                Some(format!(
                    "Line {}: {} × {} ≠ {}",
                    idx + 1,
                    item.quantity,
                    item.rate,
                    item.amount
                ))
            } else {
                None
            }
        })
        .collect();

    let c1 = if mismatches.is_empty() {
        RuleResult::pass(CheckId::C1LineItemArithmetic, 100)
    } else {
        RuleResult::fail(CheckId::C1LineItemArithmetic, mismatches, 80)
    };

    let calculated = invoice.line_items_total();
    let c2 = if (calculated - invoice.subtotal).abs() < AMOUNT_TOLERANCE {
        RuleResult::pass(CheckId::C2SubtotalMatch, 100)
    } else {
        RuleResult::fail(
            CheckId::C2SubtotalMatch,
            vec![format!(
                "Subtotal mismatch: Expected {}, Got {}",
                calculated, invoice.subtotal
            )],
            90,
        )
    };

    vec![c1, c2]
}

/// Category D
fn tds_compliance(invoice: &ParsedInvoice) -> Vec<RuleResult> {
    // Computed for the log only; the check stays a placeholder pass
    let tds_applicable = invoice.total_amount > TDS_THRESHOLD;
    debug!(tds_applicable, total_amount = invoice.total_amount, "TDS threshold check");

    vec![
        RuleResult::placeholder(CheckId::D1TdsApplicability),
        RuleResult::placeholder(CheckId::D2TdsSection),
    ]
}

/// Category E
fn policy_rules(_invoice: &ParsedInvoice) -> Vec<RuleResult> {
    vec![
        RuleResult::placeholder(CheckId::E1PurchaseOrderTolerance),
        RuleResult::placeholder(CheckId::E2ContractPeriod),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LineItem, Party};
    use crate::validation::types::{RuleCategory, RuleStatus};
    use serde_json::json;

    fn clean_invoice() -> ParsedInvoice {
        ParsedInvoice {
            invoice_number: Some("INV-2024-001".to_string()),
            vendor: Party {
                name: Some("Acme Traders".to_string()),
                gstin: Some("27AAAAA0000A1Z5".to_string()),
            },
            line_items: vec![LineItem {
                description: Some("Widget".to_string()),
                quantity: 2.0,
                rate: 100.0,
                amount: 200.0,
                ..Default::default()
            }],
            subtotal: 200.0,
            total_amount: 236.0,
            confidence: 95,
            ..Default::default()
        }
    }

    fn find<'a>(report: &'a ComplianceReport, prefix: &str) -> &'a RuleResult {
        report
            .category_results
            .iter()
            .find(|r| r.details.starts_with(prefix))
            .unwrap()
    }

    #[test]
    fn test_ten_checks_in_category_order() {
        let report = ComplianceEngine::new().evaluate(&clean_invoice());
        let prefixes: Vec<&str> = report
            .category_results
            .iter()
            .map(|r| &r.details[..2])
            .collect();
        assert_eq!(
            prefixes,
            vec!["A1", "A2", "B1", "B2", "C1", "C2", "D1", "D2", "E1", "E2"]
        );
    }

    #[test]
    fn test_clean_invoice_scores_100() {
        let report = ComplianceEngine::new().evaluate(&clean_invoice());
        assert_eq!(report.failed_checks(), 0);
        assert_eq!(report.overall_compliance_score, 100);
        assert!(!report.is_degraded());
    }

    #[test]
    fn test_scenario_clean_line_item() {
        let report = ComplianceEngine::new().evaluate(&clean_invoice());

        for result in report.category(RuleCategory::ArithmeticAccuracy) {
            assert_eq!(result.status, RuleStatus::Pass);
            assert_eq!(result.confidence, 100);
        }
        let b1 = find(&report, "B1");
        assert_eq!(b1.status, RuleStatus::Pass);
        assert_eq!(b1.confidence, 100);
    }

    #[test]
    fn test_scenario_line_item_mismatch() {
        let mut invoice = clean_invoice();
        invoice.line_items[0].amount = 150.0;
        invoice.subtotal = 150.0;

        let report = ComplianceEngine::new().evaluate(&invoice);
        let c1 = find(&report, "C1");
        assert_eq!(c1.status, RuleStatus::Fail);
        assert_eq!(c1.confidence, 80);
        assert_eq!(c1.failures, vec!["Line 1: 2 × 100 ≠ 150".to_string()]);

        // Subtotal still equals the sum of amounts
        assert_eq!(find(&report, "C2").status, RuleStatus::Pass);
    }

    #[test]
    fn test_each_mismatching_line_recorded() {
        let mut invoice = clean_invoice();
        invoice.line_items = vec![
            LineItem { quantity: 1.0, rate: 10.0, amount: 11.0, ..Default::default() },
            LineItem { quantity: 3.0, rate: 5.0, amount: 15.0, ..Default::default() },
            LineItem { quantity: 0.5, rate: 9.0, amount: 4.0, ..Default::default() },
        ];
        invoice.subtotal = 30.0;

        let report = ComplianceEngine::new().evaluate(&invoice);
        let c1 = find(&report, "C1");
        assert_eq!(c1.failures.len(), 2);
        assert!(c1.failures[0].starts_with("Line 1:"));
        assert!(c1.failures[1].starts_with("Line 3:"));
    }

    #[test]
    fn test_scenario_empty_line_items() {
        let mut invoice = clean_invoice();
        invoice.line_items.clear();
        invoice.subtotal = 0.0;

        let report = ComplianceEngine::new().evaluate(&invoice);
        assert_eq!(find(&report, "C1").status, RuleStatus::Pass);
        assert!(find(&report, "C1").failures.is_empty());
        assert_eq!(find(&report, "C2").status, RuleStatus::Pass);
    }

    #[test]
    fn test_subtotal_mismatch_message() {
        let mut invoice = clean_invoice();
        invoice.subtotal = 250.0;

        let report = ComplianceEngine::new().evaluate(&invoice);
        let c2 = find(&report, "C2");
        assert_eq!(c2.status, RuleStatus::Fail);
        assert_eq!(c2.confidence, 90);
        assert_eq!(c2.failures, vec!["Subtotal mismatch: Expected 200, Got 250".to_string()]);
    }

    #[test]
    fn test_rounding_tolerance() {
        let mut invoice = clean_invoice();
        invoice.line_items = vec![LineItem {
            quantity: 3.0,
            rate: 33.333,
            amount: 100.0,
            ..Default::default()
        }];
        invoice.subtotal = 100.005;

        let report = ComplianceEngine::new().evaluate(&invoice);
        assert_eq!(find(&report, "C1").status, RuleStatus::Pass);
        assert_eq!(find(&report, "C2").status, RuleStatus::Pass);
    }

    #[test]
    fn test_missing_invoice_number() {
        let mut invoice = clean_invoice();
        invoice.invoice_number = Some(String::new());
        let report = ComplianceEngine::new().evaluate(&invoice);
        let a1 = find(&report, "A1");
        assert_eq!(a1.status, RuleStatus::Fail);
        assert_eq!(a1.confidence, 0);

        invoice.invoice_number = None;
        let report = ComplianceEngine::new().evaluate(&invoice);
        assert_eq!(find(&report, "A1").status, RuleStatus::Fail);
    }

    #[test]
    fn test_invalid_gstin_fails_b1_and_b2() {
        let mut invoice = clean_invoice();
        invoice.vendor.gstin = Some("27AAAAA0000A1Z".to_string());

        let report = ComplianceEngine::new().evaluate(&invoice);
        let b1 = find(&report, "B1");
        let b2 = find(&report, "B2");
        assert_eq!(b1.status, RuleStatus::Fail);
        assert_eq!(b1.confidence, 0);
        assert_eq!(b2.status, RuleStatus::Fail);
        assert_eq!(b2.confidence, 60);
        assert_eq!(report.overall_compliance_score, 80);
    }

    #[test]
    fn test_valid_gstin_b2_capped() {
        let report = ComplianceEngine::new().evaluate(&clean_invoice());
        let b2 = find(&report, "B2");
        assert_eq!(b2.status, RuleStatus::Pass);
        assert_eq!(b2.confidence, 60);
    }

    #[test]
    fn test_gstin_format() {
        assert!(is_valid_gstin_format("27AAAAA0000A1Z5"));
        assert!(!is_valid_gstin_format("27AAAAA0000A1Z-"));
        assert!(!is_valid_gstin_format("27AAAAA0000A1Z55"));
        assert!(!is_valid_gstin_format(""));
        assert!(!is_valid_gstin_format("27AAAAA0000A1Zé"));
    }

    #[test]
    fn test_tds_and_policy_always_pass_low_confidence() {
        let mut invoice = clean_invoice();
        invoice.total_amount = 45_000.0;

        let report = ComplianceEngine::new().evaluate(&invoice);
        let confidences: Vec<(RuleStatus, u8)> = ["D1", "D2", "E1", "E2"]
            .iter()
            .map(|p| {
                let r = find(&report, p);
                (r.status, r.confidence)
            })
            .collect();
        assert_eq!(
            confidences,
            vec![
                (RuleStatus::Pass, 70),
                (RuleStatus::Pass, 60),
                (RuleStatus::Pass, 50),
                (RuleStatus::Pass, 50)
            ]
        );
    }

    #[test]
    fn test_non_finite_value_degrades_report() {
        let mut invoice = clean_invoice();
        invoice.line_items[0].rate = f64::NAN;

        let report = ComplianceEngine::new().evaluate(&invoice);
        assert!(report.is_degraded());
        assert_eq!(report.overall_compliance_score, 0);
        assert!(report.category_results.is_empty());
        assert!(report.error.unwrap().contains("line 1 rate"));
    }

    #[test]
    fn test_evaluate_value_coerces_nulls() {
        let report = ComplianceEngine::new().evaluate_value(json!({
            "invoice_number": "INV-7",
            "vendor": {"gstin": "27AAAAA0000A1Z5"},
            "line_items": [{"quantity": null, "rate": null, "amount": null}],
            "subtotal": null
        }));
        assert!(!report.is_degraded());
        assert_eq!(report.failed_checks(), 0);
    }

    #[test]
    fn test_evaluate_value_bad_mapping_degrades() {
        let report = ComplianceEngine::new().evaluate_value(json!({"subtotal": "abc"}));
        assert!(report.is_degraded());
        assert_eq!(report.overall_compliance_score, 0);
    }

    #[test]
    fn test_idempotent() {
        let engine = ComplianceEngine::new();
        let mut invoice = clean_invoice();
        invoice.subtotal = 10.0;
        let first = serde_json::to_string(&engine.evaluate(&invoice)).unwrap();
        let second = serde_json::to_string(&engine.evaluate(&invoice)).unwrap();
        assert_eq!(first, second);
    }
}
