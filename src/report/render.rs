//! Plain-text report rendering
//!
//! Two shapes: a compliance report when validation ran, and a data quality
//! report for the low-confidence branch where it did not.

use crate::executor::ValidationOutcome;
use crate::types::ParsedInvoice;
use crate::validation::{ComplianceReport, RuleCategory};
use std::fmt::Write;

const RULE: &str = "============================================================";
const THIN_RULE: &str = "------------------------------------------------------------";

/// Score at or above which an invoice is cleared for payment
pub const APPROVE_SCORE: u8 = 90;

/// Score at or above which flagged items only need a review
pub const REVIEW_SCORE: u8 = 70;

/// Render the report for either branch
pub fn render_report(invoice: &ParsedInvoice, validation: Option<&ValidationOutcome>) -> String {
    match validation {
        Some(outcome) => render_compliance_report(invoice, outcome),
        None => render_data_quality_report(invoice),
    }
}

/// Full report for a validated invoice
pub fn render_compliance_report(invoice: &ParsedInvoice, outcome: &ValidationOutcome) -> String {
    let mut out = String::new();
    header(&mut out, "INVOICE VALIDATION REPORT");
    invoice_summary(&mut out, invoice);
    amounts(&mut out, invoice);
    compliance_section(&mut out, &outcome.report);

    if let Some(analysis) = outcome.analysis.as_deref().filter(|a| !a.trim().is_empty()) {
        section(&mut out, "ANALYSIS");
        let _ = writeln!(out, "{}", analysis.trim());
        out.push('\n');
    }

    section(&mut out, "RECOMMENDATION");
    let _ = writeln!(out, "{}", recommendation(&outcome.report));
    out
}

/// Report for an invoice whose parse confidence was too low to validate
pub fn render_data_quality_report(invoice: &ParsedInvoice) -> String {
    let mut out = String::new();
    header(&mut out, "INVOICE DATA QUALITY REPORT");
    invoice_summary(&mut out, invoice);

    section(&mut out, "DATA QUALITY");
    let (filled, total) = invoice.coverage();
    let _ = writeln!(
        out,
        "Parse confidence {}% is below the validation threshold.",
        invoice.confidence
    );
    let _ = writeln!(out, "Compliance checks were not run.");
    let _ = writeln!(out, "Fields extracted: {}/{}", filled, total);

    let missing = invoice.missing_fields();
    if !missing.is_empty() {
        let _ = writeln!(out, "Missing or empty:");
        for field in missing {
            let _ = writeln!(out, "  - {}", field);
        }
    }
    out.push('\n');

    amounts(&mut out, invoice);

    section(&mut out, "RECOMMENDATION");
    let _ = writeln!(
        out,
        "Manual review required. Re-submit a clearer copy of the invoice or enter the missing fields before validation."
    );
    out
}

fn header(out: &mut String, title: &str) {
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "{}", title);
    let _ = writeln!(out, "{}", RULE);
    out.push('\n');
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out, "{}", title);
    let _ = writeln!(out, "{}", THIN_RULE);
}

fn or_dash(field: &Option<String>) -> &str {
    field.as_deref().filter(|s| !s.trim().is_empty()).unwrap_or("-")
}

fn invoice_summary(out: &mut String, invoice: &ParsedInvoice) {
    section(out, "INVOICE");
    let _ = writeln!(out, "Invoice Number : {}", or_dash(&invoice.invoice_number));
    let _ = writeln!(out, "Invoice Date   : {}", or_dash(&invoice.invoice_date));
    let _ = writeln!(
        out,
        "Vendor         : {} (GSTIN: {})",
        or_dash(&invoice.vendor.name),
        or_dash(&invoice.vendor.gstin)
    );
    let _ = writeln!(
        out,
        "Buyer          : {} (GSTIN: {})",
        or_dash(&invoice.buyer.name),
        or_dash(&invoice.buyer.gstin)
    );
    let _ = writeln!(out, "Parse Confidence: {}%", invoice.confidence);
    out.push('\n');
}

fn amounts(out: &mut String, invoice: &ParsedInvoice) {
    section(out, "LINE ITEMS");
    if invoice.line_items.is_empty() {
        let _ = writeln!(out, "(none)");
    }
    for (idx, item) in invoice.line_items.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>2}. {} | {} {} x {:.2} = {:.2}",
            idx + 1,
            or_dash(&item.description),
            item.quantity,
            item.unit.as_deref().unwrap_or(""),
            item.rate,
            item.amount
        );
    }
    out.push('\n');

    let _ = writeln!(out, "Subtotal     : {:>12.2}", invoice.subtotal);
    if invoice.igst_amount != 0.0 || invoice.igst_rate != 0.0 {
        let _ = writeln!(out, "IGST ({}%)  : {:>12.2}", invoice.igst_rate, invoice.igst_amount);
    } else {
        let _ = writeln!(out, "CGST ({}%)  : {:>12.2}", invoice.cgst_rate, invoice.cgst_amount);
        let _ = writeln!(out, "SGST ({}%)  : {:>12.2}", invoice.sgst_rate, invoice.sgst_amount);
    }
    let _ = writeln!(out, "Total Tax    : {:>12.2}", invoice.total_tax);
    let _ = writeln!(out, "Total Amount : {:>12.2}", invoice.total_amount);
    out.push('\n');
}

fn compliance_section(out: &mut String, report: &ComplianceReport) {
    section(out, "COMPLIANCE");

    if let Some(error) = &report.error {
        let _ = writeln!(out, "Rule engine error: {}", error);
        let _ = writeln!(out, "Overall Compliance Score: 0%");
        out.push('\n');
        return;
    }

    let total = report.total_checks();
    let _ = writeln!(
        out,
        "Overall Compliance Score: {}% ({}/{} checks passed)",
        report.overall_compliance_score,
        total - report.failed_checks(),
        total
    );
    out.push('\n');

    for category in RuleCategory::ALL {
        let results: Vec<_> = report.category(category).collect();
        if results.is_empty() {
            continue;
        }
        let _ = writeln!(out, "[{}]", category.label());
        for result in results {
            let _ = writeln!(
                out,
                "  {:<4} {} (confidence {}%)",
                result.status.to_string().to_uppercase(),
                result.details,
                result.confidence
            );
            for failure in &result.failures {
                let _ = writeln!(out, "       - {}", failure);
            }
        }
    }
    out.push('\n');
}

fn recommendation(report: &ComplianceReport) -> &'static str {
    if report.is_degraded() {
        "Hold: compliance could not be evaluated. Review the invoice manually."
    } else if report.overall_compliance_score >= APPROVE_SCORE {
        "Approve for payment."
    } else if report.overall_compliance_score >= REVIEW_SCORE {
        "Review the failed checks before approving payment."
    } else {
        "Hold payment until the compliance failures are resolved."
    }
}
