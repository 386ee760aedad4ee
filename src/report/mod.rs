//! Report rendering and persistence

pub mod render;
pub mod store;

pub use render::{render_compliance_report, render_data_quality_report, render_report};
pub use store::{report_filename, FileReportStore, ReportStore, DEFAULT_REPORTS_DIR};
