//! Report persistence
//!
//! One plain-text file per successful run, named `report_<YYYYMMDD_HHMMSS>.txt`.

use crate::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::info;

/// Default directory for written reports
pub const DEFAULT_REPORTS_DIR: &str = "outputs/reports";

/// Where finished reports go
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Persist the report text and return its location
    async fn save(&self, report: &str) -> Result<PathBuf>;
}

/// File name for a report written at `now`
pub fn report_filename(now: DateTime<Local>) -> String {
    format!("report_{}.txt", now.format("%Y%m%d_%H%M%S"))
}

/// Writes reports into a directory, creating it on demand
#[derive(Debug, Clone)]
pub struct FileReportStore {
    dir: PathBuf,
}

impl FileReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Default for FileReportStore {
    fn default() -> Self {
        Self::new(DEFAULT_REPORTS_DIR)
    }
}

#[async_trait]
impl ReportStore for FileReportStore {
    async fn save(&self, report: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(report_filename(Local::now()));
        tokio::fs::write(&path, report).await?;

        info!(path = %path.display(), bytes = report.len(), "Report saved");
        Ok(path)
    }
}
