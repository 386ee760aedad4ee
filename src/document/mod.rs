//! Document intake
//!
//! Classifies an input file by extension and turns it into the raw text the
//! Parse stage consumes. Unsupported types are rejected here, before any
//! pipeline run starts.

pub mod tabular;

pub use tabular::invoice_from_csv;

use crate::cli::config::Backend;
use crate::errors::{PipelineError, Result};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Accepted input kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Image,
    Json,
    Csv,
}

impl DocumentKind {
    /// Classify by file extension, case-insensitively
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "pdf" => Ok(DocumentKind::Pdf),
            "png" | "jpg" | "jpeg" => Ok(DocumentKind::Image),
            "json" => Ok(DocumentKind::Json),
            "csv" => Ok(DocumentKind::Csv),
            _ => Err(PipelineError::UnsupportedFileType(format!(
                "{} (expected PDF, image, JSON or CSV)",
                path.display()
            ))),
        }
    }

    /// Whether the local backend can structure this kind without a model
    pub fn parses_locally(&self) -> bool {
        matches!(self, DocumentKind::Json | DocumentKind::Csv)
    }

    /// Reject kinds the chosen backend cannot turn into an invoice
    pub fn ensure_backend(&self, backend: Backend) -> Result<()> {
        if backend == Backend::Local && !self.parses_locally() {
            return Err(PipelineError::UnsupportedFileType(format!(
                "{} input needs a model to structure its text; use --backend ollama",
                self
            )));
        }
        Ok(())
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "PDF",
            DocumentKind::Image => "Image",
            DocumentKind::Json => "JSON",
            DocumentKind::Csv => "CSV",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Classify `path` and extract its raw text
pub async fn load_raw_text(path: &Path) -> Result<String> {
    let kind = DocumentKind::from_path(path)?;
    info!(path = %path.display(), kind = %kind, "Extracting text from document");

    let text = match kind {
        DocumentKind::Json => {
            let contents = tokio::fs::read_to_string(path).await?;
            let value: Value = serde_json::from_str(&contents).map_err(|e| {
                PipelineError::ExtractionError(format!("{} is not valid JSON: {}", path.display(), e))
            })?;
            serde_json::to_string_pretty(&value)?
        }
        DocumentKind::Csv => {
            let contents = tokio::fs::read_to_string(path).await?;
            contents
                .lines()
                .map(str::trim_end)
                .collect::<Vec<_>>()
                .join("\n")
        }
        DocumentKind::Pdf => {
            let owned = path.to_path_buf();
            tokio::task::spawn_blocking(move || pdf_extract::extract_text(&owned))
                .await
                .map_err(|e| {
                    PipelineError::ExtractionError(format!("{}: {}", path.display(), e))
                })?
                .map_err(|e| {
                    PipelineError::ExtractionError(format!("{}: {}", path.display(), e))
                })?
        }
        DocumentKind::Image => {
            return Err(PipelineError::ExtractionError(format!(
                "{}: image text extraction needs an OCR collaborator",
                path.display()
            )));
        }
    };

    if text.trim().is_empty() {
        return Err(PipelineError::ExtractionError(format!(
            "{}: no text could be extracted",
            path.display()
        )));
    }

    debug!(chars = text.len(), "Text extraction completed");
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_classification() {
        assert_eq!(DocumentKind::from_path(Path::new("a.PDF")).unwrap(), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_path(Path::new("scan.jpeg")).unwrap(), DocumentKind::Image);
        assert_eq!(DocumentKind::from_path(Path::new("x.json")).unwrap(), DocumentKind::Json);
        assert_eq!(DocumentKind::from_path(Path::new("rows.csv")).unwrap(), DocumentKind::Csv);
    }

    #[test]
    fn test_unsupported_rejected() {
        for name in ["invoice.docx", "invoice", "archive.tar.gz"] {
            let result = DocumentKind::from_path(&PathBuf::from(name));
            assert!(matches!(result, Err(PipelineError::UnsupportedFileType(_))), "{}", name);
        }
    }

    #[tokio::test]
    async fn test_json_is_pretty_printed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("invoice.json");
        std::fs::write(&path, r#"{"invoice_number":"INV-1","subtotal":10}"#).unwrap();

        let text = load_raw_text(&path).await.unwrap();
        assert!(text.contains("\n  \"invoice_number\": \"INV-1\""));
    }

    #[tokio::test]
    async fn test_invalid_json_is_extraction_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.json");
        std::fs::write(&path, "{ nope").unwrap();

        assert!(matches!(load_raw_text(&path).await, Err(PipelineError::ExtractionError(_))));
    }

    #[tokio::test]
    async fn test_csv_rows_trimmed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("items.csv");
        std::fs::write(&path, "description,quantity   \nWidget,2  \r\n").unwrap();

        assert_eq!(load_raw_text(&path).await.unwrap(), "description,quantity\nWidget,2");
    }

    #[tokio::test]
    async fn test_image_needs_ocr() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("scan.png");
        std::fs::write(&path, [0u8; 8]).unwrap();

        assert!(matches!(load_raw_text(&path).await, Err(PipelineError::ExtractionError(_))));
    }

    #[tokio::test]
    async fn test_corrupt_pdf_is_extraction_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf at all").unwrap();

        assert!(matches!(load_raw_text(&path).await, Err(PipelineError::ExtractionError(_))));
    }

    #[test]
    fn test_local_backend_rejects_pdf_up_front() {
        let err = DocumentKind::Pdf.ensure_backend(Backend::Local).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFileType(_)));
        assert!(err.to_string().contains("--backend ollama"));

        assert!(DocumentKind::Pdf.ensure_backend(Backend::Ollama).is_ok());
        assert!(DocumentKind::Csv.ensure_backend(Backend::Local).is_ok());
        assert!(DocumentKind::Json.ensure_backend(Backend::Local).is_ok());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(DocumentKind::Image.to_string(), "Image");
    }
}
