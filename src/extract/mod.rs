//! Text extraction for the supported document formats.
//!
//! The extractor turns raw file bytes into plain text according to the
//! declared type: PDF text, OOXML word-processing documents, images via an
//! external OCR engine, and plain UTF-8 text. Extraction that yields only
//! whitespace is an error so callers report the file instead of silently
//! storing nothing; the file stays eligible for the next pass.

mod docx;
mod ocr;
mod pdf;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::source::RemoteFile;

/// Errors produced while extracting text from a document.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Declared type is not one the extractor understands.
    #[error("unsupported document type: {0}")]
    UnsupportedType(String),
    /// Extraction ran but produced no usable characters.
    #[error("document produced no text")]
    NoText,
    /// Declared plain text was not valid UTF-8.
    #[error("document is not valid UTF-8 text")]
    InvalidUtf8,
    /// Format-specific reader failed on the document bytes.
    #[error("{format} extraction failed: {message}")]
    Failed {
        /// Format the failing reader was handling.
        format: &'static str,
        /// Diagnostic detail from the reader.
        message: String,
    },
    /// The external OCR engine could not be run or rejected the image.
    #[error("OCR failed: {0}")]
    Ocr(String),
}

/// Document types the extractor understands, derived from name and MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// PDF document.
    Pdf,
    /// OOXML word-processing document.
    Docx,
    /// Raster image handed to the OCR engine.
    Image,
    /// Plain UTF-8 text.
    Text,
}

impl DocumentKind {
    /// Classify a file from its display name and declared MIME type.
    pub fn detect(name: &str, mime_type: &str) -> Option<Self> {
        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => return Some(Self::Pdf),
            "docx" | "doc" => return Some(Self::Docx),
            "png" | "jpg" | "jpeg" | "tiff" | "bmp" | "gif" => return Some(Self::Image),
            "txt" | "md" | "csv" | "log" => return Some(Self::Text),
            _ => {}
        }

        match mime_type {
            "application/pdf" => Some(Self::Pdf),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "application/msword" => Some(Self::Docx),
            mime if mime.starts_with("image/") => Some(Self::Image),
            mime if mime.starts_with("text/") => Some(Self::Text),
            _ => None,
        }
    }
}

/// How a document's text was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Embedded PDF text layer.
    PdfText,
    /// OOXML `word/document.xml` runs.
    DocxXml,
    /// External OCR engine output.
    Ocr,
    /// Bytes decoded directly as UTF-8.
    Utf8Text,
}

/// Plain text extracted from one remote file. Lives for a single run.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    /// Identifier of the owning remote file.
    pub file_id: String,
    /// Extracted text.
    pub text: String,
    /// Extraction method used.
    pub method: ExtractionMethod,
    /// Number of Unicode characters in `text`.
    pub char_count: usize,
}

/// Capability interface turning file bytes into text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract plain text from `bytes` according to the file's declared type.
    async fn extract(
        &self,
        file: &RemoteFile,
        bytes: Vec<u8>,
    ) -> Result<ExtractedDocument, ExtractError>;
}

/// Format-dispatching extractor backed by the crate's format readers.
pub struct DocumentExtractor {
    ocr_command: String,
}

impl DocumentExtractor {
    /// Build an extractor that invokes `ocr_command` for images.
    pub fn new(ocr_command: impl Into<String>) -> Self {
        Self {
            ocr_command: ocr_command.into(),
        }
    }
}

#[async_trait]
impl TextExtractor for DocumentExtractor {
    async fn extract(
        &self,
        file: &RemoteFile,
        bytes: Vec<u8>,
    ) -> Result<ExtractedDocument, ExtractError> {
        let kind = DocumentKind::detect(&file.name, &file.mime_type)
            .ok_or_else(|| ExtractError::UnsupportedType(file.mime_type.clone()))?;

        let (text, method) = match kind {
            DocumentKind::Pdf => (pdf::extract_text(bytes).await?, ExtractionMethod::PdfText),
            DocumentKind::Docx => (docx::extract_text(bytes).await?, ExtractionMethod::DocxXml),
            DocumentKind::Image => (
                ocr::recognize(&self.ocr_command, bytes).await?,
                ExtractionMethod::Ocr,
            ),
            DocumentKind::Text => (
                String::from_utf8(bytes).map_err(|_| ExtractError::InvalidUtf8)?,
                ExtractionMethod::Utf8Text,
            ),
        };

        if text.trim().is_empty() {
            return Err(ExtractError::NoText);
        }

        let char_count = text.chars().count();
        tracing::debug!(
            file = %file.name,
            method = ?method,
            chars = char_count,
            "Extracted text"
        );

        Ok(ExtractedDocument {
            file_id: file.id.clone(),
            text,
            method,
            char_count,
        })
    }
}
