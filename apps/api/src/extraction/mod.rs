//! Document Text Extractor: turns an uploaded resume into plain UTF-8 text.
//!
//! Synchronous and side-effect free. PDF text goes through `pdf-extract`;
//! page breaks are collapsed to whitespace and page order is preserved.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Formats the pipeline accepts for resume uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Pdf,
    PlainText,
}

impl DocumentFormat {
    /// Resolves the declared format from an upload's filename and/or content type.
    /// The content type wins when both are present and recognised.
    pub fn detect(
        filename: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<Self, ExtractionError> {
        let by_mime = content_type.and_then(|ct| {
            let essence = ct.split(';').next().unwrap_or_default().trim();
            match essence.to_ascii_lowercase().as_str() {
                "application/pdf" => Some(DocumentFormat::Pdf),
                "text/plain" => Some(DocumentFormat::PlainText),
                _ => None,
            }
        });
        if let Some(format) = by_mime {
            return Ok(format);
        }

        let extension = filename
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("pdf") => Ok(DocumentFormat::Pdf),
            Some("txt") => Ok(DocumentFormat::PlainText),
            _ => Err(ExtractionError::UnsupportedFormat(
                filename
                    .or(content_type)
                    .unwrap_or("<unnamed upload>")
                    .to_string(),
            )),
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentFormat::Pdf => f.write_str("pdf"),
            DocumentFormat::PlainText => f.write_str("plain-text"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("document is corrupt: {0}")]
    Corrupt(String),

    #[error("document contains no text")]
    Empty,

    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),
}

impl ExtractionError {
    /// Stable reason code recorded on a failed application.
    pub fn reason(&self) -> &'static str {
        match self {
            ExtractionError::Corrupt(_) => "corrupt",
            ExtractionError::Empty => "empty",
            ExtractionError::UnsupportedFormat(_) => "unsupported-format",
        }
    }
}

/// Extracts plain text from `bytes` interpreted as `format`.
pub fn extract(bytes: &[u8], format: DocumentFormat) -> Result<String, ExtractionError> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ExtractionError::Empty);
    }

    let raw = match format {
        DocumentFormat::Pdf => extract_pdf(bytes)?,
        DocumentFormat::PlainText => std::str::from_utf8(bytes)
            .map_err(|e| ExtractionError::Corrupt(format!("invalid UTF-8: {e}")))?
            .to_string(),
    };

    let text = normalize(&raw);
    if text.is_empty() {
        return Err(ExtractionError::Empty);
    }

    debug!(format = %format, chars = text.len(), "extracted resume text");
    Ok(text)
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractionError> {
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(ExtractionError::Corrupt("missing %PDF- header".to_string()));
    }

    // pdf-extract panics on some malformed object streams instead of returning an error.
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(ExtractionError::Corrupt(e.to_string())),
        Err(_) => Err(ExtractionError::Corrupt(
            "pdf parser aborted on malformed input".to_string(),
        )),
    }
}

/// Collapses page breaks, normalizes line endings, trims trailing whitespace
/// and squeezes runs of blank lines down to one.
fn normalize(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace(['\r', '\u{c}'], "\n");

    let mut lines: Vec<&str> = Vec::new();
    for line in unified.lines().map(str::trim_end) {
        let blank = line.trim().is_empty();
        if blank && lines.last().map_or(true, |prev| prev.is_empty()) {
            continue;
        }
        lines.push(if blank { "" } else { line });
    }
    while lines.last() == Some(&"") {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_returned_trimmed() {
        let text = extract(b"  Jane Doe\nBackend Engineer  \n", DocumentFormat::PlainText).unwrap();
        assert_eq!(text, "Jane Doe\nBackend Engineer");
    }

    #[test]
    fn test_page_breaks_collapse_to_whitespace_in_order() {
        let raw = "page one\u{c}page two\r\n\r\n\r\n\npage three";
        assert_eq!(normalize(raw), "page one\npage two\n\npage three");
    }

    #[test]
    fn test_empty_bytes_are_empty() {
        assert_eq!(extract(b"", DocumentFormat::Pdf), Err(ExtractionError::Empty));
        assert_eq!(
            extract(b" \n\t ", DocumentFormat::PlainText),
            Err(ExtractionError::Empty)
        );
    }

    #[test]
    fn test_form_feeds_only_is_empty() {
        assert_eq!(
            extract("\u{c}\u{c}".as_bytes(), DocumentFormat::PlainText),
            Err(ExtractionError::Empty)
        );
    }

    #[test]
    fn test_pdf_without_header_is_corrupt() {
        let err = extract(b"definitely not a pdf", DocumentFormat::Pdf).unwrap_err();
        assert_eq!(err.reason(), "corrupt");
    }

    #[test]
    fn test_truncated_pdf_is_corrupt() {
        // no xref table or trailer: rejected by the parser, never silently accepted
        let err = extract(b"%PDF-1.4\n1 0 obj\n<<", DocumentFormat::Pdf).unwrap_err();
        assert!(matches!(err, ExtractionError::Corrupt(_) | ExtractionError::Empty));
    }

    #[test]
    fn test_invalid_utf8_plain_text_is_corrupt() {
        let err = extract(&[0x66, 0x6f, 0xff, 0xfe], DocumentFormat::PlainText).unwrap_err();
        assert!(matches!(err, ExtractionError::Corrupt(_)));
    }

    #[test]
    fn test_detect_by_extension() {
        assert_eq!(
            DocumentFormat::detect(Some("Resume.PDF"), None),
            Ok(DocumentFormat::Pdf)
        );
        assert_eq!(
            DocumentFormat::detect(Some("cv.txt"), None),
            Ok(DocumentFormat::PlainText)
        );
    }

    #[test]
    fn test_detect_prefers_content_type() {
        assert_eq!(
            DocumentFormat::detect(Some("upload.bin"), Some("application/pdf")),
            Ok(DocumentFormat::Pdf)
        );
        assert_eq!(
            DocumentFormat::detect(None, Some("text/plain; charset=utf-8")),
            Ok(DocumentFormat::PlainText)
        );
    }

    #[test]
    fn test_detect_unsupported_format() {
        let err = DocumentFormat::detect(Some("resume.docx"), None).unwrap_err();
        assert_eq!(err.reason(), "unsupported-format");
        assert!(err.to_string().contains("resume.docx"));
    }
}
