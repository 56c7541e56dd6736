//! Text extraction from uploaded documents: the digital text layer of PDFs,
//! or plain UTF-8 text files. Scanned documents are flagged, not OCR'd.

use std::path::Path;

use thiserror::Error;

use crate::screening::models::TextQuality;

/// Below this many characters the text layer is considered too thin to trust.
pub const SPARSE_TEXT_CHARS: usize = 100;

#[derive(Debug, Error)]
pub enum TextExtractError {
    #[error("Unsupported file type: {0} (only .pdf and .txt are accepted)")]
    UnsupportedType(String),

    #[error("PDF text extraction failed: {0}")]
    Pdf(String),

    #[error("Text file is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub text: String,
    pub quality: TextQuality,
}

impl ExtractedText {
    fn from_raw(raw: String) -> Self {
        let text = raw.trim().to_string();
        let quality = if text.chars().count() < SPARSE_TEXT_CHARS {
            TextQuality::Sparse
        } else {
            TextQuality::Digital
        };
        Self { text, quality }
    }
}

/// Extracts text from `data`, dispatching on the extension of `file_name`.
/// CPU-bound for PDFs; call it from `spawn_blocking` in async contexts.
pub fn extract_text(file_name: &str, data: &[u8]) -> Result<ExtractedText, TextExtractError> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|v| v.to_str())
        .map(|v| v.to_ascii_lowercase())
        .unwrap_or_default();

    let raw = match extension.as_str() {
        "pdf" => pdf_extract::extract_text_from_mem(data)
            .map_err(|e| TextExtractError::Pdf(e.to_string()))?,
        "txt" => String::from_utf8(data.to_vec())?,
        _ => return Err(TextExtractError::UnsupportedType(file_name.to_string())),
    };

    Ok(ExtractedText::from_raw(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_trimmed_and_digital() {
        let body = format!("  {}  \n", "Experience and education. ".repeat(8));
        let extracted = extract_text("cv.TXT", body.as_bytes()).unwrap();
        assert_eq!(extracted.quality, TextQuality::Digital);
        assert!(!extracted.text.starts_with(' '));
        assert!(!extracted.text.ends_with('\n'));
    }

    #[test]
    fn test_short_text_is_sparse() {
        let extracted = extract_text("cv.txt", b"Jane Doe").unwrap();
        assert_eq!(extracted.quality, TextQuality::Sparse);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = extract_text("cv.docx", b"irrelevant").unwrap_err();
        assert!(matches!(err, TextExtractError::UnsupportedType(_)));
    }

    #[test]
    fn test_invalid_utf8_text() {
        let err = extract_text("cv.txt", &[0xff, 0xfe, 0xfd]).unwrap_err();
        assert!(matches!(err, TextExtractError::Encoding(_)));
    }
}
