//! PDF text extraction.
//!
//! Turns the raw bytes of an uploaded PDF into [`DocumentUnit`]s, one per
//! page that carries any text. Extraction is CPU-bound and synchronous; async
//! callers should run it on the blocking pool.

use std::path::Path;

use crate::models::DocumentUnit;

#[derive(Debug)]
pub enum ExtractError {
    Io(String),
    Pdf(String),
    NoText,
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Io(e) => write!(f, "read failed: {}", e),
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::NoText => write!(f, "PDF contains no extractable text"),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extract per-page text from PDF bytes. Pages that are blank after trimming
/// are skipped; a document with no text at all is an error.
pub fn extract_pages(source: &str, bytes: &[u8]) -> Result<Vec<DocumentUnit>, ExtractError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;

    let units: Vec<DocumentUnit> = pages
        .into_iter()
        .enumerate()
        .filter_map(|(i, text)| {
            let text = normalize_whitespace(&text);
            (!text.is_empty()).then(|| DocumentUnit {
                source: source.to_string(),
                page: i + 1,
                text,
            })
        })
        .collect();

    if units.is_empty() {
        return Err(ExtractError::NoText);
    }

    Ok(units)
}

/// Read `path` and extract its pages. The unit source is the file name.
pub fn load_pdf(path: &Path) -> Result<Vec<DocumentUnit>, ExtractError> {
    let bytes = std::fs::read(path).map_err(|e| ExtractError::Io(e.to_string()))?;
    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    extract_pages(&source, &bytes)
}

/// Trim trailing spaces per line and collapse each run of blank lines
/// into one paragraph break, so the chunker sees stable `\n\n` boundaries.
fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;

    for line in text.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        out.push_str(line);
        blank_run = 0;
    }

    out
}
