use std::path::Path;

use log::{debug, warn};

use crate::error::{AnalysisError, Result};

/// Formats the extractor can read natively. Everything else is rejected as
/// `UnsupportedFormat` before any parsing work starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    PlainText,
}

/// One page of cleaned document text. Page boundaries matter because table
/// heuristics work page-local geometry.
#[derive(Debug, Clone)]
pub struct DocumentText {
    pub pages: Vec<String>,
}

impl DocumentText {
    pub fn full_text(&self) -> String {
        self.pages.join("\n\n")
    }

    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(|p| p.trim().is_empty())
    }
}

pub fn sniff_format(path: &Path, bytes: &[u8]) -> Result<DocumentFormat> {
    if bytes.starts_with(b"%PDF") {
        return Ok(DocumentFormat::Pdf);
    }
    // DOCX/XLSX are zip containers. The original backend never parsed them;
    // callers should convert to PDF first.
    if bytes.starts_with(b"PK\x03\x04") {
        return Err(AnalysisError::UnsupportedFormat(
            "Office container formats (docx/xlsx) are not parsed directly; convert to PDF"
                .to_string(),
        ));
    }

    let mime = mime_guess::from_path(path).first_or_octet_stream();
    match (mime.type_().as_str(), mime.subtype().as_str()) {
        ("application", "pdf") => Ok(DocumentFormat::Pdf),
        ("text", _) => Ok(DocumentFormat::PlainText),
        _ if looks_like_text(bytes) => Ok(DocumentFormat::PlainText),
        _ => Err(AnalysisError::UnsupportedFormat(format!(
            "unrecognized format '{}' for {}",
            mime,
            path.display()
        ))),
    }
}

fn looks_like_text(bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        return false;
    }
    let sample = &bytes[..bytes.len().min(4096)];
    let printable = sample
        .iter()
        .filter(|b| b.is_ascii_graphic() || b.is_ascii_whitespace())
        .count();
    printable as f64 / sample.len() as f64 > 0.95
}

/// Reads the document's text layer, one entry per page.
pub fn read_document(path: &Path, bytes: &[u8]) -> Result<DocumentText> {
    match sniff_format(path, bytes)? {
        DocumentFormat::Pdf => read_pdf(bytes),
        DocumentFormat::PlainText => {
            let text = String::from_utf8_lossy(bytes);
            let pages = text
                .split('\u{c}')
                .map(clean_text)
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>();
            if pages.is_empty() {
                return Err(AnalysisError::CorruptFile(format!(
                    "{} contains no text",
                    path.display()
                )));
            }
            Ok(DocumentText { pages })
        }
    }
}

fn read_pdf(bytes: &[u8]) -> Result<DocumentText> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| AnalysisError::CorruptFile(format!("PDF parse failed: {}", e)))?;

    let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    if page_numbers.is_empty() {
        return Err(AnalysisError::CorruptFile("PDF has no pages".to_string()));
    }

    let mut pages = Vec::with_capacity(page_numbers.len());
    for page in &page_numbers {
        match doc.extract_text(&[*page]) {
            Ok(text) => pages.push(clean_text(&text)),
            Err(e) => {
                // A single undecodable page (scanned image, broken encoding)
                // is left empty; the per-statement fallback handles it.
                warn!("page {}: text extraction failed: {}", page, e);
                pages.push(String::new());
            }
        }
    }

    let doc = DocumentText { pages };
    if doc.is_empty() {
        return Err(AnalysisError::CorruptFile(
            "PDF has no extractable text layer".to_string(),
        ));
    }

    debug!("read {} pages of PDF text", doc.pages.len());
    Ok(doc)
}

/// Normalizes extracted text: strips decorative glyphs while keeping line
/// structure, column spacing, and the symbols financial tables rely on.
pub fn clean_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for line in raw.lines() {
        let cleaned: String = line
            .chars()
            .map(|c| if c == '\u{2019}' { '\'' } else { c })
            .filter(|c| {
                c.is_alphanumeric()
                    || c.is_whitespace()
                    || matches!(c, '$' | '€' | '£' | '¥' | '%' | '(' | ')' | ',' | '.' | '-' | '&' | '/' | ':' | '\'')
            })
            .collect();
        let trimmed = cleaned.trim_end();
        if !trimmed.is_empty() {
            out.push_str(trimmed);
        }
        out.push('\n');
    }
    out.trim_matches('\n').to_string()
}

/// Keywords that mark financial content. A document whose tables failed
/// geometry AND whose text mentions none of these is not a financial report.
pub const FINANCIAL_KEYWORDS: &[&str] = &[
    "revenue",
    "net income",
    "net sales",
    "total assets",
    "total liabilities",
    "shareholders equity",
    "stockholders equity",
    "cash flow",
    "operating activities",
    "income statement",
    "balance sheet",
    "earnings per share",
    "gross profit",
];

pub fn contains_financial_keywords(text: &str) -> bool {
    let lower = text.to_lowercase();
    FINANCIAL_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn sniffs_pdf_from_magic_bytes() {
        let fmt = sniff_format(&PathBuf::from("report.bin"), b"%PDF-1.7 rest").unwrap();
        assert_eq!(fmt, DocumentFormat::Pdf);
    }

    #[test]
    fn rejects_docx_containers() {
        let err = sniff_format(&PathBuf::from("report.docx"), b"PK\x03\x04zip").unwrap_err();
        assert!(matches!(err, AnalysisError::UnsupportedFormat(_)));
    }

    #[test]
    fn accepts_plain_text() {
        let fmt = sniff_format(&PathBuf::from("report.txt"), b"Revenue 100").unwrap();
        assert_eq!(fmt, DocumentFormat::PlainText);
    }

    #[test]
    fn rejects_binary_garbage() {
        let bytes = [0u8, 159, 146, 150, 7, 255, 0, 12];
        let err = sniff_format(&PathBuf::from("blob.dat"), &bytes).unwrap_err();
        assert!(matches!(err, AnalysisError::UnsupportedFormat(_)));
    }

    #[test]
    fn corrupt_pdf_is_reported() {
        let err = read_document(&PathBuf::from("broken.pdf"), b"%PDF-1.4 truncated").unwrap_err();
        assert!(matches!(err, AnalysisError::CorruptFile(_)));
    }

    #[test]
    fn clean_text_preserves_financial_symbols() {
        let cleaned = clean_text("Revenue\t $1,234.5  (55%) #@!\nNet income  12");
        assert!(cleaned.contains("$1,234.5"));
        assert!(cleaned.contains("(55%)"));
        assert!(!cleaned.contains('#'));
    }

    #[test]
    fn clean_text_keeps_possessive_labels_intact() {
        let cleaned = clean_text("Total shareholders' equity   50,100   43,700");
        assert!(cleaned.contains("shareholders' equity"));

        // Typographic apostrophes normalize to ASCII.
        let curly = clean_text("Total shareholders\u{2019} equity   50,100");
        assert!(curly.contains("shareholders' equity"));
    }

    #[test]
    fn keyword_scan_is_case_insensitive() {
        assert!(contains_financial_keywords("TOTAL ASSETS were flat"));
        assert!(!contains_financial_keywords("a travel blog about mountains"));
    }

    #[test]
    fn plain_text_pages_split_on_form_feed() {
        let doc = read_document(
            &PathBuf::from("r.txt"),
            b"page one revenue\x0cpage two assets",
        )
        .unwrap();
        assert_eq!(doc.pages.len(), 2);
    }
}
