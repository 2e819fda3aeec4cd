//! Page-level text extraction for reference documents.
//!
//! Each supported format yields a list of page texts:
//!
//! | Kind | Pages |
//! |------|-------|
//! | PDF | one entry per page, in page order |
//! | DOCX | a single entry holding `word/document.xml` text, one line per paragraph |
//! | Plain text / Markdown | a single entry holding the UTF-8 file contents |
//!
//! Malformed input yields an [`ExtractError`]; the ingestor logs it and
//! skips the file.

use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use thiserror::Error;

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
    #[error("file is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Document formats the ingestor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    PlainText,
}

impl DocumentKind {
    /// Classify a path by its (case-insensitive) extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "docx" => Some(DocumentKind::Docx),
            "txt" | "md" | "markdown" => Some(DocumentKind::PlainText),
            _ => None,
        }
    }
}

/// Extract page texts from `bytes` read from a file of the given kind.
pub fn extract_pages(bytes: &[u8], kind: DocumentKind) -> Result<Vec<String>, ExtractError> {
    match kind {
        DocumentKind::Pdf => extract_pdf(bytes),
        DocumentKind::Docx => Ok(vec![extract_docx(bytes)?]),
        DocumentKind::PlainText => Ok(vec![String::from_utf8(bytes.to_vec())?]),
    }
}

/// Convenience wrapper that classifies `path` first.
pub fn extract_file_pages(path: &Path, bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    let kind = DocumentKind::from_path(path)
        .ok_or_else(|| ExtractError::Unsupported(path.display().to_string()))?;
    extract_pages(bytes, kind)
}

fn extract_pdf(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    paragraphs_text(&doc_xml)
}

/// Collect `<w:t>` runs, emitting one line per `<w:p>` paragraph.
fn paragraphs_text(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut paragraph = String::new();
    let mut in_text = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| ExtractError::Docx(e.to_string()))?;
                paragraph.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let line = paragraph.trim();
                    if !line.is_empty() {
                        out.push_str(line);
                        out.push('\n');
                    }
                    paragraph.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    let tail = paragraph.trim();
    if !tail.is_empty() {
        out.push_str(tail);
    }
    Ok(out.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
            .collect();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn test_kind_from_path() {
        assert_eq!(DocumentKind::from_path(Path::new("a/B.PDF")), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_path(Path::new("notes.md")), Some(DocumentKind::PlainText));
        assert_eq!(DocumentKind::from_path(Path::new("x.docx")), Some(DocumentKind::Docx));
        assert_eq!(DocumentKind::from_path(Path::new("img.png")), None);
        assert_eq!(DocumentKind::from_path(Path::new("README")), None);
    }

    #[test]
    fn test_plain_text_is_single_page() {
        let pages = extract_pages("Warfarin interacts with aspirin.".as_bytes(), DocumentKind::PlainText)
            .unwrap();
        assert_eq!(pages, vec!["Warfarin interacts with aspirin.".to_string()]);
    }

    #[test]
    fn test_invalid_utf8_is_encoding_error() {
        let err = extract_pages(&[0xff, 0xfe, 0x00], DocumentKind::PlainText).unwrap_err();
        assert!(matches!(err, ExtractError::Encoding(_)));
    }

    #[test]
    fn test_docx_paragraphs_become_lines() {
        let bytes = docx_with_paragraphs(&["First paragraph.", "Second &amp; last."]);
        let pages = extract_pages(&bytes, DocumentKind::Docx).unwrap();
        assert_eq!(pages, vec!["First paragraph.\nSecond & last.".to_string()]);
    }

    #[test]
    fn test_invalid_pdf_returns_error() {
        let err = extract_pages(b"not a pdf", DocumentKind::Pdf).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn test_invalid_zip_returns_error_for_docx() {
        let err = extract_pages(b"not a zip", DocumentKind::Docx).unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn test_unsupported_path() {
        let err = extract_file_pages(Path::new("scan.tiff"), b"").unwrap_err();
        assert!(matches!(err, ExtractError::Unsupported(_)));
    }
}
