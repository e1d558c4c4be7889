use crate::error::IngestError;
use crate::models::PageText;
use lopdf::Document;
use std::path::Path;

/// Turns raw PDF bytes into one text segment per page, in page order.
pub trait PdfExtractor {
    fn extract(&self, source: &str, bytes: &[u8]) -> Result<Vec<PageText>, IngestError>;

    fn extract_path(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let bytes = std::fs::read(path)?;
        self.extract(&path.to_string_lossy(), &bytes)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract(&self, source: &str, bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
        let document = Document::load_mem(bytes).map_err(|error| extraction_error(source, error))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| extraction_error(source, error))?;

            if !text.trim().is_empty() {
                pages.push(PageText {
                    source: source.to_string(),
                    page: page_no,
                    text,
                });
            }
        }

        if pages.is_empty() {
            return Err(IngestError::Extraction {
                source_name: source.to_string(),
                reason: "pdf had no readable page text".to_string(),
            });
        }

        Ok(pages)
    }
}

fn extraction_error(source: &str, error: lopdf::Error) -> IngestError {
    IngestError::Extraction {
        source_name: source.to_string(),
        reason: error.to_string(),
    }
}

pub fn extract_page_texts(path: &Path) -> Result<Vec<PageText>, IngestError> {
    LopdfExtractor.extract_path(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn malformed_pdf_reports_source_name() {
        let result = LopdfExtractor.extract("broken.pdf", b"%PDF-1.4\n%broken");

        match result {
            Err(IngestError::Extraction { source_name, .. }) => {
                assert_eq!(source_name, "broken.pdf")
            }
            other => panic!("expected extraction error, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempdir().expect("tempdir");
        let result = extract_page_texts(&dir.path().join("absent.pdf"));
        assert!(matches!(result, Err(IngestError::Io(_))));
    }

    #[test]
    fn extract_path_uses_path_as_source() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("notes.pdf");
        fs::write(&path, b"not a pdf at all")?;

        let error = extract_page_texts(&path).expect_err("garbage must not parse");
        assert!(error.to_string().contains("notes.pdf"));
        Ok(())
    }
}
