use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;

    /// Whole-document text: non-empty pages joined with newlines.
    fn extract_text(&self, path: &Path) -> Result<String, IngestError> {
        let pages = self.extract_pages(path)?;
        Ok(join_pages(&pages))
    }
}

/// Page-by-page extraction with `lopdf`. An unreadable document is an error; an
/// unreadable page is logged and skipped.
#[derive(Debug, Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            match document.extract_text(&[page_no]) {
                Ok(text) if !text.trim().is_empty() => pages.push(PageText {
                    number: page_no,
                    text,
                }),
                Ok(_) => debug!(path = %path.display(), page = page_no, "page has no text"),
                Err(error) => warn!(
                    path = %path.display(),
                    page = page_no,
                    error = %error,
                    "skipping page that failed to extract"
                ),
            }
        }

        Ok(pages)
    }
}

/// Joins page texts with newlines. Yields an empty string for a PDF with no text layer.
pub fn join_pages(pages: &[PageText]) -> String {
    let mut text = String::new();
    for page in pages {
        text.push_str(&page.text);
        text.push('\n');
    }
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn pages_are_joined_in_order_and_trimmed() {
        let pages = vec![
            PageText {
                number: 1,
                text: "  First page".to_string(),
            },
            PageText {
                number: 2,
                text: "Second page  ".to_string(),
            },
        ];
        assert_eq!(join_pages(&pages), "First page\nSecond page");
        assert_eq!(join_pages(&[]), "");
    }

    #[test]
    fn unreadable_pdf_is_a_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"%PDF-1.4\n%broken")?;

        assert!(matches!(
            LopdfExtractor.extract_text(&path),
            Err(IngestError::PdfParse(_))
        ));
        Ok(())
    }
}
