use crate::chunking::{chunk_text, clean_text, ChunkingConfig};
use crate::extractor::PdfExtractor;
use crate::models::ExtraMetadata;
use crate::IngestError;
use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub fn is_pdf_filename(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        if entry.path().to_str().is_some_and(is_pdf_filename) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Chunks of one PDF plus the metadata every chunk record will carry.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    pub filename: String,
    pub chunks: Vec<String>,
    pub metadata: ExtraMetadata,
}

/// Extract, clean and chunk a PDF stored at `path` under the display name `filename`.
pub fn prepare_pdf(
    extractor: &dyn PdfExtractor,
    path: &Path,
    filename: &str,
    config: ChunkingConfig,
) -> Result<PreparedDocument, IngestError> {
    let text = extractor.extract_text(path)?;
    let text = clean_text(&text)?;
    let chunks = chunk_text(&text, config)?;

    if chunks.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no extractable text in {filename}"
        )));
    }

    let mut metadata = ExtraMetadata::new();
    metadata.insert("filename".to_string(), Value::from(filename));
    metadata.insert("checksum".to_string(), Value::from(digest_file(path)?));
    metadata.insert(
        "ingested_at".to_string(),
        Value::from(Utc::now().to_rfc3339()),
    );

    Ok(PreparedDocument {
        filename: filename.to_string(),
        chunks,
        metadata,
    })
}

/// Display name for a path: its final component.
pub fn display_name(path: &Path) -> Result<String, IngestError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
        })
}

#[derive(Debug)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug)]
pub struct IngestedPdf {
    pub path: PathBuf,
    pub document_id: String,
    pub chunks_count: usize,
}

#[derive(Debug, Default)]
pub struct IngestionReport {
    pub ingested: Vec<IngestedPdf>,
    pub skipped_files: Vec<SkippedPdf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{LopdfExtractor, PageText};
    use crate::testing::write_text_pdf;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn discover_pdf_files_is_recursive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(nested.join("b.PDF"))
            .and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(base.join("notes.txt"))?;

        let files = discover_pdf_files(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[test]
    fn checksum_is_reproducible() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file_path = dir.path().join("a.pdf");
        fs::write(&file_path, b"abc")?;

        let first = digest_file(&file_path)?;
        let second = digest_file(&file_path)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn pdf_names_are_matched_case_insensitively() {
        assert!(is_pdf_filename("report.PDF"));
        assert!(is_pdf_filename("a.pdf"));
        assert!(!is_pdf_filename("a.pdf.txt"));
        assert!(!is_pdf_filename("pdf"));
    }

    #[test]
    fn prepared_pdf_carries_filename_and_checksum() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("upload.tmp");
        write_text_pdf(&path, &["The sky is blue.", "Water is wet."])?;

        let prepared = prepare_pdf(&LopdfExtractor, &path, "a.pdf", ChunkingConfig::default())?;
        assert_eq!(prepared.chunks.len(), 1);
        assert!(prepared.chunks[0].contains("sky"));
        assert_eq!(prepared.metadata.get("filename"), Some(&Value::from("a.pdf")));
        assert_eq!(
            prepared.metadata.get("checksum"),
            Some(&Value::from(digest_file(&path)?))
        );
        assert!(prepared.metadata.contains_key("ingested_at"));
        Ok(())
    }

    #[test]
    fn unreadable_pdf_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"%PDF-1.4\n%broken")?;
        assert!(matches!(
            prepare_pdf(&LopdfExtractor, &path, "broken.pdf", ChunkingConfig::default()),
            Err(IngestError::PdfParse(_))
        ));
        Ok(())
    }

    struct ScannedPages(Vec<&'static str>);

    impl PdfExtractor for ScannedPages {
        fn extract_pages(&self, _path: &Path) -> Result<Vec<PageText>, IngestError> {
            Ok(self
                .0
                .iter()
                .enumerate()
                .map(|(index, text)| PageText {
                    number: index as u32 + 1,
                    text: text.to_string(),
                })
                .collect())
        }
    }

    #[test]
    fn pages_are_cleaned_before_chunking() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("scan.pdf");
        fs::write(&path, b"bytes only hashed")?;

        let extractor = ScannedPages(vec!["First   page text.\n\n\n\n1", "Second page."]);
        let prepared = prepare_pdf(&extractor, &path, "scan.pdf", ChunkingConfig::default())?;
        assert_eq!(prepared.chunks, vec!["First page text. Second page."]);

        let blank = ScannedPages(vec!["   ", "7"]);
        assert!(matches!(
            prepare_pdf(&blank, &path, "scan.pdf", ChunkingConfig::default()),
            Err(IngestError::InvalidArgument(_))
        ));
        Ok(())
    }
}
