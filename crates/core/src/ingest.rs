use crate::{
    chunking::chunk_pages, DocumentChunk, DocumentFingerprint, IngestError, IngestionOptions,
    PdfExtractor, UploadedPdf,
};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct SkippedPdf {
    pub source: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct IngestionReport {
    pub documents: Vec<DocumentFingerprint>,
    pub chunks: Vec<DocumentChunk>,
    pub skipped_files: Vec<SkippedPdf>,
}

/// Reads PDFs from disk into uploads. Unreadable paths are reported, not fatal.
pub fn load_uploads(paths: &[PathBuf]) -> (Vec<UploadedPdf>, Vec<SkippedPdf>) {
    let mut uploads = Vec::new();
    let mut skipped = Vec::new();

    for path in paths {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            skipped.push(SkippedPdf {
                source: path.display().to_string(),
                reason: IngestError::MissingFileName(path.display().to_string()).to_string(),
            });
            continue;
        };

        match fs::read(path) {
            Ok(bytes) => uploads.push(UploadedPdf::new(name, bytes)),
            Err(error) => skipped.push(SkippedPdf {
                source: path.display().to_string(),
                reason: error.to_string(),
            }),
        }
    }

    (uploads, skipped)
}

/// Extracts and chunks every upload, skipping files that fail to extract.
///
/// Fails with [`IngestError::NoDocuments`] when not a single file produced text.
pub fn ingest_uploads_best_effort(
    uploads: &[UploadedPdf],
    extractor: &dyn PdfExtractor,
    options: &IngestionOptions,
) -> Result<IngestionReport, IngestError> {
    let mut report = IngestionReport::default();
    let mut cursor = 0u64;

    for upload in uploads {
        let build_result = (|| {
            let pages = extractor.extract(&upload.name, &upload.bytes)?;
            let fingerprint = build_document_fingerprint(upload, pages.len());
            let (chunks, next_cursor) =
                chunk_pages(&fingerprint.document_id, &pages, options, cursor)?;
            Ok::<_, IngestError>((fingerprint, chunks, next_cursor))
        })();

        match build_result {
            Ok((fingerprint, chunks, next_cursor)) => {
                cursor = next_cursor;
                report.documents.push(fingerprint);
                report.chunks.extend(chunks);
            }
            Err(error @ IngestError::InvalidChunkConfig(_)) => return Err(error),
            Err(error) => {
                warn!(source = %upload.name, reason = %error, "skipped pdf");
                report.skipped_files.push(SkippedPdf {
                    source: upload.name.clone(),
                    reason: error.to_string(),
                });
            }
        }
    }

    if report.documents.is_empty() {
        return Err(IngestError::NoDocuments);
    }

    info!(
        documents = report.documents.len(),
        chunks = report.chunks.len(),
        skipped = report.skipped_files.len(),
        "extracted upload batch"
    );

    Ok(report)
}

fn build_document_fingerprint(upload: &UploadedPdf, page_count: usize) -> DocumentFingerprint {
    DocumentFingerprint {
        document_id: generate_document_id(&upload.name),
        document_title: display_title(&upload.name),
        source: upload.name.clone(),
        checksum: digest_bytes(&upload.bytes),
        page_count,
        ingested_at: Utc::now(),
    }
}

fn display_title(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(name)
        .to_string()
}

fn generate_document_id(name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TextExtractor;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    fn small_chunks() -> IngestionOptions {
        IngestionOptions {
            chunk_max_chars: 8,
            chunk_overlap_chars: 2,
        }
    }

    #[test]
    fn discover_pdf_files_is_recursive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(nested.join("b.PDF"))
            .and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(base.join("notes.txt")).and_then(|mut file| file.write_all(b"text"))?;

        let files = discover_pdf_files(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[test]
    fn checksum_is_reproducible() {
        assert_eq!(digest_bytes(b"abc"), digest_bytes(b"abc"));
        assert_ne!(digest_bytes(b"abc"), digest_bytes(b"abd"));
    }

    #[test]
    fn ordinals_continue_across_documents() -> Result<(), Box<dyn std::error::Error>> {
        let uploads = vec![
            UploadedPdf::new("first.pdf", b"alpha beta gamma\x0cdelta".to_vec()),
            UploadedPdf::new("second.pdf", b"epsilon zeta".to_vec()),
        ];

        let report = ingest_uploads_best_effort(&uploads, &TextExtractor, &small_chunks())?;

        assert_eq!(report.documents.len(), 2);
        assert_eq!(report.documents[0].page_count, 2);
        assert_eq!(report.documents[0].document_title, "first");
        for (expected, chunk) in report.chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, expected as u64);
        }
        let last = report.chunks.last().expect("chunks");
        assert_eq!(last.source, "second.pdf");
        Ok(())
    }

    #[test]
    fn failing_file_is_skipped_when_others_succeed() -> Result<(), Box<dyn std::error::Error>> {
        let uploads = vec![
            UploadedPdf::new("bad.pdf", vec![0xff, 0xfe, 0xfd]),
            UploadedPdf::new("good.pdf", b"readable text".to_vec()),
        ];

        let report = ingest_uploads_best_effort(&uploads, &TextExtractor, &small_chunks())?;

        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.skipped_files.len(), 1);
        assert_eq!(report.skipped_files[0].source, "bad.pdf");
        assert!(report.chunks.iter().all(|chunk| chunk.source == "good.pdf"));
        Ok(())
    }

    #[test]
    fn ingestion_fails_without_any_readable_document() {
        let uploads = vec![UploadedPdf::new("unreadable.pdf", b"%PDF-1.4\n%broken".to_vec())];
        let result =
            ingest_uploads_best_effort(&uploads, &crate::LopdfExtractor, &IngestionOptions::default());
        assert!(matches!(result, Err(IngestError::NoDocuments)));
    }

    #[test]
    fn empty_upload_set_has_no_documents() {
        let result =
            ingest_uploads_best_effort(&[], &TextExtractor, &IngestionOptions::default());
        assert!(matches!(result, Err(IngestError::NoDocuments)));
    }

    #[test]
    fn invalid_chunk_config_aborts_the_batch() {
        let uploads = vec![UploadedPdf::new("good.pdf", b"readable".to_vec())];
        let options = IngestionOptions {
            chunk_max_chars: 4,
            chunk_overlap_chars: 4,
        };
        let result = ingest_uploads_best_effort(&uploads, &TextExtractor, &options);
        assert!(matches!(result, Err(IngestError::InvalidChunkConfig(_))));
    }

    #[test]
    fn unreadable_paths_are_reported() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let present = dir.path().join("present.pdf");
        fs::write(&present, b"%PDF-1.4")?;
        let missing = dir.path().join("missing.pdf");

        let (uploads, skipped) = load_uploads(&[present, missing]);

        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].name, "present.pdf");
        assert_eq!(skipped.len(), 1);
        assert!(skipped[0].source.ends_with("missing.pdf"));
        Ok(())
    }

    #[test]
    fn nameless_path_is_skipped_without_dropping_the_batch() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let good = dir.path().join("good.pdf");
        fs::write(&good, b"%PDF-1.4")?;
        fs::create_dir(dir.path().join("sub"))?;
        let nameless = dir.path().join("sub").join("..");

        let (uploads, skipped) = load_uploads(&[good, nameless]);

        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].name, "good.pdf");
        assert_eq!(skipped.len(), 1);
        assert!(skipped[0].reason.contains("no file name"));
        Ok(())
    }
}
