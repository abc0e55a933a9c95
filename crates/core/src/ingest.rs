use crate::chunking::{chunk_documents, ChunkingConfig};
use crate::documents::pages_to_documents;
use crate::extractor::{join_page_texts, LopdfExtractor, PageText, PdfExtractor};
use crate::models::{DocumentChunk, SourceDocument};
use crate::IngestError;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// An extracted report: its file name and its pages.
#[derive(Debug, Clone)]
pub struct SoilReport {
    pub source: String,
    pub pages: Vec<PageText>,
}

impl SoilReport {
    pub fn from_bytes(
        source: impl Into<String>,
        bytes: &[u8],
        extractor: &dyn PdfExtractor,
    ) -> Result<Self, IngestError> {
        let source = source.into();
        let pages = extractor.extract_pages(bytes).map_err(|error| match error {
            IngestError::PdfParse(details) => IngestError::PdfParse(format!("{source}: {details}")),
            other => other,
        })?;
        Ok(Self { source, pages })
    }

    /// Text handed to the model: every page, newline separated.
    pub fn full_text(&self) -> String {
        join_page_texts(&self.pages)
    }

    pub fn documents(&self) -> Result<Vec<SourceDocument>, IngestError> {
        pages_to_documents(&self.pages, &self.source)
    }

    pub fn chunks(&self, config: &ChunkingConfig) -> Result<Vec<DocumentChunk>, IngestError> {
        chunk_documents(&self.documents()?, config)
    }
}

pub fn load_report(path: &Path) -> Result<SoilReport, IngestError> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
        })?;
    let bytes = fs::read(path)?;
    SoilReport::from_bytes(name, &bytes, &LopdfExtractor)
}

/// A single file is returned as is; a directory is walked for `*.pdf`.
pub fn discover_pdf_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }

    let mut files = Vec::new();

    for entry in WalkDir::new(path)
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

pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

pub struct IngestionReport {
    pub chunks: Vec<DocumentChunk>,
    pub reports: usize,
    pub skipped_files: Vec<SkippedPdf>,
}

/// Loads and chunks every report under `path`, skipping unreadable files.
pub fn ingest_reports_best_effort(
    path: &Path,
    config: &ChunkingConfig,
) -> Result<IngestionReport, IngestError> {
    config.validate()?;
    let files = discover_pdf_files(path);

    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no pdf files found in {}",
            path.display()
        )));
    }

    let mut chunks = Vec::new();
    let mut reports = 0;
    let mut skipped_files = Vec::new();

    for file in files {
        match load_report(&file).and_then(|report| report.chunks(config)) {
            Ok(report_chunks) => {
                reports += 1;
                chunks.extend(report_chunks);
            }
            Err(error) => skipped_files.push(SkippedPdf {
                path: file,
                reason: error.to_string(),
            }),
        }
    }

    Ok(IngestionReport {
        chunks,
        reports,
        skipped_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::tests::make_test_pdf;
    use std::fs::{self, File};
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
        fs::write(base.join("notes.txt"), b"not a report")?;

        let files = discover_pdf_files(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[test]
    fn single_file_is_discovered_as_is() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file = dir.path().join("report.pdf");
        fs::write(&file, b"%PDF-1.4")?;
        assert_eq!(discover_pdf_files(&file), vec![file]);
        Ok(())
    }

    #[test]
    fn report_keeps_the_file_name_as_source() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file = dir.path().join("field-7.pdf");
        fs::write(&file, make_test_pdf(&["pH 6.5 Nitrogen low", "Potassium high"]))?;

        let report = load_report(&file)?;
        assert_eq!(report.source, "field-7.pdf");
        assert_eq!(report.pages.len(), 2);

        let chunks = report.chunks(&ChunkingConfig::default())?;
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|chunk| chunk.metadata.source == "field-7.pdf"));
        assert!(report.full_text().contains("Potassium"));
        Ok(())
    }

    #[test]
    fn ingestion_fails_without_pdfs() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let result = ingest_reports_best_effort(dir.path(), &ChunkingConfig::default());
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn best_effort_skips_unreadable_pdfs() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("unreadable.pdf"), b"%PDF-1.4\n%broken")?;
        fs::write(dir.path().join("good.pdf"), make_test_pdf(&["Organic matter 2.1"]))?;

        let report = ingest_reports_best_effort(dir.path(), &ChunkingConfig::default())?;

        assert_eq!(report.reports, 1);
        assert_eq!(report.chunks.len(), 1);
        assert_eq!(report.skipped_files.len(), 1);
        assert_eq!(
            report.skipped_files[0]
                .path
                .file_name()
                .and_then(|name| name.to_str()),
            Some("unreadable.pdf")
        );
        Ok(())
    }
}
