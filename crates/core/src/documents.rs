use crate::error::IngestError;
use crate::extractor::PageText;
use crate::models::{DocumentMetadata, SourceDocument};

/// One document per extracted page, tagged with the originating file name.
///
/// Blank pages are passed through untouched; only a zero page number is
/// rejected since page numbers are 1-based.
pub fn pages_to_documents(
    pages: &[PageText],
    source: &str,
) -> Result<Vec<SourceDocument>, IngestError> {
    pages
        .iter()
        .map(|page| {
            if page.number == 0 {
                return Err(IngestError::InvalidArgument(format!(
                    "page numbers start at 1 (source {source})"
                )));
            }

            Ok(SourceDocument {
                content: page.text.clone(),
                metadata: DocumentMetadata {
                    source: source.to_string(),
                    page: page.number,
                },
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_page_becomes_a_document() {
        let pages = vec![
            PageText::new(1, "pH: 6.5, N: low"),
            PageText::new(2, "P: medium, K: high"),
        ];

        let documents = pages_to_documents(&pages, "report.pdf").unwrap();

        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].content, "pH: 6.5, N: low");
        assert_eq!(
            documents[0].metadata,
            DocumentMetadata {
                source: "report.pdf".to_string(),
                page: 1
            }
        );
        assert_eq!(documents[1].metadata.page, 2);
        assert_eq!(documents[1].metadata.source, "report.pdf");
    }

    #[test]
    fn blank_pages_are_kept() {
        let pages = vec![PageText::new(1, ""), PageText::new(2, "   ")];
        let documents = pages_to_documents(&pages, "scan.pdf").unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].content, "");
    }

    #[test]
    fn page_zero_is_rejected() {
        let pages = vec![PageText::new(0, "text")];
        let result = pages_to_documents(&pages, "bad.pdf");
        assert!(matches!(result, Err(IngestError::InvalidArgument(_))));
    }
}
