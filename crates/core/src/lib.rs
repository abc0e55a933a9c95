pub mod analysis;
pub mod chunking;
pub mod config;
pub mod documents;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod stores;
pub mod traits;

pub use analysis::{
    build_prompt, format_instructions, parse_analysis, render_context, AnalysisReport,
    ContextSource, SoilAnalysis, CONTEXT_PREVIEW_CHARS,
};
pub use chunking::{
    chunk_documents, ChunkingConfig, RecursiveChunker, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE,
    DEFAULT_SEPARATORS,
};
pub use config::ProviderConfig;
pub use documents::pages_to_documents;
pub use embeddings::{
    CharacterNgramEmbedder, GeminiEmbeddings, DEFAULT_EMBEDDING_DIMENSIONS,
    GEMINI_EMBEDDING_DIMENSIONS,
};
pub use error::{AnalysisError, IndexError, IngestError, ProviderError};
pub use extractor::{join_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use index::{build_or_update, open_index, Retriever, DEFAULT_TOP_K};
pub use ingest::{
    discover_pdf_files, ingest_reports_best_effort, load_report, IngestionReport, SkippedPdf,
    SoilReport,
};
pub use llm::GeminiChat;
pub use models::{
    DocumentChunk, DocumentMetadata, RetrievedChunk, SourceDocument,
};
pub use orchestrator::{AnalysisOrchestrator, CONTEXT_QUERY};
pub use stores::LocalVectorStore;
pub use traits::{EmbeddingProvider, LanguageModel, VectorIndex};
