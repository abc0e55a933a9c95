use serde::{Deserialize, Serialize};

/// Provenance attached to every document and every chunk cut from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DocumentMetadata {
    pub source: String,
    pub page: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceDocument {
    pub content: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentChunk {
    pub chunk_index: u64,
    /// Byte offset of `content` inside the parent document's content.
    pub start_offset: usize,
    pub content: String,
    pub content_hash: String,
    pub metadata: DocumentMetadata,
}

impl DocumentChunk {
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub score: f32,
    pub chunk: DocumentChunk,
}

impl RetrievedChunk {
    pub fn source(&self) -> &str {
        &self.chunk.metadata.source
    }

    pub fn page(&self) -> u32 {
        self.chunk.metadata.page
    }
}
