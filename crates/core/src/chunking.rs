use crate::error::IngestError;
use crate::models::{DocumentChunk, SourceDocument};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::ops::Range;

/// Paragraph, line, word, then single characters.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];
pub const DEFAULT_CHUNK_SIZE: usize = 1_200;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length, counted in characters.
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub separators: Vec<String>,
    pub strip_whitespace: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
            strip_whitespace: false,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Piece {
    start: usize,
    end: usize,
    chars: usize,
}

/// Recursive separator splitter.
///
/// A text is cut on the first separator from the priority list that occurs
/// in it, keeping each separator at the start of the piece that follows it.
/// Pieces shorter than the chunk size are merged back into windows; longer
/// pieces are split again with the lower-priority separators. The empty
/// separator splits into single characters, which is the hard-cut fallback.
///
/// Windows are byte ranges into the input, so chunks are exact substrings
/// and carry their start offset.
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    config: ChunkingConfig,
}

impl RecursiveChunker {
    pub fn new(config: ChunkingConfig) -> Result<Self, IngestError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Byte ranges of the chunks of `text`, in order.
    pub fn split_ranges(&self, text: &str) -> Vec<Range<usize>> {
        let mut windows = Vec::new();
        self.split_recursive(text, 0..text.len(), &self.config.separators, &mut windows);

        if !self.config.strip_whitespace {
            return windows;
        }

        windows
            .into_iter()
            .filter_map(|range| {
                let window = &text[range.clone()];
                let trimmed = window.trim();
                if trimmed.is_empty() {
                    return None;
                }
                let start = range.start + (window.len() - window.trim_start().len());
                Some(start..start + trimmed.len())
            })
            .collect()
    }

    pub fn split_document(&self, document: &SourceDocument) -> Vec<DocumentChunk> {
        self.split_ranges(&document.content)
            .into_iter()
            .enumerate()
            .map(|(index, range)| {
                let content = document.content[range.clone()].to_string();
                DocumentChunk {
                    chunk_index: index as u64,
                    start_offset: range.start,
                    content_hash: content_hash(&content),
                    content,
                    metadata: document.metadata.clone(),
                }
            })
            .collect()
    }

    fn split_recursive(
        &self,
        text: &str,
        range: Range<usize>,
        separators: &[String],
        windows: &mut Vec<Range<usize>>,
    ) {
        let segment = &text[range.clone()];

        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut lower_priority: &[String] = &[];
        for (position, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if segment.contains(candidate.as_str()) {
                separator = candidate.as_str();
                lower_priority = &separators[position + 1..];
                break;
            }
        }

        let mut fitting = Vec::new();
        for piece in split_keeping_separator(segment, separator, range.start) {
            if piece.chars < self.config.chunk_size {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                self.merge_pieces(&fitting, windows);
                fitting.clear();
            }

            if lower_priority.is_empty() {
                windows.push(piece.start..piece.end);
            } else {
                self.split_recursive(text, piece.start..piece.end, lower_priority, windows);
            }
        }

        if !fitting.is_empty() {
            self.merge_pieces(&fitting, windows);
        }
    }

    fn merge_pieces(&self, pieces: &[Piece], windows: &mut Vec<Range<usize>>) {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut current: VecDeque<Piece> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            if total + piece.chars > size {
                if let (Some(first), Some(last)) = (current.front(), current.back()) {
                    windows.push(first.start..last.end);
                }

                // Keep a tail no longer than the overlap that still leaves
                // room for the incoming piece.
                while total > overlap || (total + piece.chars > size && total > 0) {
                    match current.pop_front() {
                        Some(dropped) => total -= dropped.chars,
                        None => break,
                    }
                }
            }

            current.push_back(*piece);
            total += piece.chars;
        }

        if let (Some(first), Some(last)) = (current.front(), current.back()) {
            windows.push(first.start..last.end);
        }
    }
}

fn split_keeping_separator(segment: &str, separator: &str, base: usize) -> Vec<Piece> {
    if separator.is_empty() {
        return segment
            .char_indices()
            .map(|(offset, ch)| Piece {
                start: base + offset,
                end: base + offset + ch.len_utf8(),
                chars: 1,
            })
            .collect();
    }

    let mut pieces = Vec::new();
    let mut piece_start = 0;
    for (offset, _) in segment.match_indices(separator) {
        if offset > piece_start {
            pieces.push(make_piece(segment, piece_start..offset, base));
        }
        piece_start = offset;
    }
    if piece_start < segment.len() {
        pieces.push(make_piece(segment, piece_start..segment.len(), base));
    }
    pieces
}

fn make_piece(segment: &str, range: Range<usize>, base: usize) -> Piece {
    Piece {
        start: base + range.start,
        end: base + range.end,
        chars: segment[range].chars().count(),
    }
}

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Splits every document and keeps each document's metadata on its chunks.
pub fn chunk_documents(
    documents: &[SourceDocument],
    config: &ChunkingConfig,
) -> Result<Vec<DocumentChunk>, IngestError> {
    let chunker = RecursiveChunker::new(config.clone())?;
    Ok(documents
        .iter()
        .flat_map(|document| chunker.split_document(document))
        .collect())
}
