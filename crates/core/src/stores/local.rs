use crate::error::IndexError;
use crate::models::{DocumentChunk, RetrievedChunk};
use crate::traits::VectorIndex;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;
use uuid::Uuid;

pub const INDEX_FORMAT_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";
const SEGMENTS_DIR: &str = "segments";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexManifest {
    pub format_version: u32,
    pub model: String,
    pub dimensions: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: Uuid,
    pub chunk: DocumentChunk,
    pub embedding: Vec<f32>,
}

/// Directory-backed vector index with brute-force cosine search.
///
/// Layout: `manifest.json` plus one JSON file per append under
/// `segments/`, named `<seq>-<uuid>.json`. Segments are written to a
/// temporary file in the same directory and renamed into place, so a
/// segment is either fully present or absent. Entries are never rewritten.
#[derive(Debug)]
pub struct LocalVectorStore {
    root: PathBuf,
    manifest: IndexManifest,
    entries: Vec<IndexEntry>,
    segment_count: usize,
}

impl LocalVectorStore {
    /// Opens an existing index bound to `model`/`dimensions`.
    ///
    /// Returns [`IndexError::NotFound`] when `root` does not exist and
    /// [`IndexError::State`] when it exists but is unreadable as an index or
    /// was built by a different embedding model.
    pub fn open(root: &Path, model: &str, dimensions: usize) -> Result<Self, IndexError> {
        if !root.exists() {
            return Err(IndexError::NotFound(root.display().to_string()));
        }
        if !root.is_dir() {
            return Err(IndexError::State(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let manifest_path = root.join(MANIFEST_FILE);
        let raw = match fs::read(&manifest_path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(IndexError::State(format!(
                    "missing {} in {}",
                    MANIFEST_FILE,
                    root.display()
                )))
            }
            Err(error) => {
                return Err(IndexError::State(format!(
                    "unreadable {}: {error}",
                    manifest_path.display()
                )))
            }
        };
        let manifest: IndexManifest = serde_json::from_slice(&raw)
            .map_err(|error| IndexError::State(format!("unreadable manifest: {error}")))?;

        if manifest.format_version != INDEX_FORMAT_VERSION {
            return Err(IndexError::State(format!(
                "index format {} is not supported (expected {})",
                manifest.format_version, INDEX_FORMAT_VERSION
            )));
        }
        if manifest.model != model || manifest.dimensions != dimensions {
            return Err(IndexError::State(format!(
                "index was built with {} ({} dims), provider is {} ({} dims)",
                manifest.model, manifest.dimensions, model, dimensions
            )));
        }

        let segment_paths = list_segments(&root.join(SEGMENTS_DIR))?;
        let mut entries = Vec::new();
        for path in &segment_paths {
            let raw = fs::read(path).map_err(|error| {
                IndexError::State(format!("unreadable segment {}: {error}", path.display()))
            })?;
            let segment: Vec<IndexEntry> = serde_json::from_slice(&raw).map_err(|error| {
                IndexError::State(format!("unreadable segment {}: {error}", path.display()))
            })?;
            if let Some(bad) = segment.iter().find(|entry| entry.embedding.len() != dimensions) {
                return Err(IndexError::State(format!(
                    "entry {} has {} dims in {}",
                    bad.id,
                    bad.embedding.len(),
                    path.display()
                )));
            }
            entries.extend(segment);
        }

        debug!(
            root = %root.display(),
            segments = segment_paths.len(),
            entries = entries.len(),
            "opened vector index"
        );

        Ok(Self {
            root: root.to_path_buf(),
            manifest,
            entries,
            segment_count: segment_paths.len(),
        })
    }

    /// Creates an empty index at `root`. The directory must not hold an index.
    pub fn create(root: &Path, model: &str, dimensions: usize) -> Result<Self, IndexError> {
        if root.join(MANIFEST_FILE).exists() {
            return Err(IndexError::Request(format!(
                "an index already exists at {}",
                root.display()
            )));
        }

        fs::create_dir_all(root.join(SEGMENTS_DIR))?;

        let manifest = IndexManifest {
            format_version: INDEX_FORMAT_VERSION,
            model: model.to_string(),
            dimensions,
            created_at: Utc::now(),
        };
        write_atomic(root, &root.join(MANIFEST_FILE), &serde_json::to_vec_pretty(&manifest)?)?;

        Ok(Self {
            root: root.to_path_buf(),
            manifest,
            entries: Vec::new(),
            segment_count: 0,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn segment_count(&self) -> usize {
        self.segment_count
    }
}

impl VectorIndex for LocalVectorStore {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn add_chunks(
        &mut self,
        chunks: &[DocumentChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<usize, IndexError> {
        if chunks.len() != embeddings.len() {
            return Err(IndexError::Request(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        let segment = chunks
            .iter()
            .zip(embeddings.iter())
            .map(|(chunk, embedding)| {
                if embedding.len() != self.manifest.dimensions {
                    return Err(IndexError::Request(format!(
                        "embedding dimension {} != {}",
                        embedding.len(),
                        self.manifest.dimensions
                    )));
                }

                Ok(IndexEntry {
                    id: Uuid::new_v4(),
                    chunk: chunk.clone(),
                    embedding: embedding.clone(),
                })
            })
            .collect::<Result<Vec<_>, IndexError>>()?;

        if segment.is_empty() {
            return Ok(0);
        }

        let segments_dir = self.root.join(SEGMENTS_DIR);
        fs::create_dir_all(&segments_dir)?;
        let file_name = format!("{:06}-{}.json", self.segment_count + 1, Uuid::new_v4());
        write_atomic(
            &segments_dir,
            &segments_dir.join(&file_name),
            &serde_json::to_vec(&segment)?,
        )?;

        let added = segment.len();
        self.segment_count += 1;
        self.entries.extend(segment);

        debug!(segment = %file_name, added, total = self.entries.len(), "appended segment");
        Ok(added)
    }

    fn search_vector(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, IndexError> {
        if query_vector.len() != self.manifest.dimensions {
            return Err(IndexError::Request(format!(
                "query vector dim {} is not {}",
                query_vector.len(),
                self.manifest.dimensions
            )));
        }

        let mut scored = self
            .entries
            .iter()
            .map(|entry| (cosine_similarity(query_vector, &entry.embedding), entry))
            .collect::<Vec<_>>();

        // Stable: equal scores keep append order.
        scored.sort_by(|left, right| right.0.total_cmp(&left.0));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, entry)| RetrievedChunk {
                score,
                chunk: entry.chunk.clone(),
            })
            .collect())
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

fn list_segments(dir: &Path) -> Result<Vec<PathBuf>, IndexError> {
    let listing = match fs::read_dir(dir) {
        Ok(listing) => listing,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => {
            return Err(IndexError::State(format!(
                "unreadable {}: {error}",
                dir.display()
            )))
        }
    };

    let mut paths = Vec::new();
    for entry in listing {
        let path = entry
            .map_err(|error| IndexError::State(format!("unreadable {}: {error}", dir.display())))?
            .path();
        let is_segment = path.is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "json");
        if is_segment {
            paths.push(path);
        }
    }

    paths.sort_unstable();
    Ok(paths)
}

fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(target).map_err(|error| IndexError::Io(error.error))?;
    Ok(())
}
