use crate::error::IndexError;
use crate::models::{DocumentChunk, RetrievedChunk};
use crate::stores::LocalVectorStore;
use crate::traits::{EmbeddingProvider, VectorIndex};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_TOP_K: usize = 6;

/// Query-bound view over an index: embeds the query, returns the top-k chunks.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    provider: Arc<dyn EmbeddingProvider>,
    top_k: usize,
}

impl Retriever {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        provider: Arc<dyn EmbeddingProvider>,
        top_k: usize,
    ) -> Self {
        Self {
            index,
            provider,
            top_k,
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>, IndexError> {
        let query_vector = self.provider.embed(query).await?;
        self.index.search_vector(&query_vector, self.top_k)
    }
}

/// Opens the index at `persist_location` without creating anything.
pub fn open_index(
    persist_location: &Path,
    provider: Arc<dyn EmbeddingProvider>,
) -> Result<(Arc<LocalVectorStore>, Retriever), IndexError> {
    let store = LocalVectorStore::open(
        persist_location,
        provider.model_name(),
        provider.dimensions(),
    )?;
    Ok(into_handles(store, provider))
}

/// Appends `chunks` to the index at `persist_location`, creating it first if
/// needed.
///
/// An existing but unusable directory (corrupt files, other embedding model)
/// is moved aside to `<dir>.stale-<timestamp>` and replaced by a new index.
/// All embeddings are computed before the directory is touched, so a
/// provider failure leaves the persisted index as it was.
pub async fn build_or_update(
    chunks: &[DocumentChunk],
    persist_location: &Path,
    provider: Arc<dyn EmbeddingProvider>,
) -> Result<(Arc<LocalVectorStore>, Retriever), IndexError> {
    let model = provider.model_name().to_string();
    let dimensions = provider.dimensions();

    let (existing, stale_reason) =
        match LocalVectorStore::open(persist_location, &model, dimensions) {
            Ok(store) => (Some(store), None),
            Err(IndexError::NotFound(_)) => (None, None),
            Err(IndexError::State(reason)) => (None, Some(reason)),
            Err(other) => return Err(other),
        };

    let texts = chunks
        .iter()
        .map(|chunk| chunk.content.clone())
        .collect::<Vec<_>>();
    let embeddings = if texts.is_empty() {
        Vec::new()
    } else {
        provider.embed_batch(&texts).await?
    };

    let mut store = match existing {
        Some(store) => {
            info!(
                location = %persist_location.display(),
                entries = store.len(),
                "appending to existing index"
            );
            store
        }
        None => {
            if let Some(reason) = stale_reason {
                let stale_copy = move_aside(persist_location)?;
                warn!(
                    location = %persist_location.display(),
                    stale_copy = %stale_copy.display(),
                    %reason,
                    "index unusable, recreating"
                );
            }
            info!(location = %persist_location.display(), %model, dimensions, "creating index");
            LocalVectorStore::create(persist_location, &model, dimensions)?
        }
    };

    let added = store.add_chunks(chunks, &embeddings)?;
    info!(added, total = store.len(), "index updated");

    Ok(into_handles(store, provider))
}

fn into_handles(
    store: LocalVectorStore,
    provider: Arc<dyn EmbeddingProvider>,
) -> (Arc<LocalVectorStore>, Retriever) {
    let store = Arc::new(store);
    let retriever = Retriever::new(store.clone(), provider, DEFAULT_TOP_K);
    (store, retriever)
}

fn move_aside(location: &Path) -> Result<PathBuf, IndexError> {
    let mut stale = location.as_os_str().to_owned();
    stale.push(format!(".stale-{}", Utc::now().format("%Y%m%dT%H%M%S%.3f")));
    let stale = PathBuf::from(stale);
    fs::rename(location, &stale)?;
    Ok(stale)
}
