pub mod local;

pub use local::{cosine_similarity, IndexEntry, IndexManifest, LocalVectorStore, INDEX_FORMAT_VERSION};
