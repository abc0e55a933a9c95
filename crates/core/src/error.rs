use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Failures talking to a hosted embedding or chat model.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("unexpected provider payload: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("no index found at {0}")]
    NotFound(String),

    /// The directory exists but cannot be used with the current provider.
    #[error("index state error: {0}")]
    State(String),

    #[error("embedding provider failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("index request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("language model failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("model output does not match the analysis schema: {0}")]
    SchemaParse(String),

    #[error("could not render the analysis schema: {0}")]
    SchemaRender(#[from] serde_json::Error),

    #[error("retrieval failed: {0}")]
    Index(#[from] IndexError),

    #[error("no index available; index the report before analyzing it")]
    IndexRequired,
}
