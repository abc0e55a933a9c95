use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::traits::EmbeddingProvider;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Output size of `text-embedding-004`.
pub const GEMINI_EMBEDDING_DIMENSIONS: usize = 768;

const GEMINI_MAX_BATCH: usize = 100;

/// Offline embedder hashing character trigrams into a normalized histogram.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingProvider for CharacterNgramEmbedder {
    fn model_name(&self) -> &str {
        "char-trigram"
    }

    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.embed_text(text))
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TaskType {
    RetrievalQuery,
    RetrievalDocument,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: TaskType,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Gemini `embedContent` / `batchEmbedContents` client.
///
/// Documents are embedded with the `RETRIEVAL_DOCUMENT` task type and
/// queries with `RETRIEVAL_QUERY`.
pub struct GeminiEmbeddings {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl GeminiEmbeddings {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = config.require_api_key()?.to_string();
        Ok(Self {
            client: config.http_client()?,
            endpoint: Url::parse(&config.api_base)?,
            api_key,
            model: config.embedding_model.clone(),
            dimensions: config.embedding_dimensions,
        })
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    fn model_path(&self) -> String {
        format!("models/{}", self.model)
    }

    fn request<'a>(&self, text: &'a str, task_type: TaskType) -> EmbedContentRequest<'a> {
        EmbedContentRequest {
            model: self.model_path(),
            content: Content {
                parts: vec![Part { text }],
            },
            task_type,
            output_dimensionality: self.dimensions,
        }
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = self
            .endpoint
            .join(&format!("{}:{method}", self.model_path()))?;

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let details = response.text().await.unwrap_or_default();
            return Err(ProviderError::BackendResponse {
                backend: "gemini-embeddings".to_string(),
                details: format!("{status}: {details}"),
            });
        }

        Ok(response)
    }

    fn check_dimensions(&self, values: Vec<f32>) -> Result<Vec<f32>, ProviderError> {
        if values.len() != self.dimensions {
            return Err(ProviderError::InvalidResponse(format!(
                "embedding dimension {} != {}",
                values.len(),
                self.dimensions
            )));
        }
        Ok(values)
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddings {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let body = self.request(text, TaskType::RetrievalQuery);
        let parsed: EmbedContentResponse = self.post("embedContent", &body).await?.json().await?;
        self.check_dimensions(parsed.embedding.values)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(GEMINI_MAX_BATCH) {
            let body = BatchEmbedRequest {
                requests: batch
                    .iter()
                    .map(|text| self.request(text, TaskType::RetrievalDocument))
                    .collect(),
            };
            let parsed: BatchEmbedResponse =
                self.post("batchEmbedContents", &body).await?.json().await?;

            if parsed.embeddings.len() != batch.len() {
                return Err(ProviderError::InvalidResponse(format!(
                    "embedding count {} doesn't match text count {}",
                    parsed.embeddings.len(),
                    batch.len()
                )));
            }

            for embedding in parsed.embeddings {
                vectors.push(self.check_dimensions(embedding.values)?);
            }
            debug!(batch = batch.len(), total = vectors.len(), "embedded batch");
        }

        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed_text("Nitrogen deficient loam");
        let second = embedder.embed_text("Nitrogen deficient loam");
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed_text("abc");
        assert_eq!(vector.len(), 32);
    }

    #[tokio::test]
    async fn default_batch_embeds_each_text() {
        let embedder = CharacterNgramEmbedder::default();
        let texts = vec!["pH 6.5".to_string(), "potassium high".to_string()];
        let vectors = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], embedder.embed_text("potassium high"));
    }

    #[test]
    fn request_body_matches_the_gemini_wire_format() {
        let embeddings = GeminiEmbeddings::new(&ProviderConfig::new("key")).unwrap();
        let body = serde_json::to_value(embeddings.request("pH 6.5", TaskType::RetrievalDocument))
            .unwrap();

        assert_eq!(
            body,
            json!({
                "model": "models/text-embedding-004",
                "content": {"parts": [{"text": "pH 6.5"}]},
                "taskType": "RETRIEVAL_DOCUMENT",
                "outputDimensionality": 768,
            })
        );
    }

    #[test]
    fn configured_dimensions_are_requested_and_enforced() {
        let mut config = ProviderConfig::new("key");
        config.embedding_model = "gemini-embedding-001".to_string();
        config.embedding_dimensions = 3072;
        let embeddings = GeminiEmbeddings::new(&config).unwrap();

        let body = serde_json::to_value(embeddings.request("K high", TaskType::RetrievalQuery))
            .unwrap();
        assert_eq!(body["outputDimensionality"], 3072);
        assert_eq!(body["model"], "models/gemini-embedding-001");
        assert_eq!(embeddings.dimensions(), 3072);
        assert!(embeddings.check_dimensions(vec![0.0; 3072]).is_ok());
        assert!(embeddings.check_dimensions(vec![0.0; 768]).is_err());
    }

    #[test]
    fn batch_response_is_parsed() {
        let parsed: BatchEmbedResponse = serde_json::from_value(json!({
            "embeddings": [{"values": [0.1, 0.2]}, {"values": [0.3, 0.4]}]
        }))
        .unwrap();
        assert_eq!(parsed.embeddings.len(), 2);
        assert_eq!(parsed.embeddings[1].values, vec![0.3, 0.4]);
    }

    #[test]
    fn wrong_dimension_is_rejected() {
        let embeddings = GeminiEmbeddings::new(&ProviderConfig::new("key"))
            .unwrap()
            .with_dimensions(4);
        assert!(embeddings.check_dimensions(vec![0.0; 3]).is_err());
        assert!(embeddings.check_dimensions(vec![0.0; 4]).is_ok());
    }

    #[test]
    fn missing_key_fails_construction() {
        assert!(GeminiEmbeddings::new(&ProviderConfig::new("")).is_err());
    }
}
