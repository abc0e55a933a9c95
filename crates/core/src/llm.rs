use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::traits::LanguageModel;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use url::Url;

/// Gemini `generateContent` client used for the analysis step.
pub struct GeminiChat {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    temperature: f32,
}

impl GeminiChat {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = config.require_api_key()?.to_string();
        Ok(Self {
            client: config.http_client()?,
            endpoint: Url::parse(&config.api_base)?,
            api_key,
            model: config.chat_model.clone(),
            temperature: config.temperature,
        })
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": prompt}],
            }],
            "generationConfig": {
                "temperature": self.temperature,
            },
        })
    }
}

#[async_trait]
impl LanguageModel for GeminiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = self
            .endpoint
            .join(&format!("models/{}:generateContent", self.model))?;

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(prompt))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let details = response.text().await.unwrap_or_default();
            return Err(ProviderError::BackendResponse {
                backend: "gemini".to_string(),
                details: format!("{status}: {details}"),
            });
        }

        let parsed: Value = response.json().await?;
        candidate_text(&parsed)
    }
}

fn candidate_text(payload: &Value) -> Result<String, ProviderError> {
    let parts = payload
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array);

    let Some(parts) = parts else {
        let reason = payload
            .pointer("/promptFeedback/blockReason")
            .and_then(Value::as_str)
            .unwrap_or("no candidates returned");
        return Err(ProviderError::InvalidResponse(reason.to_string()));
    };

    let text = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<String>();

    if text.trim().is_empty() {
        return Err(ProviderError::InvalidResponse(
            "candidate has no text parts".to_string(),
        ));
    }

    Ok(text)
}
