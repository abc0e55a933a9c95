use crate::error::AnalysisError;
use crate::models::RetrievedChunk;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Characters of each retrieved chunk quoted in the prompt.
pub const CONTEXT_PREVIEW_CHARS: usize = 800;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct SoilAnalysis {
    /// Brief summary of soil quality
    pub quality: String,
    /// List of suitable crops
    pub recommended_crops: Vec<String>,
    /// Detailed suggestions to improve soil
    pub suggestions: String,
}

impl SoilAnalysis {
    pub fn json_schema() -> Result<serde_json::Value, AnalysisError> {
        Ok(serde_json::to_value(schemars::schema_for!(SoilAnalysis))?)
    }
}

/// Where a piece of retrieved context came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextSource {
    pub source: String,
    pub page: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub analysis: SoilAnalysis,
    pub context_sources: Vec<ContextSource>,
}

pub fn format_instructions() -> Result<String, AnalysisError> {
    let schema = serde_json::to_string(&SoilAnalysis::json_schema()?)?;
    Ok(format!(
        "The output must be a single JSON object that conforms to the JSON schema below.\n\
         All three properties are required: \"quality\" (string), \"recommended_crops\" \
         (array of strings) and \"suggestions\" (string).\n\
         Return only the JSON object, without commentary.\n\n\
         Schema:\n```\n{schema}\n```"
    ))
}

/// Renders chunks as `[p.<page>] <preview>` blocks separated by blank lines.
pub fn render_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|hit| {
            let preview = hit
                .chunk
                .content
                .chars()
                .take(CONTEXT_PREVIEW_CHARS)
                .collect::<String>();
            format!("[p.{}] {}", hit.page(), preview)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_prompt(report_text: &str, context: &str) -> Result<String, AnalysisError> {
    let context = if context.trim().is_empty() {
        "(no indexed context available)"
    } else {
        context
    };

    Ok(format!(
        "You are an expert soil analyst and agronomist. Analyze the following soil report \
         and respond in the specified format.\n\
         Base every statement on the values present in the soil report; do not assume \
         values that are not reported. The retrieved context is supplementary and may be \
         incomplete; when it disagrees with the report, the report wins.\n\n\
         Retrieved context:\n{context}\n\n\
         Soil Report:\n{report_text}\n\n\
         {}\n",
        format_instructions()?
    ))
}

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("valid regex")
});

/// Strict parse of raw model output into [`SoilAnalysis`].
///
/// Accepts a bare JSON object or one wrapped in a fenced code block. Missing
/// fields, wrong types or malformed JSON fail with
/// [`AnalysisError::SchemaParse`]; nothing is coerced.
pub fn parse_analysis(raw: &str) -> Result<SoilAnalysis, AnalysisError> {
    let trimmed = raw.trim();
    let candidate = FENCED_BLOCK
        .captures(trimmed)
        .and_then(|captures| captures.get(1))
        .map(|body| body.as_str().trim())
        .unwrap_or(trimmed);

    let json = match (candidate.find('{'), candidate.rfind('}')) {
        (Some(start), Some(end)) if start < end => &candidate[start..=end],
        _ => {
            return Err(AnalysisError::SchemaParse(format!(
                "no JSON object in model output: {}",
                preview(trimmed)
            )))
        }
    };

    serde_json::from_str::<SoilAnalysis>(json)
        .map_err(|error| AnalysisError::SchemaParse(format!("{error}; output: {}", preview(json))))
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 200;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(LIMIT).collect::<String>())
    }
}
