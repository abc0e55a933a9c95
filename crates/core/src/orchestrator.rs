use crate::analysis::{
    build_prompt, parse_analysis, render_context, AnalysisReport, ContextSource, SoilAnalysis,
};
use crate::error::AnalysisError;
use crate::index::Retriever;
use crate::models::RetrievedChunk;
use crate::traits::LanguageModel;
use tracing::{debug, info};

/// Fixed query used to pull report context out of the index.
pub const CONTEXT_QUERY: &str =
    "soil parameters, nutrients, pH, EC, organic matter, recommendations";

/// Prompt assembly, a single model call and a validating parse.
pub struct AnalysisOrchestrator<L>
where
    L: LanguageModel,
{
    llm: L,
}

impl<L> AnalysisOrchestrator<L>
where
    L: LanguageModel,
{
    pub fn new(llm: L) -> Self {
        Self { llm }
    }

    pub async fn analyze(
        &self,
        report_text: &str,
        context: &[RetrievedChunk],
    ) -> Result<SoilAnalysis, AnalysisError> {
        let prompt = build_prompt(report_text, &render_context(context))?;
        debug!(
            model = self.llm.model_name(),
            prompt_chars = prompt.len(),
            context_chunks = context.len(),
            "invoking language model"
        );

        let raw = self.llm.complete(&prompt).await?;
        parse_analysis(&raw)
    }

    /// Retrieves context for the report and analyzes it.
    ///
    /// `retriever` is the handle of an index built earlier; without one the
    /// call fails with [`AnalysisError::IndexRequired`].
    pub async fn analyze_with_retriever(
        &self,
        report_text: &str,
        retriever: Option<&Retriever>,
    ) -> Result<AnalysisReport, AnalysisError> {
        let retriever = retriever.ok_or(AnalysisError::IndexRequired)?;

        let context = retriever.retrieve(CONTEXT_QUERY).await?;
        info!(retrieved = context.len(), "retrieved report context");

        let analysis = self.analyze(report_text, &context).await?;

        Ok(AnalysisReport {
            analysis,
            context_sources: context
                .iter()
                .map(|hit| ContextSource {
                    source: hit.source().to_string(),
                    page: hit.page(),
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::ProviderError;
    use crate::index::build_or_update;
    use crate::models::{DocumentChunk, DocumentMetadata};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    const CONFORMING: &str = r#"{"quality":"Moderately acidic, nitrogen-deficient","recommended_crops":["beans","clover"],"suggestions":"Add nitrogen-rich compost"}"#;

    #[derive(Default)]
    struct FakeLanguageModel {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl FakeLanguageModel {
        fn replying(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for FakeLanguageModel {
        fn model_name(&self) -> &str {
            "fake"
        }

        async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    struct UnreachableModel;

    #[async_trait]
    impl LanguageModel for UnreachableModel {
        fn model_name(&self) -> &str {
            "down"
        }

        async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
            Err(ProviderError::BackendResponse {
                backend: "fake".to_string(),
                details: "503 Service Unavailable".to_string(),
            })
        }
    }

    fn chunk(page: u32, content: &str) -> DocumentChunk {
        DocumentChunk {
            chunk_index: 0,
            start_offset: 0,
            content: content.to_string(),
            content_hash: String::new(),
            metadata: DocumentMetadata {
                source: "report.pdf".to_string(),
                page,
            },
        }
    }

    #[tokio::test]
    async fn conforming_reply_becomes_the_result() {
        let orchestrator = AnalysisOrchestrator::new(FakeLanguageModel::replying(CONFORMING));
        let result = orchestrator
            .analyze("pH 6.5, Nitrogen low, Phosphorus medium", &[])
            .await
            .unwrap();

        assert_eq!(
            result,
            SoilAnalysis {
                quality: "Moderately acidic, nitrogen-deficient".to_string(),
                recommended_crops: vec!["beans".to_string(), "clover".to_string()],
                suggestions: "Add nitrogen-rich compost".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn missing_crops_fails_without_partial_result() {
        let orchestrator = AnalysisOrchestrator::new(FakeLanguageModel::replying(
            r#"{"quality":"Moderately acidic","suggestions":"Add compost"}"#,
        ));
        let result = orchestrator.analyze("pH 6.5", &[]).await;
        assert!(matches!(result, Err(AnalysisError::SchemaParse(_))));
    }

    #[tokio::test]
    async fn provider_errors_are_surfaced() {
        let orchestrator = AnalysisOrchestrator::new(UnreachableModel);
        let result = orchestrator.analyze("pH 6.5", &[]).await;
        assert!(matches!(result, Err(AnalysisError::Provider(_))));
    }

    #[tokio::test]
    async fn analysis_requires_an_index_handle() {
        let orchestrator = AnalysisOrchestrator::new(FakeLanguageModel::replying(CONFORMING));
        let result = orchestrator.analyze_with_retriever("pH 6.5", None).await;
        assert!(matches!(result, Err(AnalysisError::IndexRequired)));
    }

    #[tokio::test]
    async fn retrieved_context_reaches_the_prompt_and_provenance() {
        let dir = tempdir().unwrap();
        let (_, retriever) = build_or_update(
            &[chunk(1, "pH: 6.5, N: low"), chunk(2, "P: medium, K: high")],
            &dir.path().join("chroma_db"),
            Arc::new(CharacterNgramEmbedder::default()),
        )
        .await
        .unwrap();

        let orchestrator = AnalysisOrchestrator::new(FakeLanguageModel::replying(CONFORMING));
        let report = orchestrator
            .analyze_with_retriever("pH: 6.5, N: low\nP: medium, K: high", Some(&retriever))
            .await
            .unwrap();

        assert_eq!(report.analysis.recommended_crops, vec!["beans", "clover"]);
        assert_eq!(report.context_sources.len(), 2);
        let mut pages = report
            .context_sources
            .iter()
            .map(|source| source.page)
            .collect::<Vec<_>>();
        pages.sort_unstable();
        assert_eq!(pages, vec![1, 2]);

        let prompts = orchestrator.llm.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("[p.1] pH: 6.5, N: low"));
        assert!(prompts[0].contains("[p.2] P: medium, K: high"));
    }
}
