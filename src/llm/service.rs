use std::sync::Arc;
use std::time::Duration;

use super::openai::OpenAiProvider;
use super::provider::LlmProvider;
use super::types::{ChatMessage, ChatRequest};
use crate::core::config::AppConfig;
use crate::core::errors::RagError;
use crate::core::retry::RetryPolicy;

/// Pins one chat model and one embedding model for both ingestion and retrieval.
#[derive(Clone)]
pub struct LlmService {
    provider: Arc<dyn LlmProvider>,
    chat_model: String,
    embedding_model: String,
    dimension: usize,
    retry: RetryPolicy,
    temperature: Option<f64>,
    max_tokens: Option<i32>,
}

impl LlmService {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        chat_model: impl Into<String>,
        embedding_model: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            provider,
            chat_model: chat_model.into(),
            embedding_model: embedding_model.into(),
            dimension,
            retry: RetryPolicy::none(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, RagError> {
        let provider = OpenAiProvider::from_config(&config.llm)?;
        Ok(Self::new(
            Arc::new(provider),
            &config.llm.chat_model,
            &config.embedding.model,
            config.embedding.dimension,
        )
        .with_retry(RetryPolicy::new(
            config.embedding.max_attempts,
            Duration::from_millis(config.embedding.retry_base_delay_ms),
        ))
        .with_sampling(config.llm.temperature, config.llm.max_tokens))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sampling(mut self, temperature: Option<f64>, max_tokens: Option<i32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn chat_model(&self) -> &str {
        &self.chat_model
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub async fn health_check(&self) -> Result<bool, RagError> {
        self.provider.health_check().await
    }

    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, RagError> {
        let mut request = ChatRequest::new(messages);
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;
        self.provider.chat(request, &self.chat_model).await
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("provider returned no vector".to_string()))
    }

    /// Embeds `texts` in order, retrying transient provider failures.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let label = format!("embedding {} text(s) with {}", texts.len(), self.embedding_model);
        let vectors = self
            .retry
            .run(&label, || {
                let provider = self.provider.clone();
                let model = self.embedding_model.clone();
                let inputs = texts.to_vec();
                async move { provider.embed(&inputs, &model).await }
            })
            .await?;

        if vectors.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "expected {} vectors, provider returned {}",
                texts.len(),
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(RagError::Embedding(format!(
                "model {} returned dimension {}, expected {}",
                self.embedding_model,
                bad.len(),
                self.dimension
            )));
        }

        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProvider {
        failures_left: AtomicU32,
        dimension: usize,
    }

    #[async_trait]
    impl LlmProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn health_check(&self) -> Result<bool, RagError> {
            Ok(true)
        }

        async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, RagError> {
            Ok(format!("{}:{}", model_id, request.messages.len()))
        }

        async fn embed(&self, inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, RagError> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(RagError::EmbeddingUnavailable("429".into()));
            }
            Ok(inputs.iter().map(|_| vec![0.5; self.dimension]).collect())
        }
    }

    fn service(failures: u32, provider_dim: usize) -> LlmService {
        let provider = FlakyProvider {
            failures_left: AtomicU32::new(failures),
            dimension: provider_dim,
        };
        LlmService::new(Arc::new(provider), "gpt-4o", "text-embedding-3-small", 3)
            .with_retry(RetryPolicy::new(3, Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn embed_batch_retries_transient_failures() {
        let vectors = service(2, 3)
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
    }

    #[tokio::test]
    async fn embed_batch_gives_up_after_budget() {
        let err = service(5, 3).embed_batch(&["a".to_string()]).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn wrong_dimension_is_rejected() {
        let err = service(0, 4).embed("a").await.unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
    }

    #[tokio::test]
    async fn chat_uses_pinned_model() {
        let reply = service(0, 3).chat(vec![ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(reply, "gpt-4o:1");
    }
}
