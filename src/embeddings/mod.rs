//! Pluggable embedding backends behind a single async trait, selected by the
//! resolved `EmbeddingSettings`.

mod cohere;
mod ollama;
mod openai;
pub mod scheduler;
mod voyage;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{EmbeddingSettings, Provider};
use scheduler::{RetryPolicy, Scheduler, SharedScheduler};

/// A backend capable of turning text into dense vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one batch of documents, preserving input order.
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    /// Embed a single query string.
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut batch = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        Ok(batch.pop().unwrap_or_default())
    }

    fn dimensions(&self) -> u32;
    fn model_id(&self) -> &str;
}

/// Shared context every backend wraps its HTTP calls in: the reqwest client,
/// the scheduler (concurrency/spacing/rate budget), and the retry policy.
pub(crate) struct BackendContext {
    pub client: reqwest::Client,
    pub scheduler: SharedScheduler,
    pub retry: RetryPolicy,
    pub base_url: String,
    pub model: String,
    pub dimensions: u32,
    pub api_key: Option<String>,
}

impl BackendContext {
    fn from_settings(settings: &EmbeddingSettings) -> Self {
        let max_concurrent = 4;
        let min_spacing = Duration::from_millis(0);
        Self {
            client: reqwest::Client::new(),
            scheduler: Arc::new(Scheduler::new(max_concurrent, min_spacing, settings.max_requests_per_minute)),
            // `retry_attempts` counts retries after the initial call, so the
            // total number of attempts the policy allows is one more than that.
            retry: RetryPolicy { max_attempts: settings.retry_attempts.saturating_add(1), base_delay: settings.retry_delay },
            base_url: settings.base_url.clone(),
            model: settings.model.clone(),
            dimensions: settings.dimensions,
            api_key: settings.api_key.clone(),
        }
    }
}

/// Build the provider named by `settings.provider`.
pub fn create_provider(settings: &EmbeddingSettings) -> Box<dyn EmbeddingProvider> {
    let ctx = BackendContext::from_settings(settings);
    match settings.provider {
        Provider::OpenAi => Box::new(openai::OpenAiProvider::new(ctx)),
        Provider::Cohere => Box::new(cohere::CohereProvider::new(ctx)),
        Provider::Voyage => Box::new(voyage::VoyageProvider::new(ctx)),
        Provider::Ollama => Box::new(ollama::OllamaProvider::new(ctx)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoProvider {
        dims: u32,
    }

    #[async_trait]
    impl EmbeddingProvider for EchoProvider {
        async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32; self.dims as usize]).collect())
        }
        fn dimensions(&self) -> u32 {
            self.dims
        }
        fn model_id(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn default_embed_delegates_to_embed_batch() {
        let provider = EchoProvider { dims: 3 };
        let v = provider.embed("abcd").await.unwrap();
        assert_eq!(v, vec![4.0, 4.0, 4.0]);
    }
}
