use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::scheduler::{retry_with_backoff, CallOutcome};
use super::{BackendContext, EmbeddingProvider};

/// Ollama's `/api/embeddings` takes one prompt per call; batches are issued
/// as a sequence of calls, each still governed by the shared scheduler.
pub struct OllamaProvider {
    ctx: BackendContext,
}

impl OllamaProvider {
    pub fn new(ctx: BackendContext) -> Self {
        Self { ctx }
    }

    async fn embed_one(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.ctx.base_url);

        retry_with_backoff(self.ctx.retry, |_attempt| {
            let url = url.clone();
            async move {
                let _permit = self.ctx.scheduler.acquire().await;
                let body = Request { model: &self.ctx.model, prompt: text };
                let resp = match self.ctx.client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => return CallOutcome::Fatal(e.into()),
                };

                if resp.status().as_u16() == 429 {
                    return CallOutcome::RateLimited { retry_after: None };
                }

                let resp = match resp.error_for_status() {
                    Ok(r) => r,
                    Err(e) => return CallOutcome::Fatal(e.into()),
                };

                match resp.json::<Response>().await {
                    Ok(parsed) => CallOutcome::Success(parsed.embedding),
                    Err(e) => CallOutcome::Fatal(e.into()),
                }
            }
        })
        .await
    }
}

#[derive(Serialize)]
struct Request<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct Response {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed_one(text).await?);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> u32 {
        self.ctx.dimensions
    }

    fn model_id(&self) -> &str {
        &self.ctx.model
    }
}
