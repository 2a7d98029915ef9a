use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::scheduler::{retry_with_backoff, CallOutcome};
use super::{BackendContext, EmbeddingProvider};

pub struct OpenAiProvider {
    ctx: BackendContext,
}

impl OpenAiProvider {
    pub fn new(ctx: BackendContext) -> Self {
        Self { ctx }
    }
}

#[derive(Serialize)]
struct Request<'a> {
    input: &'a [String],
    model: &'a str,
    dimensions: u32,
}

#[derive(Deserialize)]
struct Response {
    data: Vec<Embedding>,
}

#[derive(Deserialize)]
struct Embedding {
    embedding: Vec<f32>,
    index: usize,
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/embeddings", self.ctx.base_url);
        let api_key = self
            .ctx
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("openai provider missing api key"))?;

        retry_with_backoff(self.ctx.retry, |_attempt| {
            let url = url.clone();
            async move {
                let _permit = self.ctx.scheduler.acquire().await;
                let body = Request { input: texts, model: &self.ctx.model, dimensions: self.ctx.dimensions };
                let resp = match self.ctx.client.post(&url).bearer_auth(api_key).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => return CallOutcome::Fatal(e.into()),
                };

                if resp.status().as_u16() == 429 {
                    let retry_after = resp
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .map(std::time::Duration::from_secs);
                    return CallOutcome::RateLimited { retry_after };
                }

                let resp = match resp.error_for_status() {
                    Ok(r) => r,
                    Err(e) => return CallOutcome::Fatal(e.into()),
                };

                let parsed: Response = match resp.json().await {
                    Ok(p) => p,
                    Err(e) => return CallOutcome::Fatal(e.into()),
                };

                let mut vectors = vec![Vec::new(); texts.len()];
                for item in parsed.data {
                    if item.index < vectors.len() {
                        vectors[item.index] = item.embedding;
                    }
                }
                CallOutcome::Success(vectors)
            }
        })
        .await
    }

    fn dimensions(&self) -> u32 {
        self.ctx.dimensions
    }

    fn model_id(&self) -> &str {
        &self.ctx.model
    }
}
