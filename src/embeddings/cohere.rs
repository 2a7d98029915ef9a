use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::scheduler::{retry_with_backoff, CallOutcome};
use super::{BackendContext, EmbeddingProvider};

pub struct CohereProvider {
    ctx: BackendContext,
}

impl CohereProvider {
    pub fn new(ctx: BackendContext) -> Self {
        Self { ctx }
    }
}

#[derive(Serialize)]
struct Request<'a> {
    texts: &'a [String],
    model: &'a str,
    input_type: &'static str,
}

#[derive(Deserialize)]
struct Response {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingProvider for CohereProvider {
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/embed", self.ctx.base_url);
        let api_key = self
            .ctx
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("cohere provider missing api key"))?;

        retry_with_backoff(self.ctx.retry, |_attempt| {
            let url = url.clone();
            async move {
                let _permit = self.ctx.scheduler.acquire().await;
                let body = Request { texts, model: &self.ctx.model, input_type: "search_document" };
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

                match resp.json::<Response>().await {
                    Ok(parsed) => CallOutcome::Success(parsed.embeddings),
                    Err(e) => CallOutcome::Fatal(e.into()),
                }
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
