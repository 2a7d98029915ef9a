//! Embedding provider configuration, read from the environment with
//! per-backend defaults.

use std::time::Duration;

use crate::error::{IndexError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Cohere,
    Voyage,
    Ollama,
}

impl Provider {
    fn parse(tag: &str) -> Result<Self> {
        match tag.to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "cohere" => Ok(Provider::Cohere),
            "voyage" => Ok(Provider::Voyage),
            "ollama" => Ok(Provider::Ollama),
            other => Err(IndexError::Config(format!("unknown embedding provider '{other}'"))),
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            Provider::OpenAi => "text-embedding-3-small",
            Provider::Cohere => "embed-english-v3.0",
            Provider::Voyage => "voyage-2",
            Provider::Ollama => "nomic-embed-text",
        }
    }

    fn default_dimensions(self, model: &str) -> u32 {
        match self {
            Provider::OpenAi => match model {
                "text-embedding-3-large" => 3072,
                _ => 1536,
            },
            Provider::Cohere => 1024,
            Provider::Voyage => match model {
                "voyage-large-2" => 1536,
                _ => 1024,
            },
            Provider::Ollama => 768,
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Cohere => "https://api.cohere.ai/v1",
            Provider::Voyage => "https://api.voyageai.com/v1",
            Provider::Ollama => "http://localhost:11434",
        }
    }

    fn api_key_env(self) -> Option<&'static str> {
        match self {
            Provider::OpenAi => Some("OPENAI_API_KEY"),
            Provider::Cohere => Some("COHERE_API_KEY"),
            Provider::Voyage => Some("VOYAGE_API_KEY"),
            Provider::Ollama => None,
        }
    }
}

/// Fully-resolved settings for one embedding backend.
#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub provider: Provider,
    pub model: String,
    pub dimensions: u32,
    pub base_url: String,
    pub api_key: Option<String>,
    pub max_requests_per_minute: Option<u32>,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl EmbeddingSettings {
    /// Read `EMBEDDING_PROVIDER` (required) plus the optional overrides,
    /// filling in backend-appropriate defaults for whatever is unset.
    /// Fails synchronously if the provider tag is unrecognized or the
    /// backend requires an API key that isn't present.
    pub fn from_env() -> Result<Self> {
        let provider_tag = std::env::var("EMBEDDING_PROVIDER")
            .map_err(|_| IndexError::Config("EMBEDDING_PROVIDER is not set".to_string()))?;
        let provider = Provider::parse(&provider_tag)?;

        let model = std::env::var("EMBEDDING_MODEL").unwrap_or_else(|_| provider.default_model().to_string());

        let dimensions = match std::env::var("EMBEDDING_DIMENSIONS").ok() {
            Some(v) => v
                .parse::<u32>()
                .map_err(|_| IndexError::Config(format!("EMBEDDING_DIMENSIONS '{v}' is not a valid integer")))?,
            None => provider.default_dimensions(&model),
        };

        let base_url = std::env::var("EMBEDDING_BASE_URL").unwrap_or_else(|_| provider.default_base_url().to_string());

        let api_key = match provider.api_key_env() {
            Some(env_var) => {
                let key = std::env::var(env_var)
                    .map_err(|_| IndexError::Config(format!("{env_var} is required for provider '{provider_tag}'")))?;
                Some(key)
            }
            None => None,
        };

        let max_requests_per_minute = match std::env::var("EMBEDDING_MAX_REQUESTS_PER_MINUTE").ok() {
            Some(v) => Some(
                v.parse::<u32>()
                    .map_err(|_| IndexError::Config(format!("EMBEDDING_MAX_REQUESTS_PER_MINUTE '{v}' is not a valid integer")))?,
            ),
            None => None,
        };

        let retry_attempts = match std::env::var("EMBEDDING_RETRY_ATTEMPTS").ok() {
            Some(v) => v
                .parse::<u32>()
                .map_err(|_| IndexError::Config(format!("EMBEDDING_RETRY_ATTEMPTS '{v}' is not a valid integer")))?,
            None => 3,
        };

        let retry_delay = match std::env::var("EMBEDDING_RETRY_DELAY").ok() {
            Some(v) => {
                let ms = v
                    .parse::<u64>()
                    .map_err(|_| IndexError::Config(format!("EMBEDDING_RETRY_DELAY '{v}' is not a valid integer")))?;
                Duration::from_millis(ms)
            }
            None => Duration::from_millis(500),
        };

        Ok(Self {
            provider,
            model,
            dimensions,
            base_url,
            api_key,
            max_requests_per_minute,
            retry_attempts,
            retry_delay,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // env::set_var races across tests run in parallel within this process;
    // serialize access to the environment through a single lock.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_embedding_env() {
        for key in [
            "EMBEDDING_PROVIDER",
            "EMBEDDING_MODEL",
            "EMBEDDING_DIMENSIONS",
            "EMBEDDING_BASE_URL",
            "EMBEDDING_MAX_REQUESTS_PER_MINUTE",
            "EMBEDDING_RETRY_ATTEMPTS",
            "EMBEDDING_RETRY_DELAY",
            "OPENAI_API_KEY",
            "COHERE_API_KEY",
            "VOYAGE_API_KEY",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn missing_provider_is_config_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_embedding_env();
        assert!(matches!(EmbeddingSettings::from_env(), Err(IndexError::Config(_))));
    }

    #[test]
    fn ollama_needs_no_api_key() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_embedding_env();
        std::env::set_var("EMBEDDING_PROVIDER", "ollama");
        let settings = EmbeddingSettings::from_env().unwrap();
        assert_eq!(settings.provider, Provider::Ollama);
        assert_eq!(settings.dimensions, 768);
        assert!(settings.api_key.is_none());
        clear_embedding_env();
    }

    #[test]
    fn openai_without_key_fails() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_embedding_env();
        std::env::set_var("EMBEDDING_PROVIDER", "openai");
        assert!(matches!(EmbeddingSettings::from_env(), Err(IndexError::Config(_))));
        clear_embedding_env();
    }

    #[test]
    fn openai_large_model_gets_3072_dims() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_embedding_env();
        std::env::set_var("EMBEDDING_PROVIDER", "openai");
        std::env::set_var("OPENAI_API_KEY", "sk-test");
        std::env::set_var("EMBEDDING_MODEL", "text-embedding-3-large");
        let settings = EmbeddingSettings::from_env().unwrap();
        assert_eq!(settings.dimensions, 3072);
        clear_embedding_env();
    }

    #[test]
    fn explicit_dimensions_override_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_embedding_env();
        std::env::set_var("EMBEDDING_PROVIDER", "ollama");
        std::env::set_var("EMBEDDING_DIMENSIONS", "512");
        let settings = EmbeddingSettings::from_env().unwrap();
        assert_eq!(settings.dimensions, 512);
        clear_embedding_env();
    }
}
