//! Generation providers: which hosts can answer, with which models, and how to
//! open a token stream against each of them.

use crate::config::GenerationConfig;
use crate::error::ProviderError;
use crate::llm::chat_stream::{
    stream_anthropic, stream_openai_compatible, ChatStream, GenerationRequest,
};
use crate::models::ProviderInfo;

/// Wire protocol spoken by a provider's streaming endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wire {
    Anthropic,
    OpenAiCompatible,
}

#[derive(Debug, Clone)]
pub struct GenerationProvider {
    pub id: &'static str,
    pub name: &'static str,
    pub models: &'static [&'static str],
    pub endpoint: &'static str,
    pub wire: Wire,
    api_key: Option<String>,
}

impl GenerationProvider {
    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    /// First listed model is the default.
    pub fn default_model(&self) -> &'static str {
        self.models.first().copied().unwrap_or_default()
    }

    pub fn info(&self) -> ProviderInfo {
        ProviderInfo {
            id: self.id.to_string(),
            name: self.name.to_string(),
            models: self.models.iter().map(|m| m.to_string()).collect(),
        }
    }

    /// Open a token stream for `prompt`. An empty `model` selects the default.
    pub async fn stream(
        &self,
        client: &reqwest::Client,
        prompt: &str,
        model: &str,
        max_tokens: u32,
    ) -> Result<ChatStream, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured(self.name.to_string()))?;
        let model = if model.is_empty() {
            self.default_model()
        } else {
            model
        };
        tracing::info!(provider = self.id, model, "Streaming generation");

        let req = GenerationRequest {
            provider: self.id,
            endpoint: self.endpoint,
            api_key,
            model,
            prompt,
            max_tokens,
        };
        match self.wire {
            Wire::Anthropic => stream_anthropic(client, req).await,
            Wire::OpenAiCompatible => stream_openai_compatible(client, req).await,
        }
    }
}

/// All known providers in preference order, each carrying its credential if configured.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: Vec<GenerationProvider>,
    pub max_tokens: u32,
}

impl ProviderRegistry {
    pub fn from_config(config: &GenerationConfig) -> Self {
        let providers = vec![
            GenerationProvider {
                id: "anthropic",
                name: "Anthropic",
                models: &["claude-sonnet-4-20250514", "claude-opus-4-20250514"],
                endpoint: "https://api.anthropic.com/v1/messages",
                wire: Wire::Anthropic,
                api_key: config.anthropic_api_key.clone(),
            },
            GenerationProvider {
                id: "openai",
                name: "OpenAI",
                models: &["gpt-4o", "gpt-4o-mini", "o1", "o1-mini"],
                endpoint: "https://api.openai.com/v1/chat/completions",
                wire: Wire::OpenAiCompatible,
                api_key: config.openai_api_key.clone(),
            },
            GenerationProvider {
                id: "deepseek",
                name: "DeepSeek",
                models: &["deepseek-chat", "deepseek-reasoner"],
                endpoint: "https://api.deepseek.com/chat/completions",
                wire: Wire::OpenAiCompatible,
                api_key: config.deepseek_api_key.clone(),
            },
            GenerationProvider {
                id: "perplexity",
                name: "Perplexity",
                models: &[
                    "llama-3.1-sonar-large-128k-online",
                    "llama-3.1-sonar-small-128k-online",
                ],
                endpoint: "https://api.perplexity.ai/chat/completions",
                wire: Wire::OpenAiCompatible,
                api_key: config.perplexity_api_key.clone(),
            },
        ];

        for p in &providers {
            if p.is_available() {
                tracing::info!("{} client configured", p.name);
            }
        }

        Self {
            providers,
            max_tokens: config.max_tokens,
        }
    }

    pub fn get(&self, id: &str) -> Result<&GenerationProvider, ProviderError> {
        self.providers
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| ProviderError::UnknownProvider(id.to_string()))
    }

    /// Providers with a credential, for `GET /api/providers`.
    pub fn available(&self) -> Vec<ProviderInfo> {
        self.providers
            .iter()
            .filter(|p| p.is_available())
            .map(GenerationProvider::info)
            .collect()
    }

    pub async fn stream(
        &self,
        client: &reqwest::Client,
        provider: &str,
        prompt: &str,
        model: &str,
    ) -> Result<ChatStream, ProviderError> {
        self.get(provider)?
            .stream(client, prompt, model, self.max_tokens)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_anthropic() -> ProviderRegistry {
        ProviderRegistry::from_config(&GenerationConfig {
            anthropic_api_key: Some("sk-test".into()),
            max_tokens: 2500,
            ..Default::default()
        })
    }

    #[test]
    fn test_available_lists_only_configured() {
        let available = registry_with_anthropic().available();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].id, "anthropic");
        assert_eq!(available[0].models[0], "claude-sonnet-4-20250514");
    }

    #[test]
    fn test_unknown_provider() {
        let err = registry_with_anthropic().get("mystery").unwrap_err();
        assert_eq!(err.to_string(), "Unknown provider: mystery");
    }

    #[test]
    fn test_default_models() {
        let registry = registry_with_anthropic();
        assert_eq!(registry.get("openai").unwrap().default_model(), "gpt-4o");
        assert_eq!(registry.get("deepseek").unwrap().default_model(), "deepseek-chat");
    }

    #[tokio::test]
    async fn test_unconfigured_provider_is_not_retried() {
        let registry = registry_with_anthropic();
        let result = registry
            .stream(&reqwest::Client::new(), "openai", "prompt", "")
            .await;
        match result {
            Err(ProviderError::NotConfigured(name)) => assert_eq!(name, "OpenAI"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected NotConfigured"),
        }
    }
}
