use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,
    /// Corpus JSON document
    pub corpus_path: PathBuf,
    /// Inference rule table (JSON array)
    pub rules_path: PathBuf,
    /// Persisted embedding store
    pub embeddings_path: PathBuf,
    /// Embedding function configuration
    pub embedding: EmbeddingConfig,
    /// Semantic search defaults
    pub search: SearchConfig,
    /// Maximum fired rules returned per deduction
    pub max_rules: usize,
    /// Generation provider credentials and limits
    pub generation: GenerationConfig,
    /// Maximum concurrent streaming answers
    pub max_concurrent_asks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "openai" or "ollama"
    pub provider: String,
    /// Base URL for the embedding API
    pub base_url: String,
    /// Model name. One model per store: changing it forces regeneration.
    pub model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
    /// Texts per embedding call while building the store
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub top_k: usize,
    pub min_similarity: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub deepseek_api_key: Option<String>,
    pub perplexity_api_key: Option<String>,
    pub max_tokens: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
            corpus_path: PathBuf::from("data/positions.json"),
            rules_path: PathBuf::from("data/rules.json"),
            embeddings_path: PathBuf::from("data/position_embeddings.json"),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
            max_rules: 18,
            generation: GenerationConfig {
                max_tokens: 2500,
                ..Default::default()
            },
            max_concurrent_asks: 3,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            base_url: "https://api.openai.com".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key: None,
            batch_size: 100,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: 7,
            min_similarity: 0.25,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("ASK_BIND_ADDR") {
            config.bind_addr = addr;
        } else if let Ok(port) = std::env::var("PORT") {
            config.bind_addr = format!("0.0.0.0:{port}");
        }
        if let Ok(path) = std::env::var("ASK_CORPUS_PATH") {
            config.corpus_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("ASK_RULES_PATH") {
            config.rules_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("ASK_EMBEDDINGS_PATH") {
            config.embeddings_path = PathBuf::from(path);
        }

        // Embedding config
        if let Ok(provider) = std::env::var("EMBEDDING_PROVIDER") {
            config.embedding.provider = provider;
        }
        if let Ok(url) = std::env::var("EMBEDDING_BASE_URL") {
            config.embedding.base_url = url;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            config.embedding.model = model;
        }
        if let Ok(val) = std::env::var("EMBEDDING_BATCH_SIZE") {
            if let Ok(v) = val.parse::<usize>() {
                config.embedding.batch_size = v.max(1);
            }
        }

        // Search / deduction defaults
        if let Ok(val) = std::env::var("SEARCH_TOP_K") {
            if let Ok(v) = val.parse() {
                config.search.top_k = v;
            }
        }
        if let Ok(val) = std::env::var("SEARCH_MIN_SIMILARITY") {
            if let Ok(v) = val.parse() {
                config.search.min_similarity = v;
            }
        }
        if let Ok(val) = std::env::var("DEDUCE_MAX_RULES") {
            if let Ok(v) = val.parse() {
                config.max_rules = v;
            }
        }

        // Provider credentials. OPENAI_API_KEY doubles as the embedding key.
        let openai_key = non_empty_env("OPENAI_API_KEY");
        config.embedding.api_key = openai_key.clone();
        config.generation.openai_api_key = openai_key;
        config.generation.anthropic_api_key = non_empty_env("ANTHROPIC_API_KEY");
        config.generation.deepseek_api_key = non_empty_env("DEEPSEEK_API_KEY");
        config.generation.perplexity_api_key = non_empty_env("PERPLEXITY_API_KEY");
        if let Ok(val) = std::env::var("GENERATION_MAX_TOKENS") {
            if let Ok(v) = val.parse() {
                config.generation.max_tokens = v;
            }
        }
        if let Ok(val) = std::env::var("MAX_CONCURRENT_ASKS") {
            if let Ok(v) = val.parse::<usize>() {
                config.max_concurrent_asks = v.max(1);
            }
        }

        config
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.search.top_k, 7);
        assert!((config.search.min_similarity - 0.25).abs() < f32::EPSILON);
        assert_eq!(config.max_rules, 18);
        assert_eq!(config.embedding.batch_size, 100);
        assert_eq!(config.generation.max_tokens, 2500);
    }
}
