use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;

/// Maximum characters sent per text to the embedding API.
/// text-embedding-3-small accepts 8 191 tokens; prose runs ~4 chars/token.
const MAX_EMBED_CHARS: usize = 24_000;

/// Truncate `text` to at most `MAX_EMBED_CHARS`, splitting on a UTF-8 char boundary.
fn truncate_for_embedding(text: &str) -> &str {
    if text.len() <= MAX_EMBED_CHARS {
        return text;
    }
    let mut end = MAX_EMBED_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// The embedding function shared by store construction and query search.
///
/// Implementations must return exactly one vector per input text. The
/// `model` identifier pins a persisted store to the model that produced it.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model(&self) -> &str;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Embed a single text.
pub async fn embed_one(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    embedder
        .embed(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| EmbeddingError::Malformed("no embedding returned".to_string()))
}

/// Embedder backed by an OpenAI-compatible or Ollama HTTP API.
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: EmbeddingConfig,
}

impl HttpEmbedder {
    pub fn new(client: reqwest::Client, config: EmbeddingConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let truncated: Vec<String> = texts
            .iter()
            .map(|t| truncate_for_embedding(t).to_string())
            .collect();

        match self.config.provider.as_str() {
            "openai" => embed_openai(&self.client, &self.config, truncated).await,
            "ollama" => embed_ollama(&self.client, &self.config, truncated).await,
            other => Err(EmbeddingError::Generation(format!(
                "Unknown embedding provider: {other}"
            ))),
        }
    }
}

fn request_failed(api: &str, e: reqwest::Error) -> EmbeddingError {
    EmbeddingError::Generation(format!("Failed to call {api} embed API: {e}"))
}

async fn check_status(api: &str, resp: reqwest::Response) -> Result<reqwest::Response, EmbeddingError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Err(EmbeddingError::Generation(format!(
        "{api} embed API returned {status}: {body}"
    )))
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiEmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedData>,
}

#[derive(Deserialize)]
struct OpenAiEmbedData {
    embedding: Vec<f32>,
}

async fn embed_openai(
    client: &reqwest::Client,
    config: &EmbeddingConfig,
    texts: Vec<String>,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let url = format!("{}/v1/embeddings", config.base_url.trim_end_matches('/'));
    let api_key = config.api_key.as_deref().ok_or_else(|| {
        EmbeddingError::Generation("OpenAI API key not configured for embeddings".to_string())
    })?;

    let req = OpenAiEmbedRequest {
        model: config.model.clone(),
        input: texts,
    };

    let resp = client
        .post(&url)
        .header("Authorization", format!("Bearer {api_key}"))
        .json(&req)
        .send()
        .await
        .map_err(|e| request_failed("OpenAI", e))?;
    let resp = check_status("OpenAI", resp).await?;

    let body: OpenAiEmbedResponse = resp.json().await.map_err(|e| {
        EmbeddingError::Malformed(format!("Failed to parse OpenAI embed response: {e}"))
    })?;

    Ok(body.data.into_iter().map(|d| d.embedding).collect())
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaEmbedRequest {
    model: String,
    input: Vec<String>,
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

async fn embed_ollama(
    client: &reqwest::Client,
    config: &EmbeddingConfig,
    texts: Vec<String>,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let url = format!("{}/api/embed", config.base_url.trim_end_matches('/'));

    let req = OllamaEmbedRequest {
        model: config.model.clone(),
        input: texts,
        truncate: true,
    };

    let resp = client
        .post(&url)
        .json(&req)
        .send()
        .await
        .map_err(|e| request_failed("Ollama", e))?;
    let resp = check_status("Ollama", resp).await?;

    let body: OllamaEmbedResponse = resp.json().await.map_err(|e| {
        EmbeddingError::Malformed(format!("Failed to parse Ollama embed response: {e}"))
    })?;

    Ok(body.embeddings)
}
