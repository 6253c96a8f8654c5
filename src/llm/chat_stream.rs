use futures_util::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;

use crate::error::ProviderError;

pub type ChatStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const STREAM_TIMEOUT_SECS: u64 = 300;

/// One streamed generation request, already resolved to a provider endpoint.
pub struct GenerationRequest<'a> {
    pub provider: &'a str,
    pub endpoint: &'a str,
    pub api_key: &'a str,
    pub model: &'a str,
    pub prompt: &'a str,
    pub max_tokens: u32,
}

#[derive(Serialize, Deserialize)]
struct StreamMessage {
    role: String,
    content: String,
}

fn user_message(prompt: &str) -> Vec<StreamMessage> {
    vec![StreamMessage {
        role: "user".to_string(),
        content: prompt.to_string(),
    }]
}

fn request_error(provider: &str, message: impl Into<String>) -> ProviderError {
    ProviderError::Request {
        provider: provider.to_string(),
        message: message.into(),
    }
}

async fn check_status(
    provider: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Err(request_error(provider, format!("API returned {status}: {body}")))
}

// ─── Anthropic Messages streaming ────────────────────────

#[derive(Serialize)]
struct AnthropicStreamRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<StreamMessage>,
    stream: bool,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicEvent {
    ContentBlockDelta { delta: AnthropicDelta },
    Error { error: AnthropicError },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct AnthropicDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicError {
    message: String,
}

pub async fn stream_anthropic(
    client: &reqwest::Client,
    req: GenerationRequest<'_>,
) -> Result<ChatStream, ProviderError> {
    let body = AnthropicStreamRequest {
        model: req.model.to_string(),
        max_tokens: req.max_tokens,
        messages: user_message(req.prompt),
        stream: true,
    };

    let resp = client
        .post(req.endpoint)
        .timeout(Duration::from_secs(STREAM_TIMEOUT_SECS))
        .header("x-api-key", req.api_key)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .json(&body)
        .send()
        .await
        .map_err(|e| request_error(req.provider, format!("failed to connect: {e}")))?;
    let resp = check_status(req.provider, resp).await?;

    let provider = req.provider.to_string();
    let stream = stream_lines(resp.bytes_stream()).filter_map(move |line_result| {
        let provider = provider.clone();
        async move {
            match line_result {
                Ok(line) => parse_anthropic_line(&line)
                    .map(|r| r.map_err(|message| request_error(&provider, message))),
                Err(e) => Some(Err(request_error(&provider, e))),
            }
        }
    });

    Ok(Box::pin(stream))
}

/// Parse a single Anthropic SSE line. Returns:
/// - Some(Ok(text)) for text deltas
/// - Some(Err(message)) for error events and unparseable data
/// - None to skip (event names, pings, start/stop events)
fn parse_anthropic_line(line: &str) -> Option<Result<String, String>> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data.is_empty() {
        return None;
    }

    match serde_json::from_str::<AnthropicEvent>(data) {
        Ok(AnthropicEvent::ContentBlockDelta { delta }) => {
            delta.text.filter(|t| !t.is_empty()).map(Ok)
        }
        Ok(AnthropicEvent::Error { error }) => Some(Err(error.message)),
        Ok(AnthropicEvent::Other) => None,
        Err(e) => Some(Err(format!("Failed to parse Anthropic event: {e}"))),
    }
}

// ─── OpenAI-compatible streaming ─────────────────────────

#[derive(Serialize)]
struct OpenAiStreamRequest {
    model: String,
    messages: Vec<StreamMessage>,
    stream: bool,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAiStreamChunk {
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiStreamDelta,
}

#[derive(Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
}

/// Chat completions stream for OpenAI and OpenAI-compatible hosts (DeepSeek, Perplexity).
pub async fn stream_openai_compatible(
    client: &reqwest::Client,
    req: GenerationRequest<'_>,
) -> Result<ChatStream, ProviderError> {
    let body = OpenAiStreamRequest {
        model: req.model.to_string(),
        messages: user_message(req.prompt),
        stream: true,
        max_tokens: req.max_tokens,
    };

    let resp = client
        .post(req.endpoint)
        .timeout(Duration::from_secs(STREAM_TIMEOUT_SECS))
        .header("Authorization", format!("Bearer {}", req.api_key))
        .json(&body)
        .send()
        .await
        .map_err(|e| request_error(req.provider, format!("failed to connect: {e}")))?;
    let resp = check_status(req.provider, resp).await?;

    let provider = req.provider.to_string();
    let stream = stream_lines(resp.bytes_stream()).filter_map(move |line_result| {
        let provider = provider.clone();
        async move {
            match line_result {
                Ok(line) => parse_openai_line(&line)
                    .map(|r| r.map_err(|message| request_error(&provider, message))),
                Err(e) => Some(Err(request_error(&provider, e))),
            }
        }
    });

    Ok(Box::pin(stream))
}

/// Parse a single OpenAI SSE line. Returns:
/// - Some(Ok(content)) for content deltas
/// - Some(Err(message)) for parse errors
/// - None to skip (empty lines, [DONE], role-only chunks)
fn parse_openai_line(line: &str) -> Option<Result<String, String>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let data = line.strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<OpenAiStreamChunk>(data) {
        Ok(chunk) => {
            let content = chunk
                .choices
                .first()
                .and_then(|c| c.delta.content.clone())
                .unwrap_or_default();
            if content.is_empty() {
                return None;
            }
            Some(Ok(content))
        }
        Err(e) => Some(Err(format!("Failed to parse chunk: {e}"))),
    }
}

// ─── Line buffering ──────────────────────────────────────

/// Convert a byte stream into a stream of complete lines.
fn stream_lines(
    byte_stream: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
) -> impl Stream<Item = Result<String, String>> + Send {
    futures_util::stream::unfold(
        (Box::pin(byte_stream), String::new()),
        |(mut stream, mut buffer)| async move {
            loop {
                if let Some(newline_pos) = buffer.find('\n') {
                    let line = buffer[..newline_pos].to_string();
                    buffer = buffer[newline_pos + 1..].to_string();
                    if !line.trim().is_empty() {
                        return Some((Ok(line), (stream, buffer)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(bytes)) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                    }
                    Some(Err(e)) => {
                        return Some((Err(format!("Stream read error: {e}")), (stream, buffer)));
                    }
                    None => {
                        // Stream ended: emit remaining buffer if non-empty
                        if !buffer.trim().is_empty() {
                            let remaining = std::mem::take(&mut buffer);
                            return Some((Ok(remaining), (stream, buffer)));
                        }
                        return None;
                    }
                }
            }
        },
    )
}
