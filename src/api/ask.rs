use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::Json;
use futures_util::stream::{self, Stream, StreamExt};

use crate::llm::chat_stream::ChatStream;
use crate::models::{AskRequest, FiredRule, SearchResult};
use crate::prompt::build_prompt;
use crate::state::AppState;

/// Questions may carry pasted document text, so the cap is generous.
pub const MAX_QUESTION_LEN: usize = 12_000;
const IDLE_TIMEOUT_SECS: u64 = 30;

/// POST /api/ask - Retrieve positions, run deductions, stream the generated answer over SSE.
///
/// Events, in order: `sources`, `deductions`, zero or more `delta`, optionally one
/// `error`, then `done`.
pub async fn ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    // ── Step 1: Validate input ────────────────────────────
    let question = req.question.trim();
    if question.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No question provided".to_string()));
    }
    if question.len() > MAX_QUESTION_LEN {
        tracing::warn!(len = question.len(), "Rejected over-long question");
        return Err((
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("Question exceeds {MAX_QUESTION_LEN} bytes"),
        ));
    }
    tracing::info!(provider = %req.provider, model = %req.model, "Received question");

    // ── Step 2: Deduce + search over the same snapshot ────
    let context = state.context();
    let fired = context.deduce(question, state.config.max_rules);
    let positions = context
        .search(
            question,
            state.config.search.top_k,
            state.config.search.min_similarity,
        )
        .await
        .map_err(|e| {
            tracing::error!("Search failed: {e}");
            (StatusCode::SERVICE_UNAVAILABLE, format!("Search failed: {e}"))
        })?;
    tracing::info!(
        positions = positions.len(),
        deductions = fired.len(),
        "Retrieved context"
    );

    // ── Step 3: Acquire semaphore ─────────────────────────
    let permit = state
        .ask_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Answer service at capacity".to_string(),
            )
        })?;

    // ── Step 4: Build prompt and open provider stream ─────
    let prompt = build_prompt(question, &positions, &fired);
    let head = stream::iter(vec![
        Ok::<Event, Infallible>(sources_event(&positions)),
        Ok(deductions_event(&fired)),
    ]);

    let body = match state
        .providers
        .stream(&state.http_client, &req.provider, &prompt, &req.model)
        .await
    {
        Ok(llm_stream) => delta_events(llm_stream).boxed(),
        Err(e) => {
            tracing::warn!("Provider unavailable: {e}");
            stream::once(async move { Ok(error_event(&e.to_string())) }).boxed()
        }
    };

    let done = stream::once(async {
        Ok::<Event, Infallible>(sse_event("done", serde_json::json!({})))
    });

    // Hold the semaphore permit for the lifetime of the stream
    let event_stream = head.chain(body).chain(done).map(move |event| {
        let _permit = &permit;
        event
    });

    Ok(Sse::new(event_stream))
}

/// Relay provider chunks as `delta` events; the first failure or idle timeout
/// becomes a terminal `error` event.
fn delta_events(llm_stream: ChatStream) -> impl Stream<Item = Result<Event, Infallible>> + Send {
    let idle_timeout = Duration::from_secs(IDLE_TIMEOUT_SECS);

    stream::unfold((llm_stream, false), move |(mut llm_stream, finished)| async move {
        if finished {
            return None;
        }
        match tokio::time::timeout(idle_timeout, llm_stream.next()).await {
            Ok(Some(Ok(content))) => Some((
                Ok(sse_event("delta", serde_json::json!({ "content": content }))),
                (llm_stream, false),
            )),
            Ok(Some(Err(e))) => {
                tracing::warn!("Generation failed mid-stream: {e}");
                Some((Ok(error_event(&e.to_string())), (llm_stream, true)))
            }
            Ok(None) => None,
            Err(_) => Some((
                Ok(error_event("LLM response timed out (idle)")),
                (llm_stream, true),
            )),
        }
    })
}

// ─── Helper functions ────────────────────────────────────

fn sse_event(name: &str, payload: serde_json::Value) -> Event {
    Event::default().event(name).data(payload.to_string())
}

fn error_event(message: &str) -> Event {
    sse_event("error", serde_json::json!({ "message": message }))
}

fn sources_event(positions: &[SearchResult]) -> Event {
    sse_event("sources", serde_json::json!({ "sources": source_ids(positions) }))
}

fn deductions_event(fired: &[FiredRule]) -> Event {
    let ids: Vec<&str> = fired.iter().map(|r| r.id.as_str()).collect();
    sse_event("deductions", serde_json::json!({ "rules": ids }))
}

fn source_ids(positions: &[SearchResult]) -> Vec<&str> {
    positions.iter().map(|p| p.record.id.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::models::PositionRecord;

    #[test]
    fn test_source_ids_keep_rank_order() {
        let positions: Vec<SearchResult> = ["P7", "P2"]
            .iter()
            .map(|id| SearchResult {
                record: PositionRecord {
                    id: id.to_string(),
                    text: "t".into(),
                    domain: "Unknown".into(),
                    title: String::new(),
                    sources: vec!["Unknown".into()],
                },
                similarity: 0.5,
            })
            .collect();
        assert_eq!(source_ids(&positions), vec!["P7", "P2"]);
    }

    #[tokio::test]
    async fn test_delta_events_stop_after_error() {
        let chunks: Vec<Result<String, ProviderError>> = vec![
            Ok("Color".into()),
            Err(ProviderError::Request {
                provider: "openai".into(),
                message: "reset".into(),
            }),
            Ok("never sent".into()),
        ];
        let llm_stream: ChatStream = Box::pin(stream::iter(chunks));
        let events: Vec<_> = delta_events(llm_stream).collect().await;
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_delta_events_relay_all_chunks() {
        let chunks: Vec<Result<String, ProviderError>> =
            vec![Ok("a".into()), Ok("b".into()), Ok("c".into())];
        let llm_stream: ChatStream = Box::pin(stream::iter(chunks));
        assert_eq!(delta_events(llm_stream).collect::<Vec<_>>().await.len(), 3);
    }
}
