use serde::{Deserialize, Serialize};

/// One normalized corpus entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub id: String,
    pub text: String,
    pub domain: String,
    pub title: String,
    pub sources: Vec<String>,
}

/// A corpus record merged with its cosine similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub record: PositionRecord,
    pub similarity: f32,
}

/// One deduction rule as stored in the rule table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRule {
    pub id: String,
    pub premise: String,
    pub conclusion: String,
    pub strength: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<serde_json::Value>,
}

/// A rule that matched during one `deduce` call.
pub type FiredRule = InferenceRule;

/// Search request
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: Option<usize>,
    pub min_similarity: Option<f32>,
}

/// Search response
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
}

/// Deduce request
#[derive(Debug, Clone, Deserialize)]
pub struct DeduceRequest {
    pub phenomenon: String,
    pub max_rules: Option<usize>,
}

/// Deduce response: the fired rules plus their prose rendering.
#[derive(Debug, Clone, Serialize)]
pub struct DeduceResponse {
    pub fired: Vec<FiredRule>,
    pub chain: String,
}

/// Ask request
#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: String,
}

fn default_provider() -> String {
    "anthropic".to_string()
}

/// Entry in `GET /api/providers`.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub id: String,
    pub name: String,
    pub models: Vec<String>,
}
