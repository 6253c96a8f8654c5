//! # ask-philosopher
//!
//! Answers natural-language questions from a fixed corpus of philosophical
//! positions. Each question runs through two independent engines whose output
//! is assembled into one prompt for a streaming text-generation provider.
//!
//! ## Architecture
//!
//! ```text
//!                          ┌─────────────┐
//!                          │  Question   │
//!                          └──────┬──────┘
//!                                 │
//!                    ┌────────────┴────────────┐
//!                    ▼                         ▼
//!           ┌────────────────┐       ┌──────────────────┐
//!           │ Semantic Search│       │ Deduction Engine │
//!           │ embed query    │       │ one pass over    │
//!           │ cosine vs store│       │ regex rules with │
//!           │ floor 0.25     │       │ accumulated      │
//!           │ top 7          │       │ conclusions      │
//!           └───────┬────────┘       └────────┬─────────┘
//!                   │ positions               │ fired rules
//!                   └────────────┬────────────┘   (by strength)
//!                                ▼
//!                    ┌───────────────────────┐
//!                    │   Prompt Assembly     │
//!                    └───────────┬───────────┘
//!                                ▼
//!                    ┌───────────────────────┐
//!                    │ Generation Provider   │
//!                    │ (SSE token relay)     │
//!                    └───────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for paths, embedding, search and providers
//! - [`error`] - Error taxonomy for corpus, embeddings, search, rules and providers
//! - [`models`] - Shared data types: `PositionRecord`, `SearchResult`, `InferenceRule`, request/response types
//! - [`corpus`] - Corpus loader normalizing the known corpus document shapes
//! - [`search::store`] - Embedding store with legacy-layout loading, validation and atomic persistence
//! - [`search::semantic`] - Cosine-similarity search with a similarity floor
//! - [`deduce`] - Forward-chaining regex rule engine and its prose rendering
//! - [`llm::embeddings`] - `Embedder` trait with OpenAI-compatible and Ollama backends
//! - [`llm::providers`] - Generation provider registry (Anthropic, OpenAI, DeepSeek, Perplexity)
//! - [`llm::chat_stream`] - Streaming clients and SSE line parsers
//! - [`prompt`] - Prompt assembly from positions, deductions and the question
//! - [`api`] - Axum HTTP handlers
//! - [`state`] - The immutable search context and shared application state

pub mod api;
pub mod config;
pub mod corpus;
pub mod deduce;
pub mod error;
pub mod llm;
pub mod models;
pub mod prompt;
pub mod search;
pub mod state;
