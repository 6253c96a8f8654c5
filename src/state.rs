use anyhow::Context;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::Config;
use crate::corpus::load_corpus;
use crate::deduce::{deduce, RuleTable};
use crate::error::SearchError;
use crate::llm::embeddings::{Embedder, HttpEmbedder};
use crate::llm::providers::ProviderRegistry;
use crate::models::{FiredRule, SearchResult};
use crate::search::semantic::SemanticSearch;

/// Everything a request needs from the corpus and rule table.
/// Built once by [`SearchContext::load`] and never mutated afterwards.
pub struct SearchContext {
    pub search: SemanticSearch,
    pub rules: RuleTable,
}

impl SearchContext {
    /// The single initialization path: corpus, rule table, then embedding store.
    pub async fn load(config: &Config, embedder: Arc<dyn Embedder>) -> anyhow::Result<Self> {
        let corpus = load_corpus(&config.corpus_path)
            .with_context(|| format!("Failed to load corpus {}", config.corpus_path.display()))?;
        let rules = RuleTable::load(&config.rules_path).with_context(|| {
            format!("Failed to load rule table {}", config.rules_path.display())
        })?;
        let search = SemanticSearch::initialize(
            corpus,
            &config.embeddings_path,
            embedder,
            config.embedding.batch_size,
        )
        .await
        .context("Failed to initialize embedding store")?;

        tracing::info!(
            positions = search.len(),
            rules = rules.len(),
            "Semantic search initialized"
        );
        Ok(Self { search, rules })
    }

    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<SearchResult>, SearchError> {
        self.search.search(query, top_k, min_similarity).await
    }

    pub fn deduce(&self, phenomenon: &str, max_rules: usize) -> Vec<FiredRule> {
        deduce(&self.rules, phenomenon, max_rules)
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    context: Arc<RwLock<Arc<SearchContext>>>,
    pub embedder: Arc<dyn Embedder>,
    pub providers: Arc<ProviderRegistry>,
    pub http_client: reqwest::Client,
    pub ask_semaphore: Arc<tokio::sync::Semaphore>,
    /// Serializes context builds so two reloads never regenerate the store at once.
    build_lock: Arc<tokio::sync::Mutex<()>>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(120))
            .build()?;
        let embedder: Arc<dyn Embedder> =
            Arc::new(HttpEmbedder::new(http_client.clone(), config.embedding.clone()));
        Self::with_embedder(config, http_client, embedder).await
    }

    pub async fn with_embedder(
        config: Config,
        http_client: reqwest::Client,
        embedder: Arc<dyn Embedder>,
    ) -> anyhow::Result<Self> {
        let context = SearchContext::load(&config, embedder.clone()).await?;
        let providers = ProviderRegistry::from_config(&config.generation);
        let max_concurrent_asks = config.max_concurrent_asks;

        Ok(Self {
            config,
            context: Arc::new(RwLock::new(Arc::new(context))),
            embedder,
            providers: Arc::new(providers),
            http_client,
            ask_semaphore: Arc::new(tokio::sync::Semaphore::new(max_concurrent_asks)),
            build_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    /// Snapshot of the current context. Requests keep their snapshot across a reload.
    pub fn context(&self) -> Arc<SearchContext> {
        self.context.read().clone()
    }

    /// Rebuild the context from disk and swap it in. On failure the old context stays.
    pub async fn reload(&self) -> anyhow::Result<()> {
        let _guard = self.build_lock.lock().await;
        let fresh = SearchContext::load(&self.config, self.embedder.clone()).await?;
        *self.context.write() = Arc::new(fresh);
        tracing::info!("Search context reloaded");
        Ok(())
    }
}
