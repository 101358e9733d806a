pub mod adapters;
pub mod answer;
pub mod cache;
pub mod expansion;
pub mod fusion;
pub mod graph_augment;
pub mod merge;
pub mod multi_query;
pub mod ranking;
pub mod retrieve;

mod error;

pub use answer::{AnswerRequest, AnswerResponse};
pub use error::{Error, Result};
pub use retrieve::{Degradation, RetrieveReport, RetrieveRequest};

use std::{fmt, future::Future, pin::Pin, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use grove_config::{Config, EmbeddingProviderConfig, LlmProviderConfig, ProviderConfig};
use grove_domain::{evidence::EvidenceSet, mentions::EntityMention};
use grove_providers::{chat, embedding, rerank};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

/// Scores candidate texts against a query. One score per candidate, in candidate order.
pub trait RerankProvider
where
	Self: Send + Sync,
{
	fn rerank<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>>;
}

pub trait ExpansionProvider
where
	Self: Send + Sync,
{
	fn expand<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, color_eyre::Result<Value>>;
}

pub trait GenerationProvider
where
	Self: Send + Sync,
{
	fn generate<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, color_eyre::Result<String>>;
}

/// Hybrid lexical/dense search over the fragment index.
///
/// `alpha` weights dense similarity against lexical similarity: 0.0 is purely lexical and
/// 1.0 purely dense. Results come back ordered by blended score, best first.
pub trait VectorSearch
where
	Self: Send + Sync,
{
	fn search<'a>(
		&'a self,
		query: &'a str,
		filters: Option<&'a [String]>,
		top_k: u32,
		alpha: f32,
	) -> BoxFuture<'a, Result<Vec<VectorHit>>>;
}

pub trait GraphContext
where
	Self: Send + Sync,
{
	/// Mentions that match no entity are left out.
	fn resolve_entities<'a>(
		&'a self,
		mentions: &'a [EntityMention],
	) -> BoxFuture<'a, Result<Vec<ResolvedEntity>>>;

	/// Relations reachable from each named entity within `hop_depth` hops, at most `limit` per
	/// entity.
	fn neighborhood<'a>(
		&'a self,
		entity_names: &'a [String],
		hop_depth: u32,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<GraphRelation>>>;
}

/// Memoizes evidence sets by pipeline cache key. Entries are replaced wholesale.
pub trait PipelineCache
where
	Self: Send + Sync,
{
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<EvidenceSet>>>;

	fn put<'a>(
		&'a self,
		key: &'a str,
		value: &'a EvidenceSet,
		ttl: time::Duration,
	) -> BoxFuture<'a, Result<()>>;

	fn flush(&self) -> BoxFuture<'_, Result<u64>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
	pub id: String,
	pub source_document_id: String,
	pub text: String,
	pub score: f32,
}

/// A graph entity matched by name. `kind` is whatever label the graph carries, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntity {
	pub canonical_name: String,
	pub kind: Option<String>,
	pub mention: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphRelation {
	/// Canonical name of the entity whose neighborhood produced this relation.
	pub anchor: String,
	pub subject: String,
	pub relationship_type: String,
	pub object: String,
	pub supporting_context: Option<String>,
}

/// Optional pipeline stages whose failures degrade instead of aborting the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
	Expansion,
	GraphAugmentation,
	Rerank,
}
impl Stage {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Expansion => "expansion",
			Self::GraphAugmentation => "graph_augmentation",
			Self::Rerank => "rerank",
		}
	}
}

impl fmt::Display for Stage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub rerank: Arc<dyn RerankProvider>,
	pub expansion: Arc<dyn ExpansionProvider>,
	pub generation: Arc<dyn GenerationProvider>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		rerank: Arc<dyn RerankProvider>,
		expansion: Arc<dyn ExpansionProvider>,
		generation: Arc<dyn GenerationProvider>,
	) -> Self {
		Self { embedding, rerank, expansion, generation }
	}
}

impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self {
			embedding: provider.clone(),
			rerank: provider.clone(),
			expansion: provider.clone(),
			generation: provider,
		}
	}
}

/// Data collaborators of the pipeline.
#[derive(Clone)]
pub struct Backends {
	pub vector: Arc<dyn VectorSearch>,
	pub graph: Arc<dyn GraphContext>,
	pub cache: Arc<dyn PipelineCache>,
}
impl Backends {
	pub fn new(
		vector: Arc<dyn VectorSearch>,
		graph: Arc<dyn GraphContext>,
		cache: Arc<dyn PipelineCache>,
	) -> Self {
		Self { vector, graph, cache }
	}
}

pub struct GroveService {
	pub cfg: Config,
	pub backends: Backends,
	pub providers: Providers,
	in_flight: cache::InFlight,
}
impl GroveService {
	pub fn new(cfg: Config, backends: Backends) -> Self {
		Self::with_providers(cfg, backends, Providers::default())
	}

	pub fn with_providers(cfg: Config, backends: Backends, providers: Providers) -> Self {
		Self { cfg, backends, providers, in_flight: cache::InFlight::default() }
	}

	/// Drops every cached evidence set and returns how many entries were removed.
	pub async fn flush_cache(&self) -> Result<u64> {
		let removed = self.backends.cache.flush().await?;

		tracing::info!(removed, "Pipeline cache flushed.");

		Ok(removed)
	}
}

struct DefaultProviders;

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}

impl RerankProvider for DefaultProviders {
	fn rerank<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>> {
		Box::pin(rerank::rerank(cfg, query, docs))
	}
}

impl ExpansionProvider for DefaultProviders {
	fn expand<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, color_eyre::Result<Value>> {
		Box::pin(chat::complete_json(cfg, messages))
	}
}

impl GenerationProvider for DefaultProviders {
	fn generate<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(chat::complete_text(cfg, messages))
	}
}
