use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub retrieval: Retrieval,
	pub cache: Cache,
	pub security: Security,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub rerank: ProviderConfig,
	pub llm_expansion: LlmProviderConfig,
	pub llm_generation: LlmProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

/// Budgets and switches for the retrieval-fusion pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct Retrieval {
	/// Blend between lexical (0.0) and dense (1.0) similarity.
	pub hybrid_alpha: f32,
	/// Fragments fetched for the seed context that grounds query expansion.
	pub seed_top_k: u32,
	pub main_search_top_k: u32,
	/// Per named document, per query, when the request carries source filters.
	pub per_file_chunk_limit: u32,
	pub candidate_budget: u32,
	pub candidates_per_doc: u32,
	pub final_top_n: u32,
	pub top_n_per_reranked_doc: u32,
	/// Turns every degradation into a hard error.
	#[serde(default)]
	pub strict: bool,
	pub expansion: RetrievalExpansion,
	pub rerank: RetrievalRerank,
	pub graph: RetrievalGraph,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalExpansion {
	pub enabled: bool,
	pub num_expansions: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalRerank {
	pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalGraph {
	pub enabled: bool,
	pub entity_info_hop_depth: u32,
	/// Number of top candidates scanned for entity mentions.
	#[serde(default = "default_anchor_window")]
	pub anchor_window: u32,
	#[serde(default = "default_max_mentions")]
	pub max_mentions: u32,
	#[serde(default = "default_max_facts")]
	pub max_facts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cache {
	pub enabled: bool,
	pub ttl_seconds: i64,
	/// Lifetime of entries produced while an optional stage was degraded.
	#[serde(default = "default_degraded_ttl_seconds")]
	pub degraded_ttl_seconds: i64,
	pub max_payload_bytes: Option<u64>,
	#[serde(default)]
	pub single_flight: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Security {
	pub bind_localhost_only: bool,
	pub api_auth_token: Option<String>,
}

fn default_anchor_window() -> u32 {
	5
}

fn default_max_mentions() -> u32 {
	16
}

fn default_max_facts() -> u32 {
	32
}

fn default_degraded_ttl_seconds() -> i64 {
	60
}
