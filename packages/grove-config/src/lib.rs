mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Cache, Config, EmbeddingProviderConfig, LlmProviderConfig, Postgres, ProviderConfig,
	Providers, Qdrant, Retrieval, RetrievalExpansion, RetrievalGraph, RetrievalRerank, Security,
	Service, Storage,
};

use std::{fs, path::Path};

const MAX_HOP_DEPTH: u32 = 3;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);
	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.service.admin_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.admin_bind must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}

	validate_retrieval(&cfg.retrieval)?;

	if cfg.cache.ttl_seconds <= 0 {
		return Err(Error::Validation {
			message: "cache.ttl_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.cache.degraded_ttl_seconds <= 0 || cfg.cache.degraded_ttl_seconds > cfg.cache.ttl_seconds
	{
		return Err(Error::Validation {
			message: "cache.degraded_ttl_seconds must be in the range 1-cache.ttl_seconds."
				.to_string(),
		});
	}

	if let Some(max) = cfg.cache.max_payload_bytes
		&& max == 0
	{
		return Err(Error::Validation {
			message: "cache.max_payload_bytes must be greater than zero.".to_string(),
		});
	}

	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("rerank", &cfg.providers.rerank.api_key),
		("llm_expansion", &cfg.providers.llm_expansion.api_key),
		("llm_generation", &cfg.providers.llm_generation.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	Ok(())
}

fn validate_retrieval(retrieval: &Retrieval) -> Result<()> {
	if !retrieval.hybrid_alpha.is_finite() {
		return Err(Error::Validation {
			message: "retrieval.hybrid_alpha must be a finite number.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&retrieval.hybrid_alpha) {
		return Err(Error::Validation {
			message: "retrieval.hybrid_alpha must be in the range 0.0-1.0.".to_string(),
		});
	}

	for (label, value) in [
		("retrieval.seed_top_k", retrieval.seed_top_k),
		("retrieval.main_search_top_k", retrieval.main_search_top_k),
		("retrieval.per_file_chunk_limit", retrieval.per_file_chunk_limit),
		("retrieval.candidate_budget", retrieval.candidate_budget),
		("retrieval.candidates_per_doc", retrieval.candidates_per_doc),
		("retrieval.final_top_n", retrieval.final_top_n),
		("retrieval.top_n_per_reranked_doc", retrieval.top_n_per_reranked_doc),
		("retrieval.graph.anchor_window", retrieval.graph.anchor_window),
		("retrieval.graph.max_mentions", retrieval.graph.max_mentions),
		("retrieval.graph.max_facts", retrieval.graph.max_facts),
	] {
		if value == 0 {
			return Err(Error::Validation {
				message: format!("{label} must be greater than zero."),
			});
		}
	}

	if retrieval.seed_top_k > retrieval.main_search_top_k {
		return Err(Error::Validation {
			message: "retrieval.seed_top_k must not exceed retrieval.main_search_top_k."
				.to_string(),
		});
	}
	if retrieval.final_top_n > retrieval.candidate_budget {
		return Err(Error::Validation {
			message: "retrieval.final_top_n must not exceed retrieval.candidate_budget."
				.to_string(),
		});
	}
	if retrieval.top_n_per_reranked_doc > retrieval.final_top_n {
		return Err(Error::Validation {
			message: "retrieval.top_n_per_reranked_doc must not exceed retrieval.final_top_n."
				.to_string(),
		});
	}
	if retrieval.expansion.enabled && retrieval.expansion.num_expansions == 0 {
		return Err(Error::Validation {
			message: "retrieval.expansion.num_expansions must be greater than zero when enabled."
				.to_string(),
		});
	}
	if !(1..=MAX_HOP_DEPTH).contains(&retrieval.graph.entity_info_hop_depth) {
		return Err(Error::Validation {
			message: format!(
				"retrieval.graph.entity_info_hop_depth must be in the range 1-{MAX_HOP_DEPTH}."
			),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.security.api_auth_token.as_deref().map(|token| token.trim().is_empty()).unwrap_or(false)
	{
		cfg.security.api_auth_token = None;
	}
}
