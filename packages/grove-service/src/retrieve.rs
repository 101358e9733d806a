use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use grove_domain::evidence::{EvidenceSet, EvidenceUnit};

use crate::{
	Error, GroveService, Result, Stage,
	cache::{self, cache_key_prefix},
	fusion::{self, SelectionBudget},
	merge,
	multi_query::{self, ExpandedQuerySet, SearchBudget},
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrieveRequest {
	pub query: String,
	/// Restricts retrieval to these source documents.
	#[serde(default)]
	pub source_files: Option<Vec<String>>,
	/// Overrides `retrieval.final_top_n` for this call.
	#[serde(default)]
	pub top_n: Option<u32>,
}

/// An optional stage that failed and contributed an empty or fallback result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Degradation {
	pub stage: Stage,
	pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrieveReport {
	pub evidence: EvidenceSet,
	pub cache_hit: bool,
	/// Empty on a cache hit.
	pub expanded_queries: Vec<String>,
	pub degradations: Vec<Degradation>,
}
impl RetrieveReport {
	fn cached(evidence: EvidenceSet) -> Self {
		Self { evidence, cache_hit: true, expanded_queries: Vec::new(), degradations: Vec::new() }
	}
}

struct Degradations {
	strict: bool,
	items: Vec<Degradation>,
}
impl Degradations {
	fn new(strict: bool) -> Self {
		Self { strict, items: Vec::new() }
	}

	fn record(&mut self, stage: Stage, message: String) -> Result<()> {
		warn!(stage = stage.as_str(), error = %message, strict = self.strict, "Pipeline stage degraded.");

		if self.strict {
			return Err(Error::Degraded { stage, message });
		}

		self.items.push(Degradation { stage, message });

		Ok(())
	}
}

struct PipelineOutput {
	evidence: EvidenceSet,
	expanded_queries: Vec<String>,
	degradations: Vec<Degradation>,
}

impl GroveService {
	pub async fn retrieve(&self, req: RetrieveRequest) -> Result<EvidenceSet> {
		Ok(self.retrieve_with_report(req).await?.evidence)
	}

	/// Runs the retrieval-fusion pipeline, short-circuiting on a cache hit.
	///
	/// Only a failed vector search aborts the request (unless strict mode is on). Nothing is
	/// cached when the pipeline fails.
	pub async fn retrieve_with_report(&self, req: RetrieveRequest) -> Result<RetrieveReport> {
		let query = req.query.trim();

		if query.is_empty() {
			return Err(Error::InvalidRequest { message: "query must not be empty.".to_string() });
		}

		let filters = normalize_filters(req.source_files.as_deref());
		let final_top_n = self.resolve_top_n(req.top_n);
		let cache_key = if self.cfg.cache.enabled {
			match cache::build_pipeline_cache_key(query, filters.as_deref(), final_top_n) {
				Ok(key) => Some(key),
				Err(err) => {
					warn!(error = %err, "Cache key build failed.");

					None
				},
			}
		} else {
			None
		};
		let Some(key) = cache_key else {
			let output = self.run_pipeline(query, filters.as_deref(), final_top_n).await?;

			return Ok(output.into_report());
		};

		if let Some(evidence) = self.cache_lookup(&key).await {
			return Ok(RetrieveReport::cached(evidence));
		}

		let _in_flight = if self.cfg.cache.single_flight {
			let guard = self.in_flight.acquire(&key).await;

			if let Some(evidence) = self.cache_lookup(&key).await {
				return Ok(RetrieveReport::cached(evidence));
			}

			Some(guard)
		} else {
			None
		};
		let output = self.run_pipeline(query, filters.as_deref(), final_top_n).await?;

		self.cache_store(&key, &output.evidence, !output.degradations.is_empty()).await;

		Ok(output.into_report())
	}

	fn resolve_top_n(&self, requested: Option<u32>) -> u32 {
		let cfg = &self.cfg.retrieval;

		match requested {
			Some(top_n) => top_n.clamp(1, cfg.candidate_budget),
			None => cfg.final_top_n,
		}
	}

	async fn run_pipeline(
		&self,
		query: &str,
		filters: Option<&[String]>,
		final_top_n: u32,
	) -> Result<PipelineOutput> {
		let cfg = &self.cfg.retrieval;
		let mut degradations = Degradations::new(cfg.strict);
		let expansions = if cfg.expansion.enabled {
			let seed_set = ExpandedQuerySet::new(query, Vec::new());
			let seed = multi_query::retrieve_batch(
				&self.backends.vector,
				&seed_set,
				filters,
				SearchBudget {
					top_k: cfg.seed_top_k,
					per_file_limit: cfg.per_file_chunk_limit,
					alpha: cfg.hybrid_alpha,
				},
			)
			.await?;
			let seed_context: Vec<String> =
				seed.into_iter().take(cfg.seed_top_k as usize).map(|fragment| fragment.text).collect();

			match self.generate_expansions(query, &seed_context).await {
				Ok(expansions) => expansions,
				Err(err) => {
					degradations.record(Stage::Expansion, err.to_string())?;

					Vec::new()
				},
			}
		} else {
			Vec::new()
		};
		let queries = ExpandedQuerySet::new(query, expansions);
		let pool = multi_query::retrieve_batch(
			&self.backends.vector,
			&queries,
			filters,
			SearchBudget {
				top_k: cfg.main_search_top_k,
				per_file_limit: cfg.per_file_chunk_limit,
				alpha: cfg.hybrid_alpha,
			},
		)
		.await?;
		let pool_size = pool.len();
		let per_doc_cap = match filters {
			Some(_) => cfg.candidates_per_doc.min(cfg.per_file_chunk_limit),
			None => cfg.candidates_per_doc,
		};
		let candidates = merge::merge_candidates(pool, cfg.candidate_budget, per_doc_cap);

		tracing::info!(
			stage = "merge",
			query_count = queries.len(),
			pool_size,
			candidate_count = candidates.len(),
			"Candidates merged."
		);

		let facts = if cfg.graph.enabled && !candidates.is_empty() {
			match self.augment_with_graph(&candidates).await {
				Ok(facts) => facts,
				Err(err) => {
					degradations.record(Stage::GraphAugmentation, err.to_string())?;

					Vec::new()
				},
			}
		} else {
			Vec::new()
		};
		let mut units: Vec<EvidenceUnit> =
			candidates.into_iter().map(EvidenceUnit::Fragment).collect();

		units.extend(facts.into_iter().map(EvidenceUnit::Fact));

		let budget = SelectionBudget { final_top_n, per_source_cap: cfg.top_n_per_reranked_doc };
		let evidence = if units.is_empty() {
			EvidenceSet::default()
		} else if cfg.rerank.enabled {
			match self.rerank_units(query, &units).await {
				Ok(scores) => fusion::select_by_rerank(units, &scores, budget),
				Err(err) => {
					degradations.record(Stage::Rerank, err.to_string())?;

					fusion::select_by_vector_score(units, budget)
				},
			}
		} else {
			fusion::select_by_vector_score(units, budget)
		};

		tracing::info!(
			stage = "fusion",
			evidence_count = evidence.len(),
			degraded = degradations.items.len(),
			"Retrieval pipeline completed."
		);

		Ok(PipelineOutput {
			evidence,
			expanded_queries: queries.expansions().to_vec(),
			degradations: degradations.items,
		})
	}

	async fn cache_lookup(&self, key: &str) -> Option<EvidenceSet> {
		match self.backends.cache.get(key).await {
			Ok(Some(evidence)) => {
				tracing::info!(
					cache_key_prefix = cache_key_prefix(key),
					hit = true,
					evidence_count = evidence.len(),
					"Cache hit."
				);

				Some(evidence)
			},
			Ok(None) => {
				tracing::info!(cache_key_prefix = cache_key_prefix(key), hit = false, "Cache miss.");

				None
			},
			Err(err) => {
				warn!(error = %err, cache_key_prefix = cache_key_prefix(key), "Cache read failed.");

				None
			},
		}
	}

	async fn cache_store(&self, key: &str, evidence: &EvidenceSet, degraded: bool) {
		let ttl = entry_ttl(&self.cfg.cache, degraded);

		match self.backends.cache.put(key, evidence, ttl).await {
			Ok(()) => {
				tracing::info!(
					cache_key_prefix = cache_key_prefix(key),
					ttl_seconds = ttl.whole_seconds(),
					degraded,
					evidence_count = evidence.len(),
					"Cache stored."
				);
			},
			Err(err) => {
				warn!(error = %err, cache_key_prefix = cache_key_prefix(key), "Cache write failed.");
			},
		}
	}
}

impl PipelineOutput {
	fn into_report(self) -> RetrieveReport {
		RetrieveReport {
			evidence: self.evidence,
			cache_hit: false,
			expanded_queries: self.expanded_queries,
			degradations: self.degradations,
		}
	}
}

/// Entries built while a stage was degraded live for `degraded_ttl_seconds`.
fn entry_ttl(cfg: &grove_config::Cache, degraded: bool) -> time::Duration {
	if degraded {
		time::Duration::seconds(cfg.degraded_ttl_seconds.min(cfg.ttl_seconds))
	} else {
		time::Duration::seconds(cfg.ttl_seconds)
	}
}

/// Trimmed, deduplicated, sorted. An empty list means no filtering.
fn normalize_filters(filters: Option<&[String]>) -> Option<Vec<String>> {
	let normalized: BTreeSet<String> = filters?
		.iter()
		.map(|filter| filter.trim())
		.filter(|filter| !filter.is_empty())
		.map(str::to_string)
		.collect();

	if normalized.is_empty() { None } else { Some(normalized.into_iter().collect()) }
}
