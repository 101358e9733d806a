//! Collaborator implementations backed by Qdrant, Postgres, and the HTTP providers.

use std::{collections::HashMap, sync::Arc};

use sqlx::PgPool;
use time::OffsetDateTime;

use grove_config::{Config, EmbeddingProviderConfig};
use grove_domain::{evidence::EvidenceSet, mentions::EntityMention};
use grove_storage::{
	cache as cache_store,
	db::Db,
	graph,
	qdrant::{self, PointHit, QdrantStore},
};

use crate::{
	Backends, BoxFuture, EmbeddingProvider, Error, GraphContext, GraphRelation, GroveService,
	PipelineCache, Providers, ResolvedEntity, Result, VectorHit, VectorSearch,
	cache::cache_key_prefix, ranking::cmp_f32_desc, ranking::min_max_normalize,
};

impl GroveService {
	/// Connects Postgres and Qdrant, bootstraps the schema, and wires the HTTP providers.
	pub async fn connect(cfg: Config) -> Result<Self> {
		let db = Db::connect(&cfg.storage.postgres).await?;

		db.ensure_schema().await?;

		let store = QdrantStore::new(&cfg.storage.qdrant)?;
		let providers = Providers::default();
		let vector = QdrantVectorSearch::new(
			store,
			providers.embedding.clone(),
			cfg.providers.embedding.clone(),
		);
		let graph = PgGraphStore::new(db.pool.clone());
		let cache = PgPipelineCache::new(db.pool.clone(), cfg.cache.max_payload_bytes);
		let backends = Backends::new(Arc::new(vector), Arc::new(graph), Arc::new(cache));

		Ok(Self::with_providers(cfg, backends, providers))
	}
}

/// Hybrid search: a dense query and a BM25 query, each min-max normalized, blended by `alpha`.
pub struct QdrantVectorSearch {
	store: QdrantStore,
	embedding: Arc<dyn EmbeddingProvider>,
	embedding_cfg: EmbeddingProviderConfig,
}
impl QdrantVectorSearch {
	pub fn new(
		store: QdrantStore,
		embedding: Arc<dyn EmbeddingProvider>,
		embedding_cfg: EmbeddingProviderConfig,
	) -> Self {
		Self { store, embedding, embedding_cfg }
	}
}

impl VectorSearch for QdrantVectorSearch {
	fn search<'a>(
		&'a self,
		query: &'a str,
		filters: Option<&'a [String]>,
		top_k: u32,
		alpha: f32,
	) -> BoxFuture<'a, Result<Vec<VectorHit>>> {
		Box::pin(async move {
			let texts = vec![query.to_string()];
			let mut vectors =
				self.embedding.embed(&self.embedding_cfg, &texts).await.map_err(|err| {
					Error::RetrievalUnavailable { message: format!("Query embedding failed: {err}") }
				})?;
			let vector = vectors.pop().ok_or_else(|| Error::RetrievalUnavailable {
				message: "Embedding provider returned no vectors.".to_string(),
			})?;
			let filter = filters.map(qdrant::source_document_filter);
			let dense = self
				.store
				.search_dense(vector, filter.as_ref(), top_k)
				.await
				.map_err(|err| Error::RetrievalUnavailable { message: err.to_string() })?;
			let lexical = self
				.store
				.search_bm25(query, filter.as_ref(), top_k)
				.await
				.map_err(|err| Error::RetrievalUnavailable { message: err.to_string() })?;

			Ok(blend_hits(dense, lexical, alpha, top_k))
		})
	}
}

/// `alpha * dense + (1 - alpha) * lexical` over normalized scores. A point absent from one list
/// scores 0 on that side.
pub fn blend_hits(
	dense: Vec<PointHit>,
	lexical: Vec<PointHit>,
	alpha: f32,
	top_k: u32,
) -> Vec<VectorHit> {
	let dense_scores = min_max_normalize(&dense.iter().map(|hit| hit.score).collect::<Vec<_>>());
	let lexical_scores =
		min_max_normalize(&lexical.iter().map(|hit| hit.score).collect::<Vec<_>>());
	let mut blended: HashMap<String, (PointHit, f32, f32)> = HashMap::new();

	for (hit, score) in dense.into_iter().zip(dense_scores) {
		blended.entry(hit.point_id.clone()).or_insert((hit, 0.0, 0.0)).1 = score;
	}
	for (hit, score) in lexical.into_iter().zip(lexical_scores) {
		blended.entry(hit.point_id.clone()).or_insert((hit, 0.0, 0.0)).2 = score;
	}

	let mut out: Vec<VectorHit> = blended
		.into_values()
		.map(|(hit, dense, lexical)| VectorHit {
			id: hit.point_id,
			source_document_id: hit.source_document_id,
			text: hit.text,
			score: alpha * dense + (1.0 - alpha) * lexical,
		})
		.collect();

	out.sort_by(|a, b| cmp_f32_desc(a.score, b.score).then_with(|| a.id.cmp(&b.id)));
	out.truncate(top_k as usize);

	out
}

pub struct PgGraphStore {
	pool: PgPool,
}
impl PgGraphStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}
}

impl GraphContext for PgGraphStore {
	fn resolve_entities<'a>(
		&'a self,
		mentions: &'a [EntityMention],
	) -> BoxFuture<'a, Result<Vec<ResolvedEntity>>> {
		Box::pin(async move {
			let mut conn = self.pool.acquire().await?;
			let mut out = Vec::new();

			for mention in mentions {
				if let Some(entity) =
					graph::resolve_entity(&mut conn, &mention.canonical_candidate).await?
				{
					out.push(ResolvedEntity {
						canonical_name: entity.canonical,
						kind: entity.kind,
						mention: mention.surface_text.clone(),
					});
				}
			}

			Ok(out)
		})
	}

	fn neighborhood<'a>(
		&'a self,
		entity_names: &'a [String],
		hop_depth: u32,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<GraphRelation>>> {
		Box::pin(async move {
			let mut conn = self.pool.acquire().await?;
			let mut out = Vec::new();

			for name in entity_names {
				let Some(entity) = graph::resolve_entity(&mut conn, name).await? else {
					continue;
				};
				let relations =
					graph::fetch_neighborhood(&mut conn, entity.entity_id, hop_depth, limit).await?;

				out.extend(relations.into_iter().map(|relation| GraphRelation {
					anchor: entity.canonical.clone(),
					subject: relation.subject,
					relationship_type: relation.relationship_type,
					object: relation.object,
					supporting_context: relation.supporting_context,
				}));
			}

			Ok(out)
		})
	}
}

pub struct PgPipelineCache {
	pool: PgPool,
	max_payload_bytes: Option<u64>,
}
impl PgPipelineCache {
	pub fn new(pool: PgPool, max_payload_bytes: Option<u64>) -> Self {
		Self { pool, max_payload_bytes }
	}
}

impl PipelineCache for PgPipelineCache {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<EvidenceSet>>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();
			let Some(payload) = cache_store::fetch_cache_payload(&self.pool, key, now).await? else {
				return Ok(None);
			};

			match serde_json::from_value::<EvidenceSet>(payload.value) {
				Ok(evidence) => Ok(Some(evidence)),
				Err(err) => {
					tracing::warn!(
						error = %err,
						cache_key_prefix = cache_key_prefix(key),
						payload_size = payload.size_bytes,
						"Cache payload decode failed."
					);

					Ok(None)
				},
			}
		})
	}

	fn put<'a>(
		&'a self,
		key: &'a str,
		value: &'a EvidenceSet,
		ttl: time::Duration,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let payload = serde_json::to_value(value).map_err(|err| Error::Storage {
				message: format!("Failed to encode cache payload: {err}"),
			})?;
			let now = OffsetDateTime::now_utc();
			let stored = cache_store::store_cache_payload(
				&self.pool,
				key,
				&payload,
				now,
				now + ttl,
				self.max_payload_bytes,
			)
			.await?;

			if stored.is_none() {
				tracing::info!(
					cache_key_prefix = cache_key_prefix(key),
					max_payload_bytes = self.max_payload_bytes,
					"Cache payload too large; skipping store."
				);
			}

			Ok(())
		})
	}

	fn flush(&self) -> BoxFuture<'_, Result<u64>> {
		Box::pin(async move { Ok(cache_store::flush_cache(&self.pool).await?) })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn hit(id: &str, score: f32) -> PointHit {
		PointHit {
			point_id: id.to_string(),
			source_document_id: format!("doc-{id}"),
			text: format!("text {id}"),
			score,
		}
	}

	fn ids(hits: &[VectorHit]) -> Vec<&str> {
		hits.iter().map(|hit| hit.id.as_str()).collect()
	}

	#[test]
	fn alpha_one_is_purely_dense() {
		let blended = blend_hits(
			vec![hit("a", 0.9), hit("b", 0.1)],
			vec![hit("b", 12.0), hit("c", 3.0)],
			1.0,
			10,
		);

		assert_eq!(ids(&blended), vec!["a", "b", "c"]);
		assert_eq!(blended[0].score, 1.0);
		assert_eq!(blended[2].score, 0.0);
	}

	#[test]
	fn alpha_zero_is_purely_lexical() {
		let blended = blend_hits(
			vec![hit("a", 0.9), hit("b", 0.1)],
			vec![hit("b", 12.0), hit("c", 3.0)],
			0.0,
			2,
		);

		assert_eq!(ids(&blended), vec!["b", "c"]);
	}

	#[test]
	fn balanced_blend_rewards_agreement() {
		let blended = blend_hits(
			vec![hit("a", 0.9), hit("b", 0.8), hit("c", 0.1)],
			vec![hit("b", 9.0), hit("c", 1.0), hit("a", 0.5)],
			0.5,
			3,
		);

		assert_eq!(blended[0].id, "b");
		assert!(blended.windows(2).all(|pair| pair[0].score >= pair[1].score));
	}
}
