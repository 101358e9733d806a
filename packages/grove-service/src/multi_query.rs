use std::{cmp::Ordering, sync::Arc};

use tokio::task::JoinSet;

use grove_domain::evidence::Fragment;

use crate::{Error, Result, VectorHit, VectorSearch, ranking::cmp_f32_desc};

/// The original query followed by its expansions, in generation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedQuerySet {
	queries: Vec<String>,
}
impl ExpandedQuerySet {
	pub fn new(original: &str, expansions: Vec<String>) -> Self {
		let mut queries = Vec::with_capacity(expansions.len() + 1);

		queries.push(original.to_string());
		queries.extend(expansions);

		Self { queries }
	}

	pub fn original(&self) -> &str {
		&self.queries[0]
	}

	pub fn queries(&self) -> &[String] {
		&self.queries
	}

	pub fn expansions(&self) -> &[String] {
		&self.queries[1..]
	}

	pub fn len(&self) -> usize {
		self.queries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.queries.is_empty()
	}
}

#[derive(Debug, Clone, Copy)]
pub struct SearchBudget {
	pub top_k: u32,
	/// Per named document, per query. Only applies when filters are present.
	pub per_file_limit: u32,
	pub alpha: f32,
}

/// Runs every query of `queries` through the vector index concurrently and returns the pooled
/// fragments grouped by query, in query order. Any failed search fails the whole batch.
pub async fn retrieve_batch(
	vector: &Arc<dyn VectorSearch>,
	queries: &ExpandedQuerySet,
	filters: Option<&[String]>,
	budget: SearchBudget,
) -> Result<Vec<Fragment>> {
	let mut tasks = JoinSet::new();

	for (query_idx, query) in queries.queries().iter().enumerate() {
		match filters {
			Some(documents) =>
				for document in documents {
					let vector = vector.clone();
					let query = query.clone();
					let scope = vec![document.clone()];
					let limit = budget.top_k.min(budget.per_file_limit);

					tasks.spawn(async move {
						let hits =
							vector.search(&query, Some(scope.as_slice()), limit, budget.alpha).await;

						(query_idx, hits)
					});
				},
			None => {
				let vector = vector.clone();
				let query = query.clone();

				tasks.spawn(async move {
					let hits = vector.search(&query, None, budget.top_k, budget.alpha).await;

					(query_idx, hits)
				});
			},
		}
	}

	let mut per_query: Vec<Vec<VectorHit>> = vec![Vec::new(); queries.len()];

	while let Some(joined) = tasks.join_next().await {
		let (query_idx, hits) = joined.map_err(|err| Error::RetrievalUnavailable {
			message: format!("Vector search task failed: {err}"),
		})?;
		let hits = hits.map_err(into_unavailable)?;

		per_query[query_idx].extend(hits);
	}

	let mut pool = Vec::new();

	for (query_idx, mut hits) in per_query.into_iter().enumerate() {
		// Per-document searches arrive in completion order.
		if filters.is_some() {
			hits.sort_by(order_hits);
		}

		hits.truncate(budget.top_k as usize);

		let origin = &queries.queries()[query_idx];

		pool.extend(hits.into_iter().map(|hit| Fragment {
			id: hit.id,
			source_document_id: hit.source_document_id,
			text: hit.text,
			vector_score: hit.score,
			rerank_score: None,
			origin_query: origin.clone(),
		}));
	}

	tracing::debug!(
		query_count = queries.len(),
		fragment_count = pool.len(),
		filtered = filters.is_some(),
		"Retrieval batch completed."
	);

	Ok(pool)
}

fn into_unavailable(err: Error) -> Error {
	match err {
		Error::RetrievalUnavailable { .. } => err,
		other => Error::RetrievalUnavailable { message: other.to_string() },
	}
}

fn order_hits(a: &VectorHit, b: &VectorHit) -> Ordering {
	cmp_f32_desc(a.score, b.score)
		.then_with(|| a.source_document_id.cmp(&b.source_document_id))
		.then_with(|| a.id.cmp(&b.id))
}
