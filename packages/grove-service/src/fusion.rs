use std::collections::HashMap;

use color_eyre::eyre;

use grove_domain::evidence::{EvidenceItem, EvidenceSet, EvidenceUnit};

use crate::{GroveService, ranking::cmp_f32_desc};

#[derive(Debug, Clone, Copy)]
pub struct SelectionBudget {
	pub final_top_n: u32,
	pub per_source_cap: u32,
}

impl GroveService {
	/// Scores every unit against the original query in a single reranker call.
	///
	/// A score list of the wrong length or with non-finite values counts as a failure.
	pub async fn rerank_units(
		&self,
		query: &str,
		units: &[EvidenceUnit],
	) -> color_eyre::Result<Vec<f32>> {
		let docs: Vec<String> = units.iter().map(|unit| unit.text().into_owned()).collect();
		let scores =
			self.providers.rerank.rerank(&self.cfg.providers.rerank, query, &docs).await?;

		if scores.len() != docs.len() {
			return Err(eyre::eyre!(
				"Reranker returned {} scores for {} candidates.",
				scores.len(),
				docs.len()
			));
		}
		if let Some(idx) = scores.iter().position(|score| !score.is_finite()) {
			return Err(eyre::eyre!("Reranker returned a non-finite score for candidate {idx}."));
		}

		Ok(scores)
	}
}

/// Orders units by reranker score (ties keep input order) and applies the per-source cap before
/// truncating.
pub fn select_by_rerank(
	units: Vec<EvidenceUnit>,
	scores: &[f32],
	budget: SelectionBudget,
) -> EvidenceSet {
	let mut items: Vec<EvidenceItem> = units
		.into_iter()
		.zip(scores.iter().copied())
		.map(|(mut unit, score)| {
			if let EvidenceUnit::Fragment(fragment) = &mut unit {
				fragment.rerank_score = Some(score);
			}

			EvidenceItem { unit, score }
		})
		.collect();

	items.sort_by(|a, b| cmp_f32_desc(a.score, b.score));

	EvidenceSet::new(cap_per_source(items, budget))
}

/// Deterministic ordering used when reranking is off or failed: fragments by vector score, then
/// graph facts in resolution order, scored no higher than the weakest fragment.
pub fn select_by_vector_score(units: Vec<EvidenceUnit>, budget: SelectionBudget) -> EvidenceSet {
	let mut fragments = Vec::new();
	let mut facts = Vec::new();

	for unit in units {
		match unit {
			EvidenceUnit::Fragment(fragment) => fragments.push(fragment),
			EvidenceUnit::Fact(fact) => facts.push(fact),
		}
	}

	fragments.sort_by(|a, b| cmp_f32_desc(a.vector_score, b.vector_score));
	facts.sort_by_key(|fact| fact.resolution_rank);

	let fact_score = fragments
		.iter()
		.map(|fragment| fragment.vector_score)
		.filter(|score| score.is_finite())
		.fold(0.0_f32, f32::min);
	let mut items: Vec<EvidenceItem> = fragments
		.into_iter()
		.map(|fragment| {
			let score = fragment.vector_score;

			EvidenceItem { unit: EvidenceUnit::Fragment(fragment), score }
		})
		.collect();

	items.extend(
		facts.into_iter().map(|fact| EvidenceItem { unit: EvidenceUnit::Fact(fact), score: fact_score }),
	);

	EvidenceSet::new(cap_per_source(items, budget))
}

fn cap_per_source(items: Vec<EvidenceItem>, budget: SelectionBudget) -> Vec<EvidenceItem> {
	let mut out = Vec::new();
	let mut per_source: HashMap<String, u32> = HashMap::new();

	for item in items {
		if out.len() >= budget.final_top_n as usize {
			break;
		}

		let count = per_source.entry(item.unit.source_id().to_string()).or_insert(0);

		if *count >= budget.per_source_cap {
			continue;
		}

		*count += 1;

		out.push(item);
	}

	out
}

#[cfg(test)]
mod tests {
	use grove_domain::evidence::{Fragment, GraphFact};

	use super::*;

	fn fragment(doc: &str, text: &str, score: f32) -> EvidenceUnit {
		EvidenceUnit::Fragment(Fragment {
			id: text.to_string(),
			source_document_id: doc.to_string(),
			text: text.to_string(),
			vector_score: score,
			rerank_score: None,
			origin_query: "q".to_string(),
		})
	}

	fn fact(anchor: &str, object: &str, rank: u32) -> EvidenceUnit {
		EvidenceUnit::Fact(GraphFact {
			subject: anchor.to_string(),
			relationship_type: "RELATED_TO".to_string(),
			object: object.to_string(),
			supporting_context: None,
			source_id: GraphFact::synthetic_source_id(&anchor.to_lowercase()),
			resolution_rank: rank,
		})
	}

	fn texts(set: &EvidenceSet) -> Vec<String> {
		set.iter().map(|item| item.unit.text().into_owned()).collect()
	}

	#[test]
	fn rerank_order_with_per_source_cap() {
		let units = vec![
			fragment("doc-a", "a1", 0.9),
			fragment("doc-a", "a2", 0.8),
			fragment("doc-a", "a3", 0.7),
			fragment("doc-b", "b1", 0.6),
			fact("Chimera", "Thorne", 0),
		];
		let set = select_by_rerank(
			units,
			&[0.95, 0.94, 0.93, 0.10, 0.50],
			SelectionBudget { final_top_n: 4, per_source_cap: 2 },
		);

		assert_eq!(texts(&set), vec!["a1", "a2", "Chimera RELATED_TO Thorne.", "b1"]);
		assert!(set.is_sorted_desc());
		assert!(set.max_per_source() <= 2);

		let EvidenceUnit::Fragment(first) = &set.items[0].unit else {
			panic!("Expected a fragment first.");
		};

		assert_eq!(first.rerank_score, Some(0.95));
	}

	#[test]
	fn rerank_ties_keep_input_order() {
		let set = select_by_rerank(
			vec![fragment("doc-a", "first", 0.1), fragment("doc-b", "second", 0.9)],
			&[0.5, 0.5],
			SelectionBudget { final_top_n: 2, per_source_cap: 2 },
		);

		assert_eq!(texts(&set), vec!["first", "second"]);
	}

	#[test]
	fn fallback_orders_by_vector_score_and_appends_facts() {
		let set = select_by_vector_score(
			vec![
				fact("Chimera", "Thorne", 1),
				fragment("doc-a", "a1", 0.4),
				fact("Chimera", "Helios", 0),
				fragment("doc-b", "b1", 0.7),
			],
			SelectionBudget { final_top_n: 4, per_source_cap: 2 },
		);

		assert_eq!(
			texts(&set),
			vec!["b1", "a1", "Chimera RELATED_TO Helios.", "Chimera RELATED_TO Thorne."]
		);
		assert_eq!(set.items[2].score, 0.0);
		assert!(set.is_sorted_desc());
	}

	#[test]
	fn fallback_fact_score_stays_below_negative_fragments() {
		let set = select_by_vector_score(
			vec![fragment("doc-a", "a1", -0.3), fact("Chimera", "Thorne", 0)],
			SelectionBudget { final_top_n: 2, per_source_cap: 1 },
		);

		assert_eq!(set.items[1].score, -0.3);
		assert!(set.is_sorted_desc());
	}

	#[test]
	fn fallback_truncates_before_facts_when_fragments_fill_budget() {
		let set = select_by_vector_score(
			vec![
				fragment("doc-a", "a1", 0.9),
				fragment("doc-b", "b1", 0.8),
				fragment("doc-c", "c1", 0.7),
				fact("Chimera", "Thorne", 0),
			],
			SelectionBudget { final_top_n: 3, per_source_cap: 1 },
		);

		assert_eq!(texts(&set), vec!["a1", "b1", "c1"]);
	}
}
