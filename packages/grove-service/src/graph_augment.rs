use std::collections::HashSet;

use grove_domain::{
	evidence::{Fragment, GraphFact},
	mentions::{self, normalize_entity_name},
};

use crate::{GraphRelation, GroveService, Result};

impl GroveService {
	/// Graph facts anchored on entities named in the top candidates.
	///
	/// Mentions are read from the first `anchor_window` candidates only. An empty result is
	/// normal when nothing resolves; errors come from the graph collaborator.
	pub async fn augment_with_graph(&self, candidates: &[Fragment]) -> Result<Vec<GraphFact>> {
		let cfg = &self.cfg.retrieval.graph;
		let window = candidates.iter().take(cfg.anchor_window as usize).map(|f| f.text.as_str());
		let mentions = mentions::extract_mentions(window, cfg.max_mentions as usize);

		if mentions.is_empty() {
			tracing::debug!(stage = "graph_augmentation", "No entity mentions in top candidates.");

			return Ok(Vec::new());
		}

		let resolved = self.backends.graph.resolve_entities(&mentions).await?;
		let mut anchors = Vec::new();
		let mut seen = HashSet::new();

		for entity in resolved {
			if seen.insert(normalize_entity_name(&entity.canonical_name)) {
				anchors.push(entity.canonical_name);
			}
		}

		if anchors.is_empty() {
			tracing::info!(
				stage = "graph_augmentation",
				mention_count = mentions.len(),
				"No mentions resolved to graph entities."
			);

			return Ok(Vec::new());
		}

		let relations = self
			.backends
			.graph
			.neighborhood(&anchors, cfg.entity_info_hop_depth, cfg.max_facts)
			.await?;
		let facts = facts_from_relations(relations, cfg.max_facts as usize);

		tracing::info!(
			stage = "graph_augmentation",
			mention_count = mentions.len(),
			anchor_count = anchors.len(),
			fact_count = facts.len(),
			"Graph augmentation completed."
		);

		Ok(facts)
	}
}

/// Converts relations into facts, keeping the first occurrence of each directed triple.
pub fn facts_from_relations(relations: Vec<GraphRelation>, max_facts: usize) -> Vec<GraphFact> {
	let mut out: Vec<GraphFact> = Vec::new();
	let mut seen: HashSet<(String, String, String)> = HashSet::new();

	for relation in relations {
		if out.len() >= max_facts {
			break;
		}

		let fact = GraphFact {
			source_id: GraphFact::synthetic_source_id(&normalize_entity_name(&relation.anchor)),
			subject: relation.subject,
			relationship_type: relation.relationship_type,
			object: relation.object,
			supporting_context: relation.supporting_context,
			resolution_rank: out.len() as u32,
		};
		let (subject, relationship_type, object) = fact.triple();

		if !seen.insert((subject.to_string(), relationship_type.to_string(), object.to_string())) {
			continue;
		}

		out.push(fact);
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	fn relation(anchor: &str, subject: &str, rel: &str, object: &str) -> GraphRelation {
		GraphRelation {
			anchor: anchor.to_string(),
			subject: subject.to_string(),
			relationship_type: rel.to_string(),
			object: object.to_string(),
			supporting_context: None,
		}
	}

	#[test]
	fn triple_reached_from_two_anchors_is_kept_once() {
		let facts = facts_from_relations(
			vec![
				relation("Project Chimera", "Project Chimera", "LED_BY", "Dr. Aris Thorne"),
				relation("Dr. Aris Thorne", "Project Chimera", "LED_BY", "Dr. Aris Thorne"),
				relation("Dr. Aris Thorne", "Dr. Aris Thorne", "WORKS_AT", "Zurich Lab"),
			],
			10,
		);

		assert_eq!(facts.len(), 2);
		assert_eq!(facts[0].triple(), ("Project Chimera", "LED_BY", "Dr. Aris Thorne"));
		assert_eq!(facts[0].source_id, "graph:project chimera");
		assert_eq!(facts[1].source_id, "graph:dr. aris thorne");
		assert_eq!(facts[1].resolution_rank, 1);
	}

	#[test]
	fn direction_matters_for_dedup() {
		let facts = facts_from_relations(
			vec![
				relation("Alpha Corp", "Alpha Corp", "PARTNERS_WITH", "Beta Labs"),
				relation("Alpha Corp", "Beta Labs", "PARTNERS_WITH", "Alpha Corp"),
			],
			10,
		);

		assert_eq!(facts.len(), 2);
	}

	#[test]
	fn caps_fact_count() {
		let relations = (0..5)
			.map(|idx| relation("Alpha", "Alpha", "MENTIONS", &format!("Item {idx}")))
			.collect();

		assert_eq!(facts_from_relations(relations, 3).len(), 3);
	}
}
