use std::{borrow::Cow, collections::HashMap};

use serde::{Deserialize, Serialize};

/// Prefix of the synthetic source identifier carried by graph facts.
pub const GRAPH_SOURCE_PREFIX: &str = "graph:";

/// A scored span of source text retrieved from the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
	pub id: String,
	pub source_document_id: String,
	pub text: String,
	pub vector_score: f32,
	pub rerank_score: Option<f32>,
	/// The expanded query that retrieved this fragment. Never used for ranking.
	pub origin_query: String,
}
impl Fragment {
	/// Two fragments are the same evidence unit when they share a document and identical text.
	pub fn identity(&self) -> (&str, &str) {
		(self.source_document_id.as_str(), self.text.as_str())
	}
}

/// A subject-relationship-object triple lifted out of the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphFact {
	pub subject: String,
	pub relationship_type: String,
	pub object: String,
	pub supporting_context: Option<String>,
	pub source_id: String,
	/// Position in which the fact was resolved during graph augmentation.
	pub resolution_rank: u32,
}
impl GraphFact {
	pub fn synthetic_source_id(anchor: &str) -> String {
		format!("{GRAPH_SOURCE_PREFIX}{anchor}")
	}

	pub fn triple(&self) -> (&str, &str, &str) {
		(self.subject.as_str(), self.relationship_type.as_str(), self.object.as_str())
	}

	/// Text handed to the reranker and to context assembly.
	pub fn render(&self) -> String {
		let mut out = format!("{} {} {}.", self.subject, self.relationship_type, self.object);

		if let Some(context) = self.supporting_context.as_deref().map(str::trim)
			&& !context.is_empty()
		{
			out.push(' ');
			out.push_str(context);
		}

		out
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvidenceUnit {
	Fragment(Fragment),
	Fact(GraphFact),
}
impl EvidenceUnit {
	pub fn source_id(&self) -> &str {
		match self {
			Self::Fragment(fragment) => fragment.source_document_id.as_str(),
			Self::Fact(fact) => fact.source_id.as_str(),
		}
	}

	pub fn text(&self) -> Cow<'_, str> {
		match self {
			Self::Fragment(fragment) => Cow::Borrowed(fragment.text.as_str()),
			Self::Fact(fact) => Cow::Owned(fact.render()),
		}
	}

	pub fn is_fact(&self) -> bool {
		matches!(self, Self::Fact(_))
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
	pub unit: EvidenceUnit,
	pub score: f32,
}

/// The ranked, capped evidence handed to answer generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSet {
	pub items: Vec<EvidenceItem>,
}
impl EvidenceSet {
	pub fn new(items: Vec<EvidenceItem>) -> Self {
		Self { items }
	}

	pub fn len(&self) -> usize {
		self.items.len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &EvidenceItem> {
		self.items.iter()
	}

	pub fn is_sorted_desc(&self) -> bool {
		self.items.windows(2).all(|pair| pair[0].score >= pair[1].score)
	}

	/// Largest number of items attributed to any single source.
	pub fn max_per_source(&self) -> usize {
		let mut counts: HashMap<&str, usize> = HashMap::new();

		for item in &self.items {
			*counts.entry(item.unit.source_id()).or_insert(0) += 1;
		}

		counts.into_values().max().unwrap_or(0)
	}
}
