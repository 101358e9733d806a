use serde::{Deserialize, Serialize};
use serde_json::Value;

use grove_domain::evidence::{EvidenceSet, EvidenceUnit};

use crate::{Error, GroveService, Result, RetrieveRequest};

pub const EMPTY_CONTEXT: &str = "No relevant information found.";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnswerRequest {
	pub query: String,
	#[serde(default)]
	pub source_files: Option<Vec<String>>,
	#[serde(default)]
	pub top_n: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerResponse {
	pub answer: String,
	pub context: String,
	pub evidence: EvidenceSet,
}

impl GroveService {
	/// Retrieves evidence for `req.query` and asks the generation model to answer from it.
	pub async fn answer(&self, req: AnswerRequest) -> Result<AnswerResponse> {
		let query = req.query.trim().to_string();
		let evidence = self
			.retrieve(RetrieveRequest {
				query: query.clone(),
				source_files: req.source_files,
				top_n: req.top_n,
			})
			.await?;
		let context = assemble_context(&evidence);
		let messages = build_answer_messages(&query, &context);
		let answer = self
			.providers
			.generation
			.generate(&self.cfg.providers.llm_generation, &messages)
			.await
			.map_err(|err| Error::Provider { message: format!("Answer generation failed: {err}") })?;

		tracing::info!(
			evidence_count = evidence.len(),
			context_size = context.len(),
			"Answer generated."
		);

		Ok(AnswerResponse { answer, context, evidence })
	}
}

/// Renders graph facts first, then document excerpts, each in evidence order.
pub fn assemble_context(evidence: &EvidenceSet) -> String {
	if evidence.is_empty() {
		return EMPTY_CONTEXT.to_string();
	}

	let mut facts = Vec::new();
	let mut excerpts = Vec::new();

	for item in evidence.iter() {
		match &item.unit {
			EvidenceUnit::Fact(fact) => {
				let mut line = format!(
					"- ({}) -[{}]-> ({})",
					fact.subject, fact.relationship_type, fact.object
				);

				if let Some(context) = fact.supporting_context.as_deref().map(str::trim)
					&& !context.is_empty()
				{
					line.push_str(&format!(" Context: {context}"));
				}

				facts.push(line);
			},
			EvidenceUnit::Fragment(fragment) => {
				excerpts.push(format!(
					"[{}] Source: {} (score {:.3})\n{}",
					excerpts.len() + 1,
					fragment.source_document_id,
					item.score,
					fragment.text.trim()
				));
			},
		}
	}

	let mut sections = Vec::new();

	if !facts.is_empty() {
		sections.push(format!("Knowledge Graph Context:\n{}", facts.join("\n")));
	}
	if !excerpts.is_empty() {
		sections.push(format!("Document Excerpts:\n{}", excerpts.join("\n\n")));
	}

	sections.join("\n\n")
}

pub fn build_answer_messages(query: &str, context: &str) -> Vec<Value> {
	let system_prompt = "You answer questions about a private document collection. \
Use only the provided context. If the context does not contain the answer, say so plainly. \
Do not invent sources.";
	let user_prompt = format!("Context:\n{context}\n\nQuestion:\n{query}");

	vec![
		serde_json::json!({ "role": "system", "content": system_prompt }),
		serde_json::json!({ "role": "user", "content": user_prompt }),
	]
}
