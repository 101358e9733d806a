use std::collections::HashSet;

use color_eyre::eyre;
use serde::Deserialize;
use serde_json::Value;

use crate::GroveService;

const SEED_SNIPPET_CHARS: usize = 600;

#[derive(Debug, Deserialize)]
struct ExpansionOutput {
	queries: Vec<String>,
}

impl GroveService {
	/// Alternative phrasings of `query`, grounded in `seed_context`.
	///
	/// Errors mean the generator failed or answered with something other than the expected
	/// JSON; callers treat that as zero expansions.
	pub async fn generate_expansions(
		&self,
		query: &str,
		seed_context: &[String],
	) -> color_eyre::Result<Vec<String>> {
		let cfg = &self.cfg.retrieval.expansion;

		if !cfg.enabled || cfg.num_expansions == 0 {
			return Ok(Vec::new());
		}

		let messages = build_expansion_messages(query, seed_context, cfg.num_expansions);
		let raw = self
			.providers
			.expansion
			.expand(&self.cfg.providers.llm_expansion, &messages)
			.await?;
		let expansions = parse_expansions(raw, query, cfg.num_expansions)?;

		tracing::info!(
			stage = "expansion",
			seed_count = seed_context.len(),
			expansion_count = expansions.len(),
			"Query expansion completed."
		);

		Ok(expansions)
	}
}

pub fn build_expansion_messages(query: &str, seed_context: &[String], count: u32) -> Vec<Value> {
	let schema = serde_json::json!({
		"queries": ["string"]
	});
	let schema_text = serde_json::to_string_pretty(&schema)
		.unwrap_or_else(|_| "{\"queries\": [\"string\"]}".to_string());
	let system_prompt = "You rewrite search queries for a document retrieval system. \
Output must be valid JSON only and must match the provided schema exactly. \
Each rewrite must keep the intent of the original query and use vocabulary found in the excerpts \
when it fits. Do not repeat the original query. Do not add explanations or extra fields.";
	let mut excerpts = String::new();

	for (idx, text) in seed_context.iter().enumerate() {
		let snippet: String = text.chars().take(SEED_SNIPPET_CHARS).collect();

		excerpts.push_str(&format!("[{}] {}\n", idx + 1, snippet.trim()));
	}

	if excerpts.is_empty() {
		excerpts.push_str("(none)\n");
	}

	let user_prompt = format!(
		"Return JSON matching this exact schema:\n{schema_text}\nConstraints:\n- NUM_QUERIES = {count}\nCorpus excerpts:\n{excerpts}Original query:\n{query}"
	);

	vec![
		serde_json::json!({ "role": "system", "content": system_prompt }),
		serde_json::json!({ "role": "user", "content": user_prompt }),
	]
}

pub fn parse_expansions(raw: Value, original: &str, count: u32) -> color_eyre::Result<Vec<String>> {
	let parsed: ExpansionOutput = serde_json::from_value(raw)
		.map_err(|err| eyre::eyre!("Expansion output does not match schema: {err}"))?;

	Ok(normalize_expansions(parsed.queries, original, count))
}

/// Drops blanks, the original query, and repeats (case-insensitive exact match), then keeps the
/// first `count` survivors.
pub fn normalize_expansions(candidates: Vec<String>, original: &str, count: u32) -> Vec<String> {
	let mut out = Vec::new();
	let mut seen = HashSet::new();

	seen.insert(original.trim().to_lowercase());

	for candidate in candidates {
		if out.len() >= count as usize {
			break;
		}

		push_query(&mut out, &mut seen, &candidate);
	}

	out
}

fn push_query(out: &mut Vec<String>, seen: &mut HashSet<String>, value: &str) {
	let trimmed = value.trim();

	if trimmed.is_empty() {
		return;
	}
	if seen.insert(trimmed.to_lowercase()) {
		out.push(trimmed.to_string());
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn drops_original_and_case_insensitive_repeats() {
		let normalized = normalize_expansions(
			vec![
				"what is project chimera?".to_string(),
				"Project Chimera goals".to_string(),
				"  project CHIMERA goals ".to_string(),
				"".to_string(),
				"Who leads Project Chimera".to_string(),
			],
			"What is Project Chimera?",
			5,
		);

		assert_eq!(normalized, vec!["Project Chimera goals", "Who leads Project Chimera"]);
	}

	#[test]
	fn near_duplicates_are_kept() {
		let normalized = normalize_expansions(
			vec!["Chimera funding".to_string(), "Chimera funding?".to_string()],
			"q",
			5,
		);

		assert_eq!(normalized.len(), 2);
	}

	#[test]
	fn respects_expansion_count() {
		let normalized = normalize_expansions(
			vec!["one".to_string(), "two".to_string(), "three".to_string(), "four".to_string()],
			"zero",
			3,
		);

		assert_eq!(normalized, vec!["one", "two", "three"]);
	}

	#[test]
	fn malformed_output_is_an_error() {
		assert!(parse_expansions(serde_json::json!({ "rewrites": ["a"] }), "q", 3).is_err());
		assert!(parse_expansions(serde_json::json!({ "queries": "a" }), "q", 3).is_err());
	}

	#[test]
	fn messages_carry_seed_excerpts_and_query() {
		let messages = build_expansion_messages(
			"What is Project Chimera?",
			&["Project Chimera is led by Dr. Aris Thorne.".to_string()],
			3,
		);
		let user = messages[1]["content"].as_str().expect("user prompt must be text");

		assert_eq!(messages.len(), 2);
		assert!(user.contains("NUM_QUERIES = 3"));
		assert!(user.contains("[1] Project Chimera is led by Dr. Aris Thorne."));
		assert!(user.ends_with("What is Project Chimera?"));
	}
}
