use std::collections::HashSet;

use unicode_segmentation::UnicodeSegmentation;

// Capitalized words that open sentences far more often than they name anything.
const LEADING_STOPWORDS: &[&str] = &[
	"a", "an", "and", "as", "at", "but", "by", "for", "from", "he", "her", "his", "how", "however",
	"i", "if", "in", "it", "its", "of", "on", "our", "she", "so", "that", "the", "their", "these",
	"they", "this", "those", "to", "we", "what", "when", "where", "which", "who", "why", "with",
];

const TITLE_ABBREVIATIONS: &[&str] = &["Dr", "Mr", "Mrs", "Ms", "Prof", "St"];
const SUFFIX_ABBREVIATIONS: &[&str] = &["Corp", "Inc", "Jr", "Ltd"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMention {
	pub surface_text: String,
	pub canonical_candidate: String,
}

pub fn normalize_entity_name(input: &str) -> String {
	input.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Collects capitalized spans such as "Project Chimera" or "NASA" from `texts`, in order of first
/// appearance, deduplicated by normalized name.
pub fn extract_mentions<'a, I>(texts: I, max_mentions: usize) -> Vec<EntityMention>
where
	I: IntoIterator<Item = &'a str>,
{
	let mut out = Vec::new();
	let mut seen = HashSet::new();

	if max_mentions == 0 {
		return out;
	}

	for text in texts {
		let segments: Vec<(usize, &str)> = text.split_word_bound_indices().collect();
		let mut run: Vec<&str> = Vec::new();
		let mut gap_open = false;

		for (pos, &(offset, segment)) in segments.iter().enumerate() {
			if is_capitalized_word(segment) {
				if !run.is_empty() && !gap_open {
					flush_run(&mut run, &mut out, &mut seen);
				}

				run.push(strip_possessive(segment));

				gap_open = false;

				// A possessive ends the name: "Chimera's budget".
				if segment.len() != strip_possessive(segment).len() {
					flush_run(&mut run, &mut out, &mut seen);
				}
			} else if segment == " " && !run.is_empty() {
				gap_open = true;
			} else if segment == "."
				&& !gap_open
				&& let Some(last) = run.last_mut()
				&& abbreviation_continues(last, &segments[pos + 1..])
			{
				// "Dr. Aris Thorne": the period stays with the abbreviation.
				*last = &text[offset - last.len()..offset + 1];
			} else {
				flush_run(&mut run, &mut out, &mut seen);

				gap_open = false;
			}

			if out.len() >= max_mentions {
				out.truncate(max_mentions);

				return out;
			}
		}

		flush_run(&mut run, &mut out, &mut seen);

		if out.len() >= max_mentions {
			out.truncate(max_mentions);

			return out;
		}
	}

	out
}

/// A title continues into any following capitalized word; a company or name suffix only into
/// another suffix ("Alpha Corp. Inc.").
fn abbreviation_continues(word: &str, rest: &[(usize, &str)]) -> bool {
	let [(_, " "), (_, next), ..] = rest else {
		return false;
	};

	if !is_capitalized_word(next) {
		return false;
	}

	TITLE_ABBREVIATIONS.contains(&word)
		|| (SUFFIX_ABBREVIATIONS.contains(&word) && SUFFIX_ABBREVIATIONS.contains(next))
}

fn is_abbreviation(word: &str) -> bool {
	let word = word.trim_end_matches('.');

	TITLE_ABBREVIATIONS.contains(&word) || SUFFIX_ABBREVIATIONS.contains(&word)
}

fn is_capitalized_word(segment: &str) -> bool {
	let mut chars = segment.chars();

	chars.next().map(char::is_uppercase).unwrap_or(false)
		&& segment.chars().all(|ch| ch.is_alphanumeric() || ch == '\'' || ch == '\u{2019}')
}

fn strip_possessive(word: &str) -> &str {
	word.strip_suffix("'s").or_else(|| word.strip_suffix("\u{2019}s")).unwrap_or(word)
}

fn flush_run(run: &mut Vec<&str>, out: &mut Vec<EntityMention>, seen: &mut HashSet<String>) {
	let start = run
		.iter()
		.position(|word| !LEADING_STOPWORDS.contains(&word.to_lowercase().as_str()))
		.unwrap_or(run.len());
	let words = &run[start..];

	if words.iter().all(|word| is_abbreviation(word)) {
		run.clear();

		return;
	}

	let surface_text = words.join(" ");

	run.clear();

	if surface_text.chars().count() < 2 {
		return;
	}

	let canonical_candidate = normalize_entity_name(&surface_text);

	if seen.insert(canonical_candidate.clone()) {
		out.push(EntityMention { surface_text, canonical_candidate });
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn surfaces(mentions: &[EntityMention]) -> Vec<&str> {
		mentions.iter().map(|mention| mention.surface_text.as_str()).collect()
	}

	#[test]
	fn collects_multi_word_names_and_acronyms() {
		let mentions = extract_mentions(
			["The Project Chimera team works with Alpha Corp. NASA joined later."],
			16,
		);

		assert_eq!(surfaces(&mentions), vec!["Project Chimera", "Alpha Corp", "NASA"]);
		assert_eq!(mentions[0].canonical_candidate, "project chimera");
	}

	#[test]
	fn punctuation_and_line_breaks_split_names() {
		let mentions = extract_mentions(["Helios Optimizer, Project Nova\nAlpha Corp"], 16);

		assert_eq!(surfaces(&mentions), vec!["Helios Optimizer", "Project Nova", "Alpha Corp"]);
	}

	#[test]
	fn strips_possessives_and_dedupes_across_texts() {
		let mentions = extract_mentions(
			["Project Chimera's budget grew.", "What is project chimera? Project Chimera is new."],
			16,
		);

		assert_eq!(surfaces(&mentions), vec!["Project Chimera"]);
	}

	#[test]
	fn sentence_openers_alone_are_not_mentions() {
		let mentions = extract_mentions(["What is it? In short, nothing."], 16);

		assert!(mentions.is_empty());
	}

	#[test]
	fn respects_mention_cap() {
		let mentions = extract_mentions(["Alpha met Beta and Gamma near Delta."], 2);

		assert_eq!(surfaces(&mentions), vec!["Alpha", "Beta"]);
	}

	#[test]
	fn titles_and_suffixes_stay_inside_names() {
		let mentions = extract_mentions(
			["Project Chimera is led by Dr. Aris Thorne of Alpha Corp. Inc. and Prof. Lee."],
			16,
		);

		assert_eq!(
			surfaces(&mentions),
			vec!["Project Chimera", "Dr. Aris Thorne", "Alpha Corp. Inc", "Prof. Lee"]
		);
		assert_eq!(mentions[1].canonical_candidate, "dr. aris thorne");
	}

	#[test]
	fn lone_abbreviations_are_not_mentions() {
		let mentions = extract_mentions(["It was Dr. who said so. Acme Ltd. was sold."], 16);

		assert_eq!(surfaces(&mentions), vec!["Acme Ltd"]);
	}

	#[test]
	fn normalizes_whitespace_and_case() {
		assert_eq!(normalize_entity_name("  Alice\t  Doe "), "alice doe");
	}
}
