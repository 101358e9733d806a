use std::collections::HashMap;

use grove_domain::evidence::Fragment;

use crate::ranking::cmp_f32_desc;

/// Collapses the raw fragment pool into a deduplicated candidate list.
///
/// Fragments sharing `(source_document_id, text)` keep the highest `vector_score`; on equal
/// scores the one seen first wins, so callers should pass the pool in query order. Survivors are
/// admitted best first while their document has fewer than `per_doc_cap` admissions, until
/// `budget` candidates are admitted.
pub fn merge_candidates(pool: Vec<Fragment>, budget: u32, per_doc_cap: u32) -> Vec<Fragment> {
	let mut survivors: Vec<Fragment> = Vec::with_capacity(pool.len());
	let mut by_identity: HashMap<(String, String), usize> = HashMap::new();

	for fragment in pool {
		let key = (fragment.source_document_id.clone(), fragment.text.clone());

		match by_identity.get(&key) {
			Some(&idx) =>
				if fragment.vector_score > survivors[idx].vector_score {
					survivors[idx] = fragment;
				},
			None => {
				by_identity.insert(key, survivors.len());
				survivors.push(fragment);
			},
		}
	}

	survivors.sort_by(|a, b| {
		cmp_f32_desc(a.vector_score, b.vector_score)
			.then_with(|| a.source_document_id.cmp(&b.source_document_id))
			.then_with(|| a.text.cmp(&b.text))
	});

	let mut admitted = Vec::new();
	let mut per_doc: HashMap<String, u32> = HashMap::new();

	for fragment in survivors {
		if admitted.len() >= budget as usize {
			break;
		}

		let count = per_doc.entry(fragment.source_document_id.clone()).or_insert(0);

		if *count >= per_doc_cap {
			continue;
		}

		*count += 1;

		admitted.push(fragment);
	}

	admitted
}
