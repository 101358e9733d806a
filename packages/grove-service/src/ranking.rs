use std::cmp::Ordering;

/// Descending order with NaN sorted last.
pub fn cmp_f32_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}

/// Rescales scores into 0.0..=1.0. A list of identical scores maps to all ones.
pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
	let Some(first) = scores.first() else {
		return Vec::new();
	};
	let (min, max) = scores.iter().fold((*first, *first), |(min, max), score| {
		(min.min(*score), max.max(*score))
	});
	let range = max - min;

	if !range.is_finite() || range <= f32::EPSILON {
		return vec![1.0; scores.len()];
	}

	scores.iter().map(|score| (score - min) / range).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn nan_sorts_after_numbers() {
		let mut scores = vec![0.2, f32::NAN, 0.9, 0.5];

		scores.sort_by(|a, b| cmp_f32_desc(*a, *b));

		assert_eq!(&scores[..3], &[0.9, 0.5, 0.2]);
		assert!(scores[3].is_nan());
	}

	#[test]
	fn normalizes_to_unit_range() {
		assert_eq!(min_max_normalize(&[2.0, 4.0, 3.0]), vec![0.0, 1.0, 0.5]);
	}

	#[test]
	fn flat_scores_normalize_to_one() {
		assert_eq!(min_max_normalize(&[0.3, 0.3]), vec![1.0, 1.0]);
		assert!(min_max_normalize(&[]).is_empty());
	}
}
