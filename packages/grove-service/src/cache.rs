use std::{
	collections::{BTreeSet, HashMap},
	sync::{Arc, Mutex},
};

use time::{Duration, OffsetDateTime};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use grove_domain::evidence::EvidenceSet;

use crate::{BoxFuture, Error, PipelineCache, Result};

const CACHE_SCHEMA_VERSION: u32 = 1;

/// Key for one pipeline invocation. Requests that differ only in query casing, whitespace, or
/// filter order collide.
pub fn build_pipeline_cache_key(
	query: &str,
	filters: Option<&[String]>,
	top_n: u32,
) -> Result<String> {
	let filters: BTreeSet<&str> = filters
		.unwrap_or_default()
		.iter()
		.map(|filter| filter.trim())
		.filter(|filter| !filter.is_empty())
		.collect();
	let payload = serde_json::json!({
		"kind": "pipeline",
		"schema_version": CACHE_SCHEMA_VERSION,
		"query": normalize_cache_query(query),
		"filters": filters,
		"top_n": top_n,
	});

	hash_cache_key(&payload)
}

pub fn cache_key_prefix(key: &str) -> &str {
	let len = key.len().min(12);

	&key[..len]
}

fn normalize_cache_query(query: &str) -> String {
	query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn hash_cache_key(payload: &serde_json::Value) -> Result<String> {
	let raw = serde_json::to_vec(payload).map_err(|err| Error::Storage {
		message: format!("Failed to encode cache key payload: {err}"),
	})?;

	Ok(blake3::hash(&raw).to_hex().to_string())
}

struct MemoryEntry {
	value: EvidenceSet,
	expires_at: OffsetDateTime,
}

/// In-process pipeline cache. Expiry is checked on read.
#[derive(Default)]
pub struct MemoryCache {
	entries: Mutex<HashMap<String, MemoryEntry>>,
	max_payload_bytes: Option<u64>,
}
impl MemoryCache {
	pub fn new(max_payload_bytes: Option<u64>) -> Self {
		Self { entries: Mutex::new(HashMap::new()), max_payload_bytes }
	}

	pub fn len(&self) -> usize {
		self.entries.lock().unwrap_or_else(|err| err.into_inner()).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn get_at(&self, key: &str, now: OffsetDateTime) -> Option<EvidenceSet> {
		let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());
		let expired = match entries.get(key) {
			Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
			Some(_) => true,
			None => false,
		};

		if expired {
			entries.remove(key);
		}

		None
	}

	fn put_at(
		&self,
		key: &str,
		value: &EvidenceSet,
		ttl: Duration,
		now: OffsetDateTime,
	) -> Result<()> {
		if let Some(max) = self.max_payload_bytes {
			let size = serde_json::to_vec(value)
				.map_err(|err| Error::Storage {
					message: format!("Failed to encode cache payload: {err}"),
				})?
				.len();

			if size as u64 > max {
				tracing::info!(
					cache_key_prefix = cache_key_prefix(key),
					payload_size = size,
					"Cache payload too large; skipping store."
				);

				return Ok(());
			}
		}

		let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

		entries.insert(key.to_string(), MemoryEntry { value: value.clone(), expires_at: now + ttl });

		Ok(())
	}
}

impl PipelineCache for MemoryCache {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<EvidenceSet>>> {
		Box::pin(async move { Ok(self.get_at(key, OffsetDateTime::now_utc())) })
	}

	fn put<'a>(
		&'a self,
		key: &'a str,
		value: &'a EvidenceSet,
		ttl: Duration,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { self.put_at(key, value, ttl, OffsetDateTime::now_utc()) })
	}

	fn flush(&self) -> BoxFuture<'_, Result<u64>> {
		Box::pin(async move {
			let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());
			let removed = entries.len() as u64;

			entries.clear();

			Ok(removed)
		})
	}
}

/// Per-key locks that let one request fill a cache entry while duplicates wait.
#[derive(Default)]
pub(crate) struct InFlight {
	locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}
impl InFlight {
	pub(crate) async fn acquire(&self, key: &str) -> InFlightGuard<'_> {
		let lock = {
			let mut locks = self.locks.lock().unwrap_or_else(|err| err.into_inner());

			locks.entry(key.to_string()).or_default().clone()
		};
		let guard = lock.lock_owned().await;

		InFlightGuard { registry: self, key: key.to_string(), _guard: guard }
	}
}

pub(crate) struct InFlightGuard<'a> {
	registry: &'a InFlight,
	key: String,
	_guard: OwnedMutexGuard<()>,
}
impl Drop for InFlightGuard<'_> {
	fn drop(&mut self) {
		let mut locks = self.registry.locks.lock().unwrap_or_else(|err| err.into_inner());

		// The map and this guard hold the only references when nobody is waiting.
		if let Some(lock) = locks.get(&self.key)
			&& Arc::strong_count(lock) <= 2
		{
			locks.remove(&self.key);
		}
	}
}

#[cfg(test)]
mod tests {
	use grove_domain::evidence::{EvidenceItem, EvidenceUnit, Fragment};

	use super::*;

	fn evidence(text: &str) -> EvidenceSet {
		EvidenceSet::new(vec![EvidenceItem {
			unit: EvidenceUnit::Fragment(Fragment {
				id: "1".to_string(),
				source_document_id: "doc-a".to_string(),
				text: text.to_string(),
				vector_score: 0.5,
				rerank_score: Some(0.9),
				origin_query: "q".to_string(),
			}),
			score: 0.9,
		}])
	}

	fn filters(values: &[&str]) -> Vec<String> {
		values.iter().map(|value| value.to_string()).collect()
	}

	#[test]
	fn key_ignores_case_whitespace_and_filter_order() {
		let messy = filters(&["b.pdf", "a.pdf", " a.pdf"]);
		let clean = filters(&["a.pdf", "b.pdf"]);
		let a = build_pipeline_cache_key("  What is   Project Chimera? ", Some(messy.as_slice()), 3)
			.expect("Expected cache key.");
		let b = build_pipeline_cache_key("what is project chimera?", Some(clean.as_slice()), 3)
			.expect("Expected cache key.");

		assert_eq!(a, b);
	}

	#[test]
	fn key_changes_with_filters_and_top_n() {
		let one = filters(&["a.pdf"]);
		let base = build_pipeline_cache_key("q", None, 3).expect("Expected cache key.");
		let filtered =
			build_pipeline_cache_key("q", Some(one.as_slice()), 3).expect("Expected cache key.");
		let wider = build_pipeline_cache_key("q", None, 5).expect("Expected cache key.");
		let empty =
			build_pipeline_cache_key("q", Some(&[][..]), 3).expect("Expected cache key.");

		assert_ne!(base, filtered);
		assert_ne!(base, wider);
		assert_eq!(base, empty);
	}

	#[test]
	fn memory_cache_expires_entries() {
		let cache = MemoryCache::new(None);
		let now = OffsetDateTime::now_utc();

		cache.put_at("k", &evidence("Chimera"), Duration::seconds(60), now).expect("put failed");

		assert_eq!(cache.get_at("k", now + Duration::seconds(59)), Some(evidence("Chimera")));
		assert_eq!(cache.get_at("k", now + Duration::seconds(60)), None);
		assert!(cache.is_empty());
	}

	#[test]
	fn memory_cache_skips_oversized_payloads() {
		let cache = MemoryCache::new(Some(16));

		cache
			.put_at("k", &evidence("Chimera"), Duration::seconds(60), OffsetDateTime::now_utc())
			.expect("put failed");

		assert!(cache.is_empty());
	}

	#[tokio::test]
	async fn flush_reports_removed_entries() {
		let cache = MemoryCache::new(None);

		cache.put("a", &evidence("one"), Duration::minutes(1)).await.expect("put failed");
		cache.put("b", &evidence("two"), Duration::minutes(1)).await.expect("put failed");

		assert_eq!(cache.flush().await.expect("flush failed"), 2);
		assert_eq!(cache.get("a").await.expect("get failed"), None);
	}

	#[tokio::test]
	async fn in_flight_entries_are_released() {
		let registry = InFlight::default();

		{
			let _guard = registry.acquire("k").await;
		}

		assert!(registry.locks.lock().unwrap_or_else(|err| err.into_inner()).is_empty());
	}
}
