use std::collections::HashMap;

use qdrant_client::qdrant::{
	Condition, Document, Filter, PointId, Query, QueryPointsBuilder, ScoredPoint, Value,
	point_id::PointIdOptions, value::Kind,
};

use crate::{Error, Result};

pub const DENSE_VECTOR_NAME: &str = "dense";
pub const BM25_VECTOR_NAME: &str = "bm25";
pub const BM25_MODEL: &str = "qdrant/bm25";
pub const SOURCE_DOCUMENT_ID_KEY: &str = "source_document_id";
pub const TEXT_KEY: &str = "text";

/// A point scored by one of the two similarity channels.
#[derive(Debug, Clone, PartialEq)]
pub struct PointHit {
	pub point_id: String,
	pub source_document_id: String,
	pub text: String,
	pub score: f32,
}

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &grove_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	pub async fn search_dense(
		&self,
		vector: Vec<f32>,
		filter: Option<&Filter>,
		limit: u32,
	) -> Result<Vec<PointHit>> {
		if vector.len() != self.vector_dim as usize {
			return Err(Error::InvalidArgument(format!(
				"query vector has {} dimensions; expected {}",
				vector.len(),
				self.vector_dim
			)));
		}

		let mut search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector))
			.using(DENSE_VECTOR_NAME)
			.with_payload(true)
			.limit(u64::from(limit));

		if let Some(filter) = filter {
			search = search.filter(filter.clone());
		}

		let response = self.client.query(search).await?;

		Ok(collect_hits(&response.result))
	}

	pub async fn search_bm25(
		&self,
		text: &str,
		filter: Option<&Filter>,
		limit: u32,
	) -> Result<Vec<PointHit>> {
		let mut search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(Document::new(text.to_string(), BM25_MODEL)))
			.using(BM25_VECTOR_NAME)
			.with_payload(true)
			.limit(u64::from(limit));

		if let Some(filter) = filter {
			search = search.filter(filter.clone());
		}

		let response = self.client.query(search).await?;

		Ok(collect_hits(&response.result))
	}
}

/// Restricts a search to fragments of the named documents.
pub fn source_document_filter(source_document_ids: &[String]) -> Filter {
	Filter::must([Condition::matches(SOURCE_DOCUMENT_ID_KEY, source_document_ids.to_vec())])
}

/// Points missing an id, a source document, or text are dropped.
pub fn collect_hits(points: &[ScoredPoint]) -> Vec<PointHit> {
	points
		.iter()
		.filter_map(|point| {
			let point_id = point.id.as_ref().and_then(point_id_to_string)?;
			let source_document_id = payload_string(&point.payload, SOURCE_DOCUMENT_ID_KEY)?;
			let text = payload_string(&point.payload, TEXT_KEY)?;

			Some(PointHit { point_id, source_document_id, text, score: point.score })
		})
		.collect()
}

pub fn point_id_to_string(point_id: &PointId) -> Option<String> {
	match &point_id.point_id_options {
		Some(PointIdOptions::Uuid(id)) => Some(id.clone()),
		Some(PointIdOptions::Num(num)) => Some(num.to_string()),
		None => None,
	}
}

pub fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::StringValue(text)) => Some(text.to_string()),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn point(id: Option<PointIdOptions>, payload: &[(&str, &str)], score: f32) -> ScoredPoint {
		ScoredPoint {
			id: id.map(|options| PointId { point_id_options: Some(options) }),
			payload: payload
				.iter()
				.map(|(key, value)| ((*key).to_string(), Value::from((*value).to_string())))
				.collect(),
			score,
			..Default::default()
		}
	}

	#[test]
	fn collects_hits_with_complete_payloads() {
		let points = vec![
			point(
				Some(PointIdOptions::Num(7)),
				&[("source_document_id", "doc-a"), ("text", "Project Chimera overview.")],
				0.8,
			),
			point(Some(PointIdOptions::Uuid("p-2".to_string())), &[("text", "orphan")], 0.5),
			point(None, &[("source_document_id", "doc-b"), ("text", "no id")], 0.4),
		];
		let hits = collect_hits(&points);

		assert_eq!(hits.len(), 1);
		assert_eq!(hits[0].point_id, "7");
		assert_eq!(hits[0].source_document_id, "doc-a");
		assert_eq!(hits[0].score, 0.8);
	}

	#[test]
	fn source_filter_targets_document_key() {
		let filter = source_document_filter(&["doc-a".to_string(), "doc-b".to_string()]);

		assert_eq!(filter.must.len(), 1);
		assert!(filter.should.is_empty());
	}
}
