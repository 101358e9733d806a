use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GraphEntity {
	pub entity_id: Uuid,
	pub canonical: String,
	pub canonical_norm: String,
	pub kind: Option<String>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

/// A relation reached from an anchor entity, with the entity names already joined in.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NeighborhoodRelation {
	pub relation_id: Uuid,
	pub subject: String,
	pub relationship_type: String,
	pub object: String,
	pub supporting_context: Option<String>,
	/// Hop distance of the closest endpoint from the anchor.
	pub depth: i32,
}

#[derive(Debug, Clone)]
pub struct CachePayload {
	pub value: serde_json::Value,
	pub size_bytes: usize,
}
