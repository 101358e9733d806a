use sqlx::PgConnection;
use uuid::Uuid;

use grove_domain::mentions::normalize_entity_name;

use crate::{
	Error, Result,
	models::{GraphEntity, NeighborhoodRelation},
};

pub async fn upsert_entity(
	executor: &mut PgConnection,
	canonical: &str,
	kind: Option<&str>,
) -> Result<Uuid> {
	let canonical_norm = normalize_entity_name(canonical);

	if canonical_norm.is_empty() {
		return Err(Error::InvalidArgument("graph entity name must not be empty".to_string()));
	}

	let row: (Uuid,) = sqlx::query_as(
		"\
INSERT INTO graph_entities (
	entity_id,
	canonical,
	canonical_norm,
	kind,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, now(), now())
ON CONFLICT (canonical_norm)
DO UPDATE
SET
	canonical = EXCLUDED.canonical,
	kind = COALESCE(EXCLUDED.kind, graph_entities.kind),
	updated_at = now()
RETURNING entity_id",
	)
	.bind(Uuid::new_v4())
	.bind(canonical.trim())
	.bind(&canonical_norm)
	.bind(kind)
	.fetch_one(executor)
	.await?;

	Ok(row.0)
}

pub async fn upsert_entity_alias(
	executor: &mut PgConnection,
	entity_id: Uuid,
	alias: &str,
) -> Result<()> {
	let alias_norm = normalize_entity_name(alias);

	if alias_norm.is_empty() {
		return Err(Error::InvalidArgument("graph entity alias must not be empty".to_string()));
	}

	sqlx::query(
		"\
INSERT INTO graph_entity_aliases (
	alias_id,
	entity_id,
	alias,
	alias_norm,
	created_at
)
VALUES ($1, $2, $3, $4, now())
ON CONFLICT (entity_id, alias_norm)
DO NOTHING",
	)
	.bind(Uuid::new_v4())
	.bind(entity_id)
	.bind(alias.trim())
	.bind(alias_norm)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn upsert_relation(
	executor: &mut PgConnection,
	subject_entity_id: Uuid,
	relationship_type: &str,
	object_entity_id: Uuid,
	supporting_context: Option<&str>,
) -> Result<Uuid> {
	let relationship_type = relationship_type.trim();

	if relationship_type.is_empty() {
		return Err(Error::InvalidArgument(
			"graph relationship type must not be empty".to_string(),
		));
	}

	let row: (Uuid,) = sqlx::query_as(
		"\
INSERT INTO graph_relations (
	relation_id,
	subject_entity_id,
	relationship_type,
	object_entity_id,
	supporting_context,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, now(), now())
ON CONFLICT (subject_entity_id, relationship_type, object_entity_id)
DO UPDATE
SET
	supporting_context = COALESCE(EXCLUDED.supporting_context, graph_relations.supporting_context),
	updated_at = now()
RETURNING relation_id",
	)
	.bind(Uuid::new_v4())
	.bind(subject_entity_id)
	.bind(relationship_type)
	.bind(object_entity_id)
	.bind(supporting_context)
	.fetch_one(executor)
	.await?;

	Ok(row.0)
}

/// Looks an entity up by canonical name first, then by alias.
pub async fn resolve_entity(
	executor: &mut PgConnection,
	name: &str,
) -> Result<Option<GraphEntity>> {
	let name_norm = normalize_entity_name(name);

	if name_norm.is_empty() {
		return Ok(None);
	}

	let row = sqlx::query_as::<_, GraphEntity>(
		"\
SELECT entity_id, canonical, canonical_norm, kind, created_at, updated_at
FROM (
	SELECT e.*, 0 AS match_rank
	FROM graph_entities e
	WHERE e.canonical_norm = $1
	UNION ALL
	SELECT e.*, 1 AS match_rank
	FROM graph_entity_aliases a
	JOIN graph_entities e ON e.entity_id = a.entity_id
	WHERE a.alias_norm = $1
) matches
ORDER BY match_rank, canonical_norm, entity_id
LIMIT 1",
	)
	.bind(name_norm)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

/// Relations within `hop_depth` hops of the anchor, following edges in both directions.
pub async fn fetch_neighborhood(
	executor: &mut PgConnection,
	entity_id: Uuid,
	hop_depth: u32,
	limit: u32,
) -> Result<Vec<NeighborhoodRelation>> {
	if hop_depth == 0 || limit == 0 {
		return Ok(Vec::new());
	}

	let rows = sqlx::query_as::<_, NeighborhoodRelation>(
		"\
WITH RECURSIVE reach(entity_id, depth) AS (
	SELECT $1::uuid, 0
	UNION
	SELECT
		CASE
			WHEN r.subject_entity_id = reach.entity_id THEN r.object_entity_id
			ELSE r.subject_entity_id
		END,
		reach.depth + 1
	FROM reach
	JOIN graph_relations r
		ON r.subject_entity_id = reach.entity_id OR r.object_entity_id = reach.entity_id
	WHERE reach.depth + 1 < $2
),
frontier AS (
	SELECT entity_id, min(depth) AS depth
	FROM reach
	GROUP BY entity_id
)
SELECT
	r.relation_id,
	s.canonical AS subject,
	r.relationship_type,
	o.canonical AS object,
	r.supporting_context,
	min(f.depth)::int4 AS depth
FROM graph_relations r
JOIN frontier f ON f.entity_id = r.subject_entity_id OR f.entity_id = r.object_entity_id
JOIN graph_entities s ON s.entity_id = r.subject_entity_id
JOIN graph_entities o ON o.entity_id = r.object_entity_id
GROUP BY r.relation_id, s.canonical, r.relationship_type, o.canonical, r.supporting_context
ORDER BY depth, r.relationship_type, s.canonical, o.canonical, r.relation_id
LIMIT $3",
	)
	.bind(entity_id)
	.bind(hop_depth as i32)
	.bind(i64::from(limit))
	.fetch_all(executor)
	.await?;

	Ok(rows)
}
