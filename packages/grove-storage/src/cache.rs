use sqlx::{PgPool, Row};
use time::OffsetDateTime;

use crate::{Result, models::CachePayload};

pub async fn fetch_cache_payload(
	pool: &PgPool,
	key: &str,
	now: OffsetDateTime,
) -> Result<Option<CachePayload>> {
	let row = sqlx::query(
		"SELECT payload FROM pipeline_cache WHERE cache_key = $1 AND expires_at > $2",
	)
	.bind(key)
	.bind(now)
	.fetch_optional(pool)
	.await?;
	let Some(row) = row else {
		return Ok(None);
	};
	let payload: serde_json::Value = row.try_get("payload")?;
	let size_bytes = serde_json::to_vec(&payload)?.len();

	sqlx::query(
		"\
UPDATE pipeline_cache
SET last_accessed_at = $1, hit_count = hit_count + 1
WHERE cache_key = $2",
	)
	.bind(now)
	.bind(key)
	.execute(pool)
	.await?;

	Ok(Some(CachePayload { value: payload, size_bytes }))
}

/// Returns the stored size, or `None` when the payload exceeds `max_payload_bytes`.
pub async fn store_cache_payload(
	pool: &PgPool,
	key: &str,
	payload: &serde_json::Value,
	now: OffsetDateTime,
	expires_at: OffsetDateTime,
	max_payload_bytes: Option<u64>,
) -> Result<Option<usize>> {
	let payload_size = serde_json::to_vec(payload)?.len();

	if let Some(max) = max_payload_bytes
		&& payload_size as u64 > max
	{
		return Ok(None);
	}

	sqlx::query(
		"\
INSERT INTO pipeline_cache (
	cache_key,
	payload,
	created_at,
	last_accessed_at,
	expires_at,
	hit_count
)
VALUES ($1, $2, $3, $3, $4, 0)
ON CONFLICT (cache_key)
DO UPDATE
SET
	payload = EXCLUDED.payload,
	last_accessed_at = EXCLUDED.last_accessed_at,
	expires_at = EXCLUDED.expires_at,
	hit_count = 0",
	)
	.bind(key)
	.bind(payload)
	.bind(now)
	.bind(expires_at)
	.execute(pool)
	.await?;

	Ok(Some(payload_size))
}

pub async fn flush_cache(pool: &PgPool) -> Result<u64> {
	let result = sqlx::query("DELETE FROM pipeline_cache").execute(pool).await?;

	Ok(result.rows_affected())
}
