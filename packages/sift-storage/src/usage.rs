use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use sift_domain::ledger::{self, LlmUsage, UsageIds, UsagePurpose};

use crate::{Result, db::Db};

/// Stores one usage row keyed by its idempotency key.
///
/// Returns `false` when a row with the same key already exists.
pub async fn insert_usage<'e, E>(
	executor: E,
	purpose: UsagePurpose,
	usage: &LlmUsage,
	ids: &UsageIds,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let key = ledger::idempotency_key(purpose, usage, ids);
	let res = sqlx::query(
		"\
INSERT INTO llm_usage_logs (
	id,
	idempotency_key,
	user_id,
	source_id,
	item_id,
	digest_id,
	provider,
	model,
	pricing_model_family,
	pricing_source,
	purpose,
	input_tokens,
	output_tokens,
	cache_creation_input_tokens,
	cache_read_input_tokens,
	estimated_cost_usd,
	created_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
ON CONFLICT (idempotency_key) DO NOTHING",
	)
	.bind(Uuid::new_v4())
	.bind(key)
	.bind(ids.user_id)
	.bind(ids.source_id)
	.bind(ids.item_id)
	.bind(ids.digest_id)
	.bind(usage.provider.as_str())
	.bind(usage.model.as_str())
	.bind(usage.pricing_model_family.as_deref())
	.bind(usage.pricing_source_or_unknown())
	.bind(purpose.as_str())
	.bind(usage.input_tokens)
	.bind(usage.output_tokens)
	.bind(usage.cache_creation_input_tokens)
	.bind(usage.cache_read_input_tokens)
	.bind(usage.estimated_cost_usd)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(res.rows_affected() == 1)
}

/// Estimated spend of a user in `[start, end)`.
pub async fn cost_between(
	db: &Db,
	user_id: Uuid,
	start: OffsetDateTime,
	end: OffsetDateTime,
) -> Result<f64> {
	let total = sqlx::query_scalar::<_, f64>(
		"\
SELECT COALESCE(SUM(estimated_cost_usd), 0)::double precision
FROM llm_usage_logs
WHERE user_id = $1 AND created_at >= $2 AND created_at < $3",
	)
	.bind(user_id)
	.bind(start)
	.bind(end)
	.fetch_one(&db.pool)
	.await?;

	Ok(total)
}

pub async fn count_for_item(db: &Db, item_id: Uuid, purpose: UsagePurpose) -> Result<i64> {
	let count = sqlx::query_scalar::<_, i64>(
		"SELECT COUNT(*) FROM llm_usage_logs WHERE item_id = $1 AND purpose = $2",
	)
	.bind(item_id)
	.bind(purpose.as_str())
	.fetch_one(&db.pool)
	.await?;

	Ok(count)
}
