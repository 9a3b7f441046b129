use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use sift_domain::status::ItemStatus;

use crate::{
	Result,
	db::Db,
	models::{
		CandidateRow, ExtractRecord, ItemRef, ItemRow, ItemSummaryRow, SummaryRecord,
	},
};

const ITEM_COLUMNS: &str = "\
	i.id,
	i.source_id,
	s.user_id,
	i.url,
	i.title,
	i.thumbnail_url,
	i.content_text,
	i.status,
	i.processing_error,
	i.embedding_failures,
	i.embedding_error,
	i.published_at,
	i.fetched_at,
	i.created_at,
	i.updated_at";
const CANDIDATE_FROM: &str = "\
SELECT
	i.id,
	i.source_id,
	i.url,
	i.title,
	sm.summary,
	sm.topics,
	sm.score,
	COALESCE(fb.is_favorite, false) AS is_favorite,
	(ir.item_id IS NOT NULL) AS is_read,
	emb.embedding,
	emb.dimensions,
	i.created_at,
	i.published_at,
	sm.summarized_at
FROM items i
JOIN sources s ON s.id = i.source_id
JOIN item_summaries sm ON sm.item_id = i.id
LEFT JOIN item_embeddings emb ON emb.item_id = i.id
LEFT JOIN item_feedbacks fb ON fb.item_id = i.id AND fb.user_id = s.user_id
LEFT JOIN item_reads ir ON ir.item_id = i.id AND ir.user_id = s.user_id";
// Shared by every reading-plan query: $1 user, $2 window start, $3 window end, $4 exclude read.
const PLAN_FILTER: &str = "\
WHERE s.user_id = $1
	AND i.status = 'summarized'
	AND COALESCE(i.published_at, i.created_at) >= $2
	AND ($3::timestamptz IS NULL OR COALESCE(i.published_at, i.created_at) < $3)
	AND (NOT $4 OR ir.item_id IS NULL)";

/// Filter for reading-plan candidates.
#[derive(Clone, Copy, Debug)]
pub struct PlanQuery {
	pub user_id: Uuid,
	pub start: OffsetDateTime,
	pub end: Option<OffsetDateTime>,
	pub exclude_read: bool,
}

fn status_list(statuses: &[ItemStatus]) -> Vec<String> {
	statuses.iter().map(|status| status.as_str().to_string()).collect()
}

/// Inserts an item unless (source, url) already exists. Returns the new id.
pub async fn insert_item_if_absent<'e, E>(
	executor: E,
	source_id: Uuid,
	url: &str,
	title: Option<&str>,
	published_at: Option<OffsetDateTime>,
) -> Result<Option<Uuid>>
where
	E: PgExecutor<'e>,
{
	let id = sqlx::query_scalar::<_, Uuid>(
		"\
INSERT INTO items (id, source_id, url, title, published_at, status)
VALUES ($1, $2, $3, $4, $5, 'new')
ON CONFLICT (source_id, url) DO NOTHING
RETURNING id",
	)
	.bind(Uuid::new_v4())
	.bind(source_id)
	.bind(url)
	.bind(title)
	.bind(published_at)
	.fetch_optional(executor)
	.await?;

	Ok(id)
}

pub async fn find_item_id(db: &Db, source_id: Uuid, url: &str) -> Result<Option<Uuid>> {
	let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM items WHERE source_id = $1 AND url = $2")
		.bind(source_id)
		.bind(url)
		.fetch_optional(&db.pool)
		.await?;

	Ok(id)
}

pub async fn get_item(db: &Db, item_id: Uuid) -> Result<Option<ItemRow>> {
	let sql = format!(
		"\
SELECT
{ITEM_COLUMNS}
FROM items i
JOIN sources s ON s.id = i.source_id
WHERE i.id = $1"
	);
	let row = sqlx::query_as::<_, ItemRow>(&sql).bind(item_id).fetch_optional(&db.pool).await?;

	Ok(row)
}

/// Loads an item only when it belongs to one of the user's sources.
pub async fn get_item_for_user(db: &Db, user_id: Uuid, item_id: Uuid) -> Result<Option<ItemRow>> {
	let sql = format!(
		"\
SELECT
{ITEM_COLUMNS}
FROM items i
JOIN sources s ON s.id = i.source_id
WHERE i.id = $1 AND s.user_id = $2"
	);
	let row = sqlx::query_as::<_, ItemRow>(&sql)
		.bind(item_id)
		.bind(user_id)
		.fetch_optional(&db.pool)
		.await?;

	Ok(row)
}

/// Stores the extracted body and moves the item to `fetched`.
///
/// Returns `false` when the item is no longer in a status that may become `fetched`.
pub async fn mark_fetched(
	db: &Db,
	item_id: Uuid,
	record: &ExtractRecord,
	now: OffsetDateTime,
) -> Result<bool> {
	let res = sqlx::query(
		"\
UPDATE items
SET
	title = COALESCE($2, title),
	thumbnail_url = COALESCE($3, thumbnail_url),
	content_text = $4,
	published_at = COALESCE($5, published_at),
	fetched_at = $6,
	status = 'fetched',
	processing_error = NULL,
	updated_at = $6
WHERE id = $1 AND status = ANY($7)",
	)
	.bind(item_id)
	.bind(record.title.as_deref())
	.bind(record.thumbnail_url.as_deref())
	.bind(record.content_text.as_str())
	.bind(record.published_at)
	.bind(now)
	.bind(status_list(&ItemStatus::Fetched.predecessors()))
	.execute(&db.pool)
	.await?;

	Ok(res.rows_affected() == 1)
}

/// Replaces the item's facts and moves it to `facts_extracted` in one transaction.
pub async fn save_facts(
	db: &Db,
	item_id: Uuid,
	facts: &[String],
	now: OffsetDateTime,
) -> Result<bool> {
	let mut tx = db.pool.begin().await?;

	if !advance_status(&mut *tx, item_id, ItemStatus::FactsExtracted, now).await? {
		return Ok(false);
	}

	sqlx::query(
		"\
INSERT INTO item_facts (item_id, facts, extracted_at)
VALUES ($1, $2, $3)
ON CONFLICT (item_id) DO UPDATE
SET
	facts = EXCLUDED.facts,
	extracted_at = EXCLUDED.extracted_at",
	)
	.bind(item_id)
	.bind(serde_json::to_value(facts)?)
	.bind(now)
	.execute(&mut *tx)
	.await?;

	tx.commit().await?;

	Ok(true)
}

/// Replaces the item's summary and moves it to `summarized` in one transaction.
pub async fn save_summary(
	db: &Db,
	item_id: Uuid,
	record: &SummaryRecord,
	now: OffsetDateTime,
) -> Result<bool> {
	let mut tx = db.pool.begin().await?;

	if !advance_status(&mut *tx, item_id, ItemStatus::Summarized, now).await? {
		return Ok(false);
	}

	sqlx::query(
		"\
INSERT INTO item_summaries (
	item_id,
	summary,
	topics,
	score,
	score_breakdown,
	score_reason,
	score_policy_version,
	summarized_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
ON CONFLICT (item_id) DO UPDATE
SET
	summary = EXCLUDED.summary,
	topics = EXCLUDED.topics,
	score = EXCLUDED.score,
	score_breakdown = EXCLUDED.score_breakdown,
	score_reason = EXCLUDED.score_reason,
	score_policy_version = EXCLUDED.score_policy_version,
	summarized_at = EXCLUDED.summarized_at",
	)
	.bind(item_id)
	.bind(record.summary.as_str())
	.bind(&record.topics)
	.bind(record.score)
	.bind(record.score_breakdown.as_ref())
	.bind(record.score_reason.as_deref())
	.bind(record.score_policy_version.as_deref())
	.bind(now)
	.execute(&mut *tx)
	.await?;

	tx.commit().await?;

	Ok(true)
}

/// Moves an in-flight item to `failed`. Summarized and already failed items are left untouched.
pub async fn mark_failed(
	db: &Db,
	item_id: Uuid,
	error_text: &str,
	now: OffsetDateTime,
) -> Result<bool> {
	let res = sqlx::query(
		"\
UPDATE items
SET status = 'failed', processing_error = $2, updated_at = $3
WHERE id = $1 AND status = ANY($4)",
	)
	.bind(item_id)
	.bind(error_text)
	.bind(now)
	.bind(status_list(&ItemStatus::Failed.predecessors()))
	.execute(&db.pool)
	.await?;

	Ok(res.rows_affected() == 1)
}

/// Puts a failed item back to `new` for a fresh pipeline run.
pub async fn reset_for_retry(db: &Db, item_id: Uuid, now: OffsetDateTime) -> Result<bool> {
	let res = sqlx::query(
		"\
UPDATE items
SET status = 'new', processing_error = NULL, updated_at = $2
WHERE id = $1 AND status = 'failed'",
	)
	.bind(item_id)
	.bind(now)
	.execute(&db.pool)
	.await?;

	Ok(res.rows_affected() == 1)
}

pub async fn list_failed_items(
	db: &Db,
	user_id: Uuid,
	source_id: Option<Uuid>,
	limit: i64,
) -> Result<Vec<ItemRef>> {
	let rows = sqlx::query_as::<_, ItemRef>(
		"\
SELECT i.id, i.source_id, i.url
FROM items i
JOIN sources s ON s.id = i.source_id
WHERE s.user_id = $1
	AND i.status = 'failed'
	AND ($2::uuid IS NULL OR i.source_id = $2)
ORDER BY i.updated_at ASC
LIMIT $3",
	)
	.bind(user_id)
	.bind(source_id)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

pub async fn get_facts(db: &Db, item_id: Uuid) -> Result<Option<Vec<String>>> {
	let value = sqlx::query_scalar::<_, serde_json::Value>(
		"SELECT facts FROM item_facts WHERE item_id = $1",
	)
	.bind(item_id)
	.fetch_optional(&db.pool)
	.await?;

	match value {
		Some(value) => Ok(Some(serde_json::from_value(value)?)),
		None => Ok(None),
	}
}

pub async fn get_summary(db: &Db, item_id: Uuid) -> Result<Option<ItemSummaryRow>> {
	let row = sqlx::query_as::<_, ItemSummaryRow>(
		"\
SELECT
	item_id,
	summary,
	topics,
	score,
	score_breakdown,
	score_reason,
	score_policy_version,
	summarized_at
FROM item_summaries
WHERE item_id = $1",
	)
	.bind(item_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(row)
}

pub async fn has_embedding(db: &Db, item_id: Uuid) -> Result<bool> {
	let exists = sqlx::query_scalar::<_, bool>(
		"SELECT EXISTS (SELECT 1 FROM item_embeddings WHERE item_id = $1)",
	)
	.bind(item_id)
	.fetch_one(&db.pool)
	.await?;

	Ok(exists)
}

pub async fn upsert_embedding(
	db: &Db,
	item_id: Uuid,
	model: &str,
	vector: &[f64],
	now: OffsetDateTime,
) -> Result<()> {
	let mut tx = db.pool.begin().await?;

	sqlx::query(
		"\
INSERT INTO item_embeddings (item_id, model, dimensions, embedding, created_at, updated_at)
VALUES ($1, $2, $3, $4, $5, $5)
ON CONFLICT (item_id) DO UPDATE
SET
	model = EXCLUDED.model,
	dimensions = EXCLUDED.dimensions,
	embedding = EXCLUDED.embedding,
	updated_at = EXCLUDED.updated_at",
	)
	.bind(item_id)
	.bind(model)
	.bind(vector.len() as i32)
	.bind(vector)
	.bind(now)
	.execute(&mut *tx)
	.await?;
	sqlx::query("UPDATE items SET embedding_error = NULL, updated_at = $2 WHERE id = $1")
		.bind(item_id)
		.bind(now)
		.execute(&mut *tx)
		.await?;

	tx.commit().await?;

	Ok(())
}

/// Counts a failed embedding attempt and keeps its error for operators.
pub async fn record_embedding_failure(
	db: &Db,
	item_id: Uuid,
	error_text: &str,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE items
SET embedding_failures = embedding_failures + 1, embedding_error = $2, updated_at = $3
WHERE id = $1",
	)
	.bind(item_id)
	.bind(error_text)
	.bind(now)
	.execute(&db.pool)
	.await?;

	Ok(())
}

/// Reading-plan candidates ordered by score then recency.
pub async fn list_plan_candidates(
	db: &Db,
	query: &PlanQuery,
	limit: i64,
) -> Result<Vec<CandidateRow>> {
	let sql = format!(
		"\
{CANDIDATE_FROM}
{PLAN_FILTER}
ORDER BY sm.score DESC NULLS LAST, i.created_at DESC
LIMIT $5"
	);
	let rows = sqlx::query_as::<_, CandidateRow>(&sql)
		.bind(query.user_id)
		.bind(query.start)
		.bind(query.end)
		.bind(query.exclude_read)
		.bind(limit)
		.fetch_all(&db.pool)
		.await?;

	Ok(rows)
}

pub async fn count_plan_pool(db: &Db, query: &PlanQuery) -> Result<i64> {
	let sql = format!(
		"\
SELECT COUNT(*)
FROM items i
JOIN sources s ON s.id = i.source_id
JOIN item_summaries sm ON sm.item_id = i.id
LEFT JOIN item_reads ir ON ir.item_id = i.id AND ir.user_id = s.user_id
{PLAN_FILTER}"
	);
	let count = sqlx::query_scalar::<_, i64>(&sql)
		.bind(query.user_id)
		.bind(query.start)
		.bind(query.end)
		.bind(query.exclude_read)
		.fetch_one(&db.pool)
		.await?;

	Ok(count)
}

/// Topic counts over the plan pool. Items without topics count as `__untagged__`.
pub async fn plan_topic_buckets(
	db: &Db,
	query: &PlanQuery,
	limit: i64,
) -> Result<Vec<(String, i64, Option<f64>)>> {
	let sql = format!(
		"\
SELECT
	COALESCE(NULLIF(BTRIM(t.topic), ''), '__untagged__') AS topic_key,
	COUNT(*) AS item_count,
	MAX(sm.score) AS max_score
FROM items i
JOIN sources s ON s.id = i.source_id
JOIN item_summaries sm ON sm.item_id = i.id
LEFT JOIN item_reads ir ON ir.item_id = i.id AND ir.user_id = s.user_id
CROSS JOIN LATERAL unnest(
	CASE
		WHEN COALESCE(array_length(sm.topics, 1), 0) = 0 THEN ARRAY['__untagged__']::text[]
		ELSE sm.topics
	END
) AS t(topic)
{PLAN_FILTER}
GROUP BY topic_key
ORDER BY item_count DESC, max_score DESC NULLS LAST, topic_key ASC
LIMIT $5"
	);
	let rows = sqlx::query_as::<_, (String, i64, Option<f64>)>(&sql)
		.bind(query.user_id)
		.bind(query.start)
		.bind(query.end)
		.bind(query.exclude_read)
		.bind(limit)
		.fetch_all(&db.pool)
		.await?;

	Ok(rows)
}

/// Summarized items whose summary was written in `[start, end)`.
pub async fn list_digest_candidates(
	db: &Db,
	user_id: Uuid,
	start: OffsetDateTime,
	end: OffsetDateTime,
) -> Result<Vec<CandidateRow>> {
	let sql = format!(
		"\
{CANDIDATE_FROM}
WHERE s.user_id = $1
	AND i.status = 'summarized'
	AND sm.summarized_at >= $2
	AND sm.summarized_at < $3
ORDER BY sm.score DESC NULLS LAST, sm.summarized_at DESC"
	);
	let rows = sqlx::query_as::<_, CandidateRow>(&sql)
		.bind(user_id)
		.bind(start)
		.bind(end)
		.fetch_all(&db.pool)
		.await?;

	Ok(rows)
}

/// High scoring items created since `since`, best first.
pub async fn list_highlights(
	db: &Db,
	user_id: Uuid,
	since: OffsetDateTime,
	min_score: f64,
	limit: i64,
) -> Result<Vec<CandidateRow>> {
	let sql = format!(
		"\
{CANDIDATE_FROM}
WHERE s.user_id = $1
	AND i.status = 'summarized'
	AND i.created_at >= $2
	AND sm.score >= $3
ORDER BY sm.score DESC, i.created_at DESC
LIMIT $4"
	);
	let rows = sqlx::query_as::<_, CandidateRow>(&sql)
		.bind(user_id)
		.bind(since)
		.bind(min_score)
		.bind(limit)
		.fetch_all(&db.pool)
		.await?;

	Ok(rows)
}

pub async fn count_unread_summarized(db: &Db, user_id: Uuid) -> Result<i64> {
	let count = sqlx::query_scalar::<_, i64>(
		"\
SELECT COUNT(*)
FROM items i
JOIN sources s ON s.id = i.source_id
LEFT JOIN item_reads ir ON ir.item_id = i.id AND ir.user_id = s.user_id
WHERE s.user_id = $1 AND i.status = 'summarized' AND ir.item_id IS NULL",
	)
	.bind(user_id)
	.fetch_one(&db.pool)
	.await?;

	Ok(count)
}

/// Read and unread counts of summarized items that arrived in `[start, end)`.
pub async fn count_read_unread_between(
	db: &Db,
	user_id: Uuid,
	start: OffsetDateTime,
	end: OffsetDateTime,
) -> Result<(i64, i64)> {
	let counts = sqlx::query_as::<_, (i64, i64)>(
		"\
SELECT
	COUNT(*) FILTER (WHERE ir.item_id IS NOT NULL),
	COUNT(*) FILTER (WHERE ir.item_id IS NULL)
FROM items i
JOIN sources s ON s.id = i.source_id
LEFT JOIN item_reads ir ON ir.item_id = i.id AND ir.user_id = s.user_id
WHERE s.user_id = $1
	AND i.status = 'summarized'
	AND COALESCE(i.published_at, i.created_at) >= $2
	AND COALESCE(i.published_at, i.created_at) < $3",
	)
	.bind(user_id)
	.bind(start)
	.bind(end)
	.fetch_one(&db.pool)
	.await?;

	Ok(counts)
}

async fn advance_status<'e, E>(
	executor: E,
	item_id: Uuid,
	next: ItemStatus,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let res = sqlx::query(
		"\
UPDATE items
SET status = $2, processing_error = NULL, updated_at = $3
WHERE id = $1 AND status = ANY($4)",
	)
	.bind(item_id)
	.bind(next.as_str())
	.bind(now)
	.bind(status_list(&next.predecessors()))
	.execute(executor)
	.await?;

	Ok(res.rows_affected() == 1)
}
