use time::{Date, OffsetDateTime};
use uuid::Uuid;

use sift_domain::digest::{ClusterDraft, DigestEntry, SendStatus};

use crate::{
	Result,
	db::Db,
	models::{CandidateRow, ClusterDraftRow, CreatedDigest, DigestEntryRow, DigestRow},
};

/// Creates or refreshes the digest for (user, date) with `item_ids` in rank order.
///
/// A digest that was already sent is returned untouched with `already_sent = true`.
pub async fn create_digest(
	db: &Db,
	user_id: Uuid,
	digest_date: Date,
	item_ids: &[Uuid],
	now: OffsetDateTime,
) -> Result<CreatedDigest> {
	let mut tx = db.pool.begin().await?;
	let (id, sent_at) = sqlx::query_as::<_, (Uuid, Option<OffsetDateTime>)>(
		"\
INSERT INTO digests (id, user_id, digest_date, created_at, updated_at)
VALUES ($1, $2, $3, $4, $4)
ON CONFLICT (user_id, digest_date) DO UPDATE
SET digest_date = EXCLUDED.digest_date
RETURNING id, sent_at",
	)
	.bind(Uuid::new_v4())
	.bind(user_id)
	.bind(digest_date)
	.bind(now)
	.fetch_one(&mut *tx)
	.await?;

	if sent_at.is_some() {
		tx.commit().await?;

		return Ok(CreatedDigest { id, already_sent: true });
	}

	sqlx::query("DELETE FROM digest_items WHERE digest_id = $1")
		.bind(id)
		.execute(&mut *tx)
		.await?;

	for (idx, item_id) in item_ids.iter().enumerate() {
		sqlx::query("INSERT INTO digest_items (digest_id, item_id, rank) VALUES ($1, $2, $3)")
			.bind(id)
			.bind(item_id)
			.bind(idx as i32 + 1)
			.execute(&mut *tx)
			.await?;
	}

	sqlx::query("UPDATE digests SET updated_at = $2 WHERE id = $1")
		.bind(id)
		.bind(now)
		.execute(&mut *tx)
		.await?;

	tx.commit().await?;

	Ok(CreatedDigest { id, already_sent: false })
}

pub async fn get_digest(db: &Db, digest_id: Uuid) -> Result<Option<DigestRow>> {
	let row = sqlx::query_as::<_, DigestRow>(
		"\
SELECT
	d.id,
	d.user_id,
	d.digest_date,
	d.email_subject,
	d.email_body,
	d.send_status,
	d.send_error,
	d.sent_at,
	u.email AS to_email,
	COALESCE(us.digest_email_enabled, true) AS digest_email_enabled
FROM digests d
JOIN users u ON u.id = d.user_id
LEFT JOIN user_settings us ON us.user_id = d.user_id
WHERE d.id = $1",
	)
	.bind(digest_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(row)
}

pub async fn find_digest_id(db: &Db, user_id: Uuid, digest_date: Date) -> Result<Option<Uuid>> {
	let id = sqlx::query_scalar::<_, Uuid>(
		"SELECT id FROM digests WHERE user_id = $1 AND digest_date = $2",
	)
	.bind(user_id)
	.bind(digest_date)
	.fetch_optional(&db.pool)
	.await?;

	Ok(id)
}

/// Digest items in rank order with their summaries and facts.
pub async fn list_digest_entries(db: &Db, digest_id: Uuid) -> Result<Vec<DigestEntry>> {
	let rows = sqlx::query_as::<_, DigestEntryRow>(
		"\
SELECT
	di.item_id,
	di.rank,
	i.url,
	i.title,
	sm.summary,
	sm.topics,
	sm.score,
	f.facts
FROM digest_items di
JOIN items i ON i.id = di.item_id
LEFT JOIN item_summaries sm ON sm.item_id = di.item_id
LEFT JOIN item_facts f ON f.item_id = di.item_id
WHERE di.digest_id = $1
ORDER BY di.rank ASC",
	)
	.bind(digest_id)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows.into_iter().map(DigestEntry::from).collect())
}

/// Digest items as ranking candidates, in rank order, for clustering.
pub async fn list_digest_candidates(db: &Db, digest_id: Uuid) -> Result<Vec<CandidateRow>> {
	let rows = sqlx::query_as::<_, CandidateRow>(
		"\
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
FROM digest_items di
JOIN digests d ON d.id = di.digest_id
JOIN items i ON i.id = di.item_id
LEFT JOIN item_summaries sm ON sm.item_id = i.id
LEFT JOIN item_embeddings emb ON emb.item_id = i.id
LEFT JOIN item_feedbacks fb ON fb.item_id = i.id AND fb.user_id = d.user_id
LEFT JOIN item_reads ir ON ir.item_id = i.id AND ir.user_id = d.user_id
WHERE di.digest_id = $1
ORDER BY di.rank ASC",
	)
	.bind(digest_id)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

/// Sets the send status of an unsent digest. Returns `false` once the digest is sent.
pub async fn set_send_status(
	db: &Db,
	digest_id: Uuid,
	status: SendStatus,
	error_text: Option<&str>,
	now: OffsetDateTime,
) -> Result<bool> {
	let res = sqlx::query(
		"\
UPDATE digests
SET
	send_status = $2,
	send_error = $3,
	send_tried_at = CASE WHEN $2 = 'processing' THEN $4 ELSE send_tried_at END,
	updated_at = $4
WHERE id = $1 AND sent_at IS NULL",
	)
	.bind(digest_id)
	.bind(status.as_str())
	.bind(error_text)
	.bind(now)
	.execute(&db.pool)
	.await?;

	Ok(res.rows_affected() == 1)
}

/// Marks the digest sent. Only the first call for a digest returns `true`.
pub async fn mark_sent(db: &Db, digest_id: Uuid, now: OffsetDateTime) -> Result<bool> {
	let res = sqlx::query(
		"\
UPDATE digests
SET send_status = 'sent', send_error = NULL, sent_at = $2, updated_at = $2
WHERE id = $1 AND sent_at IS NULL",
	)
	.bind(digest_id)
	.bind(now)
	.execute(&db.pool)
	.await?;

	Ok(res.rows_affected() == 1)
}

pub async fn save_email_copy(
	db: &Db,
	digest_id: Uuid,
	subject: &str,
	body: &str,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE digests
SET email_subject = $2, email_body = $3, updated_at = $4
WHERE id = $1",
	)
	.bind(digest_id)
	.bind(subject)
	.bind(body)
	.bind(now)
	.execute(&db.pool)
	.await?;

	Ok(())
}

/// Replaces every cluster draft of a digest.
pub async fn replace_cluster_drafts(
	db: &Db,
	digest_id: Uuid,
	drafts: &[ClusterDraft],
	now: OffsetDateTime,
) -> Result<()> {
	let mut tx = db.pool.begin().await?;

	sqlx::query("DELETE FROM digest_cluster_drafts WHERE digest_id = $1")
		.bind(digest_id)
		.execute(&mut *tx)
		.await?;

	for draft in drafts {
		sqlx::query(
			"\
INSERT INTO digest_cluster_drafts (
	digest_id,
	cluster_key,
	cluster_label,
	rank,
	item_count,
	topics,
	max_score,
	draft_summary,
	created_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
		)
		.bind(digest_id)
		.bind(draft.cluster_key.as_str())
		.bind(draft.cluster_label.as_str())
		.bind(draft.rank)
		.bind(draft.item_count)
		.bind(&draft.topics)
		.bind(draft.max_score)
		.bind(draft.draft_summary.as_str())
		.bind(now)
		.execute(&mut *tx)
		.await?;
	}

	tx.commit().await?;

	Ok(())
}

pub async fn list_cluster_drafts(db: &Db, digest_id: Uuid) -> Result<Vec<ClusterDraft>> {
	let rows = sqlx::query_as::<_, ClusterDraftRow>(
		"\
SELECT cluster_key, cluster_label, rank, item_count, topics, max_score, draft_summary
FROM digest_cluster_drafts
WHERE digest_id = $1
ORDER BY rank ASC",
	)
	.bind(digest_id)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows.into_iter().map(ClusterDraft::from).collect())
}
