//! Durable event queue. Rows are claimed with row locks and a lease, so a crashed worker's
//! event becomes visible again once the lease runs out.

use serde_json::Value;
use sqlx::PgExecutor;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{Result, db::Db, models::OutboxEvent};

pub const STATUS_PENDING: &str = "PENDING";
pub const STATUS_CLAIMED: &str = "CLAIMED";
pub const STATUS_DONE: &str = "DONE";
pub const STATUS_FAILED: &str = "FAILED";
pub const STATUS_DEAD: &str = "DEAD";

/// Queues an event. With a dedupe key, only the first event carrying that key is stored.
///
/// Returns whether a row was inserted.
pub async fn enqueue<'e, E>(
	executor: E,
	kind: &str,
	payload: &Value,
	dedupe_key: Option<&str>,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let res = sqlx::query(
		"\
INSERT INTO event_outbox (event_id, kind, payload, dedupe_key, status, available_at, created_at, updated_at)
VALUES ($1, $2, $3, $4, 'PENDING', $5, $5, $5)
ON CONFLICT (dedupe_key) DO NOTHING",
	)
	.bind(Uuid::new_v4())
	.bind(kind)
	.bind(payload)
	.bind(dedupe_key)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(res.rows_affected() == 1)
}

/// Queues an event under `dedupe_key`, putting a finished row back in the queue.
///
/// A row that is still pending, claimed or waiting for a retry is left alone, so at most one
/// delivery is in flight per key. Returns whether a row was inserted or re-armed.
pub async fn enqueue_or_rearm<'e, E>(
	executor: E,
	kind: &str,
	payload: &Value,
	dedupe_key: &str,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let res = sqlx::query(
		"\
INSERT INTO event_outbox (event_id, kind, payload, dedupe_key, status, available_at, created_at, updated_at)
VALUES ($1, $2, $3, $4, 'PENDING', $5, $5, $5)
ON CONFLICT (dedupe_key) DO UPDATE
SET
	payload = EXCLUDED.payload,
	status = 'PENDING',
	attempts = 0,
	last_error = NULL,
	available_at = EXCLUDED.available_at,
	updated_at = EXCLUDED.updated_at
WHERE event_outbox.status IN ('DONE', 'DEAD')",
	)
	.bind(Uuid::new_v4())
	.bind(kind)
	.bind(payload)
	.bind(dedupe_key)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(res.rows_affected() == 1)
}

pub async fn claim_next(
	db: &Db,
	now: OffsetDateTime,
	lease_seconds: i64,
) -> Result<Option<OutboxEvent>> {
	let mut tx = db.pool.begin().await?;
	let row = sqlx::query_as::<_, OutboxEvent>(
		"\
SELECT
	event_id,
	kind,
	payload,
	dedupe_key,
	status,
	attempts,
	last_error,
	available_at,
	created_at,
	updated_at
FROM event_outbox
WHERE status IN ('PENDING', 'FAILED', 'CLAIMED') AND available_at <= $1
ORDER BY available_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED",
	)
	.bind(now)
	.fetch_optional(&mut *tx)
	.await?;
	let Some(mut event) = row else {
		tx.commit().await?;

		return Ok(None);
	};
	let lease_until = now + Duration::seconds(lease_seconds);

	sqlx::query(
		"\
UPDATE event_outbox
SET status = 'CLAIMED', available_at = $1, updated_at = $2
WHERE event_id = $3",
	)
	.bind(lease_until)
	.bind(now)
	.bind(event.event_id)
	.execute(&mut *tx)
	.await?;

	tx.commit().await?;

	event.status = STATUS_CLAIMED.to_string();
	event.available_at = lease_until;
	event.updated_at = now;

	Ok(Some(event))
}

pub async fn mark_done(db: &Db, event_id: Uuid, now: OffsetDateTime) -> Result<()> {
	sqlx::query("UPDATE event_outbox SET status = 'DONE', updated_at = $1 WHERE event_id = $2")
		.bind(now)
		.bind(event_id)
		.execute(&db.pool)
		.await?;

	Ok(())
}

/// Schedules another attempt at `available_at`.
pub async fn mark_failed(
	db: &Db,
	event_id: Uuid,
	attempts: i32,
	error_text: &str,
	available_at: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<()> {
	set_failure(db, event_id, STATUS_FAILED, attempts, error_text, available_at, now).await
}

/// Parks the event for good.
pub async fn mark_dead(
	db: &Db,
	event_id: Uuid,
	attempts: i32,
	error_text: &str,
	now: OffsetDateTime,
) -> Result<()> {
	set_failure(db, event_id, STATUS_DEAD, attempts, error_text, now, now).await
}

pub async fn get_event(db: &Db, event_id: Uuid) -> Result<Option<OutboxEvent>> {
	let row = sqlx::query_as::<_, OutboxEvent>(
		"\
SELECT
	event_id,
	kind,
	payload,
	dedupe_key,
	status,
	attempts,
	last_error,
	available_at,
	created_at,
	updated_at
FROM event_outbox
WHERE event_id = $1",
	)
	.bind(event_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(row)
}

async fn set_failure(
	db: &Db,
	event_id: Uuid,
	status: &str,
	attempts: i32,
	error_text: &str,
	available_at: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE event_outbox
SET
	status = $1,
	attempts = $2,
	last_error = $3,
	available_at = $4,
	updated_at = $5
WHERE event_id = $6",
	)
	.bind(status)
	.bind(attempts)
	.bind(error_text)
	.bind(available_at)
	.bind(now)
	.bind(event_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}
