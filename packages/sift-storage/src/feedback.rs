use sqlx::PgExecutor;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use sift_domain::profile::FeedbackSignal;

use crate::{
	Result,
	db::Db,
	models::{FeedbackSignalRow, StreakRow},
};

/// Feedback rows that carry a signal and whose item has an embedding, newest first.
pub async fn list_feedback_signals(db: &Db, user_id: Uuid) -> Result<Vec<FeedbackSignal>> {
	let rows = sqlx::query_as::<_, FeedbackSignalRow>(
		"\
SELECT fb.rating, fb.is_favorite, emb.dimensions, emb.embedding
FROM item_feedbacks fb
JOIN item_embeddings emb ON emb.item_id = fb.item_id
WHERE fb.user_id = $1 AND (fb.rating <> 0 OR fb.is_favorite)
ORDER BY fb.updated_at DESC",
	)
	.bind(user_id)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows.into_iter().map(FeedbackSignal::from).collect())
}

pub async fn upsert_feedback(
	db: &Db,
	user_id: Uuid,
	item_id: Uuid,
	rating: i16,
	is_favorite: bool,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO item_feedbacks (user_id, item_id, rating, is_favorite, created_at, updated_at)
VALUES ($1, $2, $3, $4, $5, $5)
ON CONFLICT (user_id, item_id) DO UPDATE
SET
	rating = EXCLUDED.rating,
	is_favorite = EXCLUDED.is_favorite,
	updated_at = EXCLUDED.updated_at",
	)
	.bind(user_id)
	.bind(item_id)
	.bind(rating)
	.bind(is_favorite)
	.bind(now)
	.execute(&db.pool)
	.await?;

	Ok(())
}

/// Records a read and, when it is new, counts it toward the local day's streak.
///
/// Returns whether the read was new.
pub async fn mark_read(
	db: &Db,
	user_id: Uuid,
	item_id: Uuid,
	local_date: Date,
	streak_target: i32,
	now: OffsetDateTime,
) -> Result<bool> {
	let mut tx = db.pool.begin().await?;
	let res = sqlx::query(
		"\
INSERT INTO item_reads (user_id, item_id, read_at)
VALUES ($1, $2, $3)
ON CONFLICT (user_id, item_id) DO NOTHING",
	)
	.bind(user_id)
	.bind(item_id)
	.bind(now)
	.execute(&mut *tx)
	.await?;

	if res.rows_affected() == 0 {
		return Ok(false);
	}

	increment_streak(&mut *tx, user_id, local_date, streak_target, now).await?;

	tx.commit().await?;

	Ok(true)
}

pub async fn delete_read(db: &Db, user_id: Uuid, item_id: Uuid) -> Result<bool> {
	let res = sqlx::query("DELETE FROM item_reads WHERE user_id = $1 AND item_id = $2")
		.bind(user_id)
		.bind(item_id)
		.execute(&db.pool)
		.await?;

	Ok(res.rows_affected() == 1)
}

pub async fn get_streak(db: &Db, user_id: Uuid, streak_date: Date) -> Result<Option<StreakRow>> {
	let row = sqlx::query_as::<_, StreakRow>(
		"\
SELECT read_count, streak_days, is_completed
FROM reading_streaks
WHERE user_id = $1 AND streak_date = $2",
	)
	.bind(user_id)
	.bind(streak_date)
	.fetch_optional(&db.pool)
	.await?;

	Ok(row)
}

/// Adds one read to the day. The day that reaches `target` extends the previous day's streak
/// when that day was completed, else starts a new streak of one.
pub async fn increment_streak<'e, E>(
	executor: E,
	user_id: Uuid,
	streak_date: Date,
	target: i32,
	now: OffsetDateTime,
) -> Result<StreakRow>
where
	E: PgExecutor<'e>,
{
	let previous = streak_date.previous_day().unwrap_or(streak_date);
	let row = sqlx::query_as::<_, StreakRow>(
		"\
WITH prev AS (
	SELECT streak_days, is_completed
	FROM reading_streaks
	WHERE user_id = $1 AND streak_date = $3
)
INSERT INTO reading_streaks (
	user_id,
	streak_date,
	read_count,
	streak_days,
	is_completed,
	created_at,
	updated_at
)
VALUES (
	$1,
	$2,
	1,
	CASE
		WHEN 1 >= $4 THEN
			COALESCE((SELECT CASE WHEN is_completed THEN streak_days ELSE 0 END FROM prev), 0) + 1
		ELSE COALESCE((SELECT CASE WHEN is_completed THEN streak_days ELSE 0 END FROM prev), 0)
	END,
	1 >= $4,
	$5,
	$5
)
ON CONFLICT (user_id, streak_date) DO UPDATE
SET
	read_count = reading_streaks.read_count + 1,
	is_completed = reading_streaks.is_completed OR reading_streaks.read_count + 1 >= $4,
	streak_days = CASE
		WHEN NOT reading_streaks.is_completed AND reading_streaks.read_count + 1 >= $4 THEN
			COALESCE((SELECT CASE WHEN is_completed THEN streak_days ELSE 0 END FROM prev), 0) + 1
		ELSE reading_streaks.streak_days
	END,
	updated_at = $5
RETURNING read_count, streak_days, is_completed",
	)
	.bind(user_id)
	.bind(streak_date)
	.bind(previous)
	.bind(target)
	.bind(now)
	.fetch_one(executor)
	.await?;

	Ok(row)
}
