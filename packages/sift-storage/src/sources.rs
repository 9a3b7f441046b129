use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, Result, db::Db, models::SourceRow};

pub const KIND_RSS: &str = "rss";
pub const KIND_MANUAL: &str = "manual";

const SOURCE_COLUMNS: &str = "id, user_id, url, type, title, enabled, last_fetched_at, last_error";

/// Registers a source for the user, or returns the existing one for the same URL.
pub async fn upsert_source(
	db: &Db,
	user_id: Uuid,
	url: &str,
	kind: &str,
	title: Option<&str>,
) -> Result<Uuid> {
	if kind != KIND_RSS && kind != KIND_MANUAL {
		return Err(Error::InvalidArgument(format!("unknown source type {kind:?}.")));
	}

	let id = sqlx::query_scalar::<_, Uuid>(
		"\
INSERT INTO sources (id, user_id, url, type, title)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT (user_id, url) DO UPDATE
SET title = COALESCE(EXCLUDED.title, sources.title)
RETURNING id",
	)
	.bind(Uuid::new_v4())
	.bind(user_id)
	.bind(url)
	.bind(kind)
	.bind(title)
	.fetch_one(&db.pool)
	.await?;

	Ok(id)
}

pub async fn get_source(db: &Db, source_id: Uuid) -> Result<Option<SourceRow>> {
	let sql = format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = $1");
	let row = sqlx::query_as::<_, SourceRow>(&sql).bind(source_id).fetch_optional(&db.pool).await?;

	Ok(row)
}

pub async fn list_enabled_feeds(db: &Db) -> Result<Vec<SourceRow>> {
	let sql = format!(
		"SELECT {SOURCE_COLUMNS} FROM sources WHERE enabled AND type = 'rss' ORDER BY created_at ASC"
	);
	let rows = sqlx::query_as::<_, SourceRow>(&sql).fetch_all(&db.pool).await?;

	Ok(rows)
}

/// Stamps a poll attempt; `error_text` of `None` clears the previous error.
pub async fn record_fetch(
	db: &Db,
	source_id: Uuid,
	error_text: Option<&str>,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE sources
SET last_fetched_at = $2, last_error = $3, updated_at = $2
WHERE id = $1",
	)
	.bind(source_id)
	.bind(now)
	.bind(error_text)
	.execute(&db.pool)
	.await?;

	Ok(())
}
