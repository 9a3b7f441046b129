use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	db::Db,
	models::{UserRow, UserSettings},
};

pub async fn create_user(db: &Db, email: &str, name: Option<&str>) -> Result<Uuid> {
	let id = sqlx::query_scalar::<_, Uuid>(
		"\
INSERT INTO users (id, email, name)
VALUES ($1, $2, $3)
ON CONFLICT (email) DO UPDATE
SET name = COALESCE(EXCLUDED.name, users.name)
RETURNING id",
	)
	.bind(Uuid::new_v4())
	.bind(email)
	.bind(name)
	.fetch_one(&db.pool)
	.await?;

	Ok(id)
}

pub async fn get_user(db: &Db, user_id: Uuid) -> Result<Option<UserRow>> {
	let row = sqlx::query_as::<_, UserRow>(
		"SELECT id, email, name, created_at FROM users WHERE id = $1",
	)
	.bind(user_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(row)
}

pub async fn list_user_ids(db: &Db) -> Result<Vec<Uuid>> {
	let ids = sqlx::query_scalar::<_, Uuid>("SELECT id FROM users ORDER BY created_at ASC")
		.fetch_all(&db.pool)
		.await?;

	Ok(ids)
}

/// Stored settings, or defaults when the user never saved any.
pub async fn get_settings(db: &Db, user_id: Uuid) -> Result<UserSettings> {
	let row = sqlx::query_as::<_, UserSettings>(
		"\
SELECT
	user_id,
	monthly_budget_usd,
	budget_alert_enabled,
	budget_alert_threshold_pct,
	digest_email_enabled
FROM user_settings
WHERE user_id = $1",
	)
	.bind(user_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(row.unwrap_or_else(|| UserSettings::defaults(user_id)))
}

pub async fn upsert_settings(db: &Db, settings: &UserSettings, now: OffsetDateTime) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO user_settings (
	user_id,
	monthly_budget_usd,
	budget_alert_enabled,
	budget_alert_threshold_pct,
	digest_email_enabled,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $6)
ON CONFLICT (user_id) DO UPDATE
SET
	monthly_budget_usd = EXCLUDED.monthly_budget_usd,
	budget_alert_enabled = EXCLUDED.budget_alert_enabled,
	budget_alert_threshold_pct = EXCLUDED.budget_alert_threshold_pct,
	digest_email_enabled = EXCLUDED.digest_email_enabled,
	updated_at = EXCLUDED.updated_at",
	)
	.bind(settings.user_id)
	.bind(settings.monthly_budget_usd)
	.bind(settings.budget_alert_enabled)
	.bind(settings.budget_alert_threshold_pct)
	.bind(settings.digest_email_enabled)
	.bind(now)
	.execute(&db.pool)
	.await?;

	Ok(())
}
