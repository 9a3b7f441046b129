use time::OffsetDateTime;
use uuid::Uuid;

use sift_domain::budget::BudgetAlert;

use crate::{Result, db::Db, models::BudgetUserRow};

/// Users with alerts switched on and a budget set.
pub async fn list_budget_users(db: &Db) -> Result<Vec<BudgetUserRow>> {
	let rows = sqlx::query_as::<_, BudgetUserRow>(
		"\
SELECT u.id AS user_id, u.email, us.monthly_budget_usd, us.budget_alert_threshold_pct
FROM user_settings us
JOIN users u ON u.id = us.user_id
WHERE us.budget_alert_enabled AND us.monthly_budget_usd IS NOT NULL
ORDER BY u.created_at ASC",
	)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

pub async fn alert_exists(db: &Db, user_id: Uuid, month: &str, threshold_pct: i32) -> Result<bool> {
	let exists = sqlx::query_scalar::<_, bool>(
		"\
SELECT EXISTS (
	SELECT 1
	FROM budget_alert_logs
	WHERE user_id = $1 AND month = $2 AND threshold_pct = $3
)",
	)
	.bind(user_id)
	.bind(month)
	.bind(threshold_pct)
	.fetch_one(&db.pool)
	.await?;

	Ok(exists)
}

/// Returns `false` when the (user, month, threshold) alert was already logged.
pub async fn insert_alert_log(
	db: &Db,
	user_id: Uuid,
	alert: &BudgetAlert,
	now: OffsetDateTime,
) -> Result<bool> {
	let res = sqlx::query(
		"\
INSERT INTO budget_alert_logs (
	id,
	user_id,
	month,
	threshold_pct,
	budget_usd,
	used_cost_usd,
	remaining_ratio,
	created_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
ON CONFLICT (user_id, month, threshold_pct) DO NOTHING",
	)
	.bind(Uuid::new_v4())
	.bind(user_id)
	.bind(alert.month.as_str())
	.bind(alert.threshold_pct)
	.bind(alert.monthly_budget_usd)
	.bind(alert.used_cost_usd)
	.bind(alert.remaining_ratio)
	.bind(now)
	.execute(&db.pool)
	.await?;

	Ok(res.rows_affected() == 1)
}
