use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use sift_domain::{
	budget::{self, BudgetAlert, BudgetDecision},
	calendar,
};
use sift_providers::mail::MailMessage;
use sift_storage::{budget as alerts, models::BudgetUserRow, usage};

use crate::{Result, SiftService};

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct BudgetReport {
	pub month: String,
	pub checked: usize,
	pub sent: usize,
	pub skipped: usize,
	pub failed: usize,
}

enum AlertResult {
	Sent,
	Skipped,
}

impl SiftService {
	/// Sends at most one low-budget alert per user, month and threshold.
	pub async fn evaluate_budgets(&self, now: OffsetDateTime) -> Result<BudgetReport> {
		let offset = self.local_offset();
		let month = calendar::format_month(calendar::local_date(now, offset));
		let mut report = BudgetReport { month: month.clone(), ..Default::default() };

		if !self.cfg.mail.is_enabled() {
			tracing::info!("Mail transport is not configured; skipping budget evaluation.");

			return Ok(report);
		}

		let (start, end) = calendar::month_window(now, offset);

		for user in alerts::list_budget_users(&self.db).await? {
			report.checked += 1;

			match self.evaluate_user_budget(&user, &month, start, end, now).await {
				Ok(AlertResult::Sent) => report.sent += 1,
				Ok(AlertResult::Skipped) => report.skipped += 1,
				Err(err) => {
					tracing::error!(error = %err, user_id = %user.user_id, month = %month, "Budget alert failed.");

					report.failed += 1;
				},
			}
		}

		Ok(report)
	}

	async fn evaluate_user_budget(
		&self,
		user: &BudgetUserRow,
		month: &str,
		start: OffsetDateTime,
		end: OffsetDateTime,
		now: OffsetDateTime,
	) -> Result<AlertResult> {
		let used_cost_usd = usage::cost_between(&self.db, user.user_id, start, end).await?;
		let remaining_ratio = match budget::evaluate(
			user.monthly_budget_usd,
			used_cost_usd,
			user.budget_alert_threshold_pct,
		) {
			BudgetDecision::Alert { remaining_ratio } => remaining_ratio,
			BudgetDecision::NoBudget | BudgetDecision::WithinThreshold { .. } => {
				return Ok(AlertResult::Skipped);
			},
		};

		if alerts::alert_exists(&self.db, user.user_id, month, user.budget_alert_threshold_pct).await? {
			return Ok(AlertResult::Skipped);
		}

		let alert = BudgetAlert {
			month: month.to_string(),
			monthly_budget_usd: user.monthly_budget_usd,
			used_cost_usd,
			remaining_ratio,
			threshold_pct: user.budget_alert_threshold_pct,
		};
		let message =
			MailMessage { to: user.email.clone(), subject: alert.subject(), html: alert.render_html() };

		self.providers.mail.send(&self.cfg.mail, &message).await?;

		if !alerts::insert_alert_log(&self.db, user.user_id, &alert, now).await? {
			tracing::warn!(user_id = %user.user_id, month, "Budget alert was already logged by another run.");
		}

		Ok(AlertResult::Sent)
	}
}
