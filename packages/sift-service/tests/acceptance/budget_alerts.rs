use time::OffsetDateTime;

use sift_domain::ledger::{LlmUsage, UsageIds, UsagePurpose};
use sift_storage::{models::UserSettings, usage, users};

use super::{Fixture, StubOptions};

async fn enable_alerts(fx: &Fixture, budget_usd: f64, now: OffsetDateTime) {
	let settings = UserSettings {
		monthly_budget_usd: Some(budget_usd),
		budget_alert_enabled: true,
		budget_alert_threshold_pct: 20,
		..UserSettings::defaults(fx.user_id)
	};

	users::upsert_settings(&fx.service.db, &settings, now).await.expect("Failed to save settings.");
}

async fn spend(fx: &Fixture, cost_usd: f64, now: OffsetDateTime) {
	let row = LlmUsage {
		provider: "test".to_string(),
		model: "budget-model".to_string(),
		input_tokens: 1_000,
		estimated_cost_usd: cost_usd,
		..Default::default()
	};
	let ids = UsageIds { user_id: Some(fx.user_id), ..Default::default() };

	usage::insert_usage(&fx.service.db.pool, UsagePurpose::Summary, &row, &ids, now)
		.await
		.expect("Failed to insert usage.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn budget_alert_is_sent_once_per_month() {
	let Some(fx) = super::setup("budget_alert_is_sent_once_per_month", StubOptions::default()).await
	else {
		return;
	};
	let now = OffsetDateTime::now_utc();

	enable_alerts(&fx, 1.0, now).await;
	spend(&fx, 0.9, now).await;

	let first = fx.service.evaluate_budgets(now).await.expect("evaluate");
	let second = fx.service.evaluate_budgets(now).await.expect("evaluate");

	assert_eq!((first.checked, first.sent, first.skipped, first.failed), (1, 1, 0, 0));
	assert_eq!((second.checked, second.sent, second.skipped), (1, 0, 1));

	let sent = fx.mail.sent();

	assert_eq!(sent.len(), 1);
	assert_eq!(sent[0].to, "reader@example.com");
	assert!(sent[0].subject.contains("20%"));

	fx.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn spend_within_threshold_sends_nothing() {
	let Some(fx) = super::setup("spend_within_threshold_sends_nothing", StubOptions::default()).await
	else {
		return;
	};
	let now = OffsetDateTime::now_utc();

	enable_alerts(&fx, 10.0, now).await;
	spend(&fx, 1.0, now).await;

	let report = fx.service.evaluate_budgets(now).await.expect("evaluate");

	assert_eq!((report.checked, report.sent, report.skipped), (1, 0, 1));
	assert!(fx.mail.sent().is_empty());

	fx.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn disabled_transport_skips_budget_evaluation() {
	let options = StubOptions { mail_enabled: false, ..Default::default() };
	let Some(fx) = super::setup("disabled_transport_skips_budget_evaluation", options).await else {
		return;
	};
	let now = OffsetDateTime::now_utc();

	enable_alerts(&fx, 1.0, now).await;
	spend(&fx, 0.99, now).await;

	let report = fx.service.evaluate_budgets(now).await.expect("evaluate");

	assert_eq!(report.checked, 0);
	assert!(fx.mail.sent().is_empty());

	fx.test_db.cleanup().await.expect("Failed to cleanup test database.");
}
