use time::{Duration, OffsetDateTime, macros::date};
use uuid::Uuid;

use sift_config::Postgres;
use sift_domain::{
	budget::BudgetAlert,
	ledger::{LlmUsage, UsageIds, UsagePurpose},
	status::ItemStatus,
};
use sift_storage::{
	budget,
	db::Db,
	digests, feedback, items,
	models::{ExtractRecord, SummaryRecord},
	sources, usage, users,
};
use sift_testkit::TestDatabase;

struct Fixture {
	test_db: TestDatabase,
	db: Db,
	user_id: Uuid,
	source_id: Uuid,
}

async fn setup(test_name: &str) -> Option<Fixture> {
	let Some(base_dsn) = sift_testkit::env_dsn() else {
		eprintln!("Skipping {test_name}; set SIFT_PG_DSN to run this test.");

		return None;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let cfg = Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 4 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	let user_id =
		users::create_user(&db, "reader@example.com", Some("Reader")).await.expect("user");
	let source_id = sources::upsert_source(
		&db,
		user_id,
		"https://example.com/feed.xml",
		sources::KIND_RSS,
		None,
	)
	.await
	.expect("source");

	Some(Fixture { test_db, db, user_id, source_id })
}

async fn new_item(fx: &Fixture, url: &str) -> Uuid {
	items::insert_item_if_absent(&fx.db.pool, fx.source_id, url, None, None)
		.await
		.expect("Failed to insert item.")
		.expect("Item must be new.")
}

fn usage_row() -> LlmUsage {
	LlmUsage {
		provider: "anthropic".to_string(),
		model: "claude-haiku".to_string(),
		input_tokens: 120,
		output_tokens: 30,
		estimated_cost_usd: 0.002,
		..Default::default()
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn duplicate_usage_rows_are_stored_once() {
	let Some(fx) = setup("duplicate_usage_rows_are_stored_once").await else {
		return;
	};
	let item_id = new_item(&fx, "https://example.com/a").await;
	let ids = UsageIds {
		user_id: Some(fx.user_id),
		source_id: Some(fx.source_id),
		item_id: Some(item_id),
		digest_id: None,
	};
	let now = OffsetDateTime::now_utc();
	let first = usage::insert_usage(&fx.db.pool, UsagePurpose::Facts, &usage_row(), &ids, now)
		.await
		.expect("insert");
	let second = usage::insert_usage(&fx.db.pool, UsagePurpose::Facts, &usage_row(), &ids, now)
		.await
		.expect("insert");
	let other_purpose =
		usage::insert_usage(&fx.db.pool, UsagePurpose::Summary, &usage_row(), &ids, now)
			.await
			.expect("insert");

	assert!(first);
	assert!(!second);
	assert!(other_purpose);
	assert_eq!(usage::count_for_item(&fx.db, item_id, UsagePurpose::Facts).await.expect("count"), 1);

	let spent = usage::cost_between(&fx.db, fx.user_id, now - Duration::hours(1), now + Duration::hours(1))
		.await
		.expect("cost");

	assert!((spent - 0.004).abs() < 1e-9);

	fx.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn concurrent_digest_creation_yields_one_digest() {
	let Some(fx) = setup("concurrent_digest_creation_yields_one_digest").await else {
		return;
	};
	let mut item_ids = Vec::new();

	for idx in 0..5 {
		item_ids.push(new_item(&fx, &format!("https://example.com/{idx}")).await);
	}

	let now = OffsetDateTime::now_utc();
	let day = date!(2024 - 01 - 01);
	let (a, b) = tokio::join!(
		digests::create_digest(&fx.db, fx.user_id, day, &item_ids, now),
		digests::create_digest(&fx.db, fx.user_id, day, &item_ids, now),
	);
	let a = a.expect("create");
	let b = b.expect("create");

	assert_eq!(a.id, b.id);
	assert!(!a.already_sent && !b.already_sent);

	let entries = digests::list_digest_entries(&fx.db, a.id).await.expect("entries");

	assert_eq!(entries.iter().map(|e| e.rank).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
	assert_eq!(entries.iter().map(|e| e.item_id).collect::<Vec<_>>(), item_ids);

	assert!(digests::mark_sent(&fx.db, a.id, now).await.expect("sent"));
	assert!(!digests::mark_sent(&fx.db, a.id, now).await.expect("sent"));

	let again = digests::create_digest(&fx.db, fx.user_id, day, &item_ids[..2], now)
		.await
		.expect("create");

	assert_eq!(again.id, a.id);
	assert!(again.already_sent);
	assert_eq!(digests::list_digest_entries(&fx.db, a.id).await.expect("entries").len(), 5);

	fx.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn budget_alert_log_is_unique_per_month_and_threshold() {
	let Some(fx) = setup("budget_alert_log_is_unique_per_month_and_threshold").await else {
		return;
	};
	let alert = BudgetAlert {
		month: "2024-01".to_string(),
		monthly_budget_usd: 10.0,
		used_cost_usd: 9.5,
		remaining_ratio: 0.05,
		threshold_pct: 20,
	};
	let now = OffsetDateTime::now_utc();

	assert!(!budget::alert_exists(&fx.db, fx.user_id, "2024-01", 20).await.expect("exists"));
	assert!(budget::insert_alert_log(&fx.db, fx.user_id, &alert, now).await.expect("insert"));
	assert!(!budget::insert_alert_log(&fx.db, fx.user_id, &alert, now).await.expect("insert"));
	assert!(budget::alert_exists(&fx.db, fx.user_id, "2024-01", 20).await.expect("exists"));
	assert!(!budget::alert_exists(&fx.db, fx.user_id, "2024-02", 20).await.expect("exists"));

	fx.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn status_never_regresses_without_retry() {
	let Some(fx) = setup("status_never_regresses_without_retry").await else {
		return;
	};
	let item_id = new_item(&fx, "https://example.com/status").await;
	let now = OffsetDateTime::now_utc();
	let record = ExtractRecord { content_text: "lorem".to_string(), ..Default::default() };

	assert!(items::mark_fetched(&fx.db, item_id, &record, now).await.expect("fetched"));
	assert!(
		items::save_facts(&fx.db, item_id, &["a".to_string()], now).await.expect("facts")
	);
	// A late redelivery of the extract step must not move the item back.
	assert!(!items::mark_fetched(&fx.db, item_id, &record, now).await.expect("fetched"));

	let item = items::get_item(&fx.db, item_id).await.expect("get").expect("row");

	assert_eq!(item.status(), ItemStatus::FactsExtracted);
	assert!(!items::reset_for_retry(&fx.db, item_id, now).await.expect("retry"));
	assert!(items::mark_failed(&fx.db, item_id, "boom", now).await.expect("failed"));
	assert!(!items::mark_failed(&fx.db, item_id, "boom", now).await.expect("failed"));
	assert!(items::reset_for_retry(&fx.db, item_id, now).await.expect("retry"));

	let item = items::get_item(&fx.db, item_id).await.expect("get").expect("row");

	assert_eq!(item.status(), ItemStatus::New);
	assert!(item.processing_error.is_none());

	fx.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn summarized_item_cannot_be_marked_failed() {
	let Some(fx) = setup("summarized_item_cannot_be_marked_failed").await else {
		return;
	};
	let item_id = new_item(&fx, "https://example.com/summarized").await;
	let now = OffsetDateTime::now_utc();
	let record = ExtractRecord { content_text: "lorem".to_string(), ..Default::default() };
	let summary = SummaryRecord {
		summary: "Short summary.".to_string(),
		topics: vec!["rust".to_string()],
		score: 0.8,
		score_breakdown: None,
		score_reason: None,
		score_policy_version: None,
	};

	assert!(items::mark_fetched(&fx.db, item_id, &record, now).await.expect("fetched"));
	assert!(
		items::save_facts(&fx.db, item_id, &["a".to_string()], now).await.expect("facts")
	);
	assert!(items::save_summary(&fx.db, item_id, &summary, now).await.expect("summary"));
	// A late embedding failure must not discard the summary.
	assert!(!items::mark_failed(&fx.db, item_id, "embed timeout", now).await.expect("failed"));

	let item = items::get_item(&fx.db, item_id).await.expect("get").expect("row");

	assert_eq!(item.status(), ItemStatus::Summarized);
	assert!(item.processing_error.is_none());

	fx.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn streak_extends_from_completed_previous_day() {
	let Some(fx) = setup("streak_extends_from_completed_previous_day").await else {
		return;
	};
	let now = OffsetDateTime::now_utc();
	let day_one = date!(2024 - 03 - 01);
	let day_two = date!(2024 - 03 - 02);
	let mut ids = Vec::new();

	for idx in 0..4 {
		ids.push(new_item(&fx, &format!("https://example.com/read/{idx}")).await);
	}

	assert!(feedback::mark_read(&fx.db, fx.user_id, ids[0], day_one, 2, now).await.expect("read"));
	assert!(!feedback::mark_read(&fx.db, fx.user_id, ids[0], day_one, 2, now).await.expect("read"));
	feedback::mark_read(&fx.db, fx.user_id, ids[1], day_one, 2, now).await.expect("read");

	let first = feedback::get_streak(&fx.db, fx.user_id, day_one).await.expect("get").expect("row");

	assert_eq!((first.read_count, first.streak_days, first.is_completed), (2, 1, true));

	feedback::mark_read(&fx.db, fx.user_id, ids[2], day_two, 2, now).await.expect("read");

	let partial = feedback::get_streak(&fx.db, fx.user_id, day_two).await.expect("get").expect("row");

	assert_eq!((partial.read_count, partial.streak_days, partial.is_completed), (1, 1, false));

	feedback::mark_read(&fx.db, fx.user_id, ids[3], day_two, 2, now).await.expect("read");

	let second = feedback::get_streak(&fx.db, fx.user_id, day_two).await.expect("get").expect("row");

	assert_eq!((second.read_count, second.streak_days, second.is_completed), (2, 2, true));

	fx.test_db.cleanup().await.expect("Failed to cleanup test database.");
}
