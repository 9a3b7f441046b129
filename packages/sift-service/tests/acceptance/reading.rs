use time::OffsetDateTime;

use sift_domain::plan::PlanWindow;
use sift_service::{Error, FeedbackRequest, ReadingPlanRequest};

use super::StubOptions;

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn reading_plan_and_briefing_follow_reads() {
	let Some(fx) = super::setup("reading_plan_and_briefing_follow_reads", StubOptions::default()).await
	else {
		return;
	};
	let now = OffsetDateTime::now_utc();
	let mut item_ids = Vec::new();

	for idx in 0..3 {
		item_ids.push(super::summarized_item(&fx, &format!("https://example.com/read/{idx}"), now).await);
	}

	let plan = fx
		.service
		.reading_plan(fx.user_id, ReadingPlanRequest::default(), now)
		.await
		.expect("Failed to build reading plan.");

	assert_eq!(plan.window, PlanWindow::Last24Hours);
	assert_eq!(plan.size, 15);
	assert_eq!(plan.items.len(), 3);
	assert_eq!(plan.source_pool_count, 3);
	assert_eq!(plan.topics.len(), 1);
	assert_eq!((plan.topics[0].topic.as_str(), plan.topics[0].count), ("rust", 3));
	assert_eq!(plan.clusters.len(), 1);
	assert_eq!(plan.clusters[0].size, 3);

	let read = fx.service.mark_read(fx.user_id, item_ids[0], now).await.expect("read");
	let read_again = fx.service.mark_read(fx.user_id, item_ids[0], now).await.expect("read");

	assert!(read.changed);
	assert!(!read_again.changed);

	let plan = fx
		.service
		.reading_plan(fx.user_id, ReadingPlanRequest::default(), now)
		.await
		.expect("Failed to build reading plan.");

	assert_eq!(plan.items.len(), 2);
	assert!(plan.items.iter().all(|ranked| ranked.item.id != item_ids[0]));

	let briefing = fx.service.briefing(fx.user_id, now).await.expect("Failed to build briefing.");

	assert!(!briefing.greeting.is_empty());
	assert_eq!(briefing.plan.len(), 2);
	assert!(!briefing.highlights.is_empty());
	assert_eq!(briefing.stats.total_unread, 2);
	assert_eq!(briefing.stats.plan_size, 2);
	assert_eq!(briefing.stats.streak.today_read_count, 1);

	let unread = fx.service.mark_unread(fx.user_id, item_ids[0]).await.expect("unread");

	assert!(unread.changed);

	fx.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn feedback_is_validated_and_scoped_to_the_owner() {
	let Some(fx) =
		super::setup("feedback_is_validated_and_scoped_to_the_owner", StubOptions::default()).await
	else {
		return;
	};
	let now = OffsetDateTime::now_utc();
	let item_id = super::summarized_item(&fx, "https://example.com/rated", now).await;
	let bad = fx
		.service
		.set_feedback(fx.user_id, item_id, FeedbackRequest { rating: 2, is_favorite: false })
		.await
		.expect_err("rating out of range");

	assert!(matches!(bad, Error::InvalidRequest { .. }));

	fx.service
		.set_feedback(fx.user_id, item_id, FeedbackRequest { rating: 1, is_favorite: true })
		.await
		.expect("Failed to store feedback.");

	let foreign = fx
		.service
		.set_feedback(uuid::Uuid::new_v4(), item_id, FeedbackRequest { rating: 1, is_favorite: false })
		.await
		.expect_err("foreign item");

	assert!(matches!(foreign, Error::NotFound { .. }));

	fx.test_db.cleanup().await.expect("Failed to cleanup test database.");
}
