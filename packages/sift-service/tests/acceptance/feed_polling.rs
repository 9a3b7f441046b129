use time::{OffsetDateTime, macros::datetime};
use uuid::Uuid;

use sift_domain::status::ItemStatus;
use sift_providers::feed::FeedEntry;
use sift_service::{ItemCreated, SubmitItemRequest, events};
use sift_storage::{items, sources};

use super::{Fixture, StubOptions};

const DOWN_FEED: &str = "https://down.example.com/feed.xml";

fn entry(url: &str, title: &str) -> FeedEntry {
	FeedEntry {
		url: url.to_string(),
		title: Some(title.to_string()),
		published_at: Some(datetime!(2026-03-01 08:00 UTC)),
	}
}

async fn add_source(fx: &Fixture, url: &str) -> Uuid {
	sources::upsert_source(&fx.service.db, fx.user_id, url, sources::KIND_RSS, None)
		.await
		.expect("Failed to create source.")
}

async fn submit(fx: &Fixture, source_id: Uuid, url: &str) -> Uuid {
	fx.service
		.submit_item(fx.user_id, SubmitItemRequest { source_id, url: url.to_string(), title: None })
		.await
		.expect("Failed to submit item.")
		.item_id
}

async fn status_of(fx: &Fixture, item_id: Uuid) -> ItemStatus {
	items::get_item(&fx.service.db, item_id).await.expect("get").expect("row").status()
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn feed_poll_queues_new_entries_and_survives_a_failing_source() {
	let Some(fx) =
		super::setup("feed_poll_queues_new_entries_and_survives_a_failing_source", StubOptions::default())
			.await
	else {
		return;
	};
	let now = OffsetDateTime::now_utc();
	let down_id = add_source(&fx, DOWN_FEED).await;

	fx.feeds.fail(DOWN_FEED);
	fx.feeds.serve(
		"https://example.com/feed.xml",
		vec![entry("https://example.com/known", "Known"), entry("https://example.com/fresh", "Fresh")],
	);
	submit(&fx, fx.source_id, "https://example.com/known").await;

	let first = fx.service.poll_feeds(now).await.expect("poll");

	assert_eq!(first.sources, 2);
	assert_eq!(first.failed_sources, 1);
	assert_eq!(first.entries, 2);
	assert_eq!(first.created_items, 1);
	assert_eq!(super::count_events(&fx, events::ITEM_CREATED).await, 2);

	let down = sources::get_source(&fx.service.db, down_id).await.expect("get").expect("row");
	let up = sources::get_source(&fx.service.db, fx.source_id).await.expect("get").expect("row");

	assert!(down.last_error.as_deref().is_some_and(|err| err.contains("unreachable")));
	assert!(down.last_fetched_at.is_some());
	assert!(up.last_error.is_none());
	assert!(up.last_fetched_at.is_some());

	// The failing host recovers; entries already stored are not queued again.
	fx.feeds.serve(DOWN_FEED, vec![entry("https://down.example.com/late", "Late")]);

	let second = fx.service.poll_feeds(now).await.expect("poll");
	let down = sources::get_source(&fx.service.db, down_id).await.expect("get").expect("row");

	assert_eq!((second.failed_sources, second.entries, second.created_items), (0, 3, 1));
	assert_eq!(super::count_events(&fx, events::ITEM_CREATED).await, 3);
	assert!(down.last_error.is_none());

	fx.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn bulk_retry_requeues_failed_items_of_one_source() {
	let options = StubOptions { fail_extract: true, ..Default::default() };
	let Some(fx) = super::setup("bulk_retry_requeues_failed_items_of_one_source", options).await
	else {
		return;
	};
	let now = OffsetDateTime::now_utc();
	let other_source = add_source(&fx, "https://other.example.com/feed.xml").await;
	let mut failed = Vec::new();

	for (source_id, url) in [
		(fx.source_id, "https://example.com/a"),
		(fx.source_id, "https://example.com/b"),
		(other_source, "https://other.example.com/c"),
	] {
		let item_id = submit(&fx, source_id, url).await;
		let event = ItemCreated { item_id, source_id, url: url.to_string() };
		let outcome = fx.service.process_item(&event, now).await.expect("Failed to process item.");

		assert_eq!(outcome.status, ItemStatus::Failed);

		failed.push(item_id);
	}

	let pending = submit(&fx, fx.source_id, "https://example.com/pending").await;

	assert_eq!(super::count_events(&fx, events::ITEM_CREATED).await, 4);

	let scoped = fx.service.retry_failed(fx.user_id, Some(fx.source_id)).await.expect("retry");

	assert_eq!((scoped.requested, scoped.retried), (2, 2));
	assert!(scoped.item_ids.contains(&failed[0]));
	assert!(scoped.item_ids.contains(&failed[1]));
	assert_eq!(super::count_events(&fx, events::ITEM_CREATED).await, 6);
	assert_eq!(status_of(&fx, failed[0]).await, ItemStatus::New);
	assert_eq!(status_of(&fx, failed[1]).await, ItemStatus::New);
	assert_eq!(status_of(&fx, failed[2]).await, ItemStatus::Failed);
	assert_eq!(status_of(&fx, pending).await, ItemStatus::New);

	let stranger = fx.service.retry_failed(Uuid::new_v4(), None).await.expect("retry");

	assert_eq!((stranger.requested, stranger.retried), (0, 0));

	let rest = fx.service.retry_failed(fx.user_id, None).await.expect("retry");

	assert_eq!((rest.requested, rest.retried), (1, 1));
	assert_eq!(rest.item_ids, vec![failed[2]]);
	assert_eq!(super::count_events(&fx, events::ITEM_CREATED).await, 7);

	fx.test_db.cleanup().await.expect("Failed to cleanup test database.");
}
