use time::OffsetDateTime;

use sift_domain::{ledger::UsagePurpose, status::ItemStatus};
use sift_service::{Error, ItemCreated, SubmitItemRequest, events};
use sift_storage::{items, usage};

use super::{Calls, StubOptions};

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn item_runs_through_every_step_and_bills_once() {
	let Some(fx) = super::setup("item_runs_through_every_step_and_bills_once", StubOptions::default()).await
	else {
		return;
	};
	let now = OffsetDateTime::now_utc();
	let item_id = super::summarized_item(&fx, "https://example.com/happy", now).await;
	let item = items::get_item(&fx.service.db, item_id).await.expect("get").expect("row");
	let summary = items::get_summary(&fx.service.db, item_id).await.expect("get").expect("row");

	assert_eq!(item.status(), ItemStatus::Summarized);
	assert_eq!(item.title.as_deref(), Some("Story https://example.com/happy"));
	assert!(item.published_at.is_none());
	assert_eq!(summary.score, Some(1.0));
	assert_eq!(summary.topics, vec!["rust".to_string()]);
	assert!(items::has_embedding(&fx.service.db, item_id).await.expect("embedding"));

	for purpose in [UsagePurpose::Facts, UsagePurpose::Summary, UsagePurpose::Embedding] {
		assert_eq!(usage::count_for_item(&fx.service.db, item_id, purpose).await.expect("count"), 1);
	}

	// A redelivered event finds the item done and calls nothing.
	let event = ItemCreated { item_id, source_id: fx.source_id, url: item.url.clone() };
	let outcome = fx.service.process_item(&event, now).await.expect("Failed to reprocess item.");

	assert_eq!(outcome.status, ItemStatus::Summarized);
	assert!(outcome.embedded);
	assert_eq!(Calls::get(&fx.calls.extract), 1);
	assert_eq!(Calls::get(&fx.calls.summarize), 1);
	assert_eq!(Calls::get(&fx.calls.embed), 1);
	assert_eq!(super::count_events(&fx, events::ITEM_CREATED).await, 1);

	fx.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn extraction_failure_stops_the_pipeline() {
	let options = StubOptions { fail_extract: true, ..Default::default() };
	let Some(fx) = super::setup("extraction_failure_stops_the_pipeline", options).await else {
		return;
	};
	let now = OffsetDateTime::now_utc();
	let submitted = fx
		.service
		.submit_item(
			fx.user_id,
			SubmitItemRequest {
				source_id: fx.source_id,
				url: "https://example.com/broken".to_string(),
				title: Some("Broken".to_string()),
			},
		)
		.await
		.expect("Failed to submit item.");
	let event = ItemCreated {
		item_id: submitted.item_id,
		source_id: fx.source_id,
		url: "https://example.com/broken".to_string(),
	};
	let outcome = fx.service.process_item(&event, now).await.expect("Failed to process item.");
	let item = items::get_item(&fx.service.db, submitted.item_id).await.expect("get").expect("row");

	assert_eq!(outcome.status, ItemStatus::Failed);
	assert!(!outcome.embedded);
	assert_eq!(item.status(), ItemStatus::Failed);
	assert!(item.processing_error.as_deref().is_some_and(|err| err.contains("extract unavailable")));
	assert_eq!(Calls::get(&fx.calls.facts), 0);
	assert_eq!(Calls::get(&fx.calls.summarize), 0);
	assert_eq!(Calls::get(&fx.calls.embed), 0);
	assert!(items::get_facts(&fx.service.db, submitted.item_id).await.expect("facts").is_none());

	let retried = fx.service.retry_item(fx.user_id, submitted.item_id).await.expect("retry");
	let item = items::get_item(&fx.service.db, submitted.item_id).await.expect("get").expect("row");

	assert_eq!(retried.status, ItemStatus::New);
	assert_eq!(item.status(), ItemStatus::New);
	assert!(item.processing_error.is_none());
	assert_eq!(super::count_events(&fx, events::ITEM_CREATED).await, 2);

	let err = fx.service.retry_item(fx.user_id, submitted.item_id).await.expect_err("not failed");

	assert!(matches!(err, Error::InvalidRequest { .. }));

	fx.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn reemitted_event_restarts_a_failed_item() {
	let options = StubOptions { fail_extract: true, ..Default::default() };
	let Some(fx) = super::setup("reemitted_event_restarts_a_failed_item", options).await else {
		return;
	};
	let now = OffsetDateTime::now_utc();
	let url = "https://example.com/flaky";
	let submitted = fx
		.service
		.submit_item(
			fx.user_id,
			SubmitItemRequest { source_id: fx.source_id, url: url.to_string(), title: None },
		)
		.await
		.expect("Failed to submit item.");
	let event = ItemCreated { item_id: submitted.item_id, source_id: fx.source_id, url: url.to_string() };
	let first = fx.service.process_item(&event, now).await.expect("Failed to process item.");

	assert_eq!(first.status, ItemStatus::Failed);
	assert_eq!(Calls::get(&fx.calls.extract), 1);

	let second = fx.service.process_item(&event, now).await.expect("Failed to process item.");
	let item = items::get_item(&fx.service.db, submitted.item_id).await.expect("get").expect("row");

	assert_eq!(Calls::get(&fx.calls.extract), 2);
	assert_eq!(second.status, ItemStatus::Failed);
	assert_eq!(item.status(), ItemStatus::Failed);
	assert!(item.processing_error.as_deref().is_some_and(|err| err.contains("extract unavailable")));
	assert_eq!(Calls::get(&fx.calls.facts), 0);

	fx.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn embedding_failure_keeps_the_item_summarized() {
	let options = StubOptions { fail_embed: true, ..Default::default() };
	let Some(fx) = super::setup("embedding_failure_keeps_the_item_summarized", options).await else {
		return;
	};
	let now = OffsetDateTime::now_utc();
	let item_id = super::summarized_item(&fx, "https://example.com/no-vector", now).await;
	let item = items::get_item(&fx.service.db, item_id).await.expect("get").expect("row");

	assert_eq!(item.status(), ItemStatus::Summarized);
	assert_eq!(item.embedding_failures, 1);
	assert!(item.embedding_error.as_deref().is_some_and(|err| err.contains("embedding service is down")));
	assert!(!items::has_embedding(&fx.service.db, item_id).await.expect("embedding"));
	assert_eq!(
		usage::count_for_item(&fx.service.db, item_id, UsagePurpose::Embedding).await.expect("count"),
		0
	);

	// Redelivery only retries the missing embedding.
	let event = ItemCreated { item_id, source_id: fx.source_id, url: item.url.clone() };
	let outcome = fx.service.process_item(&event, now).await.expect("Failed to reprocess item.");
	let item = items::get_item(&fx.service.db, item_id).await.expect("get").expect("row");

	assert_eq!(outcome.status, ItemStatus::Summarized);
	assert!(!outcome.embedded);
	assert_eq!(item.embedding_failures, 2);
	assert_eq!(Calls::get(&fx.calls.summarize), 1);
	assert_eq!(Calls::get(&fx.calls.embed), 2);

	fx.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn resubmitting_a_url_does_not_requeue_it() {
	let Some(fx) = super::setup("resubmitting_a_url_does_not_requeue_it", StubOptions::default()).await
	else {
		return;
	};
	let request = SubmitItemRequest {
		source_id: fx.source_id,
		url: "https://example.com/same".to_string(),
		title: None,
	};
	let first = fx.service.submit_item(fx.user_id, request.clone()).await.expect("submit");
	let second = fx.service.submit_item(fx.user_id, request).await.expect("submit");

	assert!(first.created);
	assert!(!second.created);
	assert_eq!(first.item_id, second.item_id);
	assert_eq!(super::count_events(&fx, events::ITEM_CREATED).await, 1);

	let stranger = uuid::Uuid::new_v4();
	let err = fx
		.service
		.submit_item(
			stranger,
			SubmitItemRequest {
				source_id: fx.source_id,
				url: "https://example.com/other".to_string(),
				title: None,
			},
		)
		.await
		.expect_err("foreign source");

	assert!(matches!(err, Error::NotFound { .. }));

	fx.test_db.cleanup().await.expect("Failed to cleanup test database.");
}
