use time::{Date, OffsetDateTime};
use uuid::Uuid;

use sift_domain::{calendar, digest::SendStatus};
use sift_service::{DigestCreated, DigestRun, DispatchOutcome, Event, events};
use sift_storage::{digests, outbox};

use super::{Calls, Fixture, StubOptions};

fn next_digest_date(now: OffsetDateTime) -> Date {
	let today = calendar::local_date(now, time::UtcOffset::UTC);

	today.next_day().unwrap_or(today)
}

fn run_for(date: Date) -> DigestRun {
	DigestRun { date: Some(calendar::format_date(date)), user_id: None }
}

async fn digest_id(fx: &Fixture, date: Date) -> Uuid {
	digests::find_digest_id(&fx.service.db, fx.user_id, date)
		.await
		.expect("Failed to look up digest.")
		.expect("Digest must exist.")
}

async fn usage_rows(fx: &Fixture, purpose: &str) -> i64 {
	sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM llm_usage_logs WHERE purpose = $1")
		.bind(purpose)
		.fetch_one(&fx.service.db.pool)
		.await
		.expect("Failed to count usage rows.")
}

async fn digest_event(fx: &Fixture) -> (Uuid, serde_json::Value) {
	sqlx::query_as::<_, (Uuid, serde_json::Value)>(
		"SELECT event_id, payload FROM event_outbox WHERE kind = $1",
	)
	.bind(events::DIGEST_CREATED)
	.fetch_one(&fx.service.db.pool)
	.await
	.expect("Failed to load the digest event.")
}

async fn pending_events(fx: &Fixture, kind: &str) -> i64 {
	sqlx::query_scalar::<_, i64>(
		"SELECT COUNT(*) FROM event_outbox WHERE kind = $1 AND status = 'PENDING'",
	)
	.bind(kind)
	.fetch_one(&fx.service.db.pool)
	.await
	.expect("Failed to count pending events.")
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn digest_is_created_once_and_sent_once() {
	let Some(fx) = super::setup("digest_is_created_once_and_sent_once", StubOptions::default()).await
	else {
		return;
	};
	let now = OffsetDateTime::now_utc();
	let date = next_digest_date(now);

	super::summarized_item(&fx, "https://example.com/one", now).await;
	super::summarized_item(&fx, "https://example.com/two", now).await;

	let first = fx.service.generate_digests(&run_for(date), now).await.expect("run");
	let second = fx.service.generate_digests(&run_for(date), now).await.expect("run");

	assert_eq!((first.created, first.skipped_empty, first.failed), (1, 0, 0));
	assert_eq!((second.created, second.already_queued), (0, 1));
	assert_eq!(super::count_events(&fx, events::DIGEST_CREATED).await, 1);

	let digest_id = digest_id(&fx, date).await;
	let entries = digests::list_digest_entries(&fx.service.db, digest_id).await.expect("entries");

	assert_eq!(entries.iter().map(|entry| entry.rank).collect::<Vec<_>>(), vec![1, 2]);

	let event = DigestCreated { digest_id, user_id: fx.user_id, to: String::new() };
	let outcome = fx.service.send_digest(&event, now).await.expect("send");

	assert_eq!(outcome, DispatchOutcome::Sent);

	let sent = fx.mail.sent();

	assert_eq!(sent.len(), 1);
	assert_eq!(sent[0].to, "reader@example.com");
	assert!(sent[0].html.contains("Story https://example.com/one"));
	assert_eq!(Calls::get(&fx.calls.compose_digest), 1);
	assert_eq!(Calls::get(&fx.calls.compose_cluster_draft), 1);
	assert_eq!(
		digests::list_cluster_drafts(&fx.service.db, digest_id).await.expect("drafts").len(),
		1
	);
	assert_eq!(usage_rows(&fx, "digest").await, 1);
	assert_eq!(usage_rows(&fx, "digest_cluster_draft").await, 1);

	let digest = digests::get_digest(&fx.service.db, digest_id).await.expect("get").expect("row");

	assert_eq!(digest.send_status.as_deref(), Some(SendStatus::Sent.as_str()));
	assert!(digest.sent_at.is_some());
	assert!(digest.send_error.is_none());

	let again = fx.service.send_digest(&event, now).await.expect("send");
	let third = fx.service.generate_digests(&run_for(date), now).await.expect("run");

	assert_eq!(again, DispatchOutcome::AlreadySent);
	assert_eq!(Calls::get(&fx.calls.send), 1);
	assert_eq!((third.created, third.skipped_sent), (0, 1));

	fx.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn user_without_items_gets_no_digest() {
	let Some(fx) = super::setup("user_without_items_gets_no_digest", StubOptions::default()).await
	else {
		return;
	};
	let now = OffsetDateTime::now_utc();
	let date = next_digest_date(now);
	let report = fx.service.generate_digests(&run_for(date), now).await.expect("run");

	assert_eq!((report.created, report.skipped_empty), (0, 1));
	assert!(
		digests::find_digest_id(&fx.service.db, fx.user_id, date).await.expect("find").is_none()
	);
	assert_eq!(super::count_events(&fx, events::DIGEST_CREATED).await, 0);

	fx.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn disabled_transport_skips_without_composing() {
	let options = StubOptions { mail_enabled: false, ..Default::default() };
	let Some(fx) = super::setup("disabled_transport_skips_without_composing", options).await else {
		return;
	};
	let now = OffsetDateTime::now_utc();
	let date = next_digest_date(now);

	super::summarized_item(&fx, "https://example.com/quiet", now).await;
	fx.service.generate_digests(&run_for(date), now).await.expect("run");

	let digest_id = digest_id(&fx, date).await;
	let event = DigestCreated { digest_id, user_id: fx.user_id, to: String::new() };
	let outcome = fx.service.send_digest(&event, now).await.expect("send");
	let digest = digests::get_digest(&fx.service.db, digest_id).await.expect("get").expect("row");

	assert_eq!(outcome, DispatchOutcome::SkippedTransportDisabled);
	assert_eq!(digest.send_status.as_deref(), Some(SendStatus::SkippedResendDisabled.as_str()));
	assert!(digest.sent_at.is_none());
	assert_eq!(Calls::get(&fx.calls.compose_digest), 0);
	assert_eq!(Calls::get(&fx.calls.send), 0);

	fx.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn redelivery_after_send_failure_reuses_cached_copy() {
	let options = StubOptions { failing_sends: 1, ..Default::default() };
	let Some(fx) = super::setup("redelivery_after_send_failure_reuses_cached_copy", options).await
	else {
		return;
	};
	let now = OffsetDateTime::now_utc();
	let date = next_digest_date(now);

	super::summarized_item(&fx, "https://example.com/retry", now).await;
	fx.service.generate_digests(&run_for(date), now).await.expect("run");

	let digest_id = digest_id(&fx, date).await;
	let event =
		DigestCreated { digest_id, user_id: fx.user_id, to: "override@example.com".to_string() };
	let failed = fx.service.send_digest(&event, now).await.expect("send");
	let digest = digests::get_digest(&fx.service.db, digest_id).await.expect("get").expect("row");

	assert_eq!(failed, DispatchOutcome::SendFailed);
	assert_eq!(digest.send_status.as_deref(), Some(SendStatus::SendEmailFailed.as_str()));
	assert!(digest.send_error.as_deref().is_some_and(|err| err.contains("rejected")));
	assert!(digest.cached_copy().is_some());

	let sent = fx.service.send_digest(&event, now).await.expect("send");

	assert_eq!(sent, DispatchOutcome::Sent);
	assert_eq!(Calls::get(&fx.calls.compose_digest), 1);
	assert_eq!(Calls::get(&fx.calls.send), 2);
	assert_eq!(fx.mail.sent()[0].to, "override@example.com");
	assert_eq!(usage_rows(&fx, "digest").await, 1);

	fx.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn failed_send_is_queued_again_by_the_next_run() {
	let options = StubOptions { failing_sends: 1, ..Default::default() };
	let Some(fx) = super::setup("failed_send_is_queued_again_by_the_next_run", options).await
	else {
		return;
	};
	let now = OffsetDateTime::now_utc();
	let date = next_digest_date(now);

	super::summarized_item(&fx, "https://example.com/resend", now).await;

	let first = fx.service.generate_digests(&run_for(date), now).await.expect("run");

	assert_eq!(first.created, 1);

	let (event_id, payload) = digest_event(&fx).await;
	let event = match Event::decode(events::DIGEST_CREATED, payload).expect("decode") {
		Event::DigestCreated(event) => event,
		other => panic!("unexpected event {other:?}"),
	};
	let outcome = fx.service.send_digest(&event, now).await.expect("send");

	assert_eq!(outcome, DispatchOutcome::SendFailed);

	// The worker completes the event even though the send failed.
	outbox::mark_done(&fx.service.db, event_id, now).await.expect("done");

	let second = fx.service.generate_digests(&run_for(date), now).await.expect("run");
	let (rearmed_id, _) = digest_event(&fx).await;

	assert_eq!((second.created, second.already_queued, second.skipped_sent), (1, 0, 0));
	assert_eq!(rearmed_id, event_id);
	assert_eq!(pending_events(&fx, events::DIGEST_CREATED).await, 1);

	let outcome = fx.service.send_digest(&event, now).await.expect("send");

	assert_eq!(outcome, DispatchOutcome::Sent);
	assert_eq!(Calls::get(&fx.calls.send), 2);
	assert_eq!(Calls::get(&fx.calls.compose_digest), 1);

	outbox::mark_done(&fx.service.db, event_id, now).await.expect("done");

	let third = fx.service.generate_digests(&run_for(date), now).await.expect("run");

	assert_eq!((third.created, third.skipped_sent), (0, 1));
	assert_eq!(pending_events(&fx, events::DIGEST_CREATED).await, 0);

	fx.test_db.cleanup().await.expect("Failed to cleanup test database.");
}
