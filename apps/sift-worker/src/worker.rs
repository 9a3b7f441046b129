use std::time::Duration as StdDuration;

use color_eyre::Result;
use time::{Date, Duration, OffsetDateTime};
use tokio::time as tokio_time;

use sift_domain::calendar;
use sift_service::{Error as ServiceError, Event, SiftService};
use sift_storage::{models::OutboxEvent, outbox};

const BASE_BACKOFF_MS: i64 = 500;
const MAX_BACKOFF_MS: i64 = 30_000;
const MAX_OUTBOX_ERROR_CHARS: usize = 1_024;
const MAX_EVENTS_PER_TICK: usize = 32;

pub struct WorkerState {
	pub service: SiftService,
}

/// When each periodic job last ran, kept in memory to avoid hitting the outbox every tick.
#[derive(Debug, Default)]
struct Schedule {
	last_feed_poll: Option<OffsetDateTime>,
	digest_queued_for: Option<Date>,
	budget_queued_for: Option<Date>,
}

pub async fn run_worker(state: WorkerState) -> Result<()> {
	let poll_interval = StdDuration::from_millis(state.service.cfg.worker.poll_interval_ms);
	let mut schedule = Schedule::default();

	tracing::info!(
		poll_interval_ms = state.service.cfg.worker.poll_interval_ms,
		max_attempts = state.service.cfg.worker.max_attempts,
		"Worker started."
	);

	loop {
		for _ in 0..MAX_EVENTS_PER_TICK {
			match process_outbox_once(&state).await {
				Ok(true) => {},
				Ok(false) => break,
				Err(err) => {
					tracing::error!(error = %err, "Outbox processing failed.");

					break;
				},
			}
		}

		let now = OffsetDateTime::now_utc();

		poll_feeds_if_due(&state, &mut schedule, now).await;
		queue_daily_triggers(&state, &mut schedule, now).await;

		tokio_time::sleep(poll_interval).await;
	}
}

/// Claims and handles one event. Returns `false` when nothing was due.
async fn process_outbox_once(state: &WorkerState) -> Result<bool> {
	let service = &state.service;
	let now = OffsetDateTime::now_utc();
	let Some(job) =
		outbox::claim_next(&service.db, now, service.cfg.worker.claim_lease_seconds).await?
	else {
		return Ok(false);
	};
	let attempts = job.attempts.saturating_add(1);
	let event = match Event::decode(&job.kind, job.payload.clone()) {
		Ok(event) => event,
		Err(err) => {
			let error_text = sanitize_outbox_error(&err.to_string());

			outbox::mark_dead(&service.db, job.event_id, attempts, &error_text, now).await?;
			tracing::error!(
				error = %err,
				event_id = %job.event_id,
				kind = %job.kind,
				"Outbox event could not be decoded."
			);

			return Ok(true);
		},
	};

	match service.handle_event(&event, now).await {
		Ok(()) => {
			outbox::mark_done(&service.db, job.event_id, OffsetDateTime::now_utc()).await?;
		},
		Err(err) => {
			record_failure(state, &job, attempts, &err).await?;
		},
	}

	Ok(true)
}

async fn record_failure(
	state: &WorkerState,
	job: &OutboxEvent,
	attempts: i32,
	err: &ServiceError,
) -> Result<()> {
	let db = &state.service.db;
	let now = OffsetDateTime::now_utc();
	let error_text = sanitize_outbox_error(&err.to_string());
	let max_attempts = state.service.cfg.worker.max_attempts;
	let next = if is_permanent(err) { None } else { retry_at(attempts, max_attempts, now) };

	match next {
		Some(available_at) => {
			outbox::mark_failed(db, job.event_id, attempts, &error_text, available_at, now).await?;
			tracing::error!(
				error = %err,
				event_id = %job.event_id,
				kind = %job.kind,
				attempts,
				"Outbox event failed."
			);
		},
		None => {
			outbox::mark_dead(db, job.event_id, attempts, &error_text, now).await?;
			tracing::error!(
				error = %err,
				event_id = %job.event_id,
				kind = %job.kind,
				attempts,
				"Outbox event is dead."
			);
		},
	}

	Ok(())
}

async fn poll_feeds_if_due(state: &WorkerState, schedule: &mut Schedule, now: OffsetDateTime) {
	let interval = Duration::seconds(state.service.cfg.worker.feed_poll_interval_seconds);

	if schedule.last_feed_poll.is_some_and(|last| now - last < interval) {
		return;
	}

	match state.service.poll_feeds(now).await {
		Ok(report) => {
			schedule.last_feed_poll = Some(now);

			tracing::info!(
				sources = report.sources,
				failed_sources = report.failed_sources,
				entries = report.entries,
				created_items = report.created_items,
				"Feed poll finished."
			);
		},
		Err(err) => {
			tracing::error!(error = %err, "Feed poll failed.");
		},
	}
}

async fn queue_daily_triggers(state: &WorkerState, schedule: &mut Schedule, now: OffsetDateTime) {
	let cfg = &state.service.cfg;
	let local_now =
		calendar::local_now(now, calendar::local_offset(cfg.service.utc_offset_minutes));
	let today = local_now.date();

	if trigger_due(local_now, cfg.worker.digest_hour, schedule.digest_queued_for) {
		match state.service.schedule_daily_digest(now).await {
			Ok(queued) => {
				schedule.digest_queued_for = Some(today);

				if queued {
					tracing::info!(date = %today, "Daily digest run queued.");
				}
			},
			Err(err) => {
				tracing::error!(error = %err, date = %today, "Queueing the daily digest run failed.");
			},
		}
	}
	if trigger_due(local_now, cfg.worker.budget_check_hour, schedule.budget_queued_for) {
		match state.service.schedule_daily_budget_check(now).await {
			Ok(queued) => {
				schedule.budget_queued_for = Some(today);

				if queued {
					tracing::info!(date = %today, "Daily budget check queued.");
				}
			},
			Err(err) => {
				tracing::error!(error = %err, date = %today, "Queueing the daily budget check failed.");
			},
		}
	}
}

fn trigger_due(local_now: OffsetDateTime, hour: u8, last_queued_for: Option<Date>) -> bool {
	local_now.hour() >= hour && last_queued_for != Some(local_now.date())
}

// Malformed payloads and deleted rows never succeed on a later attempt.
fn is_permanent(err: &ServiceError) -> bool {
	matches!(err, ServiceError::InvalidRequest { .. } | ServiceError::NotFound { .. })
}

/// Next delivery time, or `None` once `attempts` has used up the budget.
fn retry_at(attempts: i32, max_attempts: i32, now: OffsetDateTime) -> Option<OffsetDateTime> {
	if attempts >= max_attempts {
		return None;
	}

	Some(now + backoff_for_attempt(attempts))
}

fn sanitize_outbox_error(text: &str) -> String {
	let mut parts = Vec::new();
	let mut redact_next = false;

	for raw in text.split_whitespace() {
		let mut word = raw.to_string();

		if redact_next {
			word = "[REDACTED]".to_string();
			redact_next = false;
		}
		if raw.eq_ignore_ascii_case("bearer") {
			redact_next = true;
		}

		let lowered = raw.to_ascii_lowercase();

		for key in ["api_key", "apikey", "password", "secret", "token"] {
			if lowered.contains(key) && (lowered.contains('=') || lowered.contains(':')) {
				let sep = if raw.contains('=') { '=' } else { ':' };
				let prefix = raw.split(sep).next().unwrap_or(raw);

				word = format!("{prefix}{sep}[REDACTED]");

				break;
			}
		}

		parts.push(word);
	}

	let mut out = parts.join(" ");

	if out.chars().count() > MAX_OUTBOX_ERROR_CHARS {
		out = out.chars().take(MAX_OUTBOX_ERROR_CHARS).collect();
		out.push_str("...");
	}

	out
}

fn backoff_for_attempt(attempt: i32) -> Duration {
	let attempts = attempt.max(1) as u32;
	let exp = attempts.saturating_sub(1).min(6);
	let base = BASE_BACKOFF_MS.saturating_mul(1 << exp);

	Duration::milliseconds(base.min(MAX_BACKOFF_MS))
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;

	use super::*;

	#[test]
	fn backoff_doubles_and_caps() {
		assert_eq!(backoff_for_attempt(0), Duration::milliseconds(500));
		assert_eq!(backoff_for_attempt(1), Duration::milliseconds(500));
		assert_eq!(backoff_for_attempt(2), Duration::milliseconds(1_000));
		assert_eq!(backoff_for_attempt(4), Duration::milliseconds(4_000));
		assert_eq!(backoff_for_attempt(7), Duration::milliseconds(30_000));
		assert_eq!(backoff_for_attempt(40), Duration::milliseconds(30_000));
	}

	#[test]
	fn retries_stop_at_max_attempts() {
		let now = datetime!(2026-03-01 10:00 UTC);

		assert_eq!(retry_at(1, 3, now), Some(now + Duration::milliseconds(500)));
		assert_eq!(retry_at(2, 3, now), Some(now + Duration::milliseconds(1_000)));
		assert_eq!(retry_at(3, 3, now), None);
		assert_eq!(retry_at(9, 3, now), None);
	}

	#[test]
	fn client_errors_are_not_retried() {
		assert!(is_permanent(&ServiceError::NotFound { message: "Digest not found.".to_string() }));
		assert!(is_permanent(&ServiceError::InvalidRequest { message: "bad".to_string() }));
		assert!(!is_permanent(&ServiceError::Provider { message: "timeout".to_string() }));
		assert!(!is_permanent(&ServiceError::Storage { message: "pool".to_string() }));
	}

	#[test]
	fn secrets_are_redacted() {
		let text = "status 401 Authorization: Bearer sk-live-123 api_key=abc password:hunter2 ok";

		assert_eq!(
			sanitize_outbox_error(text),
			"status 401 Authorization: Bearer [REDACTED] api_key=[REDACTED] password:[REDACTED] ok"
		);
	}

	#[test]
	fn long_errors_are_truncated() {
		let text = "x".repeat(MAX_OUTBOX_ERROR_CHARS + 10);
		let out = sanitize_outbox_error(&text);

		assert_eq!(out.chars().count(), MAX_OUTBOX_ERROR_CHARS + 3);
		assert!(out.ends_with("..."));
	}

	#[test]
	fn daily_trigger_fires_once_per_local_date() {
		let morning = datetime!(2026-03-01 06:59 +2);
		let later = datetime!(2026-03-01 07:00 +2);

		assert!(!trigger_due(morning, 7, None));
		assert!(trigger_due(later, 7, None));
		assert!(trigger_due(later, 7, Some(datetime!(2026-02-28 07:00 +2).date())));
		assert!(!trigger_due(later, 7, Some(later.date())));
	}
}
