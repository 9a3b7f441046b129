//! Events exchanged through the outbox and the entry points that consume them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgExecutor;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use sift_domain::calendar;
use sift_storage::outbox;

use crate::{Error, Result, SiftService};

pub const ITEM_CREATED: &str = "item.created";
pub const DIGEST_CREATED: &str = "digest.created";
pub const DIGEST_RUN: &str = "digest.run";
pub const BUDGET_EVALUATE: &str = "budget.evaluate";

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ItemCreated {
	pub item_id: Uuid,
	pub source_id: Uuid,
	pub url: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DigestCreated {
	pub digest_id: Uuid,
	pub user_id: Uuid,
	pub to: String,
}

/// Digest generation for one local date (today when absent), optionally for one user.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct DigestRun {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub date: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_id: Option<Uuid>,
}
impl DigestRun {
	/// The requested date, or the local date of `now`.
	pub fn resolve_date(&self, now: OffsetDateTime, offset: time::UtcOffset) -> Result<Date> {
		match self.date.as_deref().map(str::trim).filter(|raw| !raw.is_empty()) {
			Some(raw) => calendar::parse_date(raw).ok_or_else(|| Error::InvalidRequest {
				message: format!("date must be YYYY-MM-DD, got {raw:?}."),
			}),
			None => Ok(calendar::local_date(now, offset)),
		}
	}
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct BudgetEvaluate {}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
	ItemCreated(ItemCreated),
	DigestCreated(DigestCreated),
	DigestRun(DigestRun),
	BudgetEvaluate(BudgetEvaluate),
}
impl Event {
	pub fn kind(&self) -> &'static str {
		match self {
			Self::ItemCreated(_) => ITEM_CREATED,
			Self::DigestCreated(_) => DIGEST_CREATED,
			Self::DigestRun(_) => DIGEST_RUN,
			Self::BudgetEvaluate(_) => BUDGET_EVALUATE,
		}
	}

	pub fn payload(&self) -> Result<Value> {
		let value = match self {
			Self::ItemCreated(event) => serde_json::to_value(event)?,
			Self::DigestCreated(event) => serde_json::to_value(event)?,
			Self::DigestRun(event) => serde_json::to_value(event)?,
			Self::BudgetEvaluate(event) => serde_json::to_value(event)?,
		};

		Ok(value)
	}

	pub fn decode(kind: &str, payload: Value) -> Result<Self> {
		let event = match kind {
			ITEM_CREATED => Self::ItemCreated(serde_json::from_value(payload)?),
			DIGEST_CREATED => Self::DigestCreated(serde_json::from_value(payload)?),
			DIGEST_RUN => Self::DigestRun(serde_json::from_value(payload)?),
			BUDGET_EVALUATE => Self::BudgetEvaluate(serde_json::from_value(payload)?),
			other => {
				return Err(Error::InvalidRequest { message: format!("unknown event kind {other:?}.") });
			},
		};

		Ok(event)
	}
}

pub fn digest_run_dedupe_key(date: Date) -> String {
	format!("{DIGEST_RUN}:{}", calendar::format_date(date))
}

pub fn budget_evaluate_dedupe_key(date: Date) -> String {
	format!("{BUDGET_EVALUATE}:{}", calendar::format_date(date))
}

pub fn digest_created_dedupe_key(digest_id: Uuid) -> String {
	format!("digest:{digest_id}")
}

/// Writes an event to the outbox. Returns `false` when the dedupe key was already used.
pub async fn enqueue<'e, E>(
	executor: E,
	event: &Event,
	dedupe_key: Option<&str>,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let inserted = outbox::enqueue(executor, event.kind(), &event.payload()?, dedupe_key, now).await?;

	Ok(inserted)
}

/// Writes an event to the outbox, re-arming a finished event with the same key.
///
/// Returns `false` while an earlier event with that key is still waiting for delivery.
pub async fn enqueue_or_rearm<'e, E>(
	executor: E,
	event: &Event,
	dedupe_key: &str,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let queued =
		outbox::enqueue_or_rearm(executor, event.kind(), &event.payload()?, dedupe_key, now).await?;

	Ok(queued)
}

impl SiftService {
	/// Runs the work an event stands for.
	pub async fn handle_event(&self, event: &Event, now: OffsetDateTime) -> Result<()> {
		match event {
			Event::ItemCreated(event) => {
				let outcome = self.process_item(event, now).await?;

				tracing::info!(
					item_id = %outcome.item_id,
					status = %outcome.status,
					embedded = outcome.embedded,
					"Item pipeline finished."
				);
			},
			Event::DigestCreated(event) => {
				let outcome = self.send_digest(event, now).await?;

				tracing::info!(digest_id = %event.digest_id, outcome = ?outcome, "Digest dispatch finished.");
			},
			Event::DigestRun(run) => {
				let report = self.generate_digests(run, now).await?;

				tracing::info!(
					date = %report.date,
					created = report.created,
					already_queued = report.already_queued,
					skipped_sent = report.skipped_sent,
					skipped_empty = report.skipped_empty,
					failed = report.failed,
					"Digest run finished."
				);
			},
			Event::BudgetEvaluate(_) => {
				let report = self.evaluate_budgets(now).await?;

				tracing::info!(
					month = %report.month,
					checked = report.checked,
					sent = report.sent,
					skipped = report.skipped,
					failed = report.failed,
					"Budget evaluation finished."
				);
			},
		}

		Ok(())
	}

	/// Queues an `item.created` event for an existing item.
	pub async fn request_item_processing(
		&self,
		event: ItemCreated,
		now: OffsetDateTime,
	) -> Result<bool> {
		enqueue(&self.db.pool, &Event::ItemCreated(event), None, now).await
	}

	pub async fn request_digest_run(&self, run: DigestRun, now: OffsetDateTime) -> Result<bool> {
		run.resolve_date(now, self.local_offset())?;

		enqueue(&self.db.pool, &Event::DigestRun(run), None, now).await
	}

	pub async fn request_budget_evaluation(&self, now: OffsetDateTime) -> Result<bool> {
		enqueue(&self.db.pool, &Event::BudgetEvaluate(BudgetEvaluate {}), None, now).await
	}

	/// Queues the daily digest run for the local date of `now`, once per date.
	pub async fn schedule_daily_digest(&self, now: OffsetDateTime) -> Result<bool> {
		let date = calendar::local_date(now, self.local_offset());
		let run = DigestRun { date: Some(calendar::format_date(date)), user_id: None };

		enqueue(&self.db.pool, &Event::DigestRun(run), Some(&digest_run_dedupe_key(date)), now).await
	}

	/// Queues the daily budget evaluation for the local date of `now`, once per date.
	pub async fn schedule_daily_budget_check(&self, now: OffsetDateTime) -> Result<bool> {
		let date = calendar::local_date(now, self.local_offset());

		enqueue(
			&self.db.pool,
			&Event::BudgetEvaluate(BudgetEvaluate {}),
			Some(&budget_evaluate_dedupe_key(date)),
			now,
		)
		.await
	}
}
