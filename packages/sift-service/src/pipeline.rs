//! Item enrichment: extract, facts, summarize, then a best-effort embedding.
//!
//! Each step persists before the next provider call and every status write is guarded by the
//! statuses it may follow, so a redelivered `item.created` event resumes where the last run
//! stopped and a concurrent run that already moved the item on wins. A failed item is reset and
//! starts over from extraction.

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use sift_domain::{
	embedding_input,
	ledger::{UsageIds, UsagePurpose},
	status::ItemStatus,
	text,
};
use sift_storage::{
	items,
	models::{ExtractRecord, ItemRow, SummaryRecord},
};

use crate::{
	Error, Result, SiftService,
	events::{self, Event, ItemCreated},
};

pub const MAX_PROCESSING_ERROR_CHARS: usize = 2_000;
pub const MAX_BULK_RETRY: i64 = 500;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PipelineOutcome {
	pub item_id: Uuid,
	pub status: ItemStatus,
	pub embedded: bool,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct RetryReport {
	pub requested: usize,
	pub retried: usize,
	pub item_ids: Vec<Uuid>,
}

enum Step {
	Advanced(ItemStatus),
	Failed,
	/// Another run moved the item first.
	Superseded,
}

/// Artifacts carried between steps of one run.
struct Run {
	item_id: Uuid,
	url: String,
	ids: UsageIds,
	title: Option<String>,
	content: Option<String>,
	facts: Option<Vec<String>>,
	summary: Option<SummaryRecord>,
	summarized_now: bool,
}
impl Run {
	fn new(item: &ItemRow) -> Self {
		Self {
			item_id: item.id,
			url: item.url.clone(),
			ids: UsageIds {
				user_id: Some(item.user_id),
				source_id: Some(item.source_id),
				item_id: Some(item.id),
				digest_id: None,
			},
			title: item.title.clone(),
			content: item.content_text.clone(),
			facts: None,
			summary: None,
			summarized_now: false,
		}
	}
}

impl SiftService {
	pub async fn process_item(
		&self,
		event: &ItemCreated,
		now: OffsetDateTime,
	) -> Result<PipelineOutcome> {
		let mut item = self.load_item(event.item_id).await?;

		// A new `item.created` for a failed item starts it over from extraction.
		if item.status() == ItemStatus::Failed {
			if items::reset_for_retry(&self.db, item.id, now).await? {
				tracing::info!(item_id = %item.id, "Failed item re-entered the pipeline.");
			}

			item = self.load_item(event.item_id).await?;
		}

		let mut run = Run::new(&item);
		let mut status = item.status();

		loop {
			let step = match status {
				ItemStatus::New => self.extract_step(&mut run, now).await?,
				ItemStatus::Fetched => self.facts_step(&mut run, now).await?,
				ItemStatus::FactsExtracted => self.summarize_step(&mut run, now).await?,
				ItemStatus::Summarized | ItemStatus::Failed => break,
			};

			match step {
				Step::Advanced(next) => status = next,
				Step::Failed => {
					status = ItemStatus::Failed;

					break;
				},
				Step::Superseded => {
					tracing::info!(item_id = %run.item_id, "Item moved on during processing; stopping.");

					return Ok(PipelineOutcome {
						item_id: run.item_id,
						status: self.current_status(run.item_id).await?,
						embedded: items::has_embedding(&self.db, run.item_id).await?,
					});
				},
			}
		}

		let embedded = if status == ItemStatus::Summarized {
			self.embed_step(&mut run, now).await?
		} else {
			false
		};

		Ok(PipelineOutcome { item_id: run.item_id, status, embedded })
	}

	async fn load_item(&self, item_id: Uuid) -> Result<ItemRow> {
		items::get_item(&self.db, item_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: format!("Item {item_id} does not exist.") })
	}

	/// Resets one failed item of the user and queues it again.
	pub async fn retry_item(&self, user_id: Uuid, item_id: Uuid) -> Result<PipelineOutcome> {
		let now = OffsetDateTime::now_utc();
		let item = items::get_item_for_user(&self.db, user_id, item_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: "Item not found.".to_string() })?;

		if !item.status().can_retry() {
			return Err(Error::InvalidRequest {
				message: format!("Only failed items can be retried; item is {}.", item.status()),
			});
		}
		if !self.requeue(item.id, item.source_id, &item.url, now).await? {
			return Err(Error::Conflict { message: "Item was retried concurrently.".to_string() });
		}

		Ok(PipelineOutcome { item_id: item.id, status: ItemStatus::New, embedded: false })
	}

	/// Resets up to [`MAX_BULK_RETRY`] failed items of the user, optionally within one source.
	pub async fn retry_failed(&self, user_id: Uuid, source_id: Option<Uuid>) -> Result<RetryReport> {
		let now = OffsetDateTime::now_utc();
		let failed = items::list_failed_items(&self.db, user_id, source_id, MAX_BULK_RETRY).await?;
		let mut report = RetryReport { requested: failed.len(), ..Default::default() };

		for item in failed {
			if self.requeue(item.id, item.source_id, &item.url, now).await? {
				report.retried += 1;
				report.item_ids.push(item.id);
			}
		}

		Ok(report)
	}

	async fn requeue(
		&self,
		item_id: Uuid,
		source_id: Uuid,
		url: &str,
		now: OffsetDateTime,
	) -> Result<bool> {
		if !items::reset_for_retry(&self.db, item_id, now).await? {
			return Ok(false);
		}

		let event = Event::ItemCreated(ItemCreated { item_id, source_id, url: url.to_string() });

		events::enqueue(&self.db.pool, &event, None, now).await?;

		Ok(true)
	}

	async fn extract_step(&self, run: &mut Run, now: OffsetDateTime) -> Result<Step> {
		let cfg = &self.cfg.providers.enrichment;
		let extracted = match self.providers.enrichment.extract(cfg, &run.url).await {
			Ok(extracted) => extracted,
			Err(err) => return self.fail(run, "extract", &err.to_string(), now).await,
		};
		let record = ExtractRecord {
			title: extracted.title.filter(|title| !title.trim().is_empty()),
			thumbnail_url: extracted.image_url.filter(|url| !url.trim().is_empty()),
			content_text: extracted.content,
			published_at: extracted
				.published_at
				.as_deref()
				.and_then(|raw| OffsetDateTime::parse(raw.trim(), &Rfc3339).ok()),
		};

		if !items::mark_fetched(&self.db, run.item_id, &record, now).await? {
			return Ok(Step::Superseded);
		}
		if record.title.is_some() {
			run.title = record.title;
		}

		run.content = Some(record.content_text);

		Ok(Step::Advanced(ItemStatus::Fetched))
	}

	async fn facts_step(&self, run: &mut Run, now: OffsetDateTime) -> Result<Step> {
		let Some(content) = run.content.clone().filter(|content| !content.trim().is_empty()) else {
			return self.fail(run, "facts", "Item has no extracted content.", now).await;
		};
		let cfg = &self.cfg.providers.enrichment;
		let extracted =
			match self.providers.enrichment.extract_facts(cfg, run.title.as_deref(), &content).await
			{
				Ok(extracted) => extracted,
				Err(err) => return self.fail(run, "facts", &err.to_string(), now).await,
			};

		if !items::save_facts(&self.db, run.item_id, &extracted.facts, now).await? {
			return Ok(Step::Superseded);
		}

		self.record_usage(UsagePurpose::Facts, extracted.usage.as_ref(), run.ids, now).await;

		run.facts = Some(extracted.facts);

		Ok(Step::Advanced(ItemStatus::FactsExtracted))
	}

	async fn summarize_step(&self, run: &mut Run, now: OffsetDateTime) -> Result<Step> {
		let facts = match run.facts.take() {
			Some(facts) => facts,
			None => items::get_facts(&self.db, run.item_id).await?.unwrap_or_default(),
		};
		let source_text_chars = run.content.as_deref().map(|content| content.chars().count());
		let cfg = &self.cfg.providers.enrichment;
		let summary = match self
			.providers
			.enrichment
			.summarize(cfg, run.title.as_deref(), &facts, source_text_chars)
			.await
		{
			Ok(summary) => summary,
			Err(err) => {
				run.facts = Some(facts);

				return self.fail(run, "summarize", &err.to_string(), now).await;
			},
		};
		let record = SummaryRecord {
			summary: summary.summary,
			topics: clean_topics(summary.topics),
			score: clamp_score(summary.score),
			score_breakdown: summary.score_breakdown,
			score_reason: summary.score_reason,
			score_policy_version: summary.score_policy_version,
		};

		run.facts = Some(facts);

		if !items::save_summary(&self.db, run.item_id, &record, now).await? {
			return Ok(Step::Superseded);
		}

		self.record_usage(UsagePurpose::Summary, summary.usage.as_ref(), run.ids, now).await;

		run.summary = Some(record);
		run.summarized_now = true;

		Ok(Step::Advanced(ItemStatus::Summarized))
	}

	/// Returns whether the item has an embedding afterwards. Failures never fail the item.
	async fn embed_step(&self, run: &mut Run, now: OffsetDateTime) -> Result<bool> {
		if !run.summarized_now && items::has_embedding(&self.db, run.item_id).await? {
			return Ok(true);
		}

		let (summary, topics) = match run.summary.take() {
			Some(record) => (record.summary, record.topics),
			None => match items::get_summary(&self.db, run.item_id).await? {
				Some(row) => (row.summary, row.topics),
				None => return Ok(false),
			},
		};
		let facts = match run.facts.take() {
			Some(facts) => facts,
			None => items::get_facts(&self.db, run.item_id).await?.unwrap_or_default(),
		};
		let input =
			embedding_input::build_embedding_input(run.title.as_deref(), &summary, &topics, &facts);
		let cfg = &self.cfg.providers.embedding;
		let embedding = match self.providers.embedding.embed(cfg, &input).await {
			Ok(embedding) if !embedding.vector.is_empty() => embedding,
			Ok(_) => {
				return self.embedding_failed(run, "Embedding response was empty.", now).await;
			},
			Err(err) => return self.embedding_failed(run, &err.to_string(), now).await,
		};

		items::upsert_embedding(&self.db, run.item_id, &embedding.model, &embedding.vector, now)
			.await?;
		self.record_usage(UsagePurpose::Embedding, Some(&embedding.usage), run.ids, now).await;

		Ok(true)
	}

	async fn embedding_failed(&self, run: &Run, message: &str, now: OffsetDateTime) -> Result<bool> {
		let message = text::truncate_chars(message, MAX_PROCESSING_ERROR_CHARS);

		tracing::warn!(item_id = %run.item_id, error = %message, "Item embedding failed.");

		items::record_embedding_failure(&self.db, run.item_id, &message, now).await?;

		Ok(false)
	}

	async fn fail(
		&self,
		run: &Run,
		step: &'static str,
		message: &str,
		now: OffsetDateTime,
	) -> Result<Step> {
		let message = text::truncate_chars(message, MAX_PROCESSING_ERROR_CHARS);

		tracing::warn!(item_id = %run.item_id, step, error = %message, "Item processing failed.");

		if items::mark_failed(&self.db, run.item_id, &message, now).await? {
			Ok(Step::Failed)
		} else {
			Ok(Step::Superseded)
		}
	}

	async fn current_status(&self, item_id: Uuid) -> Result<ItemStatus> {
		let item = items::get_item(&self.db, item_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: format!("Item {item_id} does not exist.") })?;

		Ok(item.status())
	}
}

/// Non-finite scores become 0; everything else is clamped to `[0, 1]`.
pub fn clamp_score(score: f64) -> f64 {
	if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 }
}

fn clean_topics(topics: Vec<String>) -> Vec<String> {
	topics
		.into_iter()
		.map(|topic| topic.trim().to_string())
		.filter(|topic| !topic.is_empty())
		.collect()
}
