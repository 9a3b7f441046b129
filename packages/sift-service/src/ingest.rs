use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use sift_storage::{items, sources};

use crate::{
	Error, Result, SiftService,
	events::{self, Event, ItemCreated},
};

pub const FEED_FETCH_TIMEOUT_MS: u64 = 15_000;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SubmitItemRequest {
	pub source_id: Uuid,
	pub url: String,
	#[serde(default)]
	pub title: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SubmitItemResponse {
	pub item_id: Uuid,
	/// `false` when the URL was already known for the source.
	pub created: bool,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct FeedPollReport {
	pub sources: usize,
	pub failed_sources: usize,
	pub entries: usize,
	pub created_items: usize,
}

impl SiftService {
	/// Registers a feed or manual source for the user.
	pub async fn register_source(
		&self,
		user_id: Uuid,
		url: &str,
		kind: &str,
		title: Option<&str>,
	) -> Result<Uuid> {
		let url = url.trim();

		if url.is_empty() {
			return Err(Error::InvalidRequest { message: "url is required.".to_string() });
		}

		Ok(sources::upsert_source(&self.db, user_id, url, kind, title).await?)
	}

	/// Stores a single URL under one of the user's sources and queues it for processing.
	pub async fn submit_item(
		&self,
		user_id: Uuid,
		req: SubmitItemRequest,
	) -> Result<SubmitItemResponse> {
		let now = OffsetDateTime::now_utc();
		let url = req.url.trim();

		if url.is_empty() {
			return Err(Error::InvalidRequest { message: "url is required.".to_string() });
		}

		let source = sources::get_source(&self.db, req.source_id)
			.await?
			.filter(|source| source.user_id == user_id)
			.ok_or_else(|| Error::NotFound { message: "Source not found.".to_string() })?;
		let title = req.title.as_deref().map(str::trim).filter(|title| !title.is_empty());
		let mut tx = self.db.pool.begin().await?;
		let inserted = items::insert_item_if_absent(&mut *tx, source.id, url, title, None).await?;

		if let Some(item_id) = inserted {
			let event =
				Event::ItemCreated(ItemCreated { item_id, source_id: source.id, url: url.to_string() });

			events::enqueue(&mut *tx, &event, None, now).await?;
			tx.commit().await?;

			return Ok(SubmitItemResponse { item_id, created: true });
		}

		tx.commit().await?;

		let item_id = items::find_item_id(&self.db, source.id, url).await?.ok_or_else(|| {
			Error::Conflict { message: "Item disappeared while being submitted.".to_string() }
		})?;

		Ok(SubmitItemResponse { item_id, created: false })
	}

	/// Fetches every enabled feed once. A failing source is recorded and skipped.
	pub async fn poll_feeds(&self, now: OffsetDateTime) -> Result<FeedPollReport> {
		let feeds = sources::list_enabled_feeds(&self.db).await?;
		let mut report = FeedPollReport { sources: feeds.len(), ..Default::default() };

		for source in feeds {
			let entries = match self.providers.feeds.fetch(&source.url, FEED_FETCH_TIMEOUT_MS).await {
				Ok(entries) => entries,
				Err(err) => {
					let message = err.to_string();

					tracing::warn!(source_id = %source.id, error = %message, "Feed fetch failed.");

					report.failed_sources += 1;

					sources::record_fetch(&self.db, source.id, Some(&message), now).await?;

					continue;
				},
			};

			report.entries += entries.len();

			for entry in entries {
				let mut tx = self.db.pool.begin().await?;
				let inserted = items::insert_item_if_absent(
					&mut *tx,
					source.id,
					&entry.url,
					entry.title.as_deref(),
					entry.published_at,
				)
				.await?;

				if let Some(item_id) = inserted {
					let event = Event::ItemCreated(ItemCreated {
						item_id,
						source_id: source.id,
						url: entry.url.clone(),
					});

					events::enqueue(&mut *tx, &event, None, now).await?;

					report.created_items += 1;
				}

				tx.commit().await?;
			}

			sources::record_fetch(&self.db, source.id, None, now).await?;
		}

		Ok(report)
	}
}
