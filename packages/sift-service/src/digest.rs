use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use sift_domain::{
	calendar,
	ranking::{self, Candidate, Recency, ScoreWeights},
};
use sift_storage::{digests, items, users};

use crate::{
	Result, SiftService,
	events::{self, DigestCreated, DigestRun, Event},
};

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct DigestRunReport {
	pub date: String,
	pub created: usize,
	pub already_queued: usize,
	pub skipped_sent: usize,
	pub skipped_empty: usize,
	pub failed: usize,
}

enum UserDigest {
	Created,
	AlreadyQueued,
	AlreadySent,
	Empty,
}

impl SiftService {
	/// Builds the digest of `run.date` for every user, or for `run.user_id` alone.
	///
	/// A user whose digest fails is logged and counted; the run goes on with the next user.
	pub async fn generate_digests(
		&self,
		run: &DigestRun,
		now: OffsetDateTime,
	) -> Result<DigestRunReport> {
		let date = run.resolve_date(now, self.local_offset())?;
		let user_ids = match run.user_id {
			Some(user_id) => vec![user_id],
			None => users::list_user_ids(&self.db).await?,
		};
		let mut report = DigestRunReport { date: calendar::format_date(date), ..Default::default() };

		for user_id in user_ids {
			match self.generate_user_digest(user_id, date, now).await {
				Ok(UserDigest::Created) => report.created += 1,
				Ok(UserDigest::AlreadyQueued) => report.already_queued += 1,
				Ok(UserDigest::AlreadySent) => report.skipped_sent += 1,
				Ok(UserDigest::Empty) => report.skipped_empty += 1,
				Err(err) => {
					tracing::error!(error = %err, user_id = %user_id, date = %report.date, "Digest generation failed.");

					report.failed += 1;
				},
			}
		}

		Ok(report)
	}

	async fn generate_user_digest(
		&self,
		user_id: Uuid,
		date: Date,
		now: OffsetDateTime,
	) -> Result<UserDigest> {
		let (start, end) = calendar::digest_window(date, self.local_offset());
		let rows = items::list_digest_candidates(&self.db, user_id, start, end).await?;

		if rows.is_empty() {
			return Ok(UserDigest::Empty);
		}

		let profile = self.preference_profile(user_id).await?;
		let ranked = ranking::rank(
			rows.into_iter().map(Candidate::from).collect(),
			profile.as_deref(),
			ScoreWeights::from(&self.cfg.ranking),
			Recency::Published,
		);
		let item_ids: Vec<Uuid> = ranked.iter().map(|ranked| ranked.item.id).collect();
		let created = digests::create_digest(&self.db, user_id, date, &item_ids, now).await?;

		if created.already_sent {
			return Ok(UserDigest::AlreadySent);
		}

		let to = users::get_user(&self.db, user_id).await?.map(|user| user.email).unwrap_or_default();
		let event = Event::DigestCreated(DigestCreated { digest_id: created.id, user_id, to });

		// An unsent digest is queued again on every run; the `sent_at` guard keeps it at most once.
		let queued = events::enqueue_or_rearm(
			&self.db.pool,
			&event,
			&events::digest_created_dedupe_key(created.id),
			now,
		)
		.await?;

		if !queued {
			return Ok(UserDigest::AlreadyQueued);
		}

		Ok(UserDigest::Created)
	}
}
