use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use sift_domain::calendar;
use sift_storage::{feedback, items};

use crate::{Error, Result, SiftService};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FeedbackRequest {
	/// -1 dislike, 0 neutral, 1 like.
	#[serde(default)]
	pub rating: i16,
	#[serde(default)]
	pub is_favorite: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ReadResponse {
	pub item_id: Uuid,
	/// `false` when the item was already read (or already unread for `mark_unread`).
	pub changed: bool,
}

impl SiftService {
	pub async fn set_feedback(
		&self,
		user_id: Uuid,
		item_id: Uuid,
		req: FeedbackRequest,
	) -> Result<()> {
		if !(-1..=1).contains(&req.rating) {
			return Err(Error::InvalidRequest {
				message: "rating must be -1, 0, or 1.".to_string(),
			});
		}

		self.ensure_item_owner(user_id, item_id).await?;

		feedback::upsert_feedback(
			&self.db,
			user_id,
			item_id,
			req.rating,
			req.is_favorite,
			OffsetDateTime::now_utc(),
		)
		.await?;

		Ok(())
	}

	/// Records a read and counts it toward the local day's reading streak.
	pub async fn mark_read(
		&self,
		user_id: Uuid,
		item_id: Uuid,
		now: OffsetDateTime,
	) -> Result<ReadResponse> {
		self.ensure_item_owner(user_id, item_id).await?;

		let local_date = calendar::local_date(now, self.local_offset());
		let changed = feedback::mark_read(
			&self.db,
			user_id,
			item_id,
			local_date,
			self.cfg.briefing.streak_target,
			now,
		)
		.await?;

		Ok(ReadResponse { item_id, changed })
	}

	pub async fn mark_unread(&self, user_id: Uuid, item_id: Uuid) -> Result<ReadResponse> {
		self.ensure_item_owner(user_id, item_id).await?;

		let changed = feedback::delete_read(&self.db, user_id, item_id).await?;

		Ok(ReadResponse { item_id, changed })
	}

	async fn ensure_item_owner(&self, user_id: Uuid, item_id: Uuid) -> Result<()> {
		if items::get_item_for_user(&self.db, user_id, item_id).await?.is_none() {
			return Err(Error::NotFound { message: "Item not found.".to_string() });
		}

		Ok(())
	}
}
