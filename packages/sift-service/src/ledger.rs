use time::OffsetDateTime;
use uuid::Uuid;

use sift_domain::ledger::{LlmUsage, UsageIds, UsagePurpose};
use sift_storage::usage;

use crate::{Result, SiftService};

impl SiftService {
	/// Stores one ledger row for a billed provider call.
	///
	/// Absent or unbillable usage is skipped. A storage failure is logged and reported as `false`
	/// so it never fails the step that produced the usage.
	pub async fn record_usage(
		&self,
		purpose: UsagePurpose,
		usage: Option<&LlmUsage>,
		ids: UsageIds,
		now: OffsetDateTime,
	) -> bool {
		let Some(usage) = usage.filter(|usage| usage.is_billable()) else {
			return false;
		};

		match usage::insert_usage(&self.db.pool, purpose, usage, &ids, now).await {
			Ok(inserted) => inserted,
			Err(err) => {
				tracing::error!(
					error = %err,
					purpose = %purpose,
					item_id = ?ids.item_id,
					digest_id = ?ids.digest_id,
					"Usage ledger write failed."
				);

				false
			},
		}
	}

	/// Estimated spend of a user in `[start, end)`.
	pub async fn monthly_cost(
		&self,
		user_id: Uuid,
		start: OffsetDateTime,
		end: OffsetDateTime,
	) -> Result<f64> {
		Ok(usage::cost_between(&self.db, user_id, start, end).await?)
	}
}
