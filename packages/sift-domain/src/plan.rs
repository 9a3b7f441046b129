use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, UtcOffset};

use crate::calendar;

pub const DEFAULT_PLAN_SIZE: u32 = 15;
pub const MAX_PLAN_SIZE: u32 = 100;
pub const MAX_TOPIC_BUCKETS: i64 = 12;

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum PlanWindow {
	#[default]
	#[serde(rename = "24h")]
	Last24Hours,
	/// The current local calendar day.
	#[serde(rename = "today")]
	Today,
	#[serde(rename = "7d")]
	Last7Days,
}
impl PlanWindow {
	pub fn parse(raw: Option<&str>) -> Self {
		match raw.map(str::trim) {
			Some("today") => Self::Today,
			Some("7d") => Self::Last7Days,
			_ => Self::Last24Hours,
		}
	}

	/// Lower bound and optional exclusive upper bound on `COALESCE(published_at, created_at)`.
	pub fn bounds(
		self,
		now: OffsetDateTime,
		offset: UtcOffset,
	) -> (OffsetDateTime, Option<OffsetDateTime>) {
		match self {
			Self::Last24Hours => (now - Duration::hours(24), None),
			Self::Today => {
				let (start, end) = calendar::day_window(calendar::local_date(now, offset), offset);

				(start, Some(end))
			},
			Self::Last7Days => (now - Duration::days(7), None),
		}
	}
}

pub fn clamp_plan_size(size: Option<u32>, max: u32) -> u32 {
	match size {
		None | Some(0) => DEFAULT_PLAN_SIZE.min(max),
		Some(size) => size.min(max),
	}
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TopicBucket {
	pub topic: String,
	pub count: i64,
	pub max_score: Option<f64>,
}
