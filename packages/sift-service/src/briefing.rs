use serde::Serialize;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use sift_domain::{
	briefing::{self, StreakStats},
	calendar,
	cluster::Cluster,
	plan::{self, PlanWindow},
	ranking::{Candidate, Ranked},
};
use sift_storage::{feedback, items, items::PlanQuery};

use crate::{Result, SiftService};

pub const BRIEFING_MAX_PLAN_SIZE: u32 = 30;

#[derive(Clone, Debug, Serialize)]
pub struct BriefingResponse {
	pub date: String,
	pub greeting: String,
	pub plan: Vec<Ranked>,
	pub highlights: Vec<Ranked>,
	pub clusters: Vec<BriefingCluster>,
	pub stats: BriefingStats,
}

#[derive(Clone, Debug, Serialize)]
pub struct BriefingCluster {
	#[serde(flatten)]
	pub cluster: Cluster,
	pub summary: String,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct BriefingStats {
	pub total_unread: i64,
	pub plan_size: usize,
	pub yesterday_read: i64,
	pub yesterday_unread: i64,
	#[serde(flatten)]
	pub streak: StreakStats,
}

impl SiftService {
	/// Today's unread plan, recent highlights and reading-streak counters for one user.
	pub async fn briefing(&self, user_id: Uuid, now: OffsetDateTime) -> Result<BriefingResponse> {
		let offset = self.local_offset();
		let local_now = calendar::local_now(now, offset);
		let today = local_now.date();
		let local_hour = local_now.hour();
		let size = plan::clamp_plan_size(Some(self.cfg.briefing.plan_size), BRIEFING_MAX_PLAN_SIZE);
		let (start, end) = PlanWindow::Today.bounds(now, offset);
		let query = PlanQuery { user_id, start, end, exclude_read: true };
		let selection = self.select_plan(&query, size as usize, true).await?;
		let highlight_count = self.cfg.briefing.highlight_count as usize;
		let mut highlights: Vec<Ranked> = items::list_highlights(
			&self.db,
			user_id,
			now - Duration::hours(24),
			self.cfg.briefing.highlight_min_score,
			highlight_count as i64,
		)
		.await?
		.into_iter()
		.map(|row| {
			let item = Candidate::from(row);
			let adjusted_score = item.score.unwrap_or(0.0);

			Ranked { item, adjusted_score }
		})
		.collect();

		if highlights.is_empty() {
			highlights = briefing::fallback_highlights(&selection.items, highlight_count);
		}

		let clusters = selection
			.clusters
			.into_iter()
			.map(|cluster| {
				let summary = briefing::cluster_summary(&cluster.items);

				BriefingCluster { cluster, summary }
			})
			.collect();
		let stats = self.briefing_stats(user_id, today, local_hour, selection.items.len()).await?;

		Ok(BriefingResponse {
			date: calendar::format_date(today),
			greeting: briefing::greeting(local_hour).to_string(),
			plan: selection.items,
			highlights,
			clusters,
			stats,
		})
	}

	async fn briefing_stats(
		&self,
		user_id: Uuid,
		today: time::Date,
		local_hour: u8,
		plan_size: usize,
	) -> Result<BriefingStats> {
		let offset = self.local_offset();
		let yesterday = today.previous_day().unwrap_or(today);
		let (yesterday_start, yesterday_end) = calendar::day_window(yesterday, offset);
		let total_unread = items::count_unread_summarized(&self.db, user_id).await?;
		let (yesterday_read, yesterday_unread) =
			items::count_read_unread_between(&self.db, user_id, yesterday_start, yesterday_end)
				.await?;
		let yesterday_streak = feedback::get_streak(&self.db, user_id, yesterday).await?.unwrap_or_default();
		let today_streak = feedback::get_streak(&self.db, user_id, today).await?.unwrap_or_default();
		let streak = briefing::streak_stats(
			yesterday_streak.streak_days,
			today_streak.read_count,
			self.cfg.briefing.streak_target,
			local_hour,
			self.cfg.briefing.streak_at_risk_hour,
		);

		Ok(BriefingStats { total_unread, plan_size, yesterday_read, yesterday_unread, streak })
	}
}
