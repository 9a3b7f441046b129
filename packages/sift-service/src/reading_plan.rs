use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use sift_domain::{
	cluster::{self, Cluster, ClusterThresholds},
	diversify,
	plan::{self, PlanWindow, TopicBucket},
	profile,
	ranking::{self, Candidate, Ranked, Recency, ScoreWeights},
};
use sift_storage::{feedback, items, items::PlanQuery};

use crate::{Result, SiftService};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ReadingPlanRequest {
	/// `24h`, `today` or `7d`. Anything else reads as `24h`.
	#[serde(default)]
	pub window: Option<String>,
	#[serde(default)]
	pub size: Option<u32>,
	#[serde(default = "default_true")]
	pub diversify_topics: bool,
	#[serde(default = "default_true")]
	pub exclude_read: bool,
}
impl Default for ReadingPlanRequest {
	fn default() -> Self {
		Self { window: None, size: None, diversify_topics: true, exclude_read: true }
	}
}

#[derive(Clone, Debug, Serialize)]
pub struct ReadingPlanResponse {
	pub window: PlanWindow,
	pub size: u32,
	pub diversify_topics: bool,
	pub exclude_read: bool,
	pub source_pool_count: i64,
	pub topics: Vec<TopicBucket>,
	pub items: Vec<Ranked>,
	pub clusters: Vec<Cluster>,
}

/// Selected items and the pool clusters that contain at least one of them.
pub(crate) struct PlanSelection {
	pub items: Vec<Ranked>,
	pub clusters: Vec<Cluster>,
}

impl SiftService {
	pub async fn reading_plan(
		&self,
		user_id: Uuid,
		req: ReadingPlanRequest,
		now: OffsetDateTime,
	) -> Result<ReadingPlanResponse> {
		let window = PlanWindow::parse(req.window.as_deref());
		let size = plan::clamp_plan_size(req.size, plan::MAX_PLAN_SIZE);
		let (start, end) = window.bounds(now, self.local_offset());
		let query = PlanQuery { user_id, start, end, exclude_read: req.exclude_read };
		let selection = self.select_plan(&query, size as usize, req.diversify_topics).await?;
		let source_pool_count = items::count_plan_pool(&self.db, &query).await?;
		let topics = items::plan_topic_buckets(&self.db, &query, plan::MAX_TOPIC_BUCKETS)
			.await?
			.into_iter()
			.map(|(topic, count, max_score)| TopicBucket { topic, count, max_score })
			.collect();

		Ok(ReadingPlanResponse {
			window,
			size,
			diversify_topics: req.diversify_topics,
			exclude_read: req.exclude_read,
			source_pool_count,
			topics,
			items: selection.items,
			clusters: selection.clusters,
		})
	}

	pub(crate) async fn select_plan(
		&self,
		query: &PlanQuery,
		size: usize,
		diversify_topics: bool,
	) -> Result<PlanSelection> {
		let profile = self.preference_profile(query.user_id).await?;
		let limit = i64::from(self.cfg.ranking.candidate_limit.max(1));
		let rows = items::list_plan_candidates(&self.db, query, limit).await?;
		let ranked = ranking::rank(
			rows.into_iter().map(Candidate::from).collect(),
			profile.as_deref(),
			ScoreWeights::from(&self.cfg.ranking),
			Recency::Created,
		);
		let selected = if diversify_topics {
			diversify::diversify(&ranked, size)
		} else {
			ranked.iter().take(size).cloned().collect()
		};
		let selected_ids: HashSet<Uuid> = selected.iter().map(|ranked| ranked.item.id).collect();
		let clusters = cluster::build_clusters(
			&ranked,
			Some(&selected_ids),
			ClusterThresholds::from(&self.cfg.ranking),
		);

		Ok(PlanSelection { items: selected, clusters })
	}

	/// Preference vector of the user, `None` until they rated or favorited an embedded item.
	pub(crate) async fn preference_profile(&self, user_id: Uuid) -> Result<Option<Vec<f64>>> {
		let signals = feedback::list_feedback_signals(&self.db, user_id).await?;

		Ok(profile::build_profile(&signals))
	}
}

fn default_true() -> bool {
	true
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn request_defaults_exclude_read_and_diversify() {
		let req: ReadingPlanRequest = serde_json::from_str("{}").expect("Failed to parse request.");

		assert!(req.diversify_topics);
		assert!(req.exclude_read);
		assert!(req.window.is_none());
		assert!(req.size.is_none());
	}
}
