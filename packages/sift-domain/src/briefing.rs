use serde::Serialize;

use crate::{ranking::Ranked, text};

pub const CLUSTER_SUMMARY_MEMBERS: usize = 2;
pub const CLUSTER_SUMMARY_CHARS: usize = 120;

pub fn greeting(local_hour: u8) -> &'static str {
	match local_hour {
		0..=10 => "Good morning",
		11..=17 => "Good afternoon",
		_ => "Good evening",
	}
}

/// Reading-streak counters for the briefing.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StreakStats {
	pub streak_days: i32,
	pub today_read_count: i32,
	pub streak_target: i32,
	pub streak_remaining: i32,
	pub streak_at_risk: bool,
}

pub fn streak_stats(
	yesterday_streak_days: i32,
	today_read_count: i32,
	streak_target: i32,
	local_hour: u8,
	at_risk_hour: u8,
) -> StreakStats {
	let streak_remaining = (streak_target - today_read_count).max(0);

	StreakStats {
		streak_days: yesterday_streak_days,
		today_read_count,
		streak_target,
		streak_remaining,
		streak_at_risk: yesterday_streak_days > 0 && streak_remaining > 0 && local_hour >= at_risk_hour,
	}
}

/// `title: summary` for the first members with a summary, joined by ` / `.
pub fn cluster_summary(members: &[Ranked]) -> String {
	members
		.iter()
		.take(CLUSTER_SUMMARY_MEMBERS)
		.filter_map(|member| {
			let summary = member.item.summary.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
			let summary = text::truncate_chars(summary, CLUSTER_SUMMARY_CHARS);
			let title = member.item.display_title().trim();

			Some(if title.is_empty() { summary } else { format!("{title}: {summary}") })
		})
		.collect::<Vec<_>>()
		.join(" / ")
}

/// Top plan items by summary score when no recent highlight qualifies.
pub fn fallback_highlights(plan: &[Ranked], count: usize) -> Vec<Ranked> {
	let mut items = plan.to_vec();

	items.sort_by(|a, b| {
		b.member_score().total_cmp(&a.member_score()).then_with(|| b.item.created_at.cmp(&a.item.created_at))
	});
	items.truncate(count);

	items
}
