use std::{collections::HashSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{cluster::Cluster, diversify, text};

pub const MAX_SEND_ERROR_CHARS: usize = 2_000;
pub const MAX_DRAFTS: usize = 20;
pub const DRAFT_LINES_PER_CLUSTER: usize = 4;
pub const FACTS_PER_LINE: usize = 2;
pub const KEEP_LEADING_DRAFTS: usize = 10;
pub const KEEP_MIN_ITEMS: i32 = 3;
pub const FULL_DETAIL_COMPOSE_ITEMS: usize = 12;

const BROAD_LABEL: &str = "Broad topics";
const MERGED_LABEL: &str = "Other topics";

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
	Processing,
	ComposeFailed,
	SendEmailFailed,
	SkippedNoItems,
	SkippedResendDisabled,
	SkippedUserDisabled,
	Sent,
}
impl SendStatus {
	pub const ALL: [Self; 7] = [
		Self::Processing,
		Self::ComposeFailed,
		Self::SendEmailFailed,
		Self::SkippedNoItems,
		Self::SkippedResendDisabled,
		Self::SkippedUserDisabled,
		Self::Sent,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Processing => "processing",
			Self::ComposeFailed => "compose_failed",
			Self::SendEmailFailed => "send_email_failed",
			Self::SkippedNoItems => "skipped_no_items",
			Self::SkippedResendDisabled => "skipped_resend_disabled",
			Self::SkippedUserDisabled => "skipped_user_disabled",
			Self::Sent => "sent",
		}
	}
}
impl fmt::Display for SendStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for SendStatus {
	type Err = String;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.into_iter()
			.find(|status| status.as_str() == raw)
			.ok_or_else(|| format!("Unknown send status {raw:?}."))
	}
}

/// Operator-facing error text, cut to the stored column budget.
pub fn truncate_send_error(raw: &str) -> String {
	match raw.char_indices().nth(MAX_SEND_ERROR_CHARS) {
		Some((cut, _)) => raw[..cut].to_string(),
		None => raw.to_string(),
	}
}

/// One ranked digest item with the artifacts needed to write its copy.
#[derive(Clone, Debug, Serialize)]
pub struct DigestEntry {
	pub item_id: Uuid,
	pub rank: i32,
	pub url: String,
	pub title: Option<String>,
	pub summary: String,
	pub topics: Vec<String>,
	pub score: Option<f64>,
	pub facts: Vec<String>,
}
impl DigestEntry {
	pub fn display_title(&self) -> &str {
		self.title.as_deref().map(str::trim).filter(|title| !title.is_empty()).unwrap_or(&self.url)
	}
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ClusterDraft {
	pub cluster_key: String,
	pub cluster_label: String,
	pub rank: i32,
	pub item_count: i32,
	pub topics: Vec<String>,
	pub max_score: Option<f64>,
	pub draft_summary: String,
}

/// Input row for digest composition.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ComposeItem {
	pub rank: i32,
	pub title: Option<String>,
	pub url: String,
	pub summary: String,
	pub topics: Vec<String>,
	pub score: Option<f64>,
}

/// Turns similarity clusters into text drafts, then covers leftover items as singletons.
pub fn build_cluster_drafts(entries: &[DigestEntry], clusters: &[Cluster]) -> Vec<ClusterDraft> {
	let mut seen = HashSet::new();
	let mut drafts = Vec::with_capacity(entries.len());

	for cluster in clusters {
		let group: Vec<&DigestEntry> = cluster
			.items
			.iter()
			.filter_map(|member| entries.iter().find(|entry| entry.item_id == member.item.id))
			.filter(|entry| seen.insert(entry.item_id))
			.collect();

		if group.is_empty() {
			continue;
		}

		let label = if cluster.label.trim().is_empty() {
			diversify::topic_key(&group[0].topics).to_string()
		} else {
			cluster.label.clone()
		};
		let rank = drafts.len() as i32 + 1;

		drafts.push(draft_from_group(rank, cluster.id.to_string(), label, &group));
	}
	for entry in entries {
		if !seen.insert(entry.item_id) {
			continue;
		}

		let rank = drafts.len() as i32 + 1;
		let label = diversify::topic_key(&entry.topics).to_string();

		drafts.push(draft_from_group(rank, entry.item_id.to_string(), label, &[entry]));
	}

	drafts
}

fn draft_from_group(rank: i32, key: String, label: String, group: &[&DigestEntry]) -> ClusterDraft {
	let max_score = group.iter().filter_map(|entry| entry.score).reduce(f64::max);
	let mut lines: Vec<String> =
		group.iter().take(DRAFT_LINES_PER_CLUSTER).map(|entry| draft_line(entry)).collect();

	if group.len() > DRAFT_LINES_PER_CLUSTER {
		lines.push(format!(
			"- ...and {} more related items",
			group.len() - DRAFT_LINES_PER_CLUSTER
		));
	}

	ClusterDraft {
		cluster_key: key,
		cluster_label: label,
		rank,
		item_count: group.len() as i32,
		topics: group[0].topics.clone(),
		max_score,
		draft_summary: lines.join("\n"),
	}
}

fn draft_line(entry: &DigestEntry) -> String {
	let title = entry.display_title();
	let summary = entry.summary.trim();
	let facts = entry
		.facts
		.iter()
		.map(|fact| fact.trim())
		.filter(|fact| !fact.is_empty())
		.take(FACTS_PER_LINE)
		.collect::<Vec<_>>()
		.join(" / ");

	match (summary.is_empty(), facts.is_empty()) {
		(false, false) => format!("- {title}: {summary} | facts: {facts}"),
		(false, true) => format!("- {title}: {summary}"),
		(true, false) => format!("- {title}: {facts}"),
		(true, true) => format!("- {title}"),
	}
}

/// Non-blank trimmed lines of a draft.
pub fn draft_source_lines(draft_summary: &str) -> Vec<String> {
	draft_summary.lines().map(str::trim).filter(|line| !line.is_empty()).map(str::to_string).collect()
}

/// Bounds the number of drafts while keeping every item represented.
///
/// Leading drafts and larger clusters survive as is. The tail collapses into one or two broad
/// drafts when the head alone fills the budget, else into evenly sized merged chunks.
pub fn compress_cluster_drafts(drafts: Vec<ClusterDraft>, target: usize) -> Vec<ClusterDraft> {
	let target = if target == 0 { MAX_DRAFTS } else { target };

	if drafts.len() <= target {
		return drafts;
	}

	let mut keep = Vec::with_capacity(target);
	let mut tail = Vec::new();

	for (idx, draft) in drafts.into_iter().enumerate() {
		if idx < KEEP_LEADING_DRAFTS || draft.item_count >= KEEP_MIN_ITEMS {
			keep.push(draft);
		} else {
			tail.push(draft);
		}
	}

	if keep.len() >= target {
		let mut broad_count = match tail.len() {
			0..=3 => 0,
			4..=9 => 1,
			_ => 2,
		};
		let cut = if target > broad_count {
			target - broad_count
		} else {
			broad_count = 0;

			target
		};

		keep.truncate(cut);

		match broad_count {
			1 => keep.push(merge_drafts(&tail, "broad-1".to_string(), BROAD_LABEL.to_string())),
			2 => {
				let mid = (tail.len() / 2).max(1);

				keep.push(merge_drafts(&tail[..mid], "broad-1".to_string(), format!("{BROAD_LABEL} A")));
				keep.push(merge_drafts(&tail[mid..], "broad-2".to_string(), format!("{BROAD_LABEL} B")));
			},
			_ => {},
		}

		return rerank(keep);
	}

	let remaining = target - keep.len();

	if tail.is_empty() {
		return rerank(keep);
	}

	let chunk_size = tail.len().div_ceil(remaining).max(2);

	for chunk in tail.chunks(chunk_size) {
		if keep.len() >= target {
			break;
		}
		if let [single] = chunk {
			keep.push(single.clone());

			continue;
		}

		let key = format!("merged-tail-{}", keep.len() + 1);

		keep.push(merge_drafts(chunk, key, MERGED_LABEL.to_string()));
	}

	rerank(keep)
}

fn merge_drafts(chunk: &[ClusterDraft], key: String, label: String) -> ClusterDraft {
	let mut topics: Vec<String> = chunk
		.iter()
		.flat_map(|draft| draft.topics.iter())
		.map(|topic| topic.trim())
		.filter(|topic| !topic.is_empty())
		.map(str::to_string)
		.collect::<HashSet<_>>()
		.into_iter()
		.collect();

	topics.sort();

	let lines: Vec<String> = chunk
		.iter()
		.filter_map(|draft| {
			let body = draft.draft_summary.trim();

			body.lines().next().filter(|_| !body.is_empty()).map(|first| format!("- [{}] {first}", draft.cluster_label))
		})
		.collect();

	ClusterDraft {
		cluster_key: key,
		cluster_label: label,
		rank: 0,
		item_count: chunk.iter().map(|draft| draft.item_count).sum(),
		topics,
		max_score: chunk.iter().filter_map(|draft| draft.max_score).reduce(f64::max),
		draft_summary: lines.join("\n"),
	}
}

fn rerank(mut drafts: Vec<ClusterDraft>) -> Vec<ClusterDraft> {
	for (idx, draft) in drafts.iter_mut().enumerate() {
		draft.rank = idx as i32 + 1;
	}

	drafts
}

/// Compose input built from drafts; lower-ranked drafts keep only their lead line.
pub fn compose_items_from_drafts(drafts: &[ClusterDraft]) -> Vec<ComposeItem> {
	drafts
		.iter()
		.enumerate()
		.map(|(idx, draft)| {
			let title = if draft.item_count > 1 {
				format!("{} ({} items)", draft.cluster_label, draft.item_count)
			} else {
				draft.cluster_label.clone()
			};
			let summary = if idx >= FULL_DETAIL_COMPOSE_ITEMS {
				reduce_to_lead_line(&draft.draft_summary)
			} else {
				draft.draft_summary.clone()
			};

			ComposeItem {
				rank: idx as i32 + 1,
				title: Some(title),
				url: String::new(),
				summary,
				topics: draft.topics.clone(),
				score: draft.max_score,
			}
		})
		.collect()
}

fn reduce_to_lead_line(draft_summary: &str) -> String {
	let lines: Vec<&str> = draft_summary.trim().split('\n').collect();
	let mut out = match lines.first().map(|line| line.trim()) {
		Some(first) if !first.is_empty() => first.to_string(),
		_ => draft_summary.to_string(),
	};

	if lines.len() > 1 {
		out.push_str(&format!("\n- ...{} more lines omitted in compose input", lines.len() - 1));
	}

	out
}

/// Default subject used when the composed copy has none.
pub fn default_subject(digest_date: &str) -> String {
	format!("Sift Digest - {digest_date}")
}

/// Email HTML: composed paragraphs first, then each ranked item.
pub fn render_digest_html(digest_date: &str, body: &str, entries: &[DigestEntry]) -> String {
	let mut html = String::from(
		"<!DOCTYPE html><html><body style=\"font-family:sans-serif;max-width:640px;margin:0 auto;padding:20px\">",
	);

	html.push_str(&format!(
		"<h1 style=\"font-size:24px;border-bottom:2px solid #eee;padding-bottom:8px\">Sift Digest - {}</h1>",
		text::escape_html(digest_date)
	));

	for paragraph in body.trim().split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
		let lines: Vec<&str> = paragraph.lines().map(str::trim).filter(|line| !line.is_empty()).collect();

		if lines.len() > 1 {
			html.push_str("<div style=\"margin:12px 0 18px;color:#333;line-height:1.6\">");

			for line in lines {
				html.push_str(&format!("<p style=\"margin:0 0 6px\">{}</p>", text::escape_html(line)));
			}

			html.push_str("</div>");
		} else {
			html.push_str(&format!(
				"<p style=\"margin:12px 0 18px;color:#333;line-height:1.7\">{}</p>",
				text::escape_html(paragraph)
			));
		}
	}
	for entry in entries {
		let topics = text::escape_html(&entry.topics.join(" · "));

		html.push_str(&format!(
			"\n<div style=\"margin-bottom:24px;padding:16px;border:1px solid #eee;border-radius:8px\">\
			 <p style=\"margin:0 0 4px;font-size:12px;color:#888\">#{} &nbsp;·&nbsp; {topics}</p>\
			 <h2 style=\"margin:0 0 8px;font-size:18px\"><a href=\"{}\" style=\"color:#1a1a1a;text-decoration:none\">{}</a></h2>\
			 <p style=\"margin:0 0 8px;color:#444;line-height:1.6\">{}</p>\
			 </div>",
			entry.rank,
			text::escape_html(&entry.url),
			text::escape_html(entry.title.as_deref().unwrap_or("(untitled)")),
			text::escape_html(&entry.summary),
		));
	}

	html.push_str("</body></html>");

	html
}
