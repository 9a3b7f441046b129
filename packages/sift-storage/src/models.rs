use serde_json::Value;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use sift_domain::{
	digest::{ClusterDraft, DigestEntry},
	profile::FeedbackSignal,
	ranking::Candidate,
	status::ItemStatus,
};

#[derive(Debug, sqlx::FromRow)]
pub struct UserRow {
	pub id: Uuid,
	pub email: String,
	pub name: Option<String>,
	pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct UserSettings {
	pub user_id: Uuid,
	pub monthly_budget_usd: Option<f64>,
	pub budget_alert_enabled: bool,
	pub budget_alert_threshold_pct: i32,
	pub digest_email_enabled: bool,
}
impl UserSettings {
	pub fn defaults(user_id: Uuid) -> Self {
		Self {
			user_id,
			monthly_budget_usd: None,
			budget_alert_enabled: false,
			budget_alert_threshold_pct: 20,
			digest_email_enabled: true,
		}
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct SourceRow {
	pub id: Uuid,
	pub user_id: Uuid,
	pub url: String,
	#[sqlx(rename = "type")]
	pub kind: String,
	pub title: Option<String>,
	pub enabled: bool,
	pub last_fetched_at: Option<OffsetDateTime>,
	pub last_error: Option<String>,
}

/// An item joined with the owner of its source.
#[derive(Debug, sqlx::FromRow)]
pub struct ItemRow {
	pub id: Uuid,
	pub source_id: Uuid,
	pub user_id: Uuid,
	pub url: String,
	pub title: Option<String>,
	pub thumbnail_url: Option<String>,
	pub content_text: Option<String>,
	pub status: String,
	pub processing_error: Option<String>,
	pub embedding_failures: i32,
	pub embedding_error: Option<String>,
	pub published_at: Option<OffsetDateTime>,
	pub fetched_at: Option<OffsetDateTime>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
impl ItemRow {
	/// Unknown values read as `failed` so the pipeline never acts on them.
	pub fn status(&self) -> ItemStatus {
		self.status.parse().unwrap_or(ItemStatus::Failed)
	}
}

/// Identity of an item, enough to emit an `item.created` event.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct ItemRef {
	pub id: Uuid,
	pub source_id: Uuid,
	pub url: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ItemSummaryRow {
	pub item_id: Uuid,
	pub summary: String,
	pub topics: Vec<String>,
	pub score: Option<f64>,
	pub score_breakdown: Option<Value>,
	pub score_reason: Option<String>,
	pub score_policy_version: Option<String>,
	pub summarized_at: OffsetDateTime,
}

/// Values written by the summarize step.
#[derive(Clone, Debug)]
pub struct SummaryRecord {
	pub summary: String,
	pub topics: Vec<String>,
	pub score: f64,
	pub score_breakdown: Option<Value>,
	pub score_reason: Option<String>,
	pub score_policy_version: Option<String>,
}

/// Values written by the extract step. Absent fields keep what the item already has.
#[derive(Clone, Debug, Default)]
pub struct ExtractRecord {
	pub title: Option<String>,
	pub thumbnail_url: Option<String>,
	pub content_text: String,
	pub published_at: Option<OffsetDateTime>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct CandidateRow {
	pub id: Uuid,
	pub source_id: Uuid,
	pub url: String,
	pub title: Option<String>,
	pub summary: Option<String>,
	pub topics: Option<Vec<String>>,
	pub score: Option<f64>,
	pub is_favorite: bool,
	pub is_read: bool,
	pub embedding: Option<Vec<f64>>,
	pub dimensions: Option<i32>,
	pub created_at: OffsetDateTime,
	pub published_at: Option<OffsetDateTime>,
	pub summarized_at: Option<OffsetDateTime>,
}
impl From<CandidateRow> for Candidate {
	fn from(row: CandidateRow) -> Self {
		// A vector that disagrees with its stored dimensionality is treated as missing.
		let embedding = match (row.embedding, row.dimensions) {
			(Some(vector), Some(dims)) if dims > 0 && vector.len() == dims as usize => Some(vector),
			_ => None,
		};

		Self {
			id: row.id,
			source_id: row.source_id,
			url: row.url,
			title: row.title,
			summary: row.summary,
			topics: row.topics.unwrap_or_default(),
			score: row.score,
			is_favorite: row.is_favorite,
			is_read: row.is_read,
			embedding,
			created_at: row.created_at,
			published_at: row.published_at,
			summarized_at: row.summarized_at,
		}
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct FeedbackSignalRow {
	pub rating: i16,
	pub is_favorite: bool,
	pub dimensions: i32,
	pub embedding: Vec<f64>,
}
impl From<FeedbackSignalRow> for FeedbackSignal {
	fn from(row: FeedbackSignalRow) -> Self {
		Self {
			rating: row.rating,
			is_favorite: row.is_favorite,
			dimensions: row.dimensions,
			embedding: row.embedding,
		}
	}
}

#[derive(Clone, Copy, Debug, Default, sqlx::FromRow)]
pub struct StreakRow {
	pub read_count: i32,
	pub streak_days: i32,
	pub is_completed: bool,
}

/// A digest joined with its recipient.
#[derive(Debug, sqlx::FromRow)]
pub struct DigestRow {
	pub id: Uuid,
	pub user_id: Uuid,
	pub digest_date: Date,
	pub email_subject: Option<String>,
	pub email_body: Option<String>,
	pub send_status: Option<String>,
	pub send_error: Option<String>,
	pub sent_at: Option<OffsetDateTime>,
	pub to_email: String,
	pub digest_email_enabled: bool,
}
impl DigestRow {
	/// Subject and body, when both were composed earlier.
	pub fn cached_copy(&self) -> Option<(&str, &str)> {
		let subject = self.email_subject.as_deref().filter(|s| !s.trim().is_empty())?;
		let body = self.email_body.as_deref().filter(|s| !s.trim().is_empty())?;

		Some((subject, body))
	}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CreatedDigest {
	pub id: Uuid,
	pub already_sent: bool,
}

#[derive(Debug, sqlx::FromRow)]
pub struct DigestEntryRow {
	pub item_id: Uuid,
	pub rank: i32,
	pub url: String,
	pub title: Option<String>,
	pub summary: Option<String>,
	pub topics: Option<Vec<String>>,
	pub score: Option<f64>,
	pub facts: Option<Value>,
}
impl From<DigestEntryRow> for DigestEntry {
	fn from(row: DigestEntryRow) -> Self {
		let facts = row
			.facts
			.and_then(|value| serde_json::from_value::<Vec<String>>(value).ok())
			.unwrap_or_default();

		Self {
			item_id: row.item_id,
			rank: row.rank,
			url: row.url,
			title: row.title,
			summary: row.summary.unwrap_or_default(),
			topics: row.topics.unwrap_or_default(),
			score: row.score,
			facts,
		}
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct ClusterDraftRow {
	pub cluster_key: String,
	pub cluster_label: String,
	pub rank: i32,
	pub item_count: i32,
	pub topics: Vec<String>,
	pub max_score: Option<f64>,
	pub draft_summary: String,
}
impl From<ClusterDraftRow> for ClusterDraft {
	fn from(row: ClusterDraftRow) -> Self {
		Self {
			cluster_key: row.cluster_key,
			cluster_label: row.cluster_label,
			rank: row.rank,
			item_count: row.item_count,
			topics: row.topics,
			max_score: row.max_score,
			draft_summary: row.draft_summary,
		}
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct BudgetUserRow {
	pub user_id: Uuid,
	pub email: String,
	pub monthly_budget_usd: f64,
	pub budget_alert_threshold_pct: i32,
}

#[derive(Debug, sqlx::FromRow)]
pub struct OutboxEvent {
	pub event_id: Uuid,
	pub kind: String,
	pub payload: Value,
	pub dedupe_key: Option<String>,
	pub status: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
