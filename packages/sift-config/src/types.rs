use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub mail: Mail,
	#[serde(default)]
	pub worker: Worker,
	#[serde(default)]
	pub ranking: Ranking,
	#[serde(default)]
	pub briefing: Briefing,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
	/// Offset of the local calendar used for digest dates, budget months and reading streaks.
	#[serde(default = "default_utc_offset_minutes")]
	pub utc_offset_minutes: i32,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub enrichment: EnrichmentProviderConfig,
	pub embedding: EmbeddingProviderConfig,
}

/// The language-model service that extracts bodies and facts, summarizes, and composes digests.
#[derive(Debug, Deserialize)]
pub struct EnrichmentProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub timeout_ms: u64,
	/// Digest composition is slower than per-item calls and gets its own bound.
	#[serde(default = "default_compose_timeout_ms")]
	pub compose_timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
	/// Overrides the built-in price table when set.
	pub price_per_million_tokens_usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct Mail {
	#[serde(default = "default_mail_api_base")]
	pub api_base: String,
	pub api_key: Option<String>,
	pub from_email: Option<String>,
	#[serde(default = "default_from_name")]
	pub from_name: String,
	#[serde(default = "default_mail_timeout_ms")]
	pub timeout_ms: u64,
}
impl Mail {
	/// The transport is usable only with both credentials present.
	pub fn is_enabled(&self) -> bool {
		self.api_key.is_some() && self.from_email.is_some()
	}
}
impl Default for Mail {
	fn default() -> Self {
		Self {
			api_base: default_mail_api_base(),
			api_key: None,
			from_email: None,
			from_name: default_from_name(),
			timeout_ms: default_mail_timeout_ms(),
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct Worker {
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	#[serde(default = "default_claim_lease_seconds")]
	pub claim_lease_seconds: i64,
	#[serde(default = "default_max_attempts")]
	pub max_attempts: i32,
	#[serde(default = "default_feed_poll_interval_seconds")]
	pub feed_poll_interval_seconds: i64,
	#[serde(default = "default_digest_hour")]
	pub digest_hour: u8,
	#[serde(default = "default_budget_check_hour")]
	pub budget_check_hour: u8,
}
impl Default for Worker {
	fn default() -> Self {
		Self {
			poll_interval_ms: default_poll_interval_ms(),
			claim_lease_seconds: default_claim_lease_seconds(),
			max_attempts: default_max_attempts(),
			feed_poll_interval_seconds: default_feed_poll_interval_seconds(),
			digest_hour: default_digest_hour(),
			budget_check_hour: default_budget_check_hour(),
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct Ranking {
	#[serde(default = "default_favorite_boost")]
	pub favorite_boost: f64,
	#[serde(default = "default_embedding_bias_weight")]
	pub embedding_bias_weight: f64,
	#[serde(default = "default_cluster_similarity_threshold")]
	pub cluster_similarity_threshold: f64,
	#[serde(default = "default_cluster_topic_similarity_threshold")]
	pub cluster_topic_similarity_threshold: f64,
	#[serde(default = "default_candidate_limit")]
	pub candidate_limit: u32,
}
impl Default for Ranking {
	fn default() -> Self {
		Self {
			favorite_boost: default_favorite_boost(),
			embedding_bias_weight: default_embedding_bias_weight(),
			cluster_similarity_threshold: default_cluster_similarity_threshold(),
			cluster_topic_similarity_threshold: default_cluster_topic_similarity_threshold(),
			candidate_limit: default_candidate_limit(),
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct Briefing {
	#[serde(default = "default_plan_size")]
	pub plan_size: u32,
	#[serde(default = "default_highlight_min_score")]
	pub highlight_min_score: f64,
	#[serde(default = "default_highlight_count")]
	pub highlight_count: u32,
	#[serde(default = "default_streak_target")]
	pub streak_target: i32,
	#[serde(default = "default_streak_at_risk_hour")]
	pub streak_at_risk_hour: u8,
}
impl Default for Briefing {
	fn default() -> Self {
		Self {
			plan_size: default_plan_size(),
			highlight_min_score: default_highlight_min_score(),
			highlight_count: default_highlight_count(),
			streak_target: default_streak_target(),
			streak_at_risk_hour: default_streak_at_risk_hour(),
		}
	}
}

fn default_utc_offset_minutes() -> i32 {
	9 * 60
}

fn default_compose_timeout_ms() -> u64 {
	180_000
}

fn default_mail_api_base() -> String {
	"https://api.resend.com".to_string()
}

fn default_from_name() -> String {
	"Sift".to_string()
}

fn default_mail_timeout_ms() -> u64 {
	15_000
}

fn default_poll_interval_ms() -> u64 {
	500
}

fn default_claim_lease_seconds() -> i64 {
	300
}

fn default_max_attempts() -> i32 {
	5
}

fn default_feed_poll_interval_seconds() -> i64 {
	600
}

fn default_digest_hour() -> u8 {
	6
}

fn default_budget_check_hour() -> u8 {
	9
}

fn default_favorite_boost() -> f64 {
	0.12
}

fn default_embedding_bias_weight() -> f64 {
	0.12
}

fn default_cluster_similarity_threshold() -> f64 {
	0.68
}

fn default_cluster_topic_similarity_threshold() -> f64 {
	0.50
}

fn default_candidate_limit() -> u32 {
	2_000
}

fn default_plan_size() -> u32 {
	18
}

fn default_highlight_min_score() -> f64 {
	0.85
}

fn default_highlight_count() -> u32 {
	3
}

fn default_streak_target() -> i32 {
	3
}

fn default_streak_at_risk_hour() -> u8 {
	18
}
