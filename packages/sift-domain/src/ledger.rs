use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const UNKNOWN_PRICING_SOURCE: &str = "unknown";

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsagePurpose {
	Facts,
	Summary,
	Embedding,
	Digest,
	DigestClusterDraft,
}
impl UsagePurpose {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Facts => "facts",
			Self::Summary => "summary",
			Self::Embedding => "embedding",
			Self::Digest => "digest",
			Self::DigestClusterDraft => "digest_cluster_draft",
		}
	}
}
impl fmt::Display for UsagePurpose {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Token and cost counters reported by a billed provider call.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct LlmUsage {
	#[serde(default)]
	pub provider: String,
	#[serde(default)]
	pub model: String,
	#[serde(default)]
	pub pricing_model_family: Option<String>,
	#[serde(default)]
	pub pricing_source: Option<String>,
	#[serde(default)]
	pub input_tokens: i64,
	#[serde(default)]
	pub output_tokens: i64,
	#[serde(default)]
	pub cache_creation_input_tokens: i64,
	#[serde(default)]
	pub cache_read_input_tokens: i64,
	#[serde(default)]
	pub estimated_cost_usd: f64,
}
impl LlmUsage {
	pub fn is_billable(&self) -> bool {
		!self.provider.is_empty() && !self.model.is_empty()
	}

	pub fn pricing_source_or_unknown(&self) -> &str {
		self.pricing_source.as_deref().filter(|source| !source.is_empty()).unwrap_or(UNKNOWN_PRICING_SOURCE)
	}
}

/// Owners of a billed unit of work. Missing ids contribute empty strings to the key.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct UsageIds {
	pub user_id: Option<Uuid>,
	pub source_id: Option<Uuid>,
	pub item_id: Option<Uuid>,
	pub digest_id: Option<Uuid>,
}

/// Lowercase hex SHA-256 over every field that identifies one billed unit of work.
pub fn idempotency_key(purpose: UsagePurpose, usage: &LlmUsage, ids: &UsageIds) -> String {
	let raw = format!(
		"purpose={}|provider={}|model={}|u={}|s={}|i={}|d={}|in={}|out={}|cw={}|cr={}",
		purpose.as_str(),
		usage.provider,
		usage.model,
		id_or_empty(ids.user_id),
		id_or_empty(ids.source_id),
		id_or_empty(ids.item_id),
		id_or_empty(ids.digest_id),
		usage.input_tokens,
		usage.output_tokens,
		usage.cache_creation_input_tokens,
		usage.cache_read_input_tokens,
	);

	hex::encode(Sha256::digest(raw.as_bytes()))
}

fn id_or_empty(id: Option<Uuid>) -> String {
	id.map(|id| id.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn usage() -> LlmUsage {
		LlmUsage {
			provider: "anthropic".to_string(),
			model: "claude-haiku".to_string(),
			input_tokens: 120,
			output_tokens: 40,
			..Default::default()
		}
	}

	#[test]
	fn key_is_stable_hex() {
		let ids = UsageIds { item_id: Some(Uuid::nil()), ..Default::default() };
		let first = idempotency_key(UsagePurpose::Facts, &usage(), &ids);
		let second = idempotency_key(UsagePurpose::Facts, &usage(), &ids);

		assert_eq!(first, second);
		assert_eq!(first.len(), 64);
		assert!(first.chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase()));
	}

	#[test]
	fn key_covers_purpose_and_tokens() {
		let ids = UsageIds::default();
		let base = idempotency_key(UsagePurpose::Facts, &usage(), &ids);
		let mut more_tokens = usage();

		more_tokens.cache_read_input_tokens = 1;

		assert_ne!(base, idempotency_key(UsagePurpose::Summary, &usage(), &ids));
		assert_ne!(base, idempotency_key(UsagePurpose::Facts, &more_tokens, &ids));
	}

	#[test]
	fn key_matches_known_digest() {
		let usage = LlmUsage { provider: "p".to_string(), model: "m".to_string(), ..Default::default() };
		let expected = hex::encode(Sha256::digest(
			b"purpose=digest|provider=p|model=m|u=|s=|i=|d=|in=0|out=0|cw=0|cr=0",
		));

		assert_eq!(idempotency_key(UsagePurpose::Digest, &usage, &UsageIds::default()), expected);
	}

	#[test]
	fn pricing_source_defaults_to_unknown() {
		let mut usage = usage();

		assert_eq!(usage.pricing_source_or_unknown(), "unknown");

		usage.pricing_source = Some(String::new());

		assert_eq!(usage.pricing_source_or_unknown(), "unknown");

		usage.pricing_source = Some("table".to_string());

		assert_eq!(usage.pricing_source_or_unknown(), "table");
	}

	#[test]
	fn usage_without_provider_is_not_billable() {
		let mut usage = usage();

		assert!(usage.is_billable());

		usage.model.clear();

		assert!(!usage.is_billable());
	}
}
