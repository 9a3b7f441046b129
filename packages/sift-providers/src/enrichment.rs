//! Client for the enrichment service: body extraction, facts, summaries and digest copy.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use sift_config::EnrichmentProviderConfig;
use sift_domain::{digest::ComposeItem, ledger::LlmUsage};

use crate::Result;

pub const EXTRACT_BODY_PATH: &str = "/extract-body";
pub const EXTRACT_FACTS_PATH: &str = "/extract-facts";
pub const SUMMARIZE_PATH: &str = "/summarize";
pub const COMPOSE_DIGEST_PATH: &str = "/compose-digest";
pub const COMPOSE_CLUSTER_DRAFT_PATH: &str = "/compose-digest-cluster-draft";

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ExtractedBody {
	#[serde(default)]
	pub title: Option<String>,
	pub content: String,
	#[serde(default)]
	pub published_at: Option<String>,
	#[serde(default)]
	pub image_url: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ExtractedFacts {
	#[serde(default)]
	pub facts: Vec<String>,
	#[serde(default, rename = "llm")]
	pub usage: Option<LlmUsage>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Summary {
	pub summary: String,
	#[serde(default)]
	pub topics: Vec<String>,
	pub score: f64,
	#[serde(default)]
	pub score_breakdown: Option<Value>,
	#[serde(default)]
	pub score_reason: Option<String>,
	#[serde(default)]
	pub score_policy_version: Option<String>,
	#[serde(default, rename = "llm")]
	pub usage: Option<LlmUsage>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DigestCopy {
	pub subject: String,
	pub body: String,
	#[serde(default, rename = "llm")]
	pub usage: Option<LlmUsage>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ClusterDraftCopy {
	pub draft_summary: String,
	#[serde(default, rename = "llm")]
	pub usage: Option<LlmUsage>,
}

#[derive(Serialize)]
struct ExtractBodyRequest<'a> {
	url: &'a str,
}

#[derive(Serialize)]
struct ExtractFactsRequest<'a> {
	title: Option<&'a str>,
	content: &'a str,
}

#[derive(Serialize)]
struct SummarizeRequest<'a> {
	title: Option<&'a str>,
	facts: &'a [String],
	source_text_chars: Option<usize>,
}

#[derive(Serialize)]
struct ComposeDigestRequest<'a> {
	digest_date: &'a str,
	items: &'a [ComposeItem],
}

#[derive(Serialize)]
struct ComposeClusterDraftRequest<'a> {
	cluster_label: &'a str,
	item_count: i32,
	topics: &'a [String],
	source_lines: &'a [String],
}

pub async fn extract_body(cfg: &EnrichmentProviderConfig, url: &str) -> Result<ExtractedBody> {
	post_json(cfg, EXTRACT_BODY_PATH, &ExtractBodyRequest { url }, cfg.timeout_ms).await
}

pub async fn extract_facts(
	cfg: &EnrichmentProviderConfig,
	title: Option<&str>,
	content: &str,
) -> Result<ExtractedFacts> {
	post_json(cfg, EXTRACT_FACTS_PATH, &ExtractFactsRequest { title, content }, cfg.timeout_ms).await
}

pub async fn summarize(
	cfg: &EnrichmentProviderConfig,
	title: Option<&str>,
	facts: &[String],
	source_text_chars: Option<usize>,
) -> Result<Summary> {
	let body = SummarizeRequest { title, facts, source_text_chars };

	post_json(cfg, SUMMARIZE_PATH, &body, cfg.timeout_ms).await
}

pub async fn compose_digest(
	cfg: &EnrichmentProviderConfig,
	digest_date: &str,
	items: &[ComposeItem],
) -> Result<DigestCopy> {
	let body = ComposeDigestRequest { digest_date, items };

	post_json(cfg, COMPOSE_DIGEST_PATH, &body, cfg.compose_timeout_ms).await
}

pub async fn compose_cluster_draft(
	cfg: &EnrichmentProviderConfig,
	cluster_label: &str,
	item_count: i32,
	topics: &[String],
	source_lines: &[String],
) -> Result<ClusterDraftCopy> {
	let body = ComposeClusterDraftRequest { cluster_label, item_count, topics, source_lines };

	post_json(cfg, COMPOSE_CLUSTER_DRAFT_PATH, &body, cfg.compose_timeout_ms).await
}

async fn post_json<B, T>(
	cfg: &EnrichmentProviderConfig,
	path: &str,
	body: &B,
	timeout_ms: u64,
) -> Result<T>
where
	B: Serialize + ?Sized,
	T: DeserializeOwned,
{
	let client = crate::http_client(timeout_ms)?;
	let url = format!("{}{}", cfg.api_base, path);
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(body)
		.send()
		.await?;
	let res = crate::check_status(&format!("{} {path}", cfg.provider_id), res).await?;
	let bytes = res.bytes().await?;

	Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn summary_accepts_minimal_payload() {
		let summary: Summary =
			serde_json::from_str(r#"{"summary":"s","score":0.4}"#).expect("Failed to parse summary.");

		assert!(summary.topics.is_empty());
		assert!(summary.usage.is_none());
	}

	#[test]
	fn usage_is_read_from_llm_field() {
		let facts: ExtractedFacts = serde_json::from_str(
			r#"{"facts":["a","b"],"llm":{"provider":"anthropic","model":"haiku","input_tokens":10,"output_tokens":2,"cache_creation_input_tokens":0,"cache_read_input_tokens":0,"estimated_cost_usd":0.001}}"#,
		)
		.expect("Failed to parse facts.");
		let usage = facts.usage.expect("Usage must be present.");

		assert_eq!(usage.provider, "anthropic");
		assert_eq!(usage.input_tokens, 10);
		assert_eq!(usage.pricing_source_or_unknown(), "unknown");
	}
}
