use sift_config::EmbeddingProviderConfig;
use sift_domain::ledger::{LlmUsage, UNKNOWN_PRICING_SOURCE};

pub const STATIC_PRICING_SOURCE: &str = "static_embedding_table";
pub const CONFIG_PRICING_SOURCE: &str = "config";

const EMBEDDING_PRICES_PER_MILLION_USD: &[(&str, f64)] =
	&[("text-embedding-3-small", 0.02), ("text-embedding-3-large", 0.13)];

pub fn embedding_price_per_million(model: &str) -> Option<f64> {
	EMBEDDING_PRICES_PER_MILLION_USD.iter().find(|(name, _)| *name == model).map(|(_, price)| *price)
}

/// Usage row for one embedding call, priced by config override, then the built-in table.
pub fn embedding_usage(cfg: &EmbeddingProviderConfig, model: &str, input_tokens: i64) -> LlmUsage {
	let (price, source) = match cfg.price_per_million_tokens_usd {
		Some(price) => (Some(price), CONFIG_PRICING_SOURCE),
		None => match embedding_price_per_million(model) {
			Some(price) => (Some(price), STATIC_PRICING_SOURCE),
			None => (None, UNKNOWN_PRICING_SOURCE),
		},
	};

	LlmUsage {
		provider: cfg.provider_id.clone(),
		model: model.to_string(),
		pricing_model_family: Some(model.to_string()),
		pricing_source: Some(source.to_string()),
		input_tokens,
		estimated_cost_usd: price.map(|price| input_tokens as f64 / 1_000_000.0 * price).unwrap_or(0.0),
		..Default::default()
	}
}
