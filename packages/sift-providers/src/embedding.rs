use serde_json::Value;

use sift_config::EmbeddingProviderConfig;
use sift_domain::ledger::LlmUsage;

use crate::{Error, Result};

#[derive(Clone, Debug)]
pub struct Embedding {
	pub model: String,
	pub vector: Vec<f64>,
	pub usage: LlmUsage,
}
impl Embedding {
	pub fn dimensions(&self) -> i32 {
		self.vector.len() as i32
	}
}

pub async fn embed(cfg: &EmbeddingProviderConfig, text: &str) -> Result<Embedding> {
	let client = crate::http_client(cfg.timeout_ms)?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"input": text,
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let res = crate::check_status(&format!("{} embeddings", cfg.provider_id), res).await?;
	let json: Value = res.json().await?;
	let (vector, prompt_tokens) = parse_embedding_response(&json)?;

	Ok(Embedding {
		model: cfg.model.clone(),
		vector: normalize(vector),
		usage: crate::pricing::embedding_usage(cfg, &cfg.model, prompt_tokens),
	})
}

/// First embedding of the response plus `usage.prompt_tokens`.
pub fn parse_embedding_response(json: &Value) -> Result<(Vec<f64>, i64)> {
	let embedding = json
		.get("data")
		.and_then(|v| v.as_array())
		.and_then(|data| data.first())
		.and_then(|item| item.get("embedding"))
		.and_then(|v| v.as_array())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Embedding response is missing data[0].embedding.".to_string(),
		})?;

	if embedding.is_empty() {
		return Err(Error::InvalidResponse {
			message: "Embedding response contains an empty vector.".to_string(),
		});
	}

	let mut vector = Vec::with_capacity(embedding.len());

	for value in embedding {
		let number = value.as_f64().ok_or_else(|| Error::InvalidResponse {
			message: "Embedding value must be numeric.".to_string(),
		})?;

		vector.push(number);
	}

	let prompt_tokens = json
		.get("usage")
		.and_then(|usage| usage.get("prompt_tokens"))
		.and_then(|v| v.as_i64())
		.unwrap_or(0);

	Ok((vector, prompt_tokens))
}

/// Scales to unit length; zero vectors are returned unchanged.
pub fn normalize(vector: Vec<f64>) -> Vec<f64> {
	let norm = vector.iter().map(|x| x * x).sum::<f64>().sqrt();

	if norm == 0.0 {
		return vector;
	}

	vector.into_iter().map(|x| x / norm).collect()
}
