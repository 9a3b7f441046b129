mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Briefing, Config, EmbeddingProviderConfig, EnrichmentProviderConfig, Mail, Postgres, Providers,
	Ranking, Service, Storage, Worker,
};

use std::{fs, path::Path};

const MAX_UTC_OFFSET_MINUTES: i32 = 18 * 60;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.service.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
		return Err(Error::Validation {
			message: "service.utc_offset_minutes must be within 18 hours of UTC.".to_string(),
		});
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}

	for (label, api_base, api_key, timeout_ms) in [
		(
			"enrichment",
			&cfg.providers.enrichment.api_base,
			&cfg.providers.enrichment.api_key,
			cfg.providers.enrichment.timeout_ms,
		),
		(
			"embedding",
			&cfg.providers.embedding.api_base,
			&cfg.providers.embedding.api_key,
			cfg.providers.embedding.timeout_ms,
		),
	] {
		if api_base.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_base must be non-empty."),
			});
		}
		if api_key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
		if timeout_ms == 0 {
			return Err(Error::Validation {
				message: format!("Provider {label} timeout_ms must be greater than zero."),
			});
		}
	}

	if cfg.providers.enrichment.compose_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "providers.enrichment.compose_timeout_ms must be greater than zero."
				.to_string(),
		});
	}
	if cfg.providers.embedding.model.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.embedding.model must be non-empty.".to_string(),
		});
	}

	if let Some(price) = cfg.providers.embedding.price_per_million_tokens_usd
		&& (!price.is_finite() || price < 0.0)
	{
		return Err(Error::Validation {
			message: "providers.embedding.price_per_million_tokens_usd must be a finite number zero or greater."
				.to_string(),
		});
	}

	if cfg.mail.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "mail.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.max_attempts <= 0 {
		return Err(Error::Validation {
			message: "worker.max_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.claim_lease_seconds <= 0 {
		return Err(Error::Validation {
			message: "worker.claim_lease_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.feed_poll_interval_seconds <= 0 {
		return Err(Error::Validation {
			message: "worker.feed_poll_interval_seconds must be greater than zero.".to_string(),
		});
	}

	for (label, hour) in [
		("worker.digest_hour", cfg.worker.digest_hour),
		("worker.budget_check_hour", cfg.worker.budget_check_hour),
		("briefing.streak_at_risk_hour", cfg.briefing.streak_at_risk_hour),
	] {
		if hour > 23 {
			return Err(Error::Validation {
				message: format!("{label} must be in the range 0-23."),
			});
		}
	}
	for (label, weight) in [
		("ranking.favorite_boost", cfg.ranking.favorite_boost),
		("ranking.embedding_bias_weight", cfg.ranking.embedding_bias_weight),
	] {
		if !weight.is_finite() {
			return Err(Error::Validation { message: format!("{label} must be a finite number.") });
		}
		if weight < 0.0 {
			return Err(Error::Validation { message: format!("{label} must be zero or greater.") });
		}
	}

	let strong = cfg.ranking.cluster_similarity_threshold;
	let topic = cfg.ranking.cluster_topic_similarity_threshold;

	if !(0.0..=1.0).contains(&strong) || !(0.0..=1.0).contains(&topic) {
		return Err(Error::Validation {
			message: "ranking cluster thresholds must be in the range 0.0-1.0.".to_string(),
		});
	}
	if topic > strong {
		return Err(Error::Validation {
			message: "ranking.cluster_topic_similarity_threshold must not exceed ranking.cluster_similarity_threshold."
				.to_string(),
		});
	}
	if cfg.ranking.candidate_limit == 0 {
		return Err(Error::Validation {
			message: "ranking.candidate_limit must be greater than zero.".to_string(),
		});
	}
	if !(1..=30).contains(&cfg.briefing.plan_size) {
		return Err(Error::Validation {
			message: "briefing.plan_size must be in the range 1-30.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&cfg.briefing.highlight_min_score) {
		return Err(Error::Validation {
			message: "briefing.highlight_min_score must be in the range 0.0-1.0.".to_string(),
		});
	}
	if cfg.briefing.streak_target <= 0 {
		return Err(Error::Validation {
			message: "briefing.streak_target must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.mail.api_key = cfg.mail.api_key.take().filter(|key| !key.trim().is_empty());
	cfg.mail.from_email = cfg
		.mail
		.from_email
		.take()
		.map(|email| email.trim().to_string())
		.filter(|email| !email.is_empty());

	let base = cfg.providers.enrichment.api_base.trim_end_matches('/').to_string();

	cfg.providers.enrichment.api_base = base;
}
