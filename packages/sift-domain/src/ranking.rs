use std::cmp::Ordering;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use sift_config::Ranking;

use crate::profile;

/// A summarized item as seen by ranking, clustering and selection.
#[derive(Clone, Debug, Serialize)]
pub struct Candidate {
	pub id: Uuid,
	pub source_id: Uuid,
	pub url: String,
	pub title: Option<String>,
	pub summary: Option<String>,
	pub topics: Vec<String>,
	pub score: Option<f64>,
	pub is_favorite: bool,
	pub is_read: bool,
	#[serde(skip)]
	pub embedding: Option<Vec<f64>>,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339::option")]
	pub published_at: Option<OffsetDateTime>,
	#[serde(with = "time::serde::rfc3339::option")]
	pub summarized_at: Option<OffsetDateTime>,
}
impl Candidate {
	pub fn display_title(&self) -> &str {
		self.title.as_deref().map(str::trim).filter(|title| !title.is_empty()).unwrap_or(&self.url)
	}
}

#[derive(Clone, Debug, Serialize)]
pub struct Ranked {
	#[serde(flatten)]
	pub item: Candidate,
	pub adjusted_score: f64,
}
impl Ranked {
	/// Ordering key inside clusters: items without a summary score sink below every scored item.
	pub fn member_score(&self) -> f64 {
		if self.item.score.is_some() { self.adjusted_score } else { -1.0 }
	}
}

/// Timestamp used to break score ties.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Recency {
	Created,
	/// Publication time, then summarization time, then creation time.
	Published,
}
impl Recency {
	pub fn of(self, item: &Candidate) -> OffsetDateTime {
		match self {
			Self::Created => item.created_at,
			Self::Published => item.published_at.or(item.summarized_at).unwrap_or(item.created_at),
		}
	}
}

#[derive(Clone, Copy, Debug)]
pub struct ScoreWeights {
	pub favorite_boost: f64,
	pub embedding_bias_weight: f64,
}
impl From<&Ranking> for ScoreWeights {
	fn from(cfg: &Ranking) -> Self {
		Self {
			favorite_boost: cfg.favorite_boost,
			embedding_bias_weight: cfg.embedding_bias_weight,
		}
	}
}
impl Default for ScoreWeights {
	fn default() -> Self {
		Self::from(&Ranking::default())
	}
}

pub fn adjusted_score(item: &Candidate, profile: Option<&[f64]>, weights: ScoreWeights) -> f64 {
	let mut score = item.score.unwrap_or(0.0);

	if item.is_favorite {
		score += weights.favorite_boost;
	}
	if let (Some(profile), Some(embedding)) = (profile, item.embedding.as_deref()) {
		score += weights.embedding_bias_weight * profile::dot(profile, embedding);
	}

	score
}

/// Scores every candidate and orders them best first.
pub fn rank(
	items: Vec<Candidate>,
	profile: Option<&[f64]>,
	weights: ScoreWeights,
	recency: Recency,
) -> Vec<Ranked> {
	let mut ranked: Vec<Ranked> = items
		.into_iter()
		.map(|item| {
			let adjusted_score = adjusted_score(&item, profile, weights);

			Ranked { item, adjusted_score }
		})
		.collect();

	ranked.sort_by(|a, b| compare_ranked(a, b, recency));

	ranked
}

pub fn compare_ranked(a: &Ranked, b: &Ranked, recency: Recency) -> Ordering {
	b.adjusted_score
		.total_cmp(&a.adjusted_score)
		.then_with(|| recency.of(&b.item).cmp(&recency.of(&a.item)))
}
