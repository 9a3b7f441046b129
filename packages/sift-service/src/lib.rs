pub mod briefing;
pub mod budget;
pub mod digest;
pub mod dispatch;
pub mod events;
pub mod feedback;
pub mod ingest;
pub mod ledger;
pub mod pipeline;
pub mod reading_plan;

mod error;

pub use briefing::{BriefingCluster, BriefingResponse, BriefingStats};
pub use budget::BudgetReport;
pub use digest::DigestRunReport;
pub use dispatch::DispatchOutcome;
pub use error::{Error, Result};
pub use events::{BudgetEvaluate, DigestCreated, DigestRun, Event, ItemCreated};
pub use feedback::{FeedbackRequest, ReadResponse};
pub use ingest::{FeedPollReport, SubmitItemRequest, SubmitItemResponse};
pub use pipeline::{PipelineOutcome, RetryReport};
pub use reading_plan::{ReadingPlanRequest, ReadingPlanResponse};

use std::{future::Future, pin::Pin, sync::Arc};

use time::UtcOffset;

use sift_config::{Config, EmbeddingProviderConfig, EnrichmentProviderConfig, Mail};
use sift_domain::{calendar, digest::ComposeItem};
use sift_providers::{
	embedding::{self, Embedding},
	enrichment::{self, ClusterDraftCopy, DigestCopy, ExtractedBody, ExtractedFacts, Summary},
	feed::{self, FeedEntry},
	mail::{self, MailMessage},
};
use sift_storage::db::Db;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Calls to the language-model service.
pub trait EnrichmentProvider
where
	Self: Send + Sync,
{
	fn extract<'a>(
		&'a self,
		cfg: &'a EnrichmentProviderConfig,
		url: &'a str,
	) -> BoxFuture<'a, sift_providers::Result<ExtractedBody>>;

	fn extract_facts<'a>(
		&'a self,
		cfg: &'a EnrichmentProviderConfig,
		title: Option<&'a str>,
		content: &'a str,
	) -> BoxFuture<'a, sift_providers::Result<ExtractedFacts>>;

	fn summarize<'a>(
		&'a self,
		cfg: &'a EnrichmentProviderConfig,
		title: Option<&'a str>,
		facts: &'a [String],
		source_text_chars: Option<usize>,
	) -> BoxFuture<'a, sift_providers::Result<Summary>>;

	fn compose_digest<'a>(
		&'a self,
		cfg: &'a EnrichmentProviderConfig,
		digest_date: &'a str,
		items: &'a [ComposeItem],
	) -> BoxFuture<'a, sift_providers::Result<DigestCopy>>;

	fn compose_cluster_draft<'a>(
		&'a self,
		cfg: &'a EnrichmentProviderConfig,
		cluster_label: &'a str,
		item_count: i32,
		topics: &'a [String],
		source_lines: &'a [String],
	) -> BoxFuture<'a, sift_providers::Result<ClusterDraftCopy>>;
}

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		text: &'a str,
	) -> BoxFuture<'a, sift_providers::Result<Embedding>>;
}

/// Outbound email. Callers check [`Mail::is_enabled`] before sending.
pub trait MailTransport
where
	Self: Send + Sync,
{
	fn send<'a>(
		&'a self,
		cfg: &'a Mail,
		message: &'a MailMessage,
	) -> BoxFuture<'a, sift_providers::Result<()>>;
}

pub trait FeedFetcher
where
	Self: Send + Sync,
{
	fn fetch<'a>(
		&'a self,
		url: &'a str,
		timeout_ms: u64,
	) -> BoxFuture<'a, sift_providers::Result<Vec<FeedEntry>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub enrichment: Arc<dyn EnrichmentProvider>,
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub mail: Arc<dyn MailTransport>,
	pub feeds: Arc<dyn FeedFetcher>,
}
impl Providers {
	pub fn new(
		enrichment: Arc<dyn EnrichmentProvider>,
		embedding: Arc<dyn EmbeddingProvider>,
		mail: Arc<dyn MailTransport>,
		feeds: Arc<dyn FeedFetcher>,
	) -> Self {
		Self { enrichment, embedding, mail, feeds }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self {
			enrichment: provider.clone(),
			embedding: provider.clone(),
			mail: provider.clone(),
			feeds: provider,
		}
	}
}

pub struct SiftService {
	pub cfg: Config,
	pub db: Db,
	pub providers: Providers,
}
impl SiftService {
	pub fn new(cfg: Config, db: Db) -> Self {
		Self { cfg, db, providers: Providers::default() }
	}

	pub fn with_providers(cfg: Config, db: Db, providers: Providers) -> Self {
		Self { cfg, db, providers }
	}

	pub(crate) fn local_offset(&self) -> UtcOffset {
		calendar::local_offset(self.cfg.service.utc_offset_minutes)
	}
}

struct DefaultProviders;
impl EnrichmentProvider for DefaultProviders {
	fn extract<'a>(
		&'a self,
		cfg: &'a EnrichmentProviderConfig,
		url: &'a str,
	) -> BoxFuture<'a, sift_providers::Result<ExtractedBody>> {
		Box::pin(enrichment::extract_body(cfg, url))
	}

	fn extract_facts<'a>(
		&'a self,
		cfg: &'a EnrichmentProviderConfig,
		title: Option<&'a str>,
		content: &'a str,
	) -> BoxFuture<'a, sift_providers::Result<ExtractedFacts>> {
		Box::pin(enrichment::extract_facts(cfg, title, content))
	}

	fn summarize<'a>(
		&'a self,
		cfg: &'a EnrichmentProviderConfig,
		title: Option<&'a str>,
		facts: &'a [String],
		source_text_chars: Option<usize>,
	) -> BoxFuture<'a, sift_providers::Result<Summary>> {
		Box::pin(enrichment::summarize(cfg, title, facts, source_text_chars))
	}

	fn compose_digest<'a>(
		&'a self,
		cfg: &'a EnrichmentProviderConfig,
		digest_date: &'a str,
		items: &'a [ComposeItem],
	) -> BoxFuture<'a, sift_providers::Result<DigestCopy>> {
		Box::pin(enrichment::compose_digest(cfg, digest_date, items))
	}

	fn compose_cluster_draft<'a>(
		&'a self,
		cfg: &'a EnrichmentProviderConfig,
		cluster_label: &'a str,
		item_count: i32,
		topics: &'a [String],
		source_lines: &'a [String],
	) -> BoxFuture<'a, sift_providers::Result<ClusterDraftCopy>> {
		Box::pin(enrichment::compose_cluster_draft(
			cfg,
			cluster_label,
			item_count,
			topics,
			source_lines,
		))
	}
}

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		text: &'a str,
	) -> BoxFuture<'a, sift_providers::Result<Embedding>> {
		Box::pin(embedding::embed(cfg, text))
	}
}

impl MailTransport for DefaultProviders {
	fn send<'a>(
		&'a self,
		cfg: &'a Mail,
		message: &'a MailMessage,
	) -> BoxFuture<'a, sift_providers::Result<()>> {
		Box::pin(mail::send(cfg, message))
	}
}

impl FeedFetcher for DefaultProviders {
	fn fetch<'a>(
		&'a self,
		url: &'a str,
		timeout_ms: u64,
	) -> BoxFuture<'a, sift_providers::Result<Vec<FeedEntry>>> {
		Box::pin(feed::fetch_feed(url, timeout_ms))
	}
}
