//! Digest email delivery.
//!
//! Send status moves from empty to `processing` and then to exactly one outcome. A send failure
//! is recorded on the digest and the event is still acknowledged, so a digest is only retried
//! by an explicit redelivery.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use sift_domain::{
	calendar,
	cluster::{self, ClusterThresholds},
	digest::{self, ClusterDraft, DigestEntry, SendStatus},
	ledger::{UsageIds, UsagePurpose},
	ranking::{self, Candidate, Recency, ScoreWeights},
};
use sift_providers::mail::MailMessage;
use sift_storage::{digests, models::DigestRow};

use crate::{Error, Result, SiftService, events::DigestCreated};

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
	AlreadySent,
	SkippedNoItems,
	SkippedTransportDisabled,
	SkippedUserDisabled,
	ComposeFailed,
	SendFailed,
	Sent,
}

impl SiftService {
	pub async fn send_digest(
		&self,
		event: &DigestCreated,
		now: OffsetDateTime,
	) -> Result<DispatchOutcome> {
		let digest = digests::get_digest(&self.db, event.digest_id).await?.ok_or_else(|| {
			Error::NotFound { message: format!("Digest {} does not exist.", event.digest_id) }
		})?;

		if digest.sent_at.is_some() {
			return Ok(DispatchOutcome::AlreadySent);
		}

		let entries = digests::list_digest_entries(&self.db, digest.id).await?;

		if entries.is_empty() {
			return self.finish(&digest, SendStatus::SkippedNoItems, None, now).await;
		}
		if !self.cfg.mail.is_enabled() {
			return self.finish(&digest, SendStatus::SkippedResendDisabled, None, now).await;
		}
		if !digest.digest_email_enabled {
			return self.finish(&digest, SendStatus::SkippedUserDisabled, None, now).await;
		}
		if !digests::set_send_status(&self.db, digest.id, SendStatus::Processing, None, now).await? {
			return Ok(DispatchOutcome::AlreadySent);
		}

		let digest_date = calendar::format_date(digest.digest_date);
		let (subject, body) = match digest.cached_copy() {
			Some((subject, body)) => (subject.to_string(), body.to_string()),
			None => match self.compose_copy(&digest, &digest_date, &entries, now).await {
				Ok(copy) => copy,
				Err(err) => {
					tracing::error!(error = %err, digest_id = %digest.id, "Digest compose failed.");

					return self
						.finish(&digest, SendStatus::ComposeFailed, Some(&err.to_string()), now)
						.await;
				},
			},
		};
		let to = match event.to.trim() {
			"" => digest.to_email.clone(),
			to => to.to_string(),
		};
		let message = MailMessage {
			to,
			subject,
			html: digest::render_digest_html(&digest_date, &body, &entries),
		};

		if let Err(err) = self.providers.mail.send(&self.cfg.mail, &message).await {
			tracing::error!(error = %err, digest_id = %digest.id, "Digest email send failed.");

			return self
				.finish(&digest, SendStatus::SendEmailFailed, Some(&err.to_string()), now)
				.await;
		}
		if !digests::mark_sent(&self.db, digest.id, now).await? {
			tracing::warn!(digest_id = %digest.id, "Digest was marked sent by another delivery.");
		}

		Ok(DispatchOutcome::Sent)
	}

	async fn finish(
		&self,
		digest: &DigestRow,
		status: SendStatus,
		error_text: Option<&str>,
		now: OffsetDateTime,
	) -> Result<DispatchOutcome> {
		let error_text = error_text.map(digest::truncate_send_error);

		if !digests::set_send_status(&self.db, digest.id, status, error_text.as_deref(), now).await? {
			return Ok(DispatchOutcome::AlreadySent);
		}

		Ok(match status {
			SendStatus::SkippedNoItems => DispatchOutcome::SkippedNoItems,
			SendStatus::SkippedResendDisabled => DispatchOutcome::SkippedTransportDisabled,
			SendStatus::SkippedUserDisabled => DispatchOutcome::SkippedUserDisabled,
			SendStatus::ComposeFailed => DispatchOutcome::ComposeFailed,
			SendStatus::SendEmailFailed => DispatchOutcome::SendFailed,
			SendStatus::Processing | SendStatus::Sent => DispatchOutcome::Sent,
		})
	}

	/// Builds cluster drafts, asks the enrichment service for the copy and caches it.
	async fn compose_copy(
		&self,
		digest: &DigestRow,
		digest_date: &str,
		entries: &[DigestEntry],
		now: OffsetDateTime,
	) -> Result<(String, String)> {
		let ids = UsageIds { user_id: Some(digest.user_id), digest_id: Some(digest.id), ..Default::default() };
		let drafts = self.build_drafts(digest, entries, ids, now).await?;
		let compose_items = digest::compose_items_from_drafts(&drafts);
		let cfg = &self.cfg.providers.enrichment;
		let copy = self.providers.enrichment.compose_digest(cfg, digest_date, &compose_items).await?;

		self.record_usage(UsagePurpose::Digest, copy.usage.as_ref(), ids, now).await;

		let subject = match copy.subject.trim() {
			"" => digest::default_subject(digest_date),
			subject => subject.to_string(),
		};

		digests::save_email_copy(&self.db, digest.id, &subject, &copy.body, now).await?;

		Ok((subject, copy.body))
	}

	async fn build_drafts(
		&self,
		digest: &DigestRow,
		entries: &[DigestEntry],
		ids: UsageIds,
		now: OffsetDateTime,
	) -> Result<Vec<ClusterDraft>> {
		let rows = digests::list_digest_candidates(&self.db, digest.id).await?;
		let ranked = ranking::rank(
			rows.into_iter().map(Candidate::from).collect(),
			None,
			ScoreWeights::from(&self.cfg.ranking),
			Recency::Published,
		);
		let clusters =
			cluster::build_clusters(&ranked, None, ClusterThresholds::from(&self.cfg.ranking));
		let mut drafts = digest::compress_cluster_drafts(
			digest::build_cluster_drafts(entries, &clusters),
			digest::MAX_DRAFTS,
		);
		let cfg = &self.cfg.providers.enrichment;

		for draft in &mut drafts {
			let source_lines = digest::draft_source_lines(&draft.draft_summary);

			if source_lines.is_empty() {
				continue;
			}

			let refined = self
				.providers
				.enrichment
				.compose_cluster_draft(
					cfg,
					&draft.cluster_label,
					draft.item_count,
					&draft.topics,
					&source_lines,
				)
				.await?;

			if !refined.draft_summary.trim().is_empty() {
				draft.draft_summary = refined.draft_summary;
			}

			self.record_usage(UsagePurpose::DigestClusterDraft, refined.usage.as_ref(), ids, now).await;
		}

		digests::replace_cluster_drafts(&self.db, digest.id, &drafts, now).await?;

		Ok(digests::list_cluster_drafts(&self.db, digest.id).await?)
	}
}
