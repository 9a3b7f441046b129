use serde::Serialize;

use sift_config::Mail;

use crate::{Error, Result};

#[derive(Clone, Debug)]
pub struct MailMessage {
	pub to: String,
	pub subject: String,
	pub html: String,
}

#[derive(Serialize)]
struct SendEmailRequest<'a> {
	from: &'a str,
	to: [&'a str; 1],
	subject: &'a str,
	html: &'a str,
}

/// `Name <address>` unless the configured address already carries a display name.
pub fn formatted_from(cfg: &Mail) -> Option<String> {
	let address = cfg.from_email.as_deref().map(str::trim).filter(|addr| !addr.is_empty())?;

	if address.contains('<') && address.contains('>') {
		return Some(address.to_string());
	}

	let name = match cfg.from_name.trim() {
		"" => "Sift",
		name => name,
	};

	Some(format!("{name} <{address}>"))
}

/// Sends one email; any status >= 400 is an error.
pub async fn send(cfg: &Mail, message: &MailMessage) -> Result<()> {
	let (Some(api_key), Some(from)) = (cfg.api_key.as_deref(), formatted_from(cfg)) else {
		return Err(Error::InvalidConfig {
			message: "Mail transport requires api_key and from_email.".to_string(),
		});
	};
	let client = crate::http_client(cfg.timeout_ms)?;
	let url = format!("{}/emails", cfg.api_base.trim_end_matches('/'));
	let body = SendEmailRequest {
		from: &from,
		to: [message.to.as_str()],
		subject: &message.subject,
		html: &message.html,
	};
	let res = client.post(url).bearer_auth(api_key).json(&body).send().await?;

	crate::check_status("mail", res).await?;

	tracing::debug!(to = %message.to, "Email accepted by mail transport.");

	Ok(())
}
