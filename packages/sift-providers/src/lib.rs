pub mod embedding;
pub mod enrichment;
pub mod feed;
pub mod mail;
pub mod pricing;

mod error;

pub use error::{Error, Result};

use std::time::Duration;

use reqwest::{
	Client, Response,
	header::{AUTHORIZATION, HeaderMap, HeaderName},
};
use serde_json::{Map, Value};

/// Largest error body kept for diagnostics.
pub const MAX_ERROR_BODY_BYTES: usize = 4_096;

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

fn http_client(timeout_ms: u64) -> Result<Client> {
	Ok(Client::builder().timeout(Duration::from_millis(timeout_ms)).build()?)
}

/// Passes successful responses through and turns status >= 400 into [`Error::Status`].
async fn check_status(target: &str, res: Response) -> Result<Response> {
	let status = res.status();

	if !status.is_client_error() && !status.is_server_error() {
		return Ok(res);
	}

	let bytes = res.bytes().await.unwrap_or_default();
	let body = String::from_utf8_lossy(&bytes[..bytes.len().min(MAX_ERROR_BODY_BYTES)]).into_owned();

	Err(Error::Status { target: target.to_string(), status: status.as_u16(), body })
}
