pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error(transparent)]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error(transparent)]
	Feed(#[from] feed_rs::parser::ParseFeedError),
	#[error("{message}")]
	InvalidConfig { message: String },
	#[error("{message}")]
	InvalidResponse { message: String },
	#[error("{}", status_message(.target, .status, .body))]
	Status { target: String, status: u16, body: String },
}

fn status_message(target: &str, status: &u16, body: &str) -> String {
	if body.is_empty() {
		format!("{target}: status {status}")
	} else {
		format!("{target}: status {status} body={body}")
	}
}
