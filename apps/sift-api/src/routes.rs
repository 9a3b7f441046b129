use axum::{
	Json, Router,
	extract::{Path, Query, State},
	http::{HeaderMap, StatusCode},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use sift_service::{
	BriefingResponse, DigestRun, Error as ServiceError, FeedbackRequest, ItemCreated,
	PipelineOutcome, ReadResponse, ReadingPlanRequest, ReadingPlanResponse, RetryReport,
	SubmitItemRequest, SubmitItemResponse,
};

use crate::state::AppState;

/// Set by the authenticating proxy in front of the API.
pub const USER_ID_HEADER: &str = "x-sift-user-id";

#[derive(Debug, Default, Deserialize)]
pub struct RetryFailedRequest {
	#[serde(default)]
	pub source_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct QueuedResponse {
	/// `false` when an identical event was already queued.
	pub queued: bool,
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/items", post(submit_item))
		.route("/v1/items/retry_failed", post(retry_failed))
		.route("/v1/items/{id}/retry", post(retry_item))
		.route("/v1/items/{id}/feedback", post(set_feedback))
		.route("/v1/items/{id}/read", post(mark_read).delete(mark_unread))
		.route("/v1/reading_plan", get(reading_plan))
		.route("/v1/briefing", get(briefing))
		.route("/v1/events/item_created", post(item_created))
		.route("/v1/admin/digests/run", post(run_digests))
		.route("/v1/admin/budgets/evaluate", post(evaluate_budgets))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn submit_item(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(payload): Json<SubmitItemRequest>,
) -> Result<Json<SubmitItemResponse>, ApiError> {
	let user_id = user_id(&headers)?;
	let response = state.service.submit_item(user_id, payload).await?;

	Ok(Json(response))
}

async fn retry_item(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(item_id): Path<Uuid>,
) -> Result<Json<PipelineOutcome>, ApiError> {
	let user_id = user_id(&headers)?;
	let response = state.service.retry_item(user_id, item_id).await?;

	Ok(Json(response))
}

async fn retry_failed(
	State(state): State<AppState>,
	headers: HeaderMap,
	payload: Option<Json<RetryFailedRequest>>,
) -> Result<Json<RetryReport>, ApiError> {
	let user_id = user_id(&headers)?;
	let Json(payload) = payload.unwrap_or_default();
	let response = state.service.retry_failed(user_id, payload.source_id).await?;

	Ok(Json(response))
}

async fn set_feedback(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(item_id): Path<Uuid>,
	Json(payload): Json<FeedbackRequest>,
) -> Result<StatusCode, ApiError> {
	let user_id = user_id(&headers)?;

	state.service.set_feedback(user_id, item_id, payload).await?;

	Ok(StatusCode::NO_CONTENT)
}

async fn mark_read(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(item_id): Path<Uuid>,
) -> Result<Json<ReadResponse>, ApiError> {
	let user_id = user_id(&headers)?;
	let response = state.service.mark_read(user_id, item_id, OffsetDateTime::now_utc()).await?;

	Ok(Json(response))
}

async fn mark_unread(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(item_id): Path<Uuid>,
) -> Result<Json<ReadResponse>, ApiError> {
	let user_id = user_id(&headers)?;
	let response = state.service.mark_unread(user_id, item_id).await?;

	Ok(Json(response))
}

async fn reading_plan(
	State(state): State<AppState>,
	headers: HeaderMap,
	Query(query): Query<ReadingPlanRequest>,
) -> Result<Json<ReadingPlanResponse>, ApiError> {
	let user_id = user_id(&headers)?;
	let response =
		state.service.reading_plan(user_id, query, OffsetDateTime::now_utc()).await?;

	Ok(Json(response))
}

async fn briefing(
	State(state): State<AppState>,
	headers: HeaderMap,
) -> Result<Json<BriefingResponse>, ApiError> {
	let user_id = user_id(&headers)?;
	let response = state.service.briefing(user_id, OffsetDateTime::now_utc()).await?;

	Ok(Json(response))
}

async fn item_created(
	State(state): State<AppState>,
	Json(payload): Json<ItemCreated>,
) -> Result<(StatusCode, Json<QueuedResponse>), ApiError> {
	let queued =
		state.service.request_item_processing(payload, OffsetDateTime::now_utc()).await?;

	Ok((StatusCode::ACCEPTED, Json(QueuedResponse { queued })))
}

async fn run_digests(
	State(state): State<AppState>,
	payload: Option<Json<DigestRun>>,
) -> Result<(StatusCode, Json<QueuedResponse>), ApiError> {
	let Json(run) = payload.unwrap_or_default();
	let queued = state.service.request_digest_run(run, OffsetDateTime::now_utc()).await?;

	Ok((StatusCode::ACCEPTED, Json(QueuedResponse { queued })))
}

async fn evaluate_budgets(
	State(state): State<AppState>,
) -> Result<(StatusCode, Json<QueuedResponse>), ApiError> {
	let queued = state.service.request_budget_evaluation(OffsetDateTime::now_utc()).await?;

	Ok((StatusCode::ACCEPTED, Json(QueuedResponse { queued })))
}

fn user_id(headers: &HeaderMap) -> Result<Uuid, ApiError> {
	let Some(raw) = headers.get(USER_ID_HEADER) else {
		return Err(json_error(
			StatusCode::UNAUTHORIZED,
			"missing_user",
			format!("{USER_ID_HEADER} header is required."),
			Some(vec![USER_ID_HEADER.to_string()]),
		));
	};

	raw.to_str().ok().and_then(|value| Uuid::parse_str(value.trim()).ok()).ok_or_else(|| {
		json_error(
			StatusCode::BAD_REQUEST,
			"invalid_user",
			format!("{USER_ID_HEADER} must be a UUID."),
			Some(vec![USER_ID_HEADER.to_string()]),
		)
	})
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorBody {
	pub error_code: String,
	pub message: String,
	pub fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}

impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		match err {
			ServiceError::InvalidRequest { message } => {
				json_error(StatusCode::BAD_REQUEST, "invalid_request", message, None)
			},
			ServiceError::NotFound { message } => {
				json_error(StatusCode::NOT_FOUND, "not_found", message, None)
			},
			ServiceError::Conflict { message } => {
				json_error(StatusCode::CONFLICT, "conflict", message, None)
			},
			ServiceError::Provider { message } => {
				tracing::error!(error = %message, "Provider call failed.");

				json_error(StatusCode::BAD_GATEWAY, "provider_error", message, None)
			},
			ServiceError::Storage { message } => {
				tracing::error!(error = %message, "Storage call failed.");

				json_error(
					StatusCode::INTERNAL_SERVER_ERROR,
					"storage_error",
					"Internal storage error.",
					None,
				)
			},
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
	fields: Option<Vec<String>>,
) -> ApiError {
	ApiError::new(status, code, message, fields)
}
