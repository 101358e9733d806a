use axum::{
	Json, Router,
	extract::{Request, State},
	http::{HeaderMap, StatusCode, header::AUTHORIZATION},
	middleware::{self, Next},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::Serialize;

use grove_service::{AnswerRequest, AnswerResponse, Error, RetrieveReport, RetrieveRequest};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
	let api = Router::new()
		.route("/v1/retrieve", post(retrieve))
		.route("/v1/answer", post(answer))
		.route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

	Router::new().route("/health", get(health)).merge(api).with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new()
		.route("/v1/admin/cache/flush", post(flush_cache))
		.route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn retrieve(
	State(state): State<AppState>,
	Json(payload): Json<RetrieveRequest>,
) -> Result<Json<RetrieveReport>, ApiError> {
	let report = state.service.retrieve_with_report(payload).await?;

	Ok(Json(report))
}

async fn answer(
	State(state): State<AppState>,
	Json(payload): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
	let response = state.service.answer(payload).await?;

	Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct FlushResponse {
	removed: u64,
}

async fn flush_cache(State(state): State<AppState>) -> Result<Json<FlushResponse>, ApiError> {
	let removed = state.service.flush_cache().await?;

	Ok(Json(FlushResponse { removed }))
}

async fn require_auth(
	State(state): State<AppState>,
	req: Request,
	next: Next,
) -> Result<Response, ApiError> {
	if let Some(expected) = state.auth_token()
		&& read_bearer_token(req.headers()) != Some(expected)
	{
		return Err(json_error(
			StatusCode::UNAUTHORIZED,
			"UNAUTHORIZED",
			"A valid bearer token is required.",
			None,
		));
	}

	Ok(next.run(req).await)
}

fn read_bearer_token(headers: &HeaderMap) -> Option<&str> {
	let raw = headers.get(AUTHORIZATION)?;
	let value = raw.to_str().ok()?.trim();
	let token = value.strip_prefix("Bearer ")?.trim();

	if token.is_empty() { None } else { Some(token) }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
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

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
	fields: Option<Vec<String>>,
) -> ApiError {
	ApiError::new(status, code, message, fields)
}

impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		match err {
			Error::InvalidRequest { message } =>
				json_error(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message, None),
			Error::RetrievalUnavailable { message } => {
				tracing::error!(error = %message, "Retrieval unavailable.");

				json_error(StatusCode::SERVICE_UNAVAILABLE, "RETRIEVAL_UNAVAILABLE", message, None)
			},
			Error::Degraded { stage, message } => json_error(
				StatusCode::BAD_GATEWAY,
				"STAGE_DEGRADED",
				message,
				Some(vec![stage.as_str().to_string()]),
			),
			Error::Provider { message } => {
				tracing::error!(error = %message, "Provider request failed.");

				json_error(StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", message, None)
			},
			Error::Storage { message } | Error::Qdrant { message } => {
				tracing::error!(error = %message, "Storage request failed.");

				json_error(
					StatusCode::INTERNAL_SERVER_ERROR,
					"INTERNAL_ERROR",
					"Internal error.",
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
