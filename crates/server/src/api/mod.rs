//! JSON API under `/api/v1`.
//!
//! The caller is identified by the `x-employee-code` header; every response
//! body is an [`ApiEnvelope`].

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, Level};
use uuid::Uuid;

use incentive_core::envelope::ApiEnvelope;
use incentive_core::errors::{ApplicationError, InterfaceError};
use incentive_core::principal::Principal;

use crate::services::PortalServices;

pub mod cases;
pub mod deviations;
pub mod incentives;
pub mod me;

pub const EMPLOYEE_CODE_HEADER: &str = "x-employee-code";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct AppState {
    pub services: Arc<PortalServices>,
}

impl AppState {
    pub fn new(services: PortalServices) -> Self {
        Self { services: Arc::new(services) }
    }
}

pub fn router(state: AppState) -> Router {
    let request_id_header = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .nest("/api/v1", api_routes())
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/me/capabilities", get(me::capabilities))
        .route("/deviations/summary", get(deviations::summary))
        .route("/deviations", get(deviations::list).post(deviations::raise))
        .route("/deviations/{id}/action", post(deviations::action))
        .route("/cases", get(cases::list))
        .route("/cases/options", get(cases::options))
        .route("/incentives/me", get(incentives::mine))
        .route("/incentives/branch", get(incentives::branch))
}

/// The authenticated caller plus the correlation id of this request.
pub struct Caller {
    pub principal: Principal,
    pub correlation_id: String,
}

pub fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub async fn caller(state: &AppState, headers: &HeaderMap) -> Result<Caller, ApiError> {
    let correlation_id = correlation_id(headers);
    let code = headers
        .get(EMPLOYEE_CODE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            ApiError(InterfaceError::Forbidden {
                message: "Please sign in to continue.".to_owned(),
                correlation_id: correlation_id.clone(),
            })
        })?;

    let principal = state
        .services
        .principal(code)
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;
    Ok(Caller { principal, correlation_id })
}

pub fn ok<T>(message: &str, data: T) -> Json<ApiEnvelope<T>> {
    Json(ApiEnvelope::ok(message, data))
}

#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl ApiError {
    pub fn from_application(error: ApplicationError, correlation_id: &str) -> Self {
        Self(error.into_interface(correlation_id))
    }

    pub fn bad_request(message: &str, correlation_id: &str) -> Self {
        Self(InterfaceError::BadRequest {
            message: message.to_owned(),
            correlation_id: correlation_id.to_owned(),
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(
                event_name = "api.request_failed",
                correlation_id = %self.0.correlation_id(),
                error = %self.0,
                "request failed"
            );
        }
        let envelope: ApiEnvelope<()> = ApiEnvelope::failure(self.0.user_message());
        (status, Json(envelope)).into_response()
    }
}
