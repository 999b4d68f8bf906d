use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use incentive_core::deviations::{
    DecisionRequest, DeviationEvent, DeviationQuery, DeviationSummary, Page,
    RaiseDeviationRequest,
};
use incentive_core::domain::deviation::{Deviation, DeviationId};
use incentive_core::envelope::ApiEnvelope;

use super::{caller, ok, ApiError, AppState};

pub async fn summary(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiEnvelope<DeviationSummary>>, ApiError> {
    let caller = caller(&state, &headers).await?;
    let summary = state
        .services
        .deviation_summary(&caller.principal)
        .await
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))?;
    Ok(ok("Deviation summary loaded.", summary))
}

pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<DeviationQuery>, QueryRejection>,
) -> Result<Json<ApiEnvelope<Page<Deviation>>>, ApiError> {
    let caller = caller(&state, &headers).await?;
    let Query(query) = query.map_err(|_| {
        ApiError::bad_request("The deviation filters are not valid.", &caller.correlation_id)
    })?;

    let page = state
        .services
        .list_deviations(&caller.principal, &query)
        .await
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))?;
    Ok(ok("Deviations loaded.", page))
}

pub async fn raise(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<RaiseDeviationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiEnvelope<Deviation>>), ApiError> {
    let caller = caller(&state, &headers).await?;
    let Json(request) = payload.map_err(|_| {
        ApiError::bad_request("The deviation request is not valid.", &caller.correlation_id)
    })?;

    let deviation = state
        .services
        .raise_deviation(&caller.principal, request, &caller.correlation_id)
        .await
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))?;
    Ok((StatusCode::CREATED, ok("Deviation raised successfully.", deviation)))
}

pub async fn action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<DecisionRequest>, JsonRejection>,
) -> Result<Json<ApiEnvelope<Deviation>>, ApiError> {
    let caller = caller(&state, &headers).await?;
    let Json(request) = payload.map_err(|_| {
        ApiError::bad_request("Please choose approve or reject.", &caller.correlation_id)
    })?;

    let message = match request.action {
        DeviationEvent::Approve => "Deviation approved successfully.",
        DeviationEvent::Reject => "Deviation rejected successfully.",
    };
    let deviation = state
        .services
        .decide_deviation(&caller.principal, &DeviationId::new(id), request, &caller.correlation_id)
        .await
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))?;
    Ok(ok(message, deviation))
}
