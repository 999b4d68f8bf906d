use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;

use incentive_core::domain::case::Case;
use incentive_core::envelope::ApiEnvelope;
use incentive_core::hierarchy::SelectionOptions;

use super::{caller, ok, ApiError, AppState};
use crate::services::CaseFilter;

pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    filter: Result<Query<CaseFilter>, QueryRejection>,
) -> Result<Json<ApiEnvelope<Vec<Case>>>, ApiError> {
    let caller = caller(&state, &headers).await?;
    let Query(filter) = filter.map_err(|_| {
        ApiError::bad_request("The case filters are not valid.", &caller.correlation_id)
    })?;

    let cases = state
        .services
        .list_cases(&caller.principal, &filter)
        .await
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))?;
    Ok(ok("Cases loaded.", cases))
}

pub async fn options(
    State(state): State<AppState>,
    headers: HeaderMap,
    filter: Result<Query<CaseFilter>, QueryRejection>,
) -> Result<Json<ApiEnvelope<SelectionOptions>>, ApiError> {
    let caller = caller(&state, &headers).await?;
    let Query(filter) = filter.map_err(|_| {
        ApiError::bad_request("The case filters are not valid.", &caller.correlation_id)
    })?;

    let options = state
        .services
        .case_options(&caller.principal, &filter.selection())
        .await
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))?;
    Ok(ok("Options loaded.", options))
}
