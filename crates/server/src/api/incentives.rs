use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use incentive_core::domain::incentive::{BranchIncentive, IncentiveBreakdown, StatusBasis};
use incentive_core::envelope::ApiEnvelope;

use super::{caller, ok, ApiError, AppState};

#[derive(Clone, Debug, Deserialize)]
pub struct IncentiveQuery {
    /// `YYYY_MM`. A missing period is reported the same way as a malformed one.
    #[serde(default)]
    pub period: String,
    #[serde(default)]
    pub is_final: bool,
}

impl IncentiveQuery {
    fn basis(&self) -> StatusBasis {
        StatusBasis::from_is_final(self.is_final)
    }
}

pub async fn mine(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<IncentiveQuery>, QueryRejection>,
) -> Result<Json<ApiEnvelope<IncentiveBreakdown>>, ApiError> {
    let caller = caller(&state, &headers).await?;
    let Query(query) = query.map_err(|_| {
        ApiError::bad_request("The incentive filters are not valid.", &caller.correlation_id)
    })?;

    let breakdown = state
        .services
        .my_incentive(&caller.principal, &query.period, query.basis())
        .await
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))?;
    Ok(ok("Incentive computed.", breakdown))
}

pub async fn branch(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<IncentiveQuery>, QueryRejection>,
) -> Result<Json<ApiEnvelope<BranchIncentive>>, ApiError> {
    let caller = caller(&state, &headers).await?;
    let Query(query) = query.map_err(|_| {
        ApiError::bad_request("The incentive filters are not valid.", &caller.correlation_id)
    })?;

    let rollup = state
        .services
        .branch_incentive(&caller.principal, &query.period, query.basis())
        .await
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))?;
    Ok(ok("Branch incentive computed.", rollup))
}
