use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use incentive_core::envelope::ApiEnvelope;
use incentive_core::principal::Principal;

use super::{caller, ok, ApiError, AppState};

pub async fn capabilities(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiEnvelope<Principal>>, ApiError> {
    let caller = caller(&state, &headers).await?;
    Ok(ok("Capabilities resolved.", caller.principal))
}
