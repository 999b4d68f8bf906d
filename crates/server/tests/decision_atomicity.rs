mod common;

use axum::http::StatusCode;
use incentive_core::deviations::DecisionRequest;
use incentive_core::domain::case::{CaseId, IncentiveStatus};
use incentive_core::domain::deviation::{DeviationId, DeviationStatus};
use incentive_core::domain::employee::EmployeeCode;
use incentive_core::errors::ApplicationError;
use incentive_db::DbPool;
use serde_json::Value;

use common::{raise_body, seeded_sql_portal, send, Portal};

async fn raise(portal: &Portal) -> (StatusCode, Value) {
    send(&portal.router, "POST", "/api/v1/deviations", Some("SHB01"), Some(raise_body("LN-1001")))
        .await
}

async fn fail_case_updates(pool: &DbPool) {
    sqlx::query(
        "CREATE TRIGGER fail_case_update BEFORE UPDATE ON loan_case
         BEGIN SELECT RAISE(ABORT, 'case store unavailable'); END",
    )
    .execute(pool)
    .await
    .expect("install failing trigger");
}

async fn restore_case_updates(pool: &DbPool) {
    sqlx::query("DROP TRIGGER fail_case_update").execute(pool).await.expect("drop trigger");
}

#[tokio::test]
async fn failed_case_update_keeps_the_deviation_pending_and_retryable() {
    let (portal, pool) = seeded_sql_portal().await;
    let (status, raised) = raise(&portal).await;
    assert_eq!(status, StatusCode::CREATED, "{raised}");
    let id = DeviationId::new(raised["data"]["id"].as_str().expect("id"));

    let services = portal.state.services.clone();
    let head = services.principal("NBH01").await.expect("head");

    fail_case_updates(&pool).await;
    let failed = services.decide_deviation(&head, &id, DecisionRequest::approve(), "req-1").await;
    assert!(matches!(failed, Err(ApplicationError::Persistence(_))));

    let repositories = services.repositories();
    let stored = repositories.deviations.find_by_id(&id).await.expect("find").expect("stored");
    assert_eq!(stored.status, DeviationStatus::Pending);
    let case =
        repositories.cases.find_by_id(&CaseId::new("LN-1001")).await.expect("find").expect("case");
    assert_eq!(case.tagging.rm, Some(EmployeeCode::new("RM01")));
    assert_eq!(case.incentive_status, IncentiveStatus::UnderDeviation);

    restore_case_updates(&pool).await;
    let approved = services
        .decide_deviation(&head, &id, DecisionRequest::approve(), "req-2")
        .await
        .expect("retry succeeds");
    assert_eq!(approved.status, DeviationStatus::Approved);
    let case =
        repositories.cases.find_by_id(&CaseId::new("LN-1001")).await.expect("find").expect("case");
    assert_eq!(case.tagging.rm, Some(EmployeeCode::new("RM02")));
    assert_eq!(case.incentive_status, IncentiveStatus::Eligible);

    let trail = repositories.audit_events.list_for_deviation(&id).await.expect("audit trail");
    let types: Vec<&str> = trail.iter().map(|event| event.event_type.as_str()).collect();
    assert_eq!(types, ["deviation.raised", "deviation.transition_failed", "deviation.approved"]);
}

#[tokio::test]
async fn failed_case_update_stores_no_raise() {
    let (portal, pool) = seeded_sql_portal().await;

    fail_case_updates(&pool).await;
    let (status, _) = raise(&portal).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let repositories = portal.state.services.repositories();
    let history =
        repositories.deviations.list_for_case(&CaseId::new("LN-1001")).await.expect("history");
    assert!(history.is_empty());

    restore_case_updates(&pool).await;
    let (status, body) = raise(&portal).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
}
