#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::NaiveDate;
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;

use incentive_core::audit::InMemoryAuditSink;
use incentive_core::deviations::{DeviationWorkflow, WorkflowPolicy};
use incentive_core::domain::case::{
    ApplicationStatus, Case, CaseId, Channel, IncentiveStatus, Tagging,
};
use incentive_core::domain::employee::{Employee, EmployeeCode, Location};
use incentive_core::incentive::IncentiveCalculator;
use incentive_core::roles::{RoleResolver, RuleSet};
use incentive_db::{connect_with_settings, migrations, DbPool};
use incentive_server::api::{self, AppState, EMPLOYEE_CODE_HEADER};
use incentive_server::services::{PortalServices, Repositories};

pub struct Portal {
    pub state: AppState,
    pub router: Router,
    pub sink: InMemoryAuditSink,
}

fn pune_camp() -> Location {
    Location::new("Maharashtra", "Pune", "Pune Camp")
}

fn state_only(state: &str) -> Location {
    Location { state: Some(state.to_owned()), area: None, branch: None }
}

pub fn home_loan(id: &str, rm: &str) -> Case {
    Case {
        id: CaseId::new(id),
        customer_name: "Asha Kulkarni".to_owned(),
        product: "Home Loan".to_owned(),
        loan_amount: Decimal::new(1_000_000, 0),
        location: pune_camp(),
        tagging: Tagging {
            rm: Some(EmployeeCode::new(rm)),
            bm: Some(EmployeeCode::new("BM01")),
            bcm: None,
            cso: None,
        },
        incentive_status: IncentiveStatus::Eligible,
        application_status: ApplicationStatus::Disbursed,
        channel: Channel::Routed,
        login_date: NaiveDate::from_ymd_opt(2026, 9, 3).expect("date"),
        disbursal_date: NaiveDate::from_ymd_opt(2026, 9, 25),
    }
}

/// In-memory portal seeded with one head per hierarchy level, a Pune branch
/// team and one disbursed home loan (`LN-1001`).
pub async fn seeded_portal() -> Portal {
    seed(Repositories::in_memory()).await
}

/// The same seed over a private in-memory SQLite database. The pool is
/// returned so a test can tamper with the schema.
pub async fn seeded_sql_portal() -> (Portal, DbPool) {
    let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    (seed(Repositories::sql(pool.clone())).await, pool)
}

async fn seed(repositories: Repositories) -> Portal {
    let employees = [
        Employee::new("NBH01", "Meera Joshi", "National Business Head", Location::default()),
        Employee::new("NCH01", "Vikram Shah", "National Credit Head", Location::default()),
        Employee::new("SHB01", "Rohit Desai", "State Business Head", state_only("Maharashtra")),
        Employee::new("SHC01", "Sunita Rao", "State Credit Head", state_only("Maharashtra")),
        Employee::new("SHB02", "Karan Mehta", "State Business Head", state_only("Gujarat")),
        Employee::new("BM01", "Anil Pawar", "Branch Manager", pune_camp()),
        Employee::new("RM01", "Priya Nair", "Relationship Manager", pune_camp()),
        Employee::new("RM02", "Deepak Kale", "Relationship Manager", pune_camp()),
        Employee::new("XX01", "Temp Staff", "Intern", pune_camp()),
    ];
    for employee in employees {
        repositories.employees.save(employee).await.expect("seed employee");
    }
    repositories.cases.save(home_loan("LN-1001", "RM01")).await.expect("seed case");

    let sink = InMemoryAuditSink::default();
    let services = PortalServices::new(
        repositories,
        RoleResolver::new(RuleSet::builtin()),
        DeviationWorkflow::new(WorkflowPolicy::default()),
        IncentiveCalculator::default(),
        Arc::new(sink.clone()),
    );
    let state = AppState::new(services);
    let router = api::router(state.clone());
    Portal { state, router, sink }
}

pub async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    employee: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(code) = employee {
        builder = builder.header(EMPLOYEE_CODE_HEADER, code);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response =
        router.clone().oneshot(builder.body(body).expect("request")).await.expect("response");
    let status = response.status();
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    let json = serde_json::from_slice(&bytes).expect("json body");
    (status, json)
}

pub fn raise_body(case_id: &str) -> Value {
    serde_json::json!({
        "case_id": case_id,
        "deviation_type": "mapping_business",
        "proposed_mapping": { "hierarchy": "business", "proposed_rm": "RM02" },
        "reason": "Case was sourced by RM02"
    })
}
