//! Application services: fetch through the repositories, decide through the
//! engine, persist, then audit.

use std::sync::Arc;

use tracing::{info, warn};

use incentive_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use incentive_core::deviations::DeviationWorkflow;
use incentive_core::domain::deviation::DeviationId;
use incentive_core::domain::employee::EmployeeCode;
use incentive_core::errors::{ApplicationError, EngineError};
use incentive_core::incentive::IncentiveCalculator;
use incentive_core::principal::Principal;
use incentive_core::roles::RoleResolver;
use incentive_db::repositories::{
    AuditEventRepository, CaseRepository, DeviationRepository, EmployeeRepository,
    InMemoryAuditEventRepository, InMemoryCaseRepository, InMemoryDeviationRepository,
    InMemoryEmployeeRepository, SqlAuditEventRepository, SqlCaseRepository,
    SqlDeviationRepository, SqlEmployeeRepository,
};
use incentive_db::{DbPool, RepositoryError};

pub mod cases;
pub mod deviations;
pub mod incentives;

pub use cases::CaseFilter;

#[derive(Clone)]
pub struct Repositories {
    pub employees: Arc<dyn EmployeeRepository>,
    pub cases: Arc<dyn CaseRepository>,
    pub deviations: Arc<dyn DeviationRepository>,
    pub audit_events: Arc<dyn AuditEventRepository>,
}

impl Repositories {
    pub fn sql(pool: DbPool) -> Self {
        Self {
            employees: Arc::new(SqlEmployeeRepository::new(pool.clone())),
            cases: Arc::new(SqlCaseRepository::new(pool.clone())),
            deviations: Arc::new(SqlDeviationRepository::new(pool.clone())),
            audit_events: Arc::new(SqlAuditEventRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        let cases = InMemoryCaseRepository::default();
        let deviations = InMemoryDeviationRepository::sharing_cases(&cases);
        Self {
            employees: Arc::new(InMemoryEmployeeRepository::default()),
            cases: Arc::new(cases),
            deviations: Arc::new(deviations),
            audit_events: Arc::new(InMemoryAuditEventRepository::default()),
        }
    }
}

pub struct PortalServices {
    repositories: Repositories,
    resolver: RoleResolver,
    workflow: DeviationWorkflow,
    calculator: IncentiveCalculator,
    audit_sink: Arc<dyn AuditSink>,
}

impl PortalServices {
    pub fn new(
        repositories: Repositories,
        resolver: RoleResolver,
        workflow: DeviationWorkflow,
        calculator: IncentiveCalculator,
        audit_sink: Arc<dyn AuditSink>,
    ) -> Self {
        Self { repositories, resolver, workflow, calculator, audit_sink }
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repositories
    }

    /// Resolves the caller's role and capabilities from the stored profile.
    ///
    /// An unmatched designation is not an error: the caller gets the
    /// restricted capability set of the `Unknown` role.
    pub async fn principal(&self, employee_code: &str) -> Result<Principal, ApplicationError> {
        let code = EmployeeCode::new(employee_code.trim());
        let employee = self
            .repositories
            .employees
            .find_by_code(&code)
            .await
            .map_err(persistence)?
            .ok_or_else(|| EngineError::UnresolvedRole { employee_code: code.0.clone() })?;

        let principal = Principal::resolve(&employee, &self.resolver);
        if principal.is_unresolved() {
            warn!(
                event_name = "role.unresolved",
                employee_code = %principal.code,
                designation = %employee.designation,
                "designation matched no role; using restricted capabilities"
            );
        }
        Ok(principal)
    }

    /// Emits to the sink and stores the event. A failed store is logged, not
    /// returned: the decision it describes has already been committed.
    async fn record(&self, event: AuditEvent) {
        if let Err(error) = self.repositories.audit_events.append(&event).await {
            warn!(
                event_name = "audit.persist_failed",
                correlation_id = %event.correlation_id,
                audit_event_id = %event.event_id,
                error = %error,
                "audit event could not be stored"
            );
        }
        info!(
            event_name = "audit.recorded",
            correlation_id = %event.correlation_id,
            event_type = %event.event_type,
            outcome = event.outcome.as_str(),
            "audit event recorded"
        );
        self.audit_sink.emit(event);
    }
}

pub(crate) fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

/// Splits a service result into the engine's view of it. An error from
/// below the engine is handed back as is and audited as a failure.
pub(crate) fn engine_outcome<T: Clone>(
    result: &Result<T, ApplicationError>,
) -> Result<Result<T, EngineError>, &ApplicationError> {
    match result {
        Ok(value) => Ok(Ok(value.clone())),
        Err(ApplicationError::Engine(error)) => Ok(Err(error.clone())),
        Err(other) => Err(other),
    }
}

/// Audit record for an attempt that never reached the workflow.
pub(crate) fn attempt_failure_event(
    audit: &AuditContext,
    deviation_id: Option<&DeviationId>,
    event_type: &str,
    error: &ApplicationError,
) -> AuditEvent {
    let (category, outcome, kind) = match error {
        ApplicationError::Engine(engine) => {
            (AuditCategory::Deviation, AuditOutcome::Rejected, engine.kind())
        }
        ApplicationError::Persistence(_) => {
            (AuditCategory::Persistence, AuditOutcome::Failed, "persistence")
        }
        ApplicationError::Configuration(_) => {
            (AuditCategory::System, AuditOutcome::Failed, "configuration")
        }
    };
    AuditEvent::new(
        deviation_id.cloned(),
        None,
        audit.correlation_id.clone(),
        event_type,
        category,
        audit.actor.clone(),
        outcome,
    )
    .with_metadata("error_kind", kind)
    .with_metadata("error", error.to_string())
}
