use chrono::Utc;
use tracing::info;

use incentive_core::audit::AuditContext;
use incentive_core::deviations::query::{list, summarize};
use incentive_core::deviations::workflow::{decision_audit_event, raise_audit_event};
use incentive_core::deviations::{
    DecisionRequest, DeviationDecision, DeviationQuery, DeviationSummary, Page,
    RaiseDeviationRequest, RaisedDeviation,
};
use incentive_core::domain::deviation::{Deviation, DeviationId};
use incentive_core::errors::{ApplicationError, EngineError};
use incentive_core::principal::Principal;
use incentive_db::RepositoryError;

use super::{attempt_failure_event, engine_outcome, persistence, PortalServices};

impl PortalServices {
    pub async fn deviation_summary(
        &self,
        principal: &Principal,
    ) -> Result<DeviationSummary, ApplicationError> {
        let deviations = self.repositories.deviations.list().await.map_err(persistence)?;
        Ok(summarize(&deviations, principal)?)
    }

    pub async fn list_deviations(
        &self,
        principal: &Principal,
        query: &DeviationQuery,
    ) -> Result<Page<Deviation>, ApplicationError> {
        let deviations = self.repositories.deviations.list().await.map_err(persistence)?;
        Ok(list(&deviations, principal, query, self.workflow.policy())?)
    }

    /// Raises a deviation and marks its case. Exactly one audit event is
    /// recorded per call, whatever the outcome.
    pub async fn raise_deviation(
        &self,
        principal: &Principal,
        request: RaiseDeviationRequest,
        correlation_id: &str,
    ) -> Result<Deviation, ApplicationError> {
        let audit = AuditContext::new(correlation_id, principal.code.as_str());
        let case_id = request.case_id.clone();
        let result = self.try_raise(principal, request).await;

        let event = match engine_outcome(&result) {
            Ok(outcome) => raise_audit_event(&case_id, &outcome, &audit),
            Err(error) => attempt_failure_event(&audit, None, "deviation.raise_failed", error),
        };
        self.record(event).await;

        result.map(|raised| raised.deviation)
    }

    async fn try_raise(
        &self,
        principal: &Principal,
        request: RaiseDeviationRequest,
    ) -> Result<RaisedDeviation, ApplicationError> {
        let case = self
            .repositories
            .cases
            .find_by_id(&request.case_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| EngineError::NotFound {
                entity: "case",
                id: request.case_id.0.clone(),
            })?;
        let existing =
            self.repositories.deviations.list_for_case(&case.id).await.map_err(persistence)?;

        let raised = self.workflow.raise(principal, &case, &existing, request, Utc::now())?;

        // The partial unique index settles raises that race past the check above.
        let stored =
            self.repositories.deviations.raise(raised.deviation.clone(), &raised.signals).await;
        match stored {
            Ok(()) => Ok(raised),
            Err(RepositoryError::Conflict(_)) => Err(EngineError::DuplicateOpenDeviation {
                case_id: case.id.0.clone(),
                hierarchy: raised.deviation.hierarchy,
            }
            .into()),
            Err(error) => Err(repository_failure(error)),
        }
    }

    /// Approves or rejects a deviation. The stored status is compared and
    /// set in the same transaction as the case update, so of two racing
    /// decisions only one is applied and the other reports
    /// `InvalidTransition`. A failed case update leaves the deviation pending.
    pub async fn decide_deviation(
        &self,
        principal: &Principal,
        deviation_id: &DeviationId,
        request: DecisionRequest,
        correlation_id: &str,
    ) -> Result<Deviation, ApplicationError> {
        let audit = AuditContext::new(correlation_id, principal.code.as_str());
        let current = match self.repositories.deviations.find_by_id(deviation_id).await {
            Ok(Some(current)) => current,
            Ok(None) => {
                let error = ApplicationError::from(EngineError::NotFound {
                    entity: "deviation",
                    id: deviation_id.0.clone(),
                });
                self.record(attempt_failure_event(
                    &audit,
                    Some(deviation_id),
                    "deviation.transition_rejected",
                    &error,
                ))
                .await;
                return Err(error);
            }
            Err(error) => {
                let error = persistence(error);
                self.record(attempt_failure_event(
                    &audit,
                    Some(deviation_id),
                    "deviation.transition_failed",
                    &error,
                ))
                .await;
                return Err(error);
            }
        };

        let action = request.action;
        let result = self.try_decide(principal, &current, request).await;
        let event = match engine_outcome(&result) {
            Ok(outcome) => decision_audit_event(&current, action, &outcome, &audit),
            Err(error) => attempt_failure_event(
                &audit,
                Some(deviation_id),
                "deviation.transition_failed",
                error,
            ),
        };
        self.record(event).await;

        result.map(|decision| decision.deviation)
    }

    async fn try_decide(
        &self,
        principal: &Principal,
        current: &Deviation,
        request: DecisionRequest,
    ) -> Result<DeviationDecision, ApplicationError> {
        let case_deviations = self
            .repositories
            .deviations
            .list_for_case(&current.case_id)
            .await
            .map_err(persistence)?;
        let decision =
            self.workflow.decide(principal, current, &case_deviations, request, Utc::now())?;

        let stored = self
            .repositories
            .deviations
            .resolve(&decision.deviation, current.status, &decision.signals)
            .await;
        match stored {
            Ok(()) => Ok(decision),
            Err(RepositoryError::Conflict(_)) => {
                let status = self
                    .repositories
                    .deviations
                    .find_by_id(&current.id)
                    .await
                    .map_err(persistence)?
                    .map_or(decision.deviation.status, |stored| stored.status);
                info!(
                    event_name = "deviation.transition_lost_race",
                    deviation_id = %current.id.0,
                    employee_code = %principal.code,
                    status = status.as_str(),
                    "deviation was resolved concurrently"
                );
                Err(EngineError::InvalidTransition { deviation_id: current.id.0.clone(), status }
                    .into())
            }
            Err(error) => Err(repository_failure(error)),
        }
    }
}

/// A signal for a vanished case is reported as a missing case; the write was
/// rolled back either way.
fn repository_failure(error: RepositoryError) -> ApplicationError {
    match error {
        RepositoryError::NotFound { entity, id } => EngineError::NotFound { entity, id }.into(),
        other => persistence(other),
    }
}
