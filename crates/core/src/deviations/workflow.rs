//! Deviation lifecycle: raise by a State Head, resolve by the matching National Head.
//!
//! Every operation here is a pure decision over records the caller already
//! fetched. Persisting the result (and guarding it with a compare-and-set on the
//! stored status) is the caller's job; the returned [`CaseSignal`]s describe the
//! case changes that must follow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome};
use crate::deviations::states::{transition, DeviationAction, DeviationEvent, TransitionOutcome};
use crate::domain::case::{Case, CaseId, CaseSignal};
use crate::domain::deviation::{
    Deviation, DeviationId, DeviationStatus, DeviationType, Hierarchy, ProposedMapping,
};
use crate::errors::EngineError;
use crate::hierarchy::HierarchyFilter;
use crate::principal::Principal;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowPolicy {
    pub require_rejection_reason: bool,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self { require_rejection_reason: false, default_page_size: 20, max_page_size: 100 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaiseDeviationRequest {
    pub case_id: CaseId,
    /// Mandatory for Business raisers; Credit raisers always produce `mapping_credit`.
    #[serde(default)]
    pub deviation_type: Option<DeviationType>,
    pub proposed_mapping: ProposedMapping,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub eligibility_reason: Option<String>,
    #[serde(default)]
    pub supporting_docs: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub action: DeviationEvent,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl DecisionRequest {
    pub fn approve() -> Self {
        Self { action: DeviationEvent::Approve, rejection_reason: None, comment: None }
    }

    pub fn reject(reason: Option<&str>) -> Self {
        Self {
            action: DeviationEvent::Reject,
            rejection_reason: reason.map(str::to_owned),
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaisedDeviation {
    pub deviation: Deviation,
    pub signals: Vec<CaseSignal>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviationDecision {
    pub deviation: Deviation,
    pub outcome: TransitionOutcome,
    pub signals: Vec<CaseSignal>,
}

#[derive(Clone, Debug, Default)]
pub struct DeviationWorkflow {
    policy: WorkflowPolicy,
}

impl DeviationWorkflow {
    pub fn new(policy: WorkflowPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &WorkflowPolicy {
        &self.policy
    }

    /// Validates and builds a new pending deviation against `case`.
    ///
    /// `existing` is every deviation already recorded for the case; an open
    /// one in the raiser's hierarchy blocks the raise.
    pub fn raise(
        &self,
        principal: &Principal,
        case: &Case,
        existing: &[Deviation],
        request: RaiseDeviationRequest,
        now: DateTime<Utc>,
    ) -> Result<RaisedDeviation, EngineError> {
        let hierarchy = match principal.hierarchy() {
            Some(hierarchy) if principal.role.is_state_head() => hierarchy,
            _ => {
                return Err(EngineError::ScopeViolation {
                    reason: format!("role {} may not raise deviations", principal.role),
                })
            }
        };
        if request.case_id != case.id {
            return Err(EngineError::NotFound { entity: "case", id: request.case_id.0 });
        }
        HierarchyFilter::ensure_in_scope(principal, &case.location)?;

        let reason = request.reason.trim().to_owned();
        let eligibility_reason = request
            .eligibility_reason
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
        if reason.is_empty() && eligibility_reason.is_none() {
            return Err(EngineError::MissingReason);
        }

        let deviation_type =
            resolve_deviation_type(hierarchy, request.deviation_type, &request.proposed_mapping)?;
        if request.proposed_mapping.is_empty() {
            return Err(EngineError::EmptyProposedMapping);
        }
        let already_open = existing.iter().any(|deviation| {
            deviation.case_id == case.id && deviation.hierarchy == hierarchy && deviation.is_open()
        });
        if already_open {
            return Err(EngineError::DuplicateOpenDeviation {
                case_id: case.id.0.clone(),
                hierarchy,
            });
        }

        let deviation = Deviation {
            id: DeviationId::new(format!("DEV-{}", Uuid::new_v4().simple())),
            case_id: case.id.clone(),
            customer_name: case.customer_name.clone(),
            location: case.location.clone(),
            hierarchy,
            deviation_type,
            raised_by: principal.code.clone(),
            raised_by_role: principal.role,
            proposed: request.proposed_mapping,
            reason,
            eligibility_reason,
            supporting_docs: request
                .supporting_docs
                .into_iter()
                .filter(|doc| !doc.trim().is_empty())
                .collect(),
            status: DeviationStatus::Pending,
            rejection_reason: None,
            approver_comment: None,
            resolved_by: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        };

        info!(
            event_name = "deviation.raised",
            deviation_id = %deviation.id.0,
            case_id = %deviation.case_id.0,
            employee_code = %principal.code,
            hierarchy = deviation.hierarchy.as_str(),
            deviation_type = deviation.deviation_type.as_str(),
            "deviation raised"
        );

        let signals = vec![CaseSignal::MarkUnderDeviation { case_id: deviation.case_id.clone() }];
        Ok(RaisedDeviation { deviation, signals })
    }

    /// Approves or rejects a pending deviation. The input is never modified;
    /// a failed attempt leaves the stored record as it was.
    ///
    /// `case_deviations` is the case's deviation history. Eligibility is only
    /// restored once no other deviation on the case is still open.
    pub fn decide(
        &self,
        principal: &Principal,
        deviation: &Deviation,
        case_deviations: &[Deviation],
        request: DecisionRequest,
        now: DateTime<Utc>,
    ) -> Result<DeviationDecision, EngineError> {
        authorize_resolver(principal, deviation)?;
        let outcome = transition(&deviation.id, deviation.status, request.action)?;

        let rejection_reason = match request.action {
            DeviationEvent::Approve => None,
            DeviationEvent::Reject => {
                let reason = request
                    .rejection_reason
                    .map(|value| value.trim().to_owned())
                    .filter(|value| !value.is_empty());
                if reason.is_none() && self.policy.require_rejection_reason {
                    return Err(EngineError::MissingReason);
                }
                reason
            }
        };

        let mut resolved = deviation.clone();
        resolved.status = outcome.to;
        resolved.rejection_reason = rejection_reason;
        resolved.approver_comment =
            request.comment.map(|value| value.trim().to_owned()).filter(|value| !value.is_empty());
        resolved.resolved_by = Some(principal.code.clone());
        resolved.resolved_at = Some(now);
        resolved.updated_at = now;

        let other_open = case_deviations.iter().any(|other| {
            other.id != resolved.id && other.case_id == resolved.case_id && other.is_open()
        });
        let signals = outcome
            .actions
            .iter()
            .filter_map(|action| match action {
                DeviationAction::ApplyProposedTagging => Some(CaseSignal::ApplyTagging {
                    case_id: resolved.case_id.clone(),
                    mapping: resolved.proposed.clone(),
                }),
                DeviationAction::RestoreCaseEligibility if other_open => None,
                DeviationAction::RestoreCaseEligibility => {
                    Some(CaseSignal::RestoreEligibility { case_id: resolved.case_id.clone() })
                }
            })
            .collect();

        info!(
            event_name = "deviation.resolved",
            deviation_id = %resolved.id.0,
            case_id = %resolved.case_id.0,
            employee_code = %principal.code,
            status = resolved.status.as_str(),
            "deviation resolved"
        );

        Ok(DeviationDecision { deviation: resolved, outcome, signals })
    }
}

/// Audit record for one raise attempt.
pub fn raise_audit_event(
    case_id: &CaseId,
    result: &Result<RaisedDeviation, EngineError>,
    audit: &AuditContext,
) -> AuditEvent {
    match result {
        Ok(raised) => AuditEvent::new(
            Some(raised.deviation.id.clone()),
            Some(case_id.clone()),
            audit.correlation_id.clone(),
            "deviation.raised",
            AuditCategory::Deviation,
            audit.actor.clone(),
            AuditOutcome::Success,
        )
        .with_metadata("hierarchy", raised.deviation.hierarchy.as_str())
        .with_metadata("deviation_type", raised.deviation.deviation_type.as_str()),
        Err(error) => {
            warn!(
                event_name = "deviation.raise_rejected",
                correlation_id = %audit.correlation_id,
                case_id = %case_id.0,
                error_kind = error.kind(),
                "deviation raise rejected"
            );
            AuditEvent::new(
                None,
                Some(case_id.clone()),
                audit.correlation_id.clone(),
                "deviation.raise_rejected",
                AuditCategory::Deviation,
                audit.actor.clone(),
                AuditOutcome::Rejected,
            )
            .with_metadata("error_kind", error.kind())
            .with_metadata("error", error.to_string())
        }
    }
}

/// Audit record for one approve/reject attempt.
pub fn decision_audit_event(
    deviation: &Deviation,
    action: DeviationEvent,
    result: &Result<DeviationDecision, EngineError>,
    audit: &AuditContext,
) -> AuditEvent {
    match result {
        Ok(decision) => AuditEvent::new(
            Some(deviation.id.clone()),
            Some(deviation.case_id.clone()),
            audit.correlation_id.clone(),
            format!("deviation.{}", decision.outcome.to.as_str()),
            AuditCategory::Deviation,
            audit.actor.clone(),
            AuditOutcome::Success,
        )
        .with_metadata("from", decision.outcome.from.as_str())
        .with_metadata("to", decision.outcome.to.as_str())
        .with_metadata("action", action.as_str()),
        Err(error) => {
            warn!(
                event_name = "deviation.transition_rejected",
                correlation_id = %audit.correlation_id,
                deviation_id = %deviation.id.0,
                error_kind = error.kind(),
                "deviation transition rejected"
            );
            AuditEvent::new(
                Some(deviation.id.clone()),
                Some(deviation.case_id.clone()),
                audit.correlation_id.clone(),
                "deviation.transition_rejected",
                AuditCategory::Deviation,
                audit.actor.clone(),
                AuditOutcome::Rejected,
            )
            .with_metadata("action", action.as_str())
            .with_metadata("error_kind", error.kind())
            .with_metadata("error", error.to_string())
        }
    }
}

fn resolve_deviation_type(
    raiser: Hierarchy,
    requested: Option<DeviationType>,
    mapping: &ProposedMapping,
) -> Result<DeviationType, EngineError> {
    let mismatch = || EngineError::InvalidHierarchyMismatch {
        expected: Some(requested.map_or(raiser, deviation_type_hierarchy)),
        actual: Some(mapping.hierarchy()),
    };

    match raiser {
        Hierarchy::Business => {
            let chosen = requested.ok_or(EngineError::MissingDeviationType)?;
            if chosen != mapping.deviation_type() {
                return Err(mismatch());
            }
            Ok(chosen)
        }
        Hierarchy::Credit => {
            if mapping.hierarchy() != Hierarchy::Credit
                || requested.is_some_and(|chosen| chosen != DeviationType::MappingCredit)
            {
                return Err(EngineError::InvalidHierarchyMismatch {
                    expected: Some(Hierarchy::Credit),
                    actual: Some(mapping.hierarchy()),
                });
            }
            Ok(DeviationType::MappingCredit)
        }
    }
}

fn deviation_type_hierarchy(deviation_type: DeviationType) -> Hierarchy {
    match deviation_type {
        DeviationType::MappingBusiness => Hierarchy::Business,
        DeviationType::MappingCredit => Hierarchy::Credit,
    }
}

fn authorize_resolver(principal: &Principal, deviation: &Deviation) -> Result<(), EngineError> {
    if !principal.role.is_national_head() || !principal.capabilities.can_approve_deviation {
        return Err(EngineError::ScopeViolation {
            reason: format!("role {} may not resolve deviations", principal.role),
        });
    }
    if principal.hierarchy() != Some(deviation.hierarchy) {
        return Err(EngineError::InvalidHierarchyMismatch {
            expected: Some(deviation.hierarchy),
            actual: principal.hierarchy(),
        });
    }
    Ok(())
}
