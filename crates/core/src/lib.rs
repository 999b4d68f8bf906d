pub mod audit;
pub mod config;
pub mod deviations;
pub mod domain;
pub mod envelope;
pub mod errors;
pub mod hierarchy;
pub mod incentive;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use deviations::{
    DecisionRequest, DeviationDecision, DeviationQuery, DeviationSummary, DeviationWorkflow, Page,
    RaiseDeviationRequest, RaisedDeviation, WorkflowPolicy,
};
pub use domain::case::{Case, CaseId, CaseSignal, IncentiveStatus};
pub use domain::deviation::{
    Deviation, DeviationId, DeviationStatus, DeviationType, Hierarchy, ProposedMapping,
};
pub use domain::employee::{Employee, EmployeeCode, Location, PermissionGrants};
pub use domain::incentive::{BranchIncentive, IncentiveBreakdown, Period, StatusBasis};
pub use envelope::ApiEnvelope;
pub use errors::{ApplicationError, EngineError, InterfaceError};
pub use hierarchy::{HierarchyFilter, Selection, SelectionLevel, SelectionOptions};
pub use incentive::{IncentiveCalculator, IncentivePolicy};
pub use permissions::{CapabilitySet, PermissionEvaluator, StaticPermissionEvaluator, ViewScope};
pub use principal::Principal;
pub use roles::{Role, RoleResolver, RuleSet};
