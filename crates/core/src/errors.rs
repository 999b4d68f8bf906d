use thiserror::Error;

use crate::domain::deviation::{DeviationStatus, Hierarchy};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("no role could be resolved for employee {employee_code}")]
    UnresolvedRole { employee_code: String },
    #[error("scope violation: {reason}")]
    ScopeViolation { reason: String },
    #[error("deviation {deviation_id} is already {status:?}")]
    InvalidTransition { deviation_id: String, status: DeviationStatus },
    #[error("hierarchy mismatch: expected {expected:?}, found {actual:?}")]
    InvalidHierarchyMismatch { expected: Option<Hierarchy>, actual: Option<Hierarchy> },
    #[error("invalid period key `{period}`")]
    InvalidPeriod { period: String },
    #[error("a reason or eligibility reason is required")]
    MissingReason,
    #[error("business raisers must choose a deviation type")]
    MissingDeviationType,
    #[error("proposed mapping names no employee")]
    EmptyProposedMapping,
    #[error("case {case_id} already has an open {hierarchy:?} deviation")]
    DuplicateOpenDeviation { case_id: String, hierarchy: Hierarchy },
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
}

impl EngineError {
    /// Stable machine-readable kind carried to callers alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnresolvedRole { .. } => "unresolved_role",
            Self::ScopeViolation { .. } => "scope_violation",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::InvalidHierarchyMismatch { .. } => "invalid_hierarchy_mismatch",
            Self::InvalidPeriod { .. } => "invalid_period",
            Self::MissingReason => "missing_reason",
            Self::MissingDeviationType => "missing_deviation_type",
            Self::EmptyProposedMapping => "empty_proposed_mapping",
            Self::DuplicateOpenDeviation { .. } => "duplicate_open_deviation",
            Self::NotFound { .. } => "not_found",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::UnresolvedRole { .. } => {
                "Your designation is not recognised. Contact an administrator.".to_owned()
            }
            Self::ScopeViolation { .. } => {
                "You are not allowed to view or act on this record.".to_owned()
            }
            Self::InvalidTransition { status, .. } => {
                format!("This deviation has already been {}.", status.as_str())
            }
            Self::InvalidHierarchyMismatch { .. } => {
                "This deviation belongs to a different reporting hierarchy.".to_owned()
            }
            Self::InvalidPeriod { period } => {
                format!("Period `{period}` is not valid. Use the YYYY_MM format.")
            }
            Self::MissingReason => "Please provide a reason for the deviation.".to_owned(),
            Self::MissingDeviationType => "Please choose a deviation type.".to_owned(),
            Self::EmptyProposedMapping => {
                "Please propose at least one employee for the new mapping.".to_owned()
            }
            Self::DuplicateOpenDeviation { .. } => {
                "A deviation is already pending for this case.".to_owned()
            }
            Self::NotFound { entity, .. } => format!("The requested {entity} was not found."),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    /// Message safe to show to the caller. Engine failures carry their own
    /// wording; infrastructure failures use a fixed sentence.
    pub fn user_message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::Forbidden { message, .. }
            | Self::Conflict { message, .. }
            | Self::NotFound { message, .. } => message,
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::Forbidden { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::ServiceUnavailable { .. } => 503,
            Self::Internal { .. } => 500,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Engine(error) => {
                let message = error.user_message();
                match error {
                    EngineError::UnresolvedRole { .. }
                    | EngineError::ScopeViolation { .. }
                    | EngineError::InvalidHierarchyMismatch { .. } => {
                        Self::Forbidden { message, correlation_id }
                    }
                    EngineError::InvalidTransition { .. }
                    | EngineError::DuplicateOpenDeviation { .. } => {
                        Self::Conflict { message, correlation_id }
                    }
                    EngineError::NotFound { .. } => Self::NotFound { message, correlation_id },
                    EngineError::InvalidPeriod { .. }
                    | EngineError::MissingReason
                    | EngineError::MissingDeviationType
                    | EngineError::EmptyProposedMapping => {
                        Self::BadRequest { message, correlation_id }
                    }
                }
            }
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}
