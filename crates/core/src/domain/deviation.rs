use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::case::CaseId;
use crate::domain::employee::{EmployeeCode, Location};
use crate::roles::Role;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviationId(pub String);

impl DeviationId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

/// The two parallel reporting chains. A deviation and its approver always share one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hierarchy {
    Business,
    Credit,
}

impl Hierarchy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Business => "business",
            Self::Credit => "credit",
        }
    }
}

impl std::str::FromStr for Hierarchy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "business" => Ok(Self::Business),
            "credit" => Ok(Self::Credit),
            other => Err(format!("unknown hierarchy `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviationType {
    MappingBusiness,
    MappingCredit,
}

impl DeviationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MappingBusiness => "mapping_business",
            Self::MappingCredit => "mapping_credit",
        }
    }
}

impl std::str::FromStr for DeviationType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mapping_business" => Ok(Self::MappingBusiness),
            "mapping_credit" => Ok(Self::MappingCredit),
            other => Err(format!("unknown deviation type `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviationStatus {
    Pending,
    Approved,
    Rejected,
}

impl DeviationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for DeviationStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown deviation status `{other}`")),
        }
    }
}

/// Proposed tagging change. The variant fixes which tagging fields may be proposed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "hierarchy", rename_all = "snake_case")]
pub enum ProposedMapping {
    Business {
        #[serde(default)]
        proposed_rm: Option<EmployeeCode>,
        #[serde(default)]
        proposed_bm: Option<EmployeeCode>,
    },
    Credit {
        #[serde(default)]
        proposed_bcm: Option<EmployeeCode>,
        #[serde(default)]
        proposed_cso: Option<EmployeeCode>,
    },
}

impl ProposedMapping {
    pub fn hierarchy(&self) -> Hierarchy {
        match self {
            Self::Business { .. } => Hierarchy::Business,
            Self::Credit { .. } => Hierarchy::Credit,
        }
    }

    /// The deviation type this mapping corrects.
    pub fn deviation_type(&self) -> DeviationType {
        match self {
            Self::Business { .. } => DeviationType::MappingBusiness,
            Self::Credit { .. } => DeviationType::MappingCredit,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Business { proposed_rm, proposed_bm } => {
                proposed_rm.is_none() && proposed_bm.is_none()
            }
            Self::Credit { proposed_bcm, proposed_cso } => {
                proposed_bcm.is_none() && proposed_cso.is_none()
            }
        }
    }

    pub fn proposed_codes(&self) -> Vec<&EmployeeCode> {
        match self {
            Self::Business { proposed_rm, proposed_bm } => {
                proposed_rm.iter().chain(proposed_bm.iter()).collect()
            }
            Self::Credit { proposed_bcm, proposed_cso } => {
                proposed_bcm.iter().chain(proposed_cso.iter()).collect()
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deviation {
    pub id: DeviationId,
    pub case_id: CaseId,
    /// Snapshot of the case's customer at raise time, used for search.
    pub customer_name: String,
    /// Snapshot of the case's location at raise time, used for visibility.
    pub location: Location,
    pub hierarchy: Hierarchy,
    pub deviation_type: DeviationType,
    pub raised_by: EmployeeCode,
    pub raised_by_role: Role,
    pub proposed: ProposedMapping,
    pub reason: String,
    pub eligibility_reason: Option<String>,
    pub supporting_docs: Vec<String>,
    pub status: DeviationStatus,
    pub rejection_reason: Option<String>,
    pub approver_comment: Option<String>,
    pub resolved_by: Option<EmployeeCode>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Deviation {
    pub fn is_open(&self) -> bool {
        self.status == DeviationStatus::Pending
    }
}
