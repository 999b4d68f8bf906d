use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::deviation::{Hierarchy, ProposedMapping};
use crate::domain::employee::{EmployeeCode, Location};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(pub String);

impl CaseId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncentiveStatus {
    Eligible,
    UnderDeviation,
    Hold,
    Approved,
    Rejected,
    Pending,
}

impl IncentiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eligible => "eligible",
            Self::UnderDeviation => "under_deviation",
            Self::Hold => "hold",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Pending => "pending",
        }
    }
}

impl std::str::FromStr for IncentiveStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "eligible" => Ok(Self::Eligible),
            "under_deviation" => Ok(Self::UnderDeviation),
            "hold" => Ok(Self::Hold),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "pending" => Ok(Self::Pending),
            other => Err(format!("unknown incentive status `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Login,
    InProcess,
    Sanctioned,
    Disbursed,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::InProcess => "in_process",
            Self::Sanctioned => "sanctioned",
            Self::Disbursed => "disbursed",
            Self::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "login" => Ok(Self::Login),
            "in_process" => Ok(Self::InProcess),
            "sanctioned" => Ok(Self::Sanctioned),
            "disbursed" => Ok(Self::Disbursed),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown application status `{other}`")),
        }
    }
}

/// How a disbursal reached the tagged employee.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Direct,
    #[default]
    Routed,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Routed => "routed",
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "routed" => Ok(Self::Routed),
            other => Err(format!("unknown channel `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaggingSlot {
    Rm,
    Bm,
    Bcm,
    Cso,
}

impl TaggingSlot {
    pub fn hierarchy(&self) -> Hierarchy {
        match self {
            Self::Rm | Self::Bm => Hierarchy::Business,
            Self::Bcm | Self::Cso => Hierarchy::Credit,
        }
    }

    pub fn for_hierarchy(hierarchy: Hierarchy) -> [Self; 2] {
        match hierarchy {
            Hierarchy::Business => [Self::Rm, Self::Bm],
            Hierarchy::Credit => [Self::Bcm, Self::Cso],
        }
    }
}

/// Case-to-employee tagging that incentive attribution is computed from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tagging {
    #[serde(default)]
    pub rm: Option<EmployeeCode>,
    #[serde(default)]
    pub bm: Option<EmployeeCode>,
    #[serde(default)]
    pub bcm: Option<EmployeeCode>,
    #[serde(default)]
    pub cso: Option<EmployeeCode>,
}

impl Tagging {
    pub fn get(&self, slot: TaggingSlot) -> Option<&EmployeeCode> {
        match slot {
            TaggingSlot::Rm => self.rm.as_ref(),
            TaggingSlot::Bm => self.bm.as_ref(),
            TaggingSlot::Bcm => self.bcm.as_ref(),
            TaggingSlot::Cso => self.cso.as_ref(),
        }
    }

    /// Tagged employees, limited to one hierarchy when given.
    pub fn codes(&self, hierarchy: Option<Hierarchy>) -> Vec<&EmployeeCode> {
        let slots: Vec<TaggingSlot> = match hierarchy {
            Some(hierarchy) => TaggingSlot::for_hierarchy(hierarchy).to_vec(),
            None => vec![TaggingSlot::Rm, TaggingSlot::Bm, TaggingSlot::Bcm, TaggingSlot::Cso],
        };
        slots.into_iter().filter_map(|slot| self.get(slot)).collect()
    }

    /// Overwrites only the fields the mapping proposes; unset proposals keep the current value.
    pub fn apply(&mut self, mapping: &ProposedMapping) {
        match mapping {
            ProposedMapping::Business { proposed_rm, proposed_bm } => {
                if let Some(rm) = proposed_rm {
                    self.rm = Some(rm.clone());
                }
                if let Some(bm) = proposed_bm {
                    self.bm = Some(bm.clone());
                }
            }
            ProposedMapping::Credit { proposed_bcm, proposed_cso } => {
                if let Some(bcm) = proposed_bcm {
                    self.bcm = Some(bcm.clone());
                }
                if let Some(cso) = proposed_cso {
                    self.cso = Some(cso.clone());
                }
            }
        }
    }
}

/// Side effects a deviation transition requests from the case owner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum CaseSignal {
    MarkUnderDeviation { case_id: CaseId },
    ApplyTagging { case_id: CaseId, mapping: ProposedMapping },
    RestoreEligibility { case_id: CaseId },
}

impl CaseSignal {
    pub fn case_id(&self) -> &CaseId {
        match self {
            Self::MarkUnderDeviation { case_id }
            | Self::ApplyTagging { case_id, .. }
            | Self::RestoreEligibility { case_id } => case_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    pub customer_name: String,
    pub product: String,
    pub loan_amount: Decimal,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub tagging: Tagging,
    pub incentive_status: IncentiveStatus,
    pub application_status: ApplicationStatus,
    #[serde(default)]
    pub channel: Channel,
    pub login_date: NaiveDate,
    #[serde(default)]
    pub disbursal_date: Option<NaiveDate>,
}

impl Case {
    pub fn is_disbursed(&self) -> bool {
        self.application_status == ApplicationStatus::Disbursed
    }

    /// Date the case counts toward: disbursal date for disbursed cases, login date otherwise.
    pub fn activity_date(&self) -> NaiveDate {
        if self.is_disbursed() {
            self.disbursal_date.unwrap_or(self.login_date)
        } else {
            self.login_date
        }
    }

    pub fn apply_signal(&mut self, signal: &CaseSignal) {
        match signal {
            CaseSignal::MarkUnderDeviation { .. } => {
                self.incentive_status = IncentiveStatus::UnderDeviation;
            }
            CaseSignal::ApplyTagging { mapping, .. } => self.tagging.apply(mapping),
            CaseSignal::RestoreEligibility { .. } => {
                self.incentive_status = IncentiveStatus::Eligible;
            }
        }
    }
}
