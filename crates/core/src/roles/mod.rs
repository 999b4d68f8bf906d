pub mod resolver;
pub mod rules;

use serde::{Deserialize, Serialize};

use crate::domain::case::TaggingSlot;
use crate::domain::deviation::Hierarchy;

pub use resolver::{Resolution, ResolutionSource, RoleResolver};
pub use rules::{DesignationRule, NormalizedDesignation, RuleSet, RuleSetError};

/// Canonical role. Exactly one per employee; `Unknown` is the most restrictive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Rm,
    Bm,
    Bcm,
    Cso,
    AreaHeadBusiness,
    AreaHeadCredit,
    StateHeadBusiness,
    StateHeadCredit,
    NationalBusinessHead,
    NationalCreditHead,
    Admin,
    CentralOps,
    Hr,
    Unknown,
}

impl Role {
    pub const ALL: [Role; 14] = [
        Role::Rm,
        Role::Bm,
        Role::Bcm,
        Role::Cso,
        Role::AreaHeadBusiness,
        Role::AreaHeadCredit,
        Role::StateHeadBusiness,
        Role::StateHeadCredit,
        Role::NationalBusinessHead,
        Role::NationalCreditHead,
        Role::Admin,
        Role::CentralOps,
        Role::Hr,
        Role::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rm => "rm",
            Self::Bm => "bm",
            Self::Bcm => "bcm",
            Self::Cso => "cso",
            Self::AreaHeadBusiness => "area_head_business",
            Self::AreaHeadCredit => "area_head_credit",
            Self::StateHeadBusiness => "state_head_business",
            Self::StateHeadCredit => "state_head_credit",
            Self::NationalBusinessHead => "national_business_head",
            Self::NationalCreditHead => "national_credit_head",
            Self::Admin => "admin",
            Self::CentralOps => "central_ops",
            Self::Hr => "hr",
            Self::Unknown => "unknown",
        }
    }

    /// Reporting chain the role belongs to; `None` for cross-cutting roles.
    pub fn hierarchy(&self) -> Option<Hierarchy> {
        match self {
            Self::Rm
            | Self::Bm
            | Self::AreaHeadBusiness
            | Self::StateHeadBusiness
            | Self::NationalBusinessHead => Some(Hierarchy::Business),
            Self::Bcm
            | Self::Cso
            | Self::AreaHeadCredit
            | Self::StateHeadCredit
            | Self::NationalCreditHead => Some(Hierarchy::Credit),
            Self::Admin | Self::CentralOps | Self::Hr | Self::Unknown => None,
        }
    }

    /// Case tagging field that attributes activity to this role.
    pub fn tagging_slot(&self) -> Option<TaggingSlot> {
        match self {
            Self::Rm => Some(TaggingSlot::Rm),
            Self::Bm => Some(TaggingSlot::Bm),
            Self::Bcm => Some(TaggingSlot::Bcm),
            Self::Cso => Some(TaggingSlot::Cso),
            _ => None,
        }
    }

    /// Role of the direct reports a branch manager rolls up.
    pub fn direct_report(&self) -> Option<Role> {
        match self {
            Self::Bm => Some(Self::Rm),
            Self::Bcm => Some(Self::Cso),
            _ => None,
        }
    }

    pub fn is_state_head(&self) -> bool {
        matches!(self, Self::StateHeadBusiness | Self::StateHeadCredit)
    }

    pub fn is_national_head(&self) -> bool {
        matches!(self, Self::NationalBusinessHead | Self::NationalCreditHead)
    }

    pub fn state_head_for(hierarchy: Hierarchy) -> Self {
        match hierarchy {
            Hierarchy::Business => Self::StateHeadBusiness,
            Hierarchy::Credit => Self::StateHeadCredit,
        }
    }

    pub fn national_head_for(hierarchy: Hierarchy) -> Self {
        match hierarchy {
            Hierarchy::Business => Self::NationalBusinessHead,
            Hierarchy::Credit => Self::NationalCreditHead,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let key = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == key)
            .ok_or_else(|| format!("unknown role `{}`", value.trim()))
    }
}
