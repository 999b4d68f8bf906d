use serde::{Deserialize, Serialize};

use crate::domain::employee::PermissionGrants;
use crate::roles::Role;

/// Accepted grant names per capability. The first entry is the canonical code.
pub mod grant {
    pub const VIEW_OWN: &[&str] = &["view_own"];
    pub const VIEW_BRANCH: &[&str] = &["view_branch"];
    pub const VIEW_AREA: &[&str] = &["view_area"];
    pub const VIEW_STATE: &[&str] = &["view_state"];
    pub const VIEW_ALL_INDIA: &[&str] = &["view_all_india"];
    pub const RAISE_DEVIATION: &[&str] = &["raise_deviation", "raise_deviations"];
    pub const APPROVE_DEVIATION: &[&str] = &["approve_deviation", "approve_deviations"];
    pub const VIEW_DEVIATIONS: &[&str] = &["view_deviations", "view_deviation"];
    pub const UPLOAD_DOCKETS: &[&str] = &["upload_dockets", "upload_docket"];
    pub const UPLOAD_SALARIES: &[&str] = &["upload_salaries", "upload_salary"];
}

/// How far up the organisation tree a principal can see, narrowest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewScope {
    None,
    Own,
    Branch,
    Area,
    State,
    AllIndia,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub view_scope: ViewScope,
    pub can_raise_deviation: bool,
    pub can_approve_deviation: bool,
    pub can_view_deviations: bool,
    pub can_upload_dockets: bool,
    pub can_upload_salaries: bool,
}

impl CapabilitySet {
    /// Capability set of [`Role::Unknown`]: sees nothing, may do nothing.
    pub const fn restricted() -> Self {
        Self {
            view_scope: ViewScope::None,
            can_raise_deviation: false,
            can_approve_deviation: false,
            can_view_deviations: false,
            can_upload_dockets: false,
            can_upload_salaries: false,
        }
    }

    const fn scoped(view_scope: ViewScope) -> Self {
        let mut set = Self::restricted();
        set.view_scope = view_scope;
        set
    }

    /// Static role table.
    pub const fn for_role(role: Role) -> Self {
        match role {
            Role::Rm | Role::Cso => Self::scoped(ViewScope::Own),
            Role::Bm | Role::Bcm => Self::scoped(ViewScope::Branch),
            Role::AreaHeadBusiness | Role::AreaHeadCredit => Self::scoped(ViewScope::Area),
            Role::StateHeadBusiness | Role::StateHeadCredit => Self {
                can_raise_deviation: true,
                can_view_deviations: true,
                ..Self::scoped(ViewScope::State)
            },
            Role::NationalBusinessHead | Role::NationalCreditHead => Self {
                can_approve_deviation: true,
                can_view_deviations: true,
                ..Self::scoped(ViewScope::AllIndia)
            },
            Role::Admin => Self {
                can_view_deviations: true,
                can_upload_dockets: true,
                can_upload_salaries: true,
                ..Self::scoped(ViewScope::AllIndia)
            },
            Role::CentralOps => {
                Self { can_upload_dockets: true, ..Self::scoped(ViewScope::AllIndia) }
            }
            Role::Hr => Self { can_upload_salaries: true, ..Self::scoped(ViewScope::AllIndia) },
            Role::Unknown => Self::restricted(),
        }
    }
}

pub trait PermissionEvaluator: Send + Sync {
    fn capabilities_for(&self, role: Role, grants: Option<&PermissionGrants>) -> CapabilitySet;
}

#[derive(Clone, Debug, Default)]
pub struct StaticPermissionEvaluator;

impl PermissionEvaluator for StaticPermissionEvaluator {
    fn capabilities_for(&self, role: Role, grants: Option<&PermissionGrants>) -> CapabilitySet {
        capabilities_for(role, grants)
    }
}

/// Role table first, then each field granted explicitly is switched on.
///
/// Grants are evaluated field by field: a grant for one capability never
/// resets the others. When several view grants are present the widest wins.
pub fn capabilities_for(role: Role, grants: Option<&PermissionGrants>) -> CapabilitySet {
    let mut capabilities = CapabilitySet::for_role(role);
    let Some(grants) = grants.filter(|grants| !grants.is_empty()) else {
        return capabilities;
    };

    let granted_scope = [
        (grant::VIEW_ALL_INDIA, ViewScope::AllIndia),
        (grant::VIEW_STATE, ViewScope::State),
        (grant::VIEW_AREA, ViewScope::Area),
        (grant::VIEW_BRANCH, ViewScope::Branch),
        (grant::VIEW_OWN, ViewScope::Own),
    ]
    .into_iter()
    .find(|(names, _)| grants.contains_any(names))
    .map(|(_, scope)| scope);
    if let Some(scope) = granted_scope {
        capabilities.view_scope = scope;
    }

    capabilities.can_raise_deviation |= grants.contains_any(grant::RAISE_DEVIATION);
    capabilities.can_approve_deviation |= grants.contains_any(grant::APPROVE_DEVIATION);
    capabilities.can_view_deviations |= grants.contains_any(grant::VIEW_DEVIATIONS);
    capabilities.can_upload_dockets |= grants.contains_any(grant::UPLOAD_DOCKETS);
    capabilities.can_upload_salaries |= grants.contains_any(grant::UPLOAD_SALARIES);

    capabilities
}
