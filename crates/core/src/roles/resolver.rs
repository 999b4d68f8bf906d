use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::deviation::Hierarchy;
use crate::domain::employee::{Employee, PermissionGrants};
use crate::permissions::grant;
use crate::roles::rules::{NormalizedDesignation, RuleSet};
use crate::roles::Role;

/// Why a role was chosen, for diagnostics and the CLI.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ResolutionSource {
    Explicit,
    Designation { rule_set_version: String, rule_index: usize },
    Capability { grant: String },
    Unresolved,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub role: Role,
    #[serde(flatten)]
    pub source: ResolutionSource,
}

#[derive(Clone, Debug, Default)]
pub struct RoleResolver {
    rules: RuleSet,
}

impl RoleResolver {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn rule_set(&self) -> &RuleSet {
        &self.rules
    }

    /// Never fails; unmatched profiles resolve to [`Role::Unknown`].
    pub fn resolve(&self, employee: &Employee) -> Role {
        self.explain(employee).role
    }

    pub fn explain(&self, employee: &Employee) -> Resolution {
        if let Some(role) = employee.role {
            return Resolution { role, source: ResolutionSource::Explicit };
        }

        let designation = NormalizedDesignation::new(&employee.designation);
        if let Some((rule_index, role)) = self.rules.first_match(&designation) {
            return Resolution {
                role,
                source: ResolutionSource::Designation {
                    rule_set_version: self.rules.version.clone(),
                    rule_index,
                },
            };
        }

        if let Some((role, grant)) = infer_from_grants(&designation, &employee.grants) {
            return Resolution { role, source: ResolutionSource::Capability { grant } };
        }

        warn!(
            event_name = "access.role.unresolved",
            employee_code = %employee.code,
            designation = %employee.designation,
            "designation matched no rule; falling back to restricted capabilities"
        );
        Resolution { role: Role::Unknown, source: ResolutionSource::Unresolved }
    }
}

fn infer_from_grants(
    designation: &NormalizedDesignation,
    grants: &PermissionGrants,
) -> Option<(Role, String)> {
    if grants.is_empty() {
        return None;
    }

    let domain = domain_token(designation, grants);

    if grants.contains_any(grant::UPLOAD_DOCKETS) {
        return Some((Role::CentralOps, grant::UPLOAD_DOCKETS[0].to_string()));
    }
    if let Some(hierarchy) = domain {
        if grants.contains_any(grant::APPROVE_DEVIATION) {
            return Some((
                Role::national_head_for(hierarchy),
                grant::APPROVE_DEVIATION[0].to_string(),
            ));
        }
        if grants.contains_any(grant::RAISE_DEVIATION) {
            return Some((Role::state_head_for(hierarchy), grant::RAISE_DEVIATION[0].to_string()));
        }
    }

    let scoped = [
        (grant::VIEW_ALL_INDIA, Role::NationalBusinessHead),
        (grant::VIEW_STATE, Role::StateHeadBusiness),
        (grant::VIEW_BRANCH, Role::Bm),
        (grant::VIEW_OWN, Role::Rm),
    ];
    scoped
        .into_iter()
        .find(|(names, _)| grants.contains_any(names))
        .map(|(names, role)| (role, names[0].to_string()))
}

/// Domain named by the designation or by grant names; `None` when absent or ambiguous.
fn domain_token(
    designation: &NormalizedDesignation,
    grants: &PermissionGrants,
) -> Option<Hierarchy> {
    let grant_names: Vec<String> = grants.normalized_names().collect();
    let grant_has =
        |token: &str| grant_names.iter().any(|name| name.split('_').any(|part| part == token));

    let business = designation.has_phrase("business")
        || designation.has_phrase("bh")
        || grant_has("business");
    let credit =
        designation.has_phrase("credit") || designation.has_phrase("ch") || grant_has("credit");

    match (business, credit) {
        (true, false) => Some(Hierarchy::Business),
        (false, true) => Some(Hierarchy::Credit),
        _ => None,
    }
}
