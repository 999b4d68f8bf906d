use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{normalize_key, same_key};
use crate::roles::Role;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmployeeCode(pub String);

impl EmployeeCode {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, other: &str) -> bool {
        same_key(&self.0, other)
    }
}

impl fmt::Display for EmployeeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position of an employee or a case in the national → state → area → branch tree.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
}

impl Location {
    pub fn new(state: &str, area: &str, branch: &str) -> Self {
        Self {
            state: Some(state.to_string()),
            area: Some(area.to_string()),
            branch: Some(branch.to_string()),
        }
    }

    pub fn in_state(&self, state: &str) -> bool {
        self.state.as_deref().is_some_and(|value| same_key(value, state))
    }

    pub fn in_area(&self, area: &str) -> bool {
        self.area.as_deref().is_some_and(|value| same_key(value, area))
    }

    pub fn in_branch(&self, branch: &str) -> bool {
        self.branch.as_deref().is_some_and(|value| same_key(value, branch))
    }
}

/// Explicit permission grants attached to an employee profile, either as flat
/// permission codes or as group names.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrants {
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl PermissionGrants {
    pub fn from_permissions<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { permissions: permissions.into_iter().map(Into::into).collect(), groups: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.iter().chain(self.groups.iter()).all(|name| name.trim().is_empty())
    }

    /// Grant names normalised to `snake_case` keys (`"Approve Deviation"` → `approve_deviation`).
    pub fn normalized_names(&self) -> impl Iterator<Item = String> + '_ {
        self.permissions
            .iter()
            .chain(self.groups.iter())
            .map(|name| normalize_grant(name))
            .filter(|name| !name.is_empty())
    }

    pub fn contains_any(&self, names: &[&str]) -> bool {
        self.normalized_names().any(|granted| names.iter().any(|name| granted == *name))
    }
}

fn normalize_grant(name: &str) -> String {
    normalize_key(name)
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub code: EmployeeCode,
    pub name: String,
    pub designation: String,
    /// Externally assigned role; wins over designation matching when present.
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub grants: PermissionGrants,
    #[serde(default)]
    pub location: Location,
}

impl Employee {
    pub fn new(code: &str, name: &str, designation: &str, location: Location) -> Self {
        Self {
            code: EmployeeCode::new(code),
            name: name.to_string(),
            designation: designation.to_string(),
            role: None,
            grants: PermissionGrants::default(),
            location,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_grants(mut self, grants: PermissionGrants) -> Self {
        self.grants = grants;
        self
    }
}
