use serde::{Deserialize, Serialize};

use crate::domain::deviation::Hierarchy;
use crate::domain::employee::{Employee, EmployeeCode, Location};
use crate::permissions::{capabilities_for, CapabilitySet};
use crate::roles::{Role, RoleResolver};

/// A caller after role resolution and capability derivation.
///
/// Recomputed from the employee profile on demand; never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub code: EmployeeCode,
    pub name: String,
    pub role: Role,
    pub capabilities: CapabilitySet,
    pub home: Location,
}

impl Principal {
    pub fn resolve(employee: &Employee, resolver: &RoleResolver) -> Self {
        let role = resolver.resolve(employee);
        Self::with_role(employee, role)
    }

    pub fn with_role(employee: &Employee, role: Role) -> Self {
        let grants = (!employee.grants.is_empty()).then_some(&employee.grants);
        Self {
            code: employee.code.clone(),
            name: employee.name.clone(),
            role,
            capabilities: capabilities_for(role, grants),
            home: employee.location.clone(),
        }
    }

    pub fn hierarchy(&self) -> Option<Hierarchy> {
        self.role.hierarchy()
    }

    pub fn is_unresolved(&self) -> bool {
        self.role == Role::Unknown
    }
}
