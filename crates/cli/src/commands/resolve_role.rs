use serde_json::json;

use crate::commands::{load_config, to_data, CommandResult};
use incentive_core::domain::employee::{Employee, Location, PermissionGrants};
use incentive_core::permissions::{PermissionEvaluator, StaticPermissionEvaluator};
use incentive_core::roles::RoleResolver;

/// Resolves a designation against the configured rule table, the same way a
/// stored employee profile is resolved on every request.
pub fn run(designation: &str, grants: &[String]) -> CommandResult {
    let config = match load_config("resolve-role") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let rule_set = match config.roles.load_rule_set() {
        Ok(rule_set) => rule_set,
        Err(error) => {
            return CommandResult::failure("resolve-role", "rules_invalid", error.to_string(), 2)
        }
    };

    let resolver = RoleResolver::new(rule_set);
    let mut employee = Employee::new("CLI", "cli", designation, Location::default());
    employee.grants = PermissionGrants::from_permissions(grants.iter().cloned());

    let resolution = resolver.explain(&employee);
    let explicit = (!employee.grants.is_empty()).then_some(&employee.grants);
    let capabilities = StaticPermissionEvaluator.capabilities_for(resolution.role, explicit);

    let payload = json!({
        "designation": designation,
        "resolution": resolution,
        "capabilities": capabilities,
    });
    let data = match to_data("resolve-role", &payload) {
        Ok(data) => data,
        Err(failure) => return failure,
    };
    CommandResult::success_with_data(
        "resolve-role",
        format!("resolved to {}", resolution.role),
        Some(data),
    )
}
