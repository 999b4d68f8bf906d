use std::fs;
use std::path::PathBuf;

use anyhow::Context;

use crate::commands::{load_config, to_data, CommandResult};
use incentive_core::domain::case::Case;
use incentive_core::domain::employee::EmployeeCode;
use incentive_core::domain::incentive::StatusBasis;
use incentive_core::incentive::IncentiveCalculator;
use incentive_core::roles::Role;

#[derive(Debug, Clone)]
pub struct ComputeArgs {
    pub cases: PathBuf,
    pub employee: String,
    pub role: String,
    pub period: String,
    pub is_final: bool,
}

/// Offline incentive computation over a case export, using the configured
/// rate card.
pub fn run(args: &ComputeArgs) -> CommandResult {
    let config = match load_config("compute") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let role = match args.role.parse::<Role>() {
        Ok(role) => role,
        Err(error) => return CommandResult::failure("compute", "invalid_argument", error, 2),
    };

    let cases = match read_cases(args) {
        Ok(cases) => cases,
        Err(error) => {
            return CommandResult::failure("compute", "case_file", format!("{error:#}"), 4)
        }
    };

    let calculator = IncentiveCalculator::new(config.incentive);
    let breakdown = match calculator.compute(
        &EmployeeCode::new(args.employee.trim()),
        role,
        &args.period,
        StatusBasis::from_is_final(args.is_final),
        &cases,
    ) {
        Ok(breakdown) => breakdown,
        Err(error) => {
            return CommandResult::failure("compute", error.kind(), error.user_message(), 5)
        }
    };

    let message = format!(
        "{} earns {} for {} across {} qualifying cases",
        args.employee.trim(),
        breakdown.total_incentive,
        args.period,
        breakdown.qualifying_cases
    );
    match to_data("compute", &breakdown) {
        Ok(data) => CommandResult::success_with_data("compute", message, Some(data)),
        Err(failure) => failure,
    }
}

fn read_cases(args: &ComputeArgs) -> anyhow::Result<Vec<Case>> {
    let raw = fs::read_to_string(&args.cases)
        .with_context(|| format!("failed to read {}", args.cases.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of cases", args.cases.display()))
}
