pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "incentive",
    about = "Incentive portal operator CLI",
    long_about = "Inspect configuration, apply migrations, check designation rules, and compute \
                  incentives offline.",
    after_help = "Examples:\n  incentive config\n  incentive resolve-role --designation \"State \
                  Business Head\"\n  incentive compute --cases cases.json --employee RM01 --role \
                  rm --period 2026_09"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Resolve a designation (plus optional grants) to a role and capability set")]
    ResolveRole {
        #[arg(long, help = "Designation text as it appears on the employee profile")]
        designation: String,
        #[arg(long = "grant", help = "Explicit permission grant; repeat for several")]
        grants: Vec<String>,
    },
    #[command(about = "Compute one employee's incentive breakdown from a JSON case file")]
    Compute {
        #[arg(long, help = "JSON array of cases")]
        cases: PathBuf,
        #[arg(long, help = "Employee code the breakdown is for")]
        employee: String,
        #[arg(long, help = "Role key, for example rm or bm")]
        role: String,
        #[arg(long, help = "Period as YYYY_MM")]
        period: String,
        #[arg(long = "final", help = "Count only final (approved) cases")]
        is_final: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => commands::config::run(),
        Command::Migrate => commands::migrate::run(),
        Command::ResolveRole { designation, grants } => {
            commands::resolve_role::run(&designation, &grants)
        }
        Command::Compute { cases, employee, role, period, is_final } => {
            commands::compute::run(&commands::compute::ComputeArgs {
                cases,
                employee,
                role,
                period,
                is_final,
            })
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
