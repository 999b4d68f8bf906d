use std::process::ExitCode;

fn main() -> ExitCode {
    incentive_cli::run()
}
