use std::process::ExitCode;

fn main() -> ExitCode {
    casetrack_cli::run()
}
