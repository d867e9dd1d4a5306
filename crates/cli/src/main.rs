use std::process::ExitCode;

fn main() -> ExitCode {
    caserules_cli::run()
}
