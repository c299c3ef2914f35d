use std::process::ExitCode;

fn main() -> ExitCode {
    projbot_cli::run()
}
