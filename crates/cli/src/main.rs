use std::process::ExitCode;

fn main() -> ExitCode {
    freddie_cli::run()
}
