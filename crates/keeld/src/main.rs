use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match keeld::run_service() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let mut stderr = io::stderr().lock();
            let _ = writeln!(stderr, "keeld: {error}");
            ExitCode::FAILURE
        }
    }
}
