use std::process::ExitCode;

fn main() -> ExitCode {
    match hostbridged::run_executor() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("hostbridged: {error}");
            ExitCode::FAILURE
        }
    }
}
