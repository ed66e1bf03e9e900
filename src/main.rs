use std::process::ExitCode;

fn main() -> ExitCode {
    match cohort_filter::cli::run() {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}
