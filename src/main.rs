use std::process::ExitCode;

fn main() -> ExitCode {
    match courtgate_lib::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("courtgate: {e}");
            ExitCode::FAILURE
        }
    }
}
