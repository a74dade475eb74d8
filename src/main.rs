use std::process::ExitCode;

fn main() -> ExitCode {
    match flexlate::cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            flexlate::ui::output::error(format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}
