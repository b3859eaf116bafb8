use std::process::ExitCode;

fn main() -> ExitCode {
    match docmigrate::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}
