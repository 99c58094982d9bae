use colored::Colorize;
use std::process::ExitCode;

fn main() -> ExitCode {
    match emprops::run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}
