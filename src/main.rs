use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match levelup::cli::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(levelup::errors::get_exit_code(&e))
        }
    }
}
