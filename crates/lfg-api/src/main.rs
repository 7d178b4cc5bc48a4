use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match lfg_api::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "lfg-api stopped");
            eprintln!("lfg-api: {err}");
            ExitCode::FAILURE
        }
    }
}
