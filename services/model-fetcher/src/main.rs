use std::process::ExitCode;
use tracing::{error, info};
use model_fetcher::{acquire_with_mlflow, FetchSettings};
use pricecast_core::init_tracing;

// Exit 0 when an artifact is available (fresh or cached), 1 otherwise.
#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_tracing("model-fetcher") { eprintln!("tracing init failed: {e}"); }
    let settings = match FetchSettings::from_env() {
        Ok(s) => s,
        Err(e) => { error!(error=%e, "invalid configuration"); return ExitCode::from(1); }
    };
    match acquire_with_mlflow(&settings).await {
        Ok(artifact) => {
            info!(path=%artifact.path.display(), fresh=artifact.is_fresh(), origin=?artifact.origin, "model artifact available");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error=%e, "model artifact unavailable");
            ExitCode::from(1)
        }
    }
}
