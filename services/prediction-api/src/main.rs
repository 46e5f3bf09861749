use anyhow::Result;
use tracing::info;
use model_fetcher::FetchSettings;
use pricecast_core::{init_tracing, EnvSource};
use prediction_api::{run, ServiceSettings, SERVICE_NAME};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(SERVICE_NAME)?;
    let env = EnvSource::Process;
    let settings = ServiceSettings::load(&env)?;
    info!(?settings, "config loaded");
    let fetch = if settings.acquire_on_start { Some(FetchSettings::load(&env)?) } else { None };
    run(settings, fetch).await
}
