//! House price prediction service: loads the cached model once, then serves
//! `/health`, `/ready`, `/predict`, `/batch-predict` and `/metrics`.

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use model_fetcher::{acquire_with_mlflow, FetchSettings};
use pricecast_core::StartupPhase;

pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod routes;
pub mod schema;
pub mod state;

pub use config::ServiceSettings;
pub use model::LoadedModel;
pub use routes::router;
pub use state::{AppState, SharedState};

pub const SERVICE_NAME: &str = "prediction-api";

/// Binds, starts serving behind a closed readiness gate, loads the model, then opens the gate.
/// A startup failure stops the server and is returned to the caller.
pub async fn run(settings: ServiceSettings, fetch: Option<FetchSettings>) -> Result<()> {
    let state = AppState::new(settings.request_timeout())?;
    let listener = TcpListener::bind(settings.bind_addr).await.with_context(|| format!("binding {}", settings.bind_addr))?;
    info!(addr=%listener.local_addr()?, "prediction api listening");

    let app = router(state.clone());
    let server = tokio::spawn(async move { axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await });

    if let Err(e) = bootstrap(&state, &settings, fetch.as_ref()).await {
        error!(error=%e, "startup failed; refusing to serve");
        server.abort();
        return Err(e);
    }
    server.await??;
    info!("prediction api stopped");
    Ok(())
}

/// Acquires (when `fetch` is given) and loads the model, then opens the readiness gate.
/// Any failure leaves the startup state `failed`.
pub async fn bootstrap(state: &SharedState, settings: &ServiceSettings, fetch: Option<&FetchSettings>) -> Result<()> {
    let model = match load_model(state, settings, fetch).await {
        Ok(model) => model,
        Err(e) => {
            state.fail();
            return Err(e);
        }
    };
    let summary = model.summary();
    info!(model=%summary.name, version=?summary.version, features=summary.features, scaled=summary.scaled, source=?model.source(), "model loaded");
    state.install(model);
    Ok(())
}

async fn load_model(state: &SharedState, settings: &ServiceSettings, fetch: Option<&FetchSettings>) -> Result<LoadedModel> {
    let model = match fetch {
        Some(fetch) => {
            state.enter(StartupPhase::Acquiring);
            let artifact = acquire_with_mlflow(fetch).await?;
            state.enter(StartupPhase::Loading);
            tokio::task::spawn_blocking(move || LoadedModel::from_files(&artifact.path, artifact.companion.as_deref())).await??
        }
        None => {
            state.enter(StartupPhase::Loading);
            let (dir, name, preprocessor) = (settings.model_dir.clone(), settings.model_name.clone(), settings.preprocessor_name.clone());
            tokio::task::spawn_blocking(move || LoadedModel::load(&dir, &name, &preprocessor)).await??
        }
    };
    Ok(model)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error=%e, "cannot listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
