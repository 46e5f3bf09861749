//! Core shared utilities for the pricecast services.

use anyhow::Result;
use tracing::info;
use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Env flag switching the fmt layer to flattened JSON lines.
pub const JSON_LOG_ENV: &str = "PRICECAST_JSON_LOG";

pub fn init_tracing(service: &str) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let json = std::env::var(JSON_LOG_ENV).ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let registry = tracing_subscriber::registry().with(env_filter);
        if json {
            registry
                .with(tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(false))
                .try_init()?;
        } else {
            registry
                .with(tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_line_number(true))
                .try_init()?;
        }
        Ok(())
    })?;
    info!(target: "pricecast", service, "tracing initialized");
    Ok(())
}

pub mod settings;
pub mod telemetry;
pub mod lifecycle;
mod resilience;

pub use settings::{load_layered, EnvSource, CONFIG_FILE_ENV};
pub use telemetry::encode_metrics;
pub use lifecycle::{StartupPhase, StartupState};
pub use resilience::{retry_async, RetryConfig};
