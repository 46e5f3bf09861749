use std::sync::Arc;
use std::time::Duration;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::info;
use pricecast_core::{StartupPhase, StartupState};
use crate::metrics::ServiceMetrics;
use crate::model::LoadedModel;

pub type SharedState = Arc<AppState>;

/// Everything a handler may touch. The model is set once; nothing else mutates after startup
/// except the atomic metrics.
pub struct AppState {
    model: OnceCell<Arc<LoadedModel>>,
    startup: RwLock<StartupState>,
    pub metrics: ServiceMetrics,
    request_timeout: Duration,
}

impl AppState {
    pub fn new(request_timeout: Duration) -> Result<SharedState, prometheus::Error> {
        Ok(Arc::new(Self { model: OnceCell::new(), startup: RwLock::new(StartupState::new()), metrics: ServiceMetrics::new()?, request_timeout }))
    }

    /// Convenience for embedding and tests: a state that is already serving `model`.
    pub fn serving(model: LoadedModel, request_timeout: Duration) -> Result<SharedState, prometheus::Error> {
        let state = Self::new(request_timeout)?;
        state.install(model);
        Ok(state)
    }

    pub fn model(&self) -> Option<Arc<LoadedModel>> { self.model.get().cloned() }
    pub fn request_timeout(&self) -> Duration { self.request_timeout }

    /// Opens the readiness gate. Returns false if a model was already installed.
    pub fn install(&self, model: LoadedModel) -> bool {
        if self.model.set(Arc::new(model)).is_err() { return false; }
        let mut startup = self.startup.write();
        startup.enter(StartupPhase::Serving);
        let phases: Vec<String> = startup.durations().iter().map(|(phase, took)| format!("{phase:?}={}ms", took.as_millis())).collect();
        info!(startup_ms = startup.uptime().as_millis() as u64, phases = %phases.join(","), "model installed; serving");
        true
    }

    pub fn enter(&self, phase: StartupPhase) { self.startup.write().enter(phase); }
    pub fn fail(&self) { self.startup.write().fail(); }
    pub fn phase(&self) -> StartupPhase { self.startup.read().phase() }
    pub fn is_ready(&self) -> bool { self.model.get().is_some() && self.startup.read().is_ready() }
}
