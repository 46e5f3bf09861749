//! Service startup finite state machine backing the readiness gate.
//!
//! Phases:
//! - Starting
//! - Acquiring (optional: pull artifacts before loading)
//! - Loading
//! - Serving
//! - Failed (terminal)
//!
//! Tracks how long each phase took and answers whether traffic may be served.

use std::time::{Instant, Duration};
use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StartupPhase { Starting, Acquiring, Loading, Serving, Failed }

#[derive(Debug)]
pub struct StartupState {
    phase: StartupPhase,
    started_at: Instant,
    phase_started_at: Instant,
    phase_durations: Vec<(StartupPhase, Duration)>,
}

impl Default for StartupState { fn default() -> Self { Self::new() } }

impl StartupState {
    pub fn new() -> Self { Self { phase: StartupPhase::Starting, started_at: Instant::now(), phase_started_at: Instant::now(), phase_durations: Vec::new() } }
    pub fn phase(&self) -> StartupPhase { self.phase }

    /// Moves to `next`. Leaving `Failed` or going backwards is ignored; returns whether the phase changed.
    pub fn enter(&mut self, next: StartupPhase) -> bool {
        if self.phase == StartupPhase::Failed || rank(next) <= rank(self.phase) { return false; }
        let now = Instant::now();
        self.phase_durations.push((self.phase, now - self.phase_started_at));
        self.phase = next;
        self.phase_started_at = now;
        true
    }

    pub fn fail(&mut self) -> bool { self.enter(StartupPhase::Failed) }
    pub fn is_ready(&self) -> bool { self.phase == StartupPhase::Serving }
    pub fn uptime(&self) -> Duration { self.started_at.elapsed() }
    pub fn durations(&self) -> &[(StartupPhase, Duration)] { &self.phase_durations }
}

fn rank(p: StartupPhase) -> u8 {
    match p { StartupPhase::Starting => 0, StartupPhase::Acquiring => 1, StartupPhase::Loading => 2, StartupPhase::Serving => 3, StartupPhase::Failed => 4 }
}
