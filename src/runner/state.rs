use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Instant;

/// Lifecycle of a single test
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TestState {
    /// Created, `execute` not yet called
    NotStarted,
    /// Executing its pipeline
    Running,
    /// Pipeline failed; absorbing
    Error,
    /// Pipeline completed; absorbing
    Finished,
}

impl TestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TestState::Error | TestState::Finished)
    }

    fn can_advance_to(&self, next: TestState) -> bool {
        matches!(
            (self, next),
            (TestState::NotStarted, TestState::Running)
                | (TestState::Running, TestState::Finished)
                | (TestState::Running, TestState::Error)
        )
    }
}

/// Holds a test's state and enforces forward-only transitions.
#[derive(Debug)]
pub struct StateCell {
    state: Mutex<TestState>,
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TestState::NotStarted),
        }
    }

    pub fn get(&self) -> TestState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move to `next`. Returns false, leaving the state alone, when the move
    /// is not a forward step of the lifecycle.
    pub fn advance(&self, next: TestState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.can_advance_to(next) {
            *state = next;
            true
        } else {
            log::debug!("Ignoring transition {:?} -> {:?}", *state, next);
            false
        }
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters for one session run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub providers_total: u32,
    pub providers_active: u32,
    pub providers_failed: u32,
    pub tasks: u32,
    pub results: u32,
    pub total_duration_ms: Option<u64>,
}

/// Accumulates a [`SessionSummary`] while a session runs.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: String,
    pub providers_total: u32,
    pub providers_active: u32,
    pub providers_failed: u32,
    pub tasks: u32,
    pub results: u32,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
}

impl SessionState {
    pub fn new(session_id: &str, providers_total: usize) -> Self {
        Self {
            session_id: session_id.to_string(),
            providers_total: providers_total as u32,
            providers_active: 0,
            providers_failed: 0,
            tasks: 0,
            results: 0,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    pub fn finish(&mut self, results: usize) {
        self.results = results as u32;
        self.finished_at = Some(Instant::now());
    }

    pub fn summary(&self) -> SessionSummary {
        let total_duration_ms = self.started_at.map(|start| {
            self.finished_at
                .unwrap_or_else(Instant::now)
                .duration_since(start)
                .as_millis() as u64
        });

        SessionSummary {
            session_id: self.session_id.clone(),
            providers_total: self.providers_total,
            providers_active: self.providers_active,
            providers_failed: self.providers_failed,
            tasks: self.tasks,
            results: self.results,
            total_duration_ms,
        }
    }
}
