use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::sequence::{sequence, settle_all, Settled};
use crate::environment::Environment;
use crate::provider::{Executable, Provider};
use crate::types::SessionResult;
use crate::utils::ready::{AlreadyReady, ReadySignal};

/// Runs a session's expanded tasks and collects their bundles.
pub type SessionProcessFn =
    Arc<dyn Fn(Vec<Arc<dyn Executable>>) -> BoxFuture<'static, SessionResult> + Send + Sync>;

/// Run tasks one after another. Failed tasks contribute nothing.
pub fn default_session_process() -> SessionProcessFn {
    Arc::new(|tasks: Vec<Arc<dyn Executable>>| {
        async move {
            let funcs: Vec<_> = tasks
                .into_iter()
                .map(|task| move || async move { task.execute().await })
                .collect();
            SessionResult {
                test_results: sequence(funcs).await,
            }
        }
        .boxed()
    })
}

/// Run all tasks at once. Results keep task order; failed tasks contribute nothing.
pub fn parallel_session_process() -> SessionProcessFn {
    Arc::new(|tasks: Vec<Arc<dyn Executable>>| {
        async move {
            let settled = settle_all(tasks.iter().map(|task| task.execute())).await;
            SessionResult {
                test_results: settled.into_iter().filter_map(Settled::ok).collect(),
            }
        }
        .boxed()
    })
}

/// Everything [`init`](super::init) needs to run a session.
pub struct ClientSettings {
    pub pre_config_start_delay: Option<Duration>,
    pub providers: Vec<Arc<dyn Provider>>,
    pub session_process: Option<SessionProcessFn>,
    pub ready: Arc<dyn ReadySignal>,
    /// Receives the session-level events. Test and beacon events go to each
    /// provider's own [`Provider::environment`].
    pub environment: Arc<Environment>,
}

impl fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("ClientSettings")
            .field("pre_config_start_delay", &self.pre_config_start_delay)
            .field("providers", &names)
            .field("session_process", &self.session_process.is_some())
            .finish()
    }
}

/// Accumulates [`ClientSettings`].
#[derive(Default)]
pub struct ClientSettingsBuilder {
    pre_config_start_delay: Option<Duration>,
    providers: Vec<Arc<dyn Provider>>,
    session_process: Option<SessionProcessFn>,
    ready: Option<Arc<dyn ReadySignal>>,
    environment: Option<Arc<Environment>>,
}

impl ClientSettingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pre_config_start_delay(&mut self, delay: Duration) -> &mut Self {
        self.pre_config_start_delay = Some(delay);
        self
    }

    /// Providers run in the order they are added.
    pub fn add_provider(&mut self, provider: Arc<dyn Provider>) -> &mut Self {
        self.providers.push(provider);
        self
    }

    pub fn set_session_process(&mut self, process: SessionProcessFn) -> &mut Self {
        self.session_process = Some(process);
        self
    }

    pub fn set_ready_signal(&mut self, ready: Arc<dyn ReadySignal>) -> &mut Self {
        self.ready = Some(ready);
        self
    }

    /// Environment session events are emitted on. Defaults to the global one.
    ///
    /// Tests emit on their provider's [`Provider::environment`] instead. To
    /// observe a whole session on one emitter, give the providers this same
    /// environment.
    pub fn set_environment(&mut self, environment: Arc<Environment>) -> &mut Self {
        self.environment = Some(environment);
        self
    }

    pub fn to_settings(&self) -> ClientSettings {
        ClientSettings {
            pre_config_start_delay: self.pre_config_start_delay,
            providers: self.providers.clone(),
            session_process: self.session_process.clone(),
            ready: self
                .ready
                .clone()
                .unwrap_or_else(|| Arc::new(AlreadyReady) as Arc<dyn ReadySignal>),
            environment: self
                .environment
                .clone()
                .unwrap_or_else(Environment::global),
        }
    }
}
