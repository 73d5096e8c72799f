pub mod events;
pub mod fetch;
pub mod sequence;
pub mod settings;
pub mod state;

use futures::future::join_all;
use std::sync::Arc;
use uuid::Uuid;

use crate::provider::{Executable, KnownError, Provider};
use crate::types::SessionResult;

pub use events::*;
pub use fetch::{Fetch, FetchProbe};
pub use sequence::{sequence, settle_all, Settled};
pub use settings::{
    default_session_process, parallel_session_process, ClientSettings, ClientSettingsBuilder,
    SessionProcessFn,
};
pub use state::*;
pub use test::{Probe, Test};

/// Run a RUM session.
///
/// Waits for readiness and the configured start delay, fetches every active
/// provider's session config concurrently, expands the fulfilled ones into
/// tasks in provider order and hands those to the session process. Provider
/// failures are contained: a provider whose config fetch fails contributes
/// no tasks.
///
/// Session events go to `settings.environment`; each test reports on its
/// provider's environment.
pub async fn init(settings: ClientSettings) -> SessionResult {
    let ClientSettings {
        pre_config_start_delay,
        providers,
        session_process,
        ready,
        environment,
    } = settings;

    ready.when_ready().await;
    if let Some(delay) = pre_config_start_delay.filter(|d| !d.is_zero()) {
        log::debug!("Delaying session start by {}ms", delay.as_millis());
        tokio::time::sleep(delay).await;
    }

    let session_id = Uuid::new_v4().to_string();
    let mut session = SessionState::new(&session_id, providers.len());
    session.start();
    environment.events.emit(SessionEvent::SessionStarted {
        session_id,
        provider_count: providers.len(),
    });

    // 1. Filter
    let should_run = join_all(providers.iter().map(|p| p.should_run())).await;
    let mut active: Vec<Arc<dyn Provider>> = Vec::with_capacity(providers.len());
    for (provider, run) in providers.into_iter().zip(should_run) {
        if run {
            active.push(provider);
        } else {
            log::debug!("[{}] Not running this session", provider.name());
            environment.events.emit(SessionEvent::ProviderSkipped {
                provider: provider.name().to_string(),
            });
        }
    }
    session.providers_active = active.len() as u32;

    // 2. Configure
    let configs = settle_all(active.iter().map(|p| p.fetch_session_config())).await;

    // 3. Expand, in declared order
    let mut tasks: Vec<Arc<dyn Executable>> = Vec::new();
    for (provider, config) in active.iter().zip(configs) {
        match config {
            Settled::Fulfilled(config) => {
                provider.set_session_config(config);
                let expanded = provider.clone().expand_tasks();
                log::debug!("[{}] Expanded {} tasks", provider.name(), expanded.len());
                environment.events.emit(SessionEvent::TasksExpanded {
                    provider: provider.name().to_string(),
                    count: expanded.len(),
                });
                tasks.extend(expanded);
            }
            Settled::Rejected(e) => {
                session.providers_failed += 1;
                log::warn!(
                    "[{}] Failed to fetch session config: {:#}",
                    provider.name(),
                    e
                );
                environment.events.emit(SessionEvent::ProviderConfigFailed {
                    provider: provider.name().to_string(),
                    error: format!("{:#}", e),
                });
                provider.handle_error(KnownError::ProviderConfigFetch, &e);
            }
        }
    }
    session.tasks = tasks.len() as u32;

    // 4. Process
    let process = session_process.unwrap_or_else(default_session_process);
    let result = process(tasks).await;

    session.finish(result.test_results.len());
    environment.events.emit(SessionEvent::SessionFinished {
        summary: session.summary(),
    });
    result
}
