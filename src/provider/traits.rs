use anyhow::Result;
use async_trait::async_trait;
use reqwest::Url;
use std::fmt;
use std::sync::{Arc, RwLock};

use super::errors::KnownError;
use crate::environment::Environment;
use crate::net::{beacon, ProbeResponse, SendBeaconResult};
use crate::timing::ResourceTimingEntry;
use crate::types::{BeaconData, HttpHeader, TestConfiguration, TestResultBundle, TestSetupResult};

/// A unit of work the session runs.
#[async_trait]
pub trait Executable: Send + Sync {
    async fn execute(&self) -> Result<TestResultBundle>;
}

/// A provider's configuration for one session, plus the tasks expanded from it.
#[derive(Clone, Default)]
pub struct SessionConfig {
    pub data: serde_json::Value,
    expanded_tasks: Vec<Arc<dyn Executable>>,
}

impl SessionConfig {
    pub fn new(data: serde_json::Value) -> Self {
        Self {
            data,
            expanded_tasks: Vec::new(),
        }
    }

    pub fn expanded_tasks(&self) -> &[Arc<dyn Executable>] {
        &self.expanded_tasks
    }

    pub fn set_expanded_tasks(&mut self, tasks: Vec<Arc<dyn Executable>>) {
        self.expanded_tasks = tasks;
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("data", &self.data)
            .field("expanded_tasks", &self.expanded_tasks.len())
            .finish()
    }
}

/// Storage for the session config a provider receives from the bootstrap.
#[derive(Debug, Default)]
pub struct SessionConfigSlot {
    value: RwLock<Option<SessionConfig>>,
}

impl SessionConfigSlot {
    pub fn set(&self, config: SessionConfig) {
        *self.value.write().unwrap_or_else(|e| e.into_inner()) = Some(config);
    }

    pub fn get(&self) -> Option<SessionConfig> {
        self.value.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Attach expanded tasks to the stored config, if there is one.
    pub fn set_expanded_tasks(&self, tasks: Vec<Arc<dyn Executable>>) {
        if let Some(config) = self.value.write().unwrap_or_else(|e| e.into_inner()).as_mut() {
            config.set_expanded_tasks(tasks);
        }
    }
}

/// The hooks a RUM provider supplies.
///
/// The session bootstrap and the test pipeline drive a provider entirely
/// through this trait. Hooks with a default body are optional.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider-defined name, used in results and logs
    fn name(&self) -> &str;

    /// Whether the provider takes part in this session
    async fn should_run(&self) -> bool {
        true
    }

    /// Fetch the provider's configuration for this session
    async fn fetch_session_config(&self) -> Result<SessionConfig>;

    /// Store the configuration returned by [`Provider::fetch_session_config`]
    fn set_session_config(&self, config: SessionConfig);

    /// The stored session configuration
    fn session_config(&self) -> Option<SessionConfig>;

    /// Build the tasks to run from the stored session configuration
    fn expand_tasks(self: Arc<Self>) -> Vec<Arc<dyn Executable>>;

    /// Prepare for a test. The result is handed to the later hooks.
    async fn test_set_up(&self, _config: &TestConfiguration) -> Result<TestSetupResult> {
        Ok(TestSetupResult::default())
    }

    /// Turn a fetch test's timing entry and response into a result bundle
    async fn create_fetch_test_result(
        &self,
        timing_entry: ResourceTimingEntry,
        response: &ProbeResponse,
        config: &TestConfiguration,
        setup_result: TestSetupResult,
    ) -> Result<TestResultBundle>;

    /// Build the beacon payload for a finished test
    fn make_beacon_data(
        &self,
        config: &TestConfiguration,
        bundle: &TestResultBundle,
    ) -> Result<BeaconData>;

    /// Serialize beacon data for transmission (JSON by default)
    fn encode_beacon_data(&self, _config: &TestConfiguration, data: &BeaconData) -> Result<String> {
        Ok(serde_json::to_string(data)?)
    }

    /// Send encoded beacon data.
    ///
    /// The default goes through [`beacon::send`] to
    /// [`Provider::make_beacon_url`]. Providers with their own reporting
    /// channel override this instead.
    async fn send_beacon(
        &self,
        config: &TestConfiguration,
        encoded: String,
    ) -> Result<SendBeaconResult> {
        let url = self.make_beacon_url(config)?;
        let env = self.environment();
        beacon::send(&env, url, encoded).await
    }

    /// Collector URL used by the default [`Provider::send_beacon`]
    fn make_beacon_url(&self, _config: &TestConfiguration) -> Result<Url> {
        anyhow::bail!("Method not implemented.")
    }

    fn on_send_beacon_resolved(&self, _result: &SendBeaconResult) {}

    fn on_send_beacon_rejected(&self, error: &anyhow::Error) {
        self.handle_error(KnownError::SendBeacon, error);
    }

    /// Report a recovered failure
    fn handle_error(&self, kind: KnownError, error: &anyhow::Error) {
        log::warn!("[{}] {} error: {:#}", self.name(), kind, error);
    }

    /// Post-process a finished bundle
    async fn test_tear_down(&self, bundle: TestResultBundle) -> Result<TestResultBundle> {
        Ok(bundle)
    }

    /// URL a fetch test requests
    fn get_resource_url(&self, config: &TestConfiguration) -> Result<Url>;

    /// Extra request headers for a fetch test
    fn get_resource_request_headers(&self, _config: &TestConfiguration) -> Vec<HttpHeader> {
        Vec::new()
    }

    /// Environment the provider's tests run against
    fn environment(&self) -> Arc<Environment> {
        Environment::global()
    }
}
