//! A provider driven entirely by a session file entry.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use super::traits::{Executable, Provider, SessionConfig, SessionConfigSlot};
use crate::environment::Environment;
use crate::net::{ProbeRequest, ProbeResponse};
use crate::parser::ProviderSpec;
use crate::runner::Fetch;
use crate::timing::ResourceTimingEntry;
use crate::types::{
    BeaconData, BeaconState, HttpHeader, TestConfiguration, TestResultBundle, TestSetupResult,
};

pub const FETCH_TEST: &str = "fetch";

/// Runs the fetch tests listed in its [`ProviderSpec`], or the ones served by
/// its `config_url`, and reports each result to its `beacon_url`.
pub struct ConfiguredProvider {
    spec: ProviderSpec,
    env: Arc<Environment>,
    slot: SessionConfigSlot,
}

impl ConfiguredProvider {
    pub fn new(spec: ProviderSpec, env: Arc<Environment>) -> Self {
        Self {
            spec,
            env,
            slot: SessionConfigSlot::default(),
        }
    }

    pub fn spec(&self) -> &ProviderSpec {
        &self.spec
    }

    fn tests_from(config: &SessionConfig) -> Result<Vec<TestConfiguration>> {
        let tests = config
            .data
            .get("tests")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        serde_json::from_value(tests).context("Session config has an invalid tests list")
    }
}

#[async_trait]
impl Provider for ConfiguredProvider {
    fn name(&self) -> &str {
        &self.spec.name
    }

    async fn should_run(&self) -> bool {
        self.spec.should_run
    }

    async fn fetch_session_config(&self) -> Result<SessionConfig> {
        let Some(config_url) = &self.spec.config_url else {
            return Ok(SessionConfig::new(json!({ "tests": self.spec.tests })));
        };

        let url = Url::parse(config_url)
            .with_context(|| format!("Invalid config_url: {}", config_url))?;
        let response = self.env.transport.fetch(ProbeRequest::get(url)).await?;
        if !response.ok() {
            anyhow::bail!(
                "Config request to {} answered {}",
                response.url,
                response.status
            );
        }
        let data: Value = response.json()?;
        // Validated here so a bad payload rejects the provider up front.
        Self::tests_from(&SessionConfig::new(data.clone()))?;
        Ok(SessionConfig::new(data))
    }

    fn set_session_config(&self, config: SessionConfig) {
        self.slot.set(config);
    }

    fn session_config(&self) -> Option<SessionConfig> {
        self.slot.get()
    }

    fn expand_tasks(self: Arc<Self>) -> Vec<Arc<dyn Executable>> {
        let Some(config) = self.session_config() else {
            return Vec::new();
        };
        let tests = match Self::tests_from(&config) {
            Ok(tests) => tests,
            Err(e) => {
                log::warn!("[{}] {:#}", self.spec.name, e);
                return Vec::new();
            }
        };

        let mut tasks: Vec<Arc<dyn Executable>> = Vec::with_capacity(tests.len());
        for test in tests {
            if test.test_type != FETCH_TEST {
                log::warn!(
                    "[{}] Skipping test of unknown type: {}",
                    self.spec.name,
                    test.test_type
                );
                continue;
            }
            tasks.push(Arc::new(Fetch::new(self.clone(), test)));
        }
        tasks
    }

    async fn create_fetch_test_result(
        &self,
        timing_entry: ResourceTimingEntry,
        response: &ProbeResponse,
        config: &TestConfiguration,
        setup_result: TestSetupResult,
    ) -> Result<TestResultBundle> {
        let mut record: Map<String, Value> = timing_entry
            .into_iter()
            .map(|(key, value)| (key, serde_json::to_value(value).unwrap_or(Value::Null)))
            .collect();
        record.insert("url".to_string(), Value::from(response.url.as_str()));
        record.insert("status".to_string(), Value::from(response.status));
        record.insert("ok".to_string(), Value::from(response.ok()));
        record.insert("bytes".to_string(), Value::from(response.body.len()));
        if let Some(label) = config.get_str("label") {
            record.insert("label".to_string(), Value::from(label));
        }

        Ok(TestResultBundle::new(
            &config.test_type,
            vec![record],
            setup_result,
        ))
    }

    fn make_beacon_data(
        &self,
        config: &TestConfiguration,
        bundle: &TestResultBundle,
    ) -> Result<BeaconData> {
        let all_ok = bundle
            .data
            .iter()
            .all(|record| record.get("ok").and_then(Value::as_bool).unwrap_or(false));
        let state = if bundle.data.is_empty() {
            BeaconState::Unknown
        } else if all_ok {
            BeaconState::Success
        } else {
            BeaconState::Failure
        };

        let mut data = Map::new();
        data.insert("provider".to_string(), Value::from(self.spec.name.as_str()));
        data.insert("results".to_string(), serde_json::to_value(&bundle.data)?);
        Ok(BeaconData::new(state, config).with_data(data))
    }

    fn make_beacon_url(&self, _config: &TestConfiguration) -> Result<Url> {
        let url = self
            .spec
            .beacon_url
            .as_deref()
            .with_context(|| format!("No beacon_url configured for {}", self.spec.name))?;
        Url::parse(url).with_context(|| format!("Invalid beacon_url: {}", url))
    }

    fn get_resource_url(&self, config: &TestConfiguration) -> Result<Url> {
        let url = config
            .get_str("url")
            .with_context(|| format!("{} test has no url", config.test_type))?;
        Url::parse(url).with_context(|| format!("Invalid test url: {}", url))
    }

    /// Provider headers first, then the test's own `headers` list.
    fn get_resource_request_headers(&self, config: &TestConfiguration) -> Vec<HttpHeader> {
        let mut headers: Vec<HttpHeader> = self.spec.headers.iter().map(HttpHeader::from).collect();
        if let Some(Value::Array(extra)) = config.get("headers") {
            headers.extend(extra.iter().filter_map(|h| {
                Some((
                    h.get("name")?.as_str()?.to_string(),
                    h.get("value")?.as_str()?.to_string(),
                ))
            }));
        }
        headers
    }

    fn environment(&self) -> Arc<Environment> {
        self.env.clone()
    }
}
