//! Fixtures shared by the unit tests.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, Url};
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::environment::Environment;
use crate::net::{HttpTransport, ProbeRequest, ProbeResponse, SendBeaconResult};
use crate::provider::{Executable, KnownError, Provider, SessionConfig, SessionConfigSlot};
use crate::runner::Fetch;
use crate::timing::{PerformanceEntry, PerformanceTimeline, ResourceTimingEntry, RESOURCE};
use crate::types::{
    BeaconData, BeaconState, HttpHeader, TestConfiguration, TestResult, TestResultBundle,
    TestSetupResult,
};
use crate::utils::config::Config;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A resource timing entry shaped like the ones a browser reports.
/// `request_start` defaults to 100.
pub fn make_performance_timing_entry(name: &str, request_start: Option<f64>) -> PerformanceEntry {
    PerformanceEntry::new(name, RESOURCE)
        .with("startTime", 0)
        .with("duration", 0)
        .with("initiatorType", "foo")
        .with("nextHopProtocol", "foo")
        .with("workerStart", 0)
        .with("redirectStart", 0)
        .with("redirectEnd", 0)
        .with("fetchStart", 0)
        .with("domainLookupStart", 0)
        .with("domainLookupEnd", 0)
        .with("connectStart", 2)
        .with("connectEnd", 3)
        .with("secureConnectionStart", 0)
        .with("requestStart", request_start.unwrap_or(100.0))
        .with("responseStart", 0)
        .with("responseEnd", 0)
        .with("transferSize", 0)
        .with("encodedBodySize", 0)
        .with("decodedBodySize", 0)
        .with("toJSON", json!({}))
}

/// Transport that records requests and answers 200 "ok".
///
/// Once attached to a timeline, every GET also records a resource entry for
/// its URL, the way a real transport would.
#[derive(Default)]
pub struct RecordingTransport {
    requests: Mutex<Vec<ProbeRequest>>,
    timeline: Mutex<Option<PerformanceTimeline>>,
    request_start: Option<f64>,
    body: Option<String>,
    fail: bool,
}

impl RecordingTransport {
    /// Record entries with this `requestStart`.
    pub fn with_request_start(mut self, request_start: f64) -> Self {
        self.request_start = Some(request_start);
        self
    }

    /// Answer with this body instead of "ok".
    pub fn with_body(mut self, body: &str) -> Self {
        self.body = Some(body.to_string());
        self
    }

    /// Fail every request.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn attach_timeline(&self, timeline: PerformanceTimeline) {
        *self.timeline.lock().unwrap() = Some(timeline);
    }

    pub fn requests(&self) -> Vec<ProbeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn fetch(&self, request: ProbeRequest) -> Result<ProbeResponse> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            anyhow::bail!("connection refused: {}", request.url);
        }
        if request.method == Method::GET {
            let timeline = self.timeline.lock().unwrap().clone();
            if let Some(timeline) = timeline {
                timeline.record(vec![make_performance_timing_entry(
                    request.url.as_str(),
                    self.request_start,
                )]);
            }
        }
        Ok(ProbeResponse {
            url: request.url,
            status: 200,
            headers: HeaderMap::new(),
            body: self.body.as_deref().unwrap_or("ok").as_bytes().to_vec(),
        })
    }
}

/// An environment around `transport`, with the transport recording into
/// the environment's timeline. No beacon queue, so beacons are POSTed.
pub fn env_with_transport(transport: Arc<RecordingTransport>) -> Arc<Environment> {
    let env = Environment::new(Config::default(), transport.clone());
    transport.attach_timeline(env.timeline.clone());
    Arc::new(env)
}

/// Configurable provider that records what the pipeline hands it.
pub struct UnitTestProvider {
    name: String,
    env: Arc<Environment>,
    slot: SessionConfigSlot,
    beacon_url: Option<String>,
    resource_url: String,
    request_headers: Vec<HttpHeader>,
    tasks: Vec<TestConfiguration>,
    should_run: bool,
    config_delay: Duration,
    fail_config_fetch: bool,
    fail_set_up: bool,
    fail_beacon_data: bool,
    fail_tear_down: bool,
    beacon_outcomes: Mutex<Vec<String>>,
    handled_errors: Mutex<Vec<KnownError>>,
    last_timing_entry: Mutex<Option<ResourceTimingEntry>>,
    last_response_status: Mutex<Option<u16>>,
}

impl UnitTestProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            env: env_with_transport(Arc::new(RecordingTransport::default())),
            slot: SessionConfigSlot::default(),
            beacon_url: None,
            resource_url: format!("https://{}.probe.test/resource", name.to_lowercase()),
            request_headers: Vec::new(),
            tasks: vec![TestConfiguration::new("fetch")],
            should_run: true,
            config_delay: Duration::ZERO,
            fail_config_fetch: false,
            fail_set_up: false,
            fail_beacon_data: false,
            fail_tear_down: false,
            beacon_outcomes: Mutex::new(Vec::new()),
            handled_errors: Mutex::new(Vec::new()),
            last_timing_entry: Mutex::new(None),
            last_response_status: Mutex::new(None),
        }
    }

    pub fn with_environment(mut self, env: Arc<Environment>) -> Self {
        self.env = env;
        self
    }

    pub fn with_beacon_url(mut self, url: &str) -> Self {
        self.beacon_url = Some(url.to_string());
        self
    }

    pub fn with_resource_url(mut self, url: &str) -> Self {
        self.resource_url = url.to_string();
        self
    }

    pub fn with_request_headers(mut self, headers: Vec<HttpHeader>) -> Self {
        self.request_headers = headers;
        self
    }

    /// Test configurations returned as the session config.
    pub fn with_tasks(mut self, tasks: Vec<TestConfiguration>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn with_should_run(mut self, should_run: bool) -> Self {
        self.should_run = should_run;
        self
    }

    pub fn with_config_delay(mut self, delay: Duration) -> Self {
        self.config_delay = delay;
        self
    }

    pub fn failing_config_fetch(mut self) -> Self {
        self.fail_config_fetch = true;
        self
    }

    pub fn failing_set_up(mut self) -> Self {
        self.fail_set_up = true;
        self
    }

    pub fn failing_beacon_data(mut self) -> Self {
        self.fail_beacon_data = true;
        self
    }

    pub fn failing_tear_down(mut self) -> Self {
        self.fail_tear_down = true;
        self
    }

    pub fn fetch_task(self: &Arc<Self>, config: TestConfiguration) -> Arc<dyn Executable> {
        Arc::new(Fetch::new(self.clone(), config))
    }

    pub fn beacon_outcomes(&self) -> Vec<String> {
        self.beacon_outcomes.lock().unwrap().clone()
    }

    pub fn handled_errors(&self) -> Vec<KnownError> {
        self.handled_errors.lock().unwrap().clone()
    }

    pub fn last_timing_entry(&self) -> Option<ResourceTimingEntry> {
        self.last_timing_entry.lock().unwrap().clone()
    }

    pub fn last_response_status(&self) -> Option<u16> {
        *self.last_response_status.lock().unwrap()
    }
}

#[async_trait]
impl Provider for UnitTestProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn should_run(&self) -> bool {
        self.should_run
    }

    async fn fetch_session_config(&self) -> Result<SessionConfig> {
        tokio::time::sleep(self.config_delay).await;
        if self.fail_config_fetch {
            anyhow::bail!("config endpoint unavailable");
        }
        Ok(SessionConfig::new(json!({ "tests": self.tasks })))
    }

    fn set_session_config(&self, config: SessionConfig) {
        self.slot.set(config);
    }

    fn session_config(&self) -> Option<SessionConfig> {
        self.slot.get()
    }

    fn expand_tasks(self: Arc<Self>) -> Vec<Arc<dyn Executable>> {
        let configs: Vec<TestConfiguration> = self
            .session_config()
            .and_then(|config| serde_json::from_value(config.data["tests"].clone()).ok())
            .unwrap_or_default();
        configs
            .into_iter()
            .map(|config| self.fetch_task(config))
            .collect()
    }

    async fn test_set_up(&self, _config: &TestConfiguration) -> Result<TestSetupResult> {
        if self.fail_set_up {
            anyhow::bail!("set up failed");
        }
        let mut data = Map::new();
        data.insert("setup".to_string(), Value::from(self.name.as_str()));
        Ok(TestSetupResult { data })
    }

    async fn create_fetch_test_result(
        &self,
        timing_entry: ResourceTimingEntry,
        response: &ProbeResponse,
        config: &TestConfiguration,
        setup_result: TestSetupResult,
    ) -> Result<TestResultBundle> {
        *self.last_timing_entry.lock().unwrap() = Some(timing_entry);
        *self.last_response_status.lock().unwrap() = Some(response.status);

        let data: Vec<TestResult> = config
            .get("data")
            .and_then(|data| serde_json::from_value(data.clone()).ok())
            .unwrap_or_default();
        Ok(TestResultBundle::new(&config.test_type, data, setup_result))
    }

    fn make_beacon_data(
        &self,
        config: &TestConfiguration,
        bundle: &TestResultBundle,
    ) -> Result<BeaconData> {
        if self.fail_beacon_data {
            anyhow::bail!("cannot build beacon data");
        }
        let mut data = Map::new();
        data.insert("results".to_string(), Value::from(bundle.data.len()));
        Ok(BeaconData::new(BeaconState::Success, config).with_data(data))
    }

    fn make_beacon_url(&self, _config: &TestConfiguration) -> Result<Url> {
        match &self.beacon_url {
            Some(url) => Ok(Url::parse(url)?),
            None => anyhow::bail!("Method not implemented."),
        }
    }

    fn on_send_beacon_resolved(&self, _result: &SendBeaconResult) {
        self.beacon_outcomes.lock().unwrap().push("resolved".to_string());
    }

    fn on_send_beacon_rejected(&self, error: &anyhow::Error) {
        self.beacon_outcomes.lock().unwrap().push("rejected".to_string());
        self.handle_error(KnownError::SendBeacon, error);
    }

    fn handle_error(&self, kind: KnownError, error: &anyhow::Error) {
        log::warn!("[{}] {} error: {:#}", self.name, kind, error);
        self.handled_errors.lock().unwrap().push(kind);
    }

    async fn test_tear_down(&self, bundle: TestResultBundle) -> Result<TestResultBundle> {
        if self.fail_tear_down {
            anyhow::bail!("tear down failed");
        }
        Ok(bundle)
    }

    fn get_resource_url(&self, _config: &TestConfiguration) -> Result<Url> {
        Ok(Url::parse(&self.resource_url)?)
    }

    fn get_resource_request_headers(&self, _config: &TestConfiguration) -> Vec<HttpHeader> {
        self.request_headers.clone()
    }

    fn environment(&self) -> Arc<Environment> {
        self.env.clone()
    }
}
