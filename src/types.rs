use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A provider-defined record describing one test.
///
/// Only `type` is interpreted by the runner; every other field is carried
/// through untouched for the provider's own hooks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestConfiguration {
    #[serde(rename = "type")]
    pub test_type: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TestConfiguration {
    pub fn new(test_type: &str) -> Self {
        Self {
            test_type: test_type.to_string(),
            extra: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }
}

/// Data produced by a provider's setup hook and handed back to its later hooks.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TestSetupResult {
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// One provider-defined result record.
pub type TestResult = Map<String, Value>;

/// An HTTP request header as `(name, value)`.
pub type HttpHeader = (String, String);

/// Outcome flag carried in a beacon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BeaconState {
    Success,
    Failure,
    Unknown,
}

/// Payload reported to the collector for a single test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BeaconData {
    pub state: BeaconState,
    pub test_config: TestConfiguration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

impl BeaconData {
    pub fn new(state: BeaconState, test_config: &TestConfiguration) -> Self {
        Self {
            state,
            test_config: test_config.clone(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = Some(data);
        self
    }
}

/// Aggregate outcome of one test execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestResultBundle {
    #[serde(default)]
    pub provider_name: String,
    pub test_type: String,
    pub data: Vec<TestResult>,
    pub setup_result: TestSetupResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beacon_data: Option<BeaconData>,
}

impl TestResultBundle {
    pub fn new(test_type: &str, data: Vec<TestResult>, setup_result: TestSetupResult) -> Self {
        Self {
            provider_name: String::new(),
            test_type: test_type.to_string(),
            data,
            setup_result,
            beacon_data: None,
        }
    }

    /// Bundle returned when a test hits its error path: no results, no setup data.
    pub fn fallback(provider_name: &str, test_type: &str) -> Self {
        Self {
            provider_name: provider_name.to_string(),
            test_type: test_type.to_string(),
            ..Default::default()
        }
    }
}

/// Results of every task run in one session, in execution order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionResult {
    pub test_results: Vec<TestResultBundle>,
}
