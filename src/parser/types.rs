use serde::{Deserialize, Serialize};

use crate::types::{HttpHeader, TestConfiguration};
use crate::utils::config::Config;

/// A session file: client configuration plus the providers to run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionFile {
    #[serde(default)]
    pub config: Config,
    #[serde(default)]
    pub providers: Vec<ProviderSpec>,
}

/// One provider as declared in a session file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderSpec {
    pub name: String,

    #[serde(default = "default_should_run", alias = "shouldRun")]
    pub should_run: bool,

    /// Collector the provider's beacons are sent to
    #[serde(default, alias = "beaconUrl")]
    pub beacon_url: Option<String>,

    /// Endpoint returning the session config as JSON; replaces `tests`
    #[serde(default, alias = "configUrl")]
    pub config_url: Option<String>,

    /// Headers sent with every test request
    #[serde(default)]
    pub headers: Vec<HeaderSpec>,

    #[serde(default)]
    pub tests: Vec<TestConfiguration>,
}

fn default_should_run() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeaderSpec {
    pub name: String,
    pub value: String,
}

impl From<&HeaderSpec> for HttpHeader {
    fn from(header: &HeaderSpec) -> Self {
        (header.name.clone(), header.value.clone())
    }
}
