use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;
use std::time::Duration;

use super::test::{Probe, Test};
use crate::net::ProbeRequest;
use crate::provider::{KnownError, Provider};
use crate::timing::{async_get_entry, default_entry_predicate, normalize_entry, EntryPredicate};
use crate::types::{HttpHeader, TestConfiguration, TestResultBundle, TestSetupResult};

/// A fetch test: request a resource and read back its timing entry.
pub type Fetch = Test<FetchProbe>;

/// Probe that requests the provider's resource URL while observing the
/// timeline for the matching resource timing entry.
pub struct FetchProbe {
    timeout: Duration,
    is_valid_entry: EntryPredicate,
}

impl FetchProbe {
    pub fn new(timeout: Duration, is_valid_entry: EntryPredicate) -> Self {
        Self {
            timeout,
            is_valid_entry,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Fetch {
    /// A fetch test using the environment's timing timeout and the default
    /// entry validity rule.
    pub fn new(provider: Arc<dyn Provider>, config: TestConfiguration) -> Self {
        let timeout = provider.environment().config.resource_timing_timeout();
        Self::with_options(provider, config, timeout, default_entry_predicate())
    }

    pub fn with_options(
        provider: Arc<dyn Provider>,
        config: TestConfiguration,
        timeout: Duration,
        is_valid_entry: EntryPredicate,
    ) -> Self {
        Test::with_probe(provider, config, FetchProbe::new(timeout, is_valid_entry))
    }
}

/// Build request headers, joining repeated names with "," in order of appearance.
pub fn build_headers(headers: &[HttpHeader]) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("Invalid header name: {}", name))?;
        let joined = match map.get(&name).and_then(|v| v.to_str().ok()) {
            Some(existing) => format!("{},{}", existing, value),
            None => value.clone(),
        };
        let value = HeaderValue::from_str(&joined)
            .with_context(|| format!("Invalid value for header {}", name))?;
        map.insert(name, value);
    }
    Ok(map)
}

#[async_trait]
impl Probe for FetchProbe {
    async fn test(
        &self,
        provider: &Arc<dyn Provider>,
        config: &TestConfiguration,
        setup_result: TestSetupResult,
    ) -> Result<TestResultBundle> {
        let env = provider.environment();
        let url = provider.get_resource_url(config)?;
        let headers = build_headers(&provider.get_resource_request_headers(config))?;

        // Registered before the request goes out.
        let timing = async_get_entry(
            &env.timeline,
            url.as_str(),
            self.timeout,
            self.is_valid_entry.clone(),
        );
        let request = ProbeRequest::get(url).with_headers(headers);

        let fetch = async {
            env.transport.fetch(request).await.map_err(|e| {
                provider.handle_error(KnownError::TestResourceFetch, &e);
                e
            })
        };
        let timing = async { timing.await.map_err(anyhow::Error::from) };

        let (response, entry) = tokio::try_join!(fetch, timing)?;
        provider
            .create_fetch_test_result(normalize_entry(&entry), &response, config, setup_result)
            .await
    }
}
