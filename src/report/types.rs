use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::SessionResult;

/// A finished session as saved by `rum-probe run`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub session_id: String,
    pub generated_at: String,
    pub summary: ReportSummary,
    pub results: SessionResult,
}

/// Counts derived from a session's bundles.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub tests: usize,
    /// Bundles carrying at least one result record
    pub measured: usize,
    /// Fallback bundles, i.e. tests that hit their error path
    pub empty: usize,
    pub beacons: usize,
    pub by_provider: BTreeMap<String, ProviderSummary>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSummary {
    pub tests: usize,
    pub measured: usize,
}

impl SessionReport {
    pub fn new(results: SessionResult) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            summary: ReportSummary::from_results(&results),
            results,
        }
    }
}

impl ReportSummary {
    pub fn from_results(results: &SessionResult) -> Self {
        let mut summary = ReportSummary::default();
        for bundle in &results.test_results {
            let measured = !bundle.data.is_empty();
            summary.tests += 1;
            if measured {
                summary.measured += 1;
            } else {
                summary.empty += 1;
            }
            if bundle.beacon_data.is_some() {
                summary.beacons += 1;
            }

            let provider = summary
                .by_provider
                .entry(bundle.provider_name.clone())
                .or_default();
            provider.tests += 1;
            if measured {
                provider.measured += 1;
            }
        }
        summary
    }
}
