use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

use super::types::SessionFile;

/// Parse a YAML session file
pub fn parse_session_file(path: &Path) -> Result<SessionFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    parse_yaml_content(&content)
        .with_context(|| format!("Invalid session file: {}", path.display()))
}

/// Parse YAML content into a SessionFile
pub fn parse_yaml_content(content: &str) -> Result<SessionFile> {
    let session: SessionFile =
        serde_yaml::from_str(content).context("Failed to parse session YAML")?;

    let mut seen = HashSet::new();
    for provider in &session.providers {
        if provider.name.trim().is_empty() {
            anyhow::bail!("Provider name must not be empty");
        }
        if !seen.insert(provider.name.as_str()) {
            anyhow::bail!("Duplicate provider name: {}", provider.name);
        }
        for (i, test) in provider.tests.iter().enumerate() {
            if test.test_type == "fetch" && test.get_str("url").is_none() {
                anyhow::bail!(
                    "Test {} of provider {} is a fetch test without a url",
                    i,
                    provider.name
                );
            }
        }
    }

    Ok(session)
}
