pub mod json;
pub mod types;

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

pub use types::{ProviderSummary, ReportSummary, SessionReport};

/// Print a saved report's summary and, when `output` is given, re-write it there.
pub fn generate_report(results_path: &Path, output: Option<&Path>) -> Result<()> {
    let report = json::load(results_path)?;
    print_summary(&report);
    if let Some(path) = output {
        json::generate(&report, Some(path))?;
    }
    Ok(())
}

pub fn print_summary(report: &SessionReport) {
    let summary = &report.summary;
    println!(
        "\n{} Session {} ({})",
        "■".cyan(),
        report.session_id.cyan(),
        report.generated_at.dimmed()
    );
    println!(
        "  {} tests: {} measured, {} empty, {} beacons",
        summary.tests,
        summary.measured.to_string().green(),
        if summary.empty > 0 {
            summary.empty.to_string().red()
        } else {
            summary.empty.to_string().normal()
        },
        summary.beacons
    );
    for (provider, counts) in &summary.by_provider {
        println!(
            "    {} {}/{}",
            provider.white().bold(),
            counts.measured,
            counts.tests
        );
    }
}
