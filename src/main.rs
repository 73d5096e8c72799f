use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use rum_probe::provider::ConfiguredProvider;
use rum_probe::report::{self, SessionReport};
use rum_probe::runner::{self, ConsoleEventListener};
use rum_probe::utils::config::Config;
use rum_probe::{parser, ClientSettingsBuilder, Environment};

#[derive(Parser)]
#[command(name = "rum-probe")]
#[command(version = "0.1.0")]
#[command(about = "Real user monitoring probes from the command line", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the providers declared in a session file
    Run {
        /// Path to the session YAML file
        path: PathBuf,

        /// Write the session report as JSON to this path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Client configuration YAML, replacing the session file's `config`
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Run all tasks concurrently instead of one at a time
        #[arg(long, default_value = "false", conflicts_with = "sequential")]
        parallel: bool,

        /// Run tasks one at a time, even if the config sets `parallel`
        #[arg(long, default_value = "false")]
        sequential: bool,
    },

    /// Print a saved session report
    Report {
        /// Path to a report JSON written by `run --output`
        results: PathBuf,

        /// Re-write the report to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            path,
            output,
            config,
            parallel,
            sequential,
        } => {
            println!(
                "{} Running session from: {}",
                "▶".green().bold(),
                path.display()
            );
            let mut session = parser::parse_session_file(&path)?;
            if let Some(config_path) = config {
                session.config = Config::load(&config_path)?;
                println!("  Config: {}", config_path.display().to_string().cyan());
            }
            let parallel = run_parallel(&session.config, parallel, sequential);
            if parallel {
                println!("  Parallel: {}", "Enabled".yellow());
            }

            let env = Arc::new(Environment::detect(session.config.clone()));
            if Environment::install_global(env.clone()).is_err() {
                log::warn!("Global environment already installed");
            }

            let mut builder = ClientSettingsBuilder::new();
            builder.set_environment(env.clone());
            if let Some(delay) = session.config.pre_config_start_delay() {
                builder.set_pre_config_start_delay(delay);
            }
            if parallel {
                builder.set_session_process(runner::parallel_session_process());
            }
            for spec in session.providers {
                builder.add_provider(Arc::new(ConfiguredProvider::new(spec, env.clone())));
            }

            let listener = tokio::spawn(ConsoleEventListener::listen(env.events.subscribe()));
            let result = runner::init(builder.to_settings()).await;
            env.flush_beacons().await;
            if let Err(e) = listener.await {
                log::warn!("Event listener stopped: {}", e);
            }

            let report = SessionReport::new(result);
            report::print_summary(&report);
            if let Some(path) = output {
                report::json::generate(&report, Some(&path))?;
                println!("  Report: {}", path.display().to_string().cyan());
            }
        }

        Commands::Report { results, output } => {
            println!(
                "{} Reading report from: {}",
                "📊".to_string().blue(),
                results.display()
            );
            report::generate_report(&results, output.as_deref())?;
        }
    }

    Ok(())
}

/// Command-line flags win over the config's `parallel` default.
fn run_parallel(config: &Config, parallel: bool, sequential: bool) -> bool {
    if sequential {
        false
    } else {
        parallel || config.parallel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_overrides_config() {
        let config = Config {
            parallel: true,
            ..Config::default()
        };
        assert!(run_parallel(&config, false, false));
        assert!(!run_parallel(&config, false, true));
        assert!(run_parallel(&Config::default(), true, false));
        assert!(!run_parallel(&Config::default(), false, false));
    }

    #[test]
    fn test_parallel_and_sequential_conflict() {
        let parsed = Cli::try_parse_from(["rum-probe", "run", "s.yaml", "--parallel", "--sequential"]);
        assert!(parsed.is_err());
    }
}
