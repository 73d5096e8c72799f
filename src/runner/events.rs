use super::state::SessionSummary;
use tokio::sync::broadcast;

/// Session execution events for real-time updates
#[derive(Debug, Clone)]
pub enum SessionEvent {
    // Session events
    SessionStarted {
        session_id: String,
        provider_count: usize,
    },
    SessionFinished {
        summary: SessionSummary,
    },

    // Provider events
    ProviderSkipped {
        provider: String,
    },
    ProviderConfigFailed {
        provider: String,
        error: String,
    },
    TasksExpanded {
        provider: String,
        count: usize,
    },

    // Test events
    TestStarted {
        test_id: String,
        provider: String,
        test_type: String,
    },
    TestFinished {
        test_id: String,
        provider: String,
        test_type: String,
        duration_ms: u64,
    },
    TestFailed {
        test_id: String,
        provider: String,
        test_type: String,
        error: String,
        duration_ms: u64,
    },

    // Beacon events
    BeaconSent {
        test_id: String,
        provider: String,
    },
    BeaconFailed {
        test_id: String,
        provider: String,
        error: String,
    },
}

/// Fans session events out to every subscriber.
///
/// Events emitted while nobody is subscribed are dropped. A subscriber more
/// than `capacity` events behind loses the oldest ones.
pub struct EventEmitter {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventEmitter {
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn emit(&self, event: SessionEvent) {
        if self.sender.send(event).is_err() {
            log::trace!("Session event dropped, no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::time::Duration as StdDuration;

/// Console event listener for printing real-time updates
pub struct ConsoleEventListener;

impl ConsoleEventListener {
    /// Print events until the session finishes or the emitter is dropped.
    pub async fn listen(mut receiver: broadcast::Receiver<SessionEvent>) {
        use colored::Colorize;
        use indicatif::ProgressDrawTarget;
        use std::io::IsTerminal;

        // Piped output gets no spinners, only the final lines
        let multi = if std::io::stdout().is_terminal() {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };

        // Running tests by id; several run at once under a parallel session process
        let mut spinners: HashMap<String, (ProgressBar, String)> = HashMap::new();

        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            };
            match event {
                SessionEvent::SessionStarted {
                    session_id,
                    provider_count,
                } => {
                    multi
                        .println(format!(
                            "\n{} Session started: {} ({} providers)",
                            "▶".green().bold(),
                            session_id.cyan(),
                            provider_count
                        ))
                        .ok();
                }

                SessionEvent::SessionFinished { summary } => {
                    for (_, (pb, _)) in spinners.drain() {
                        pb.finish();
                    }

                    println!("\n{} Session finished", "■".blue().bold());
                    println!(
                        "  Providers: {} active of {}, {} failed to configure",
                        summary.providers_active,
                        summary.providers_total,
                        summary.providers_failed.to_string().red()
                    );
                    println!(
                        "  {} results from {} tasks",
                        summary.results.to_string().green(),
                        summary.tasks
                    );
                    if let Some(duration) = summary.total_duration_ms {
                        println!("  Duration: {}ms", duration);
                    }
                    break;
                }

                SessionEvent::ProviderSkipped { provider } => {
                    multi
                        .println(format!("  {} {} (not running)", "○".yellow(), provider))
                        .ok();
                }

                SessionEvent::ProviderConfigFailed { provider, error } => {
                    multi
                        .println(format!(
                            "  {} {} config failed: {}",
                            "✗".red(),
                            provider,
                            error.dimmed()
                        ))
                        .ok();
                }

                SessionEvent::TasksExpanded { provider, count } => {
                    multi
                        .println(format!(
                            "  {} {} ({} tasks)",
                            "→".blue(),
                            provider.white().bold(),
                            count
                        ))
                        .ok();
                }

                SessionEvent::TestStarted {
                    test_id,
                    provider,
                    test_type,
                } => {
                    let pb = multi.add(ProgressBar::new_spinner());
                    if let Ok(style) = ProgressStyle::default_spinner()
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                        .template("    {spinner} {msg}")
                    {
                        pb.set_style(style);
                    }
                    let body = format!("[{}] {}... ", provider, test_type.dimmed());
                    pb.set_message(body.clone());
                    pb.enable_steady_tick(StdDuration::from_millis(100));
                    spinners.insert(test_id, (pb, body));
                }

                SessionEvent::TestFinished {
                    test_id,
                    duration_ms,
                    ..
                } => {
                    if let Some((pb, body)) = spinners.remove(&test_id) {
                        pb.finish_and_clear();
                        println!("    {} {}({}ms)", "✓".green(), body, duration_ms);
                    }
                }

                SessionEvent::TestFailed {
                    test_id,
                    error,
                    duration_ms,
                    ..
                } => {
                    if let Some((pb, body)) = spinners.remove(&test_id) {
                        pb.finish_and_clear();
                        println!(
                            "    {} {}({}ms) {}",
                            "✗".red(),
                            body,
                            duration_ms,
                            error.dimmed()
                        );
                    }
                }

                SessionEvent::BeaconSent { provider, .. } => {
                    log::debug!("Beacon sent for {}", provider);
                }

                SessionEvent::BeaconFailed {
                    provider, error, ..
                } => {
                    multi
                        .println(format!(
                            "    {} beacon for {} failed: {}",
                            "!".yellow(),
                            provider,
                            error.dimmed()
                        ))
                        .ok();
                }
            }
        }
    }
}
