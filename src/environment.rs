//! Process-wide client environment.
//!
//! Bundles the performance timeline, the HTTP transport, the optional beacon
//! queue and the event emitter. Capabilities are settled once, when the
//! environment is built; nothing probes for them afterwards. Providers reach
//! the environment through [`Provider::environment`](crate::provider::Provider::environment),
//! which tests override to inject their own.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::Notify;

use crate::net::{BeaconQueue, HttpTransport, NetworkTransport};
use crate::runner::events::EventEmitter;
use crate::timing::PerformanceTimeline;
use crate::utils::config::Config;

static GLOBAL: OnceLock<Arc<Environment>> = OnceLock::new();

pub struct Environment {
    pub config: Config,
    pub timeline: PerformanceTimeline,
    pub transport: Arc<dyn HttpTransport>,
    pub events: EventEmitter,
    beacon_queue: Option<BeaconQueue>,
    beacons_in_flight: AtomicUsize,
    beacons_idle: Notify,
}

/// Marks a beacon dispatch as in flight until dropped.
pub struct BeaconTicket {
    env: Arc<Environment>,
}

impl Drop for BeaconTicket {
    fn drop(&mut self) {
        if self.env.beacons_in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.env.beacons_idle.notify_waiters();
        }
    }
}

impl Environment {
    /// An environment with its own timeline and no beacon support.
    pub fn new(config: Config, transport: Arc<dyn HttpTransport>) -> Self {
        let timeline = PerformanceTimeline::new(&config.supported_entry_types);
        Self::with_timeline(config, timeline, transport)
    }

    pub fn with_timeline(
        config: Config,
        timeline: PerformanceTimeline,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let events = EventEmitter::with_capacity(config.event_backlog);
        Self {
            config,
            timeline,
            transport,
            events,
            beacon_queue: None,
            beacons_in_flight: AtomicUsize::new(0),
            beacons_idle: Notify::new(),
        }
    }

    pub fn with_beacon_queue(mut self, queue: BeaconQueue) -> Self {
        self.beacon_queue = Some(queue);
        self
    }

    /// Build the default environment: a reqwest transport recording into a
    /// fresh timeline, plus a beacon queue delivering through it.
    pub fn detect(config: Config) -> Self {
        let timeline = PerformanceTimeline::new(&config.supported_entry_types);
        let transport: Arc<dyn HttpTransport> =
            Arc::new(NetworkTransport::new(timeline.clone(), config.request_timeout()));
        let queue = BeaconQueue::new(transport.clone(), config.beacon_queue_capacity);
        log::debug!("Environment detected");
        Self::with_timeline(config, timeline, transport).with_beacon_queue(queue)
    }

    pub fn has_beacon_support(&self) -> bool {
        self.beacon_queue.is_some()
    }

    pub fn beacon_queue(&self) -> Option<&BeaconQueue> {
        self.beacon_queue.as_ref()
    }

    /// Register a beacon dispatch; [`Environment::flush_beacons`] waits for
    /// the returned ticket to be dropped.
    pub fn track_beacon(self: &Arc<Self>) -> BeaconTicket {
        self.beacons_in_flight.fetch_add(1, Ordering::SeqCst);
        BeaconTicket { env: self.clone() }
    }

    /// Wait for every tracked beacon dispatch, then close the beacon queue
    /// once it has delivered what it holds.
    pub async fn flush_beacons(&self) {
        loop {
            let idle = self.beacons_idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if self.beacons_in_flight.load(Ordering::SeqCst) == 0 {
                break;
            }
            idle.await;
        }
        if let Some(queue) = &self.beacon_queue {
            queue.close().await;
        }
    }

    /// The shared environment, detected with default configuration on first use.
    pub fn global() -> Arc<Environment> {
        GLOBAL
            .get_or_init(|| Arc::new(Environment::detect(Config::default())))
            .clone()
    }

    /// Install `env` as the shared environment. Fails with the given
    /// environment if one was already installed or detected.
    pub fn install_global(env: Arc<Environment>) -> Result<(), Arc<Environment>> {
        GLOBAL.set(env)
    }
}
