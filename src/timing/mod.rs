//! Performance timeline and resource timing acquisition.
//!
//! The timeline is a shared, append-only buffer of [`PerformanceEntry`]
//! records. Whatever performs network activity (the HTTP transport, or a
//! host embedding this crate) records entries into it; observers registered
//! through [`PerformanceTimeline::observe`] receive every batch recorded after
//! registration.

pub mod acquire;
pub mod entry;

pub use acquire::async_get_entry;
pub use entry::*;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::broadcast;

/// Batches an observer can fall behind by before it starts losing them.
const OBSERVER_BACKLOG: usize = 256;

#[derive(Debug, Error)]
pub enum TimingError {
    #[error("Timed out observing resource timing ({name})")]
    Timeout { name: String },

    #[error("None of the entry types {0:?} can be observed")]
    UnsupportedEntryType(Vec<String>),

    #[error("Performance timeline closed")]
    Closed,
}

struct TimelineBuffer {
    entries: Vec<PerformanceEntry>,
    /// Entries removed by `clear`, so positions stay absolute.
    base: usize,
}

impl TimelineBuffer {
    fn end(&self) -> usize {
        self.base + self.entries.len()
    }

    /// Entries at absolute positions `from..`.
    fn since(&self, from: usize) -> &[PerformanceEntry] {
        let offset = from.saturating_sub(self.base).min(self.entries.len());
        &self.entries[offset..]
    }
}

/// A recorded batch and the absolute buffer position of its first entry.
struct RecordedBatch {
    start: usize,
    entries: Vec<PerformanceEntry>,
}

struct TimelineInner {
    origin: Instant,
    buffer: Mutex<TimelineBuffer>,
    sender: broadcast::Sender<Arc<RecordedBatch>>,
    supported_entry_types: Vec<String>,
}

impl TimelineInner {
    fn buffer(&self) -> MutexGuard<'_, TimelineBuffer> {
        self.buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Handle to a shared performance timeline. Clones refer to the same buffer.
#[derive(Clone)]
pub struct PerformanceTimeline {
    inner: Arc<TimelineInner>,
}

impl PerformanceTimeline {
    pub fn new(supported_entry_types: &[String]) -> Self {
        let (sender, _) = broadcast::channel(OBSERVER_BACKLOG);
        Self {
            inner: Arc::new(TimelineInner {
                origin: Instant::now(),
                buffer: Mutex::new(TimelineBuffer {
                    entries: Vec::new(),
                    base: 0,
                }),
                sender,
                supported_entry_types: supported_entry_types.to_vec(),
            }),
        }
    }

    /// Milliseconds elapsed since the timeline was created.
    pub fn now(&self) -> f64 {
        self.inner.origin.elapsed().as_secs_f64() * 1000.0
    }

    /// Milliseconds between the timeline origin and `instant`.
    pub fn timestamp(&self, instant: Instant) -> f64 {
        instant
            .saturating_duration_since(self.inner.origin)
            .as_secs_f64()
            * 1000.0
    }

    /// Append entries and deliver them to current observers as one batch.
    pub fn record(&self, entries: Vec<PerformanceEntry>) {
        if entries.is_empty() {
            return;
        }
        // Sent under the lock so batch positions arrive in buffer order.
        let mut buffer = self.inner.buffer();
        let start = buffer.end();
        buffer.entries.extend(entries.iter().cloned());
        // No receivers simply means nobody is observing right now.
        let _ = self
            .inner
            .sender
            .send(Arc::new(RecordedBatch { start, entries }));
    }

    pub fn entries(&self) -> Vec<PerformanceEntry> {
        self.inner.buffer().entries.clone()
    }

    pub fn entries_by_name(&self, name: &str) -> Vec<PerformanceEntry> {
        self.inner
            .buffer()
            .entries
            .iter()
            .filter(|e| e.name() == name)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        let mut buffer = self.inner.buffer();
        buffer.base += buffer.entries.len();
        buffer.entries.clear();
    }

    /// Register an observer for the given entry types.
    ///
    /// Types the timeline does not support are ignored; if none are left the
    /// registration fails. Dropping the observer disconnects it.
    pub fn observe(&self, entry_types: &[&str]) -> Result<PerformanceObserver, TimingError> {
        let types: Vec<String> = entry_types
            .iter()
            .filter(|t| self.inner.supported_entry_types.iter().any(|s| s == *t))
            .map(|t| t.to_string())
            .collect();
        if types.is_empty() {
            return Err(TimingError::UnsupportedEntryType(
                entry_types.iter().map(|t| t.to_string()).collect(),
            ));
        }
        let buffer = self.inner.buffer();
        Ok(PerformanceObserver {
            receiver: self.inner.sender.subscribe(),
            cursor: buffer.end(),
            timeline: self.inner.clone(),
            entry_types: types,
        })
    }
}

impl Default for PerformanceTimeline {
    fn default() -> Self {
        Self::new(&crate::utils::config::Config::default().supported_entry_types)
    }
}

/// Receives batches of entries recorded after registration.
///
/// The observer keeps its position in the timeline buffer. If it falls more
/// than the channel backlog behind, the missed entries are read back from the
/// buffer instead of being lost.
pub struct PerformanceObserver {
    receiver: broadcast::Receiver<Arc<RecordedBatch>>,
    cursor: usize,
    timeline: Arc<TimelineInner>,
    entry_types: Vec<String>,
}

impl PerformanceObserver {
    fn observed<'a>(
        &'a self,
        entries: impl IntoIterator<Item = &'a PerformanceEntry>,
    ) -> Vec<PerformanceEntry> {
        entries
            .into_iter()
            .filter(|e| self.entry_types.iter().any(|t| t == e.entry_type()))
            .cloned()
            .collect()
    }

    /// Wait for the next batch that contains at least one observed entry.
    pub async fn next_batch(&mut self) -> Result<PerformanceObserverEntryList, TimingError> {
        loop {
            let entries = match self.receiver.recv().await {
                Ok(batch) => {
                    let end = batch.start + batch.entries.len();
                    if end <= self.cursor {
                        // Already read back from the buffer.
                        continue;
                    }
                    let skip = self.cursor.saturating_sub(batch.start);
                    self.cursor = end;
                    self.observed(&batch.entries[skip..])
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::debug!(
                        "Performance observer lagged by {} batches, reading back from buffer",
                        skipped
                    );
                    let (missed, end) = {
                        let buffer = self.timeline.buffer();
                        (buffer.since(self.cursor).to_vec(), buffer.end())
                    };
                    self.cursor = end;
                    self.observed(&missed)
                }
                Err(broadcast::error::RecvError::Closed) => return Err(TimingError::Closed),
            };
            if !entries.is_empty() {
                return Ok(PerformanceObserverEntryList { entries });
            }
        }
    }
}

/// One batch delivered to an observer, in arrival order.
#[derive(Debug, Clone)]
pub struct PerformanceObserverEntryList {
    entries: Vec<PerformanceEntry>,
}

impl PerformanceObserverEntryList {
    pub fn get_entries(&self) -> &[PerformanceEntry] {
        &self.entries
    }

    pub fn get_entries_by_name<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a PerformanceEntry> + 'a {
        self.entries.iter().filter(move |e| e.name() == name)
    }
}
