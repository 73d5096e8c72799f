use std::future::Future;
use std::time::Duration;

use super::entry::{EntryPredicate, PerformanceEntry, RESOURCE};
use super::{PerformanceTimeline, TimingError};

/// Wait for a valid resource timing entry named `name`.
///
/// The observer is registered when this function is called, not when the
/// returned future is first polled, so a request issued right after the call
/// cannot slip past it. The future resolves with the first entry (in arrival
/// order) accepted by `is_valid_entry`, or fails once `timeout` elapses.
/// Registration failures surface from the future without waiting.
///
/// Both the observer and the timer live inside the future: whichever side
/// finishes first, or the caller dropping the future, disposes of both.
pub fn async_get_entry(
    timeline: &PerformanceTimeline,
    name: &str,
    timeout: Duration,
    is_valid_entry: EntryPredicate,
) -> impl Future<Output = Result<PerformanceEntry, TimingError>> + Send + 'static {
    let registration = timeline.observe(&[RESOURCE]);
    let name = name.to_string();

    async move {
        let mut observer = registration?;

        let watch = async {
            loop {
                let list = observer.next_batch().await?;
                let found = list
                    .get_entries_by_name(&name)
                    .find(|entry| is_valid_entry(*entry))
                    .cloned();
                if let Some(entry) = found {
                    return Ok::<_, TimingError>(entry);
                }
                log::debug!("No valid timing entry for {} in batch, still observing", name);
            }
        };

        match tokio::time::timeout(timeout, watch).await {
            Ok(result) => result,
            Err(_) => {
                log::debug!("Gave up observing {} after {:?}", name, timeout);
                Err(TimingError::Timeout { name: name.clone() })
            }
        }
    }
}
