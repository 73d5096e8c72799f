use anyhow::Result;
use reqwest::Url;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::transport::{HttpTransport, ProbeRequest, ProbeResponse};
use crate::environment::Environment;

#[derive(Debug, Error)]
pub enum BeaconError {
    #[error("sendBeacon failed")]
    Refused,

    #[error("beacon queue closed")]
    QueueClosed,
}

/// How a beacon left the client.
#[derive(Debug, Clone)]
pub enum SendBeaconResult {
    /// Handed to the background queue; delivery is not observed.
    Queued,
    /// Posted directly; the collector's response.
    Response(ProbeResponse),
}

struct QueuedBeacon {
    url: Url,
    body: String,
}

enum QueueState {
    Idle,
    Running {
        sender: mpsc::Sender<QueuedBeacon>,
        worker: JoinHandle<()>,
    },
    Closed,
}

/// Background beacon delivery, the analogue of a browser's beacon API:
/// `queue` returns immediately and reports only whether the beacon was accepted.
///
/// The delivery worker starts on the runtime of the first `queue` call. If
/// that runtime shuts down the worker goes with it, and the next `queue`
/// starts a fresh one on the caller's runtime. Only [`BeaconQueue::close`]
/// stops the queue for good.
pub struct BeaconQueue {
    transport: Arc<dyn HttpTransport>,
    capacity: usize,
    state: Mutex<QueueState>,
}

impl BeaconQueue {
    pub fn new(transport: Arc<dyn HttpTransport>, capacity: usize) -> Self {
        Self {
            transport,
            capacity: capacity.max(1),
            state: Mutex::new(QueueState::Idle),
        }
    }

    fn start_worker(&self) -> (mpsc::Sender<QueuedBeacon>, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<QueuedBeacon>(self.capacity);
        let transport = self.transport.clone();
        let worker = tokio::spawn(async move {
            while let Some(beacon) = receiver.recv().await {
                let url = beacon.url.clone();
                match transport
                    .fetch(ProbeRequest::post(beacon.url, beacon.body))
                    .await
                {
                    Ok(res) if res.ok() => log::debug!("Beacon delivered to {}", url),
                    Ok(res) => log::warn!("Beacon to {} answered {}", url, res.status),
                    Err(e) => log::warn!("Beacon to {} failed: {:#}", url, e),
                }
            }
        });
        (sender, worker)
    }

    /// Hand a beacon to the worker without waiting. A full queue refuses it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn queue(&self, url: Url, body: String) -> Result<(), BeaconError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let worker_gone = match &*state {
            QueueState::Closed => return Err(BeaconError::QueueClosed),
            QueueState::Idle => true,
            QueueState::Running { sender, .. } => {
                if sender.is_closed() {
                    log::debug!("Beacon worker stopped with its runtime, restarting");
                }
                sender.is_closed()
            }
        };
        if worker_gone {
            let (sender, worker) = self.start_worker();
            *state = QueueState::Running { sender, worker };
        }

        let QueueState::Running { sender, .. } = &*state else {
            return Err(BeaconError::QueueClosed);
        };
        sender
            .try_send(QueuedBeacon { url, body })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => BeaconError::Refused,
                mpsc::error::TrySendError::Closed(_) => BeaconError::QueueClosed,
            })
    }

    /// Stop accepting beacons and wait until the queued ones are delivered.
    pub async fn close(&self) {
        let previous = std::mem::replace(
            &mut *self.state.lock().unwrap_or_else(|e| e.into_inner()),
            QueueState::Closed,
        );
        if let QueueState::Running { sender, worker } = previous {
            drop(sender);
            if let Err(e) = worker.await {
                log::warn!("Beacon worker stopped abnormally: {}", e);
            }
        }
    }
}

/// Send beacon data to `url`.
///
/// Uses the environment's beacon queue when it has one. A refused beacon is
/// not retried over a direct POST, as that could report it twice. Without a
/// queue the body is POSTed and the response returned.
pub async fn send(env: &Environment, url: Url, body: String) -> Result<SendBeaconResult> {
    if let Some(queue) = env.beacon_queue() {
        queue.queue(url, body)?;
        return Ok(SendBeaconResult::Queued);
    }
    let response = env.transport.fetch(ProbeRequest::post(url, body)).await?;
    Ok(SendBeaconResult::Response(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::RecordingTransport;
    use crate::utils::config::Config;
    use std::time::Duration;

    #[tokio::test]
    async fn test_send_without_queue_posts() {
        let transport = Arc::new(RecordingTransport::default());
        let env = Environment::new(Config::default(), transport.clone());
        let url = Url::parse("https://collector.test/beacon").unwrap();

        let result = send(&env, url.clone(), "some data".to_string())
            .await
            .unwrap();
        assert!(matches!(result, SendBeaconResult::Response(_)));

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, reqwest::Method::POST);
        assert_eq!(requests[0].url, url);
        assert_eq!(requests[0].body.as_deref(), Some("some data"));
    }

    #[tokio::test]
    async fn test_send_with_queue_delivers_in_background() {
        let transport = Arc::new(RecordingTransport::default());
        let env = Environment::new(Config::default(), transport.clone())
            .with_beacon_queue(BeaconQueue::new(transport.clone(), 4));
        let url = Url::parse("https://collector.test/beacon").unwrap();

        let result = send(&env, url, "queued".to_string()).await.unwrap();
        assert!(matches!(result, SendBeaconResult::Queued));

        for _ in 0..50 {
            if !transport.requests().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(transport.requests()[0].body.as_deref(), Some("queued"));
    }

    #[tokio::test]
    async fn test_close_drains_then_refuses() {
        let transport = Arc::new(RecordingTransport::default());
        let queue = BeaconQueue::new(transport.clone(), 4);
        let url = Url::parse("https://collector.test/beacon").unwrap();

        queue.queue(url.clone(), "first".to_string()).unwrap();
        queue.queue(url.clone(), "second".to_string()).unwrap();
        queue.close().await;

        let bodies: Vec<Option<String>> =
            transport.requests().into_iter().map(|r| r.body).collect();
        assert_eq!(bodies, vec![Some("first".to_string()), Some("second".to_string())]);
        assert!(matches!(
            queue.queue(url, "late".to_string()),
            Err(BeaconError::QueueClosed)
        ));
    }

    #[test]
    fn test_queue_outlives_the_runtime_that_started_it() {
        let transport = Arc::new(RecordingTransport::default());
        let queue = BeaconQueue::new(transport.clone(), 4);
        let url = Url::parse("https://collector.test/beacon").unwrap();

        let first = tokio::runtime::Runtime::new().unwrap();
        first.block_on(async {
            queue.queue(url.clone(), "first".to_string()).unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        });
        drop(first);

        let second = tokio::runtime::Runtime::new().unwrap();
        second.block_on(async {
            queue.queue(url.clone(), "second".to_string()).unwrap();
            queue.close().await;
        });

        let bodies: Vec<Option<String>> =
            transport.requests().into_iter().map(|r| r.body).collect();
        assert_eq!(bodies, vec![Some("first".to_string()), Some("second".to_string())]);
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_send() {
        let transport = Arc::new(RecordingTransport::default());
        let env = Environment::new(Config::default(), transport.clone())
            .with_beacon_queue(BeaconQueue::new(transport.clone(), 4));
        env.beacon_queue().unwrap().close().await;

        let url = Url::parse("https://collector.test/beacon").unwrap();
        let err = send(&env, url, "x".to_string()).await.unwrap_err();
        assert!(err.to_string().contains("closed"));
        assert!(transport.requests().is_empty());
    }
}
