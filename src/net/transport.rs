use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio_rustls::TlsConnector;

use super::connection::{timed_exchange, tls_connector, PhaseTimings, HTTP_1_1};
use crate::timing::{PerformanceEntry, PerformanceTimeline, RESOURCE};

/// An outgoing request issued by a probe or a beacon.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<String>,
}

impl ProbeRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn post(url: Url, body: String) -> Self {
        Self {
            method: Method::POST,
            url,
            headers: HeaderMap::new(),
            body: Some(body),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// A fully read response.
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub url: Url,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ProbeResponse {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .with_context(|| format!("Response from {} is not valid JSON", self.url))
    }
}

/// Network access used by fetch tests and beacons.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Perform the request and read the whole body.
    async fn fetch(&self, request: ProbeRequest) -> Result<ProbeResponse>;
}

/// The default [`HttpTransport`].
///
/// GET requests are resource loads: each runs on a fresh connection whose
/// lookup, connect and TLS phases are timed on the socket that carries it, and
/// records a `resource` entry into the timeline once the body has been read.
/// Other requests (beacons) go through reqwest and record nothing.
pub struct NetworkTransport {
    timeline: PerformanceTimeline,
    timeout: Duration,
    tls: TlsConnector,
}

impl NetworkTransport {
    pub fn new(timeline: PerformanceTimeline, timeout: Duration) -> Self {
        Self {
            timeline,
            timeout,
            tls: tls_connector(),
        }
    }

    async fn load_resource(&self, request: ProbeRequest) -> Result<ProbeResponse> {
        let url = request.url.clone();
        let (response, phases) = tokio::time::timeout(
            self.timeout,
            timed_exchange(&self.tls, request),
        )
        .await
        .with_context(|| format!("Timed out loading {}", url))??;
        self.timeline
            .record(vec![self.resource_entry(&response, &phases)]);
        Ok(response)
    }

    fn resource_entry(&self, response: &ProbeResponse, phases: &PhaseTimings) -> PerformanceEntry {
        let ts = |instant: Instant| self.timeline.timestamp(instant);
        let header_size: usize = response
            .headers
            .iter()
            .map(|(k, v)| k.as_str().len() + v.as_bytes().len() + 4)
            .sum();
        let body_size = response.body.len() as u64;

        PerformanceEntry::new(response.url.as_str(), RESOURCE)
            .with("initiatorType", "fetch")
            .with("nextHopProtocol", HTTP_1_1)
            .with("startTime", ts(phases.fetch_start))
            .with("duration", ts(phases.response_end) - ts(phases.fetch_start))
            .with("workerStart", 0)
            .with("redirectStart", 0)
            .with("redirectEnd", 0)
            .with("fetchStart", ts(phases.fetch_start))
            .with("domainLookupStart", ts(phases.lookup_start))
            .with("domainLookupEnd", ts(phases.lookup_end))
            .with("connectStart", ts(phases.connect_start))
            .with("connectEnd", ts(phases.connect_end))
            .with(
                "secureConnectionStart",
                phases.secure_connection_start.map(ts).unwrap_or(0.0),
            )
            .with("requestStart", ts(phases.request_start))
            .with("responseStart", ts(phases.response_start))
            .with("responseEnd", ts(phases.response_end))
            .with("transferSize", header_size as u64 + body_size)
            .with("encodedBodySize", body_size)
            .with("decodedBodySize", body_size)
            .with("responseStatus", response.status)
            .with("serverTiming", Value::Array(Vec::new()))
    }

    async fn send(&self, request: ProbeRequest) -> Result<ProbeResponse> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .context("Failed to create HTTP client")?;
        let mut req = client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers);
        if let Some(body) = request.body {
            req = req.body(body);
        }
        let res = req
            .send()
            .await
            .with_context(|| format!("Request to {} failed", request.url))?;

        let status = res.status().as_u16();
        let headers = res.headers().clone();
        let body = res
            .bytes()
            .await
            .with_context(|| format!("Failed to read body from {}", request.url))?
            .to_vec();
        Ok(ProbeResponse {
            url: request.url,
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl HttpTransport for NetworkTransport {
    async fn fetch(&self, request: ProbeRequest) -> Result<ProbeResponse> {
        if request.method == Method::GET {
            self.load_resource(request).await
        } else {
            self.send(request).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one HTTP response per connection, counting connections.
    async fn serve(body: &'static str) -> (SocketAddr, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                if n == 0 {
                    continue;
                }
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nx-datacenter: ams\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
            }
        });
        (addr, accepted)
    }

    #[tokio::test]
    async fn test_fetch_records_resource_entry() {
        let (addr, accepted) = serve("hello").await;
        let timeline = PerformanceTimeline::default();
        let transport = NetworkTransport::new(timeline.clone(), Duration::from_secs(5));
        let url = Url::parse(&format!("http://{}/probe.txt?v=1", addr)).unwrap();

        let response = transport.fetch(ProbeRequest::get(url.clone())).await.unwrap();
        assert!(response.ok());
        assert_eq!(response.text(), "hello");
        assert_eq!(response.header("x-datacenter"), Some("ams"));

        // The timed connection is the one that carried the request.
        assert_eq!(accepted.load(Ordering::SeqCst), 1);

        let entries = timeline.entries_by_name(url.as_str());
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.entry_type(), RESOURCE);
        assert_eq!(entry.number("decodedBodySize"), Some(5.0));
        assert_eq!(entry.number("secureConnectionStart"), Some(0.0));

        let phase = |key: &str| entry.number(key).unwrap();
        assert!(phase("domainLookupEnd") <= phase("connectStart"));
        assert!(phase("connectEnd") > phase("connectStart"));
        assert!(phase("requestStart") >= phase("connectEnd"));
        assert!(phase("responseStart") >= phase("requestStart"));
        assert!(phase("responseEnd") >= phase("responseStart"));
    }

    #[tokio::test]
    async fn test_post_records_no_entry() {
        let (addr, _) = serve("ok").await;
        let timeline = PerformanceTimeline::default();
        let transport = NetworkTransport::new(timeline.clone(), Duration::from_secs(5));
        let url = Url::parse(&format!("http://{}/beacon", addr)).unwrap();

        let response = transport
            .fetch(ProbeRequest::post(url, "{}".to_string()))
            .await
            .unwrap();
        assert!(response.ok());
        assert!(timeline.entries().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_unreachable_host_fails() {
        let timeline = PerformanceTimeline::default();
        let transport = NetworkTransport::new(timeline.clone(), Duration::from_millis(500));
        // Bind then drop to get a port with nothing listening.
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();
        let url = Url::parse(&format!("http://{}/", addr)).unwrap();

        assert!(transport.fetch(ProbeRequest::get(url)).await.is_err());
        assert!(timeline.entries().is_empty());
    }
}
