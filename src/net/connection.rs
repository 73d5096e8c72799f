//! A single HTTP/1.1 exchange over a connection whose setup is timed.
//!
//! Name resolution, the TCP handshake and the TLS handshake are measured on
//! the same socket that then carries the request, so every phase reported in
//! a resource entry belongs to the request it describes.

use anyhow::{Context, Result};
use reqwest::header::{HeaderValue, HOST};
use reqwest::Url;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use super::transport::{ProbeRequest, ProbeResponse};

pub const HTTP_1_1: &str = "http/1.1";

/// When each phase of an exchange started and ended.
#[derive(Debug, Clone, Copy)]
pub struct PhaseTimings {
    pub fetch_start: Instant,
    pub lookup_start: Instant,
    pub lookup_end: Instant,
    pub connect_start: Instant,
    /// Set for https only; `connect_end` then includes the TLS handshake.
    pub secure_connection_start: Option<Instant>,
    pub connect_end: Instant,
    pub request_start: Instant,
    pub response_start: Instant,
    pub response_end: Instant,
}

pub fn tls_connector() -> TlsConnector {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.into(),
    };
    let mut config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = vec![HTTP_1_1.as_bytes().to_vec()];
    TlsConnector::from(Arc::new(config))
}

async fn resolve(url: &Url) -> Result<(String, SocketAddr)> {
    let host = url
        .host_str()
        .with_context(|| format!("URL has no host: {}", url))?;
    let port = url
        .port_or_known_default()
        .with_context(|| format!("URL has no port: {}", url))?;
    let host = host.trim_start_matches('[').trim_end_matches(']').to_string();
    let addr = tokio::net::lookup_host((host.as_str(), port))
        .await
        .with_context(|| format!("Failed to resolve {}", host))?
        .next()
        .with_context(|| format!("No addresses for {}", host))?;
    Ok((host, addr))
}

/// Run `request` on a fresh connection, timing each phase.
pub async fn timed_exchange(
    tls: &TlsConnector,
    request: ProbeRequest,
) -> Result<(ProbeResponse, PhaseTimings)> {
    let fetch_start = Instant::now();

    let lookup_start = Instant::now();
    let (host, addr) = resolve(&request.url).await?;
    let lookup_end = Instant::now();

    let connect_start = Instant::now();
    let tcp = TcpStream::connect(addr)
        .await
        .with_context(|| format!("Failed to connect to {}", addr))?;

    if request.url.scheme() == "https" {
        let secure_start = Instant::now();
        let name = ServerName::try_from(host.clone())
            .with_context(|| format!("Invalid TLS server name: {}", host))?;
        let stream = tls
            .connect(name, tcp)
            .await
            .with_context(|| format!("TLS handshake with {} failed", host))?;
        let connect_end = Instant::now();
        let (response, request_start, response_start, response_end) =
            exchange(stream, request).await?;
        Ok((
            response,
            PhaseTimings {
                fetch_start,
                lookup_start,
                lookup_end,
                connect_start,
                secure_connection_start: Some(secure_start),
                connect_end,
                request_start,
                response_start,
                response_end,
            },
        ))
    } else {
        let connect_end = Instant::now();
        let (response, request_start, response_start, response_end) =
            exchange(tcp, request).await?;
        Ok((
            response,
            PhaseTimings {
                fetch_start,
                lookup_start,
                lookup_end,
                connect_start,
                secure_connection_start: None,
                connect_end,
                request_start,
                response_start,
                response_end,
            },
        ))
    }
}

fn host_header(url: &Url) -> Result<HeaderValue> {
    let host = url.host_str().unwrap_or_default();
    let value = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    HeaderValue::from_str(&value).with_context(|| format!("Invalid host header: {}", value))
}

async fn exchange<T>(
    io: T,
    request: ProbeRequest,
) -> Result<(ProbeResponse, Instant, Instant, Instant)>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, connection) = hyper::client::conn::handshake(io)
        .await
        .context("HTTP handshake failed")?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            log::debug!("Connection closed with error: {}", e);
        }
    });

    let mut target = request.url.path().to_string();
    if let Some(query) = request.url.query() {
        target.push('?');
        target.push_str(query);
    }
    let body = match request.body {
        Some(body) => hyper::Body::from(body),
        None => hyper::Body::empty(),
    };
    let mut outgoing = hyper::Request::builder()
        .method(request.method.clone())
        .uri(target)
        .body(body)
        .context("Failed to build request")?;
    *outgoing.headers_mut() = request.headers;
    if !outgoing.headers().contains_key(HOST) {
        outgoing
            .headers_mut()
            .insert(HOST, host_header(&request.url)?);
    }

    let request_start = Instant::now();
    let response = sender
        .send_request(outgoing)
        .await
        .with_context(|| format!("Request to {} failed", request.url))?;
    let response_start = Instant::now();

    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = hyper::body::to_bytes(response.into_body())
        .await
        .with_context(|| format!("Failed to read body from {}", request.url))?
        .to_vec();
    let response_end = Instant::now();

    Ok((
        ProbeResponse {
            url: request.url,
            status,
            headers,
            body,
        },
        request_start,
        response_start,
        response_end,
    ))
}
