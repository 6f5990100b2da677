//! LoadGeneratingConnection: a single HTTP flow that either downloads a
//! large object or uploads an unbounded body.
//!
//! The transport is a manually driven `hyper` HTTP/2 connection over an
//! owned `tokio_rustls` stream rather than a pooled high-level client, so
//! the LGC can retain the raw socket for extended-stats harvesting, feed
//! the handshake through the shared key-log writer (see `crate::tls`,
//! `crate::keylog`), and — the reason HTTP/2 rather than HTTP/1.1 is used
//! for every flow, not only the probe-bearing ones — let the SelfProber
//! multiplex a small request over the very same connection a large
//! download/upload is saturating, which HTTP/1.1 keep-alive cannot do while
//! a response body is still streaming.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes as HyperBytes;
use hyper::client::conn::http2;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use url::Url;

use crate::core::body::counting_upload_body;
use crate::core::types::{Direction, FlowStats};
use crate::error::{Result, RpmError};
use crate::extended_stats;
use crate::logging::DebugLogger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LgcState {
    Pending,
    Started,
    TransferringBytes,
    Error,
    Stopped,
}

type BoxBody = http_body_util::combinators::BoxBody<HyperBytes, std::convert::Infallible>;
type SendRequest = http2::SendRequest<BoxBody>;

/// Shared capability set for download and upload flows, per the
/// polymorphism note: model as a tagged variant or an interface. Here,
/// an interface — both variants are instances of the same struct,
/// parameterised by `Direction`.
#[async_trait]
pub trait LoadGeneratingConnection: Send + Sync {
    async fn start(&self) -> Result<()>;
    fn transferred(&self) -> u64;
    fn is_valid(&self) -> bool;
    fn stats(&self) -> FlowStats;
    async fn close(&self);
    fn direction(&self) -> Direction;

    /// Issues one small request on `path` over this same connection and
    /// returns the wall-clock round-trip duration. `None` if this flow has
    /// no usable handle right now (not started yet, or torn down) — the
    /// SelfProber treats that as "re-select a different LGC".
    async fn probe(&self, path: &str) -> Option<Duration>;
}

pub struct HttpLgc {
    direction: Direction,
    url: Url,
    tls_config: Arc<rustls::ClientConfig>,
    bytes: Arc<AtomicU64>,
    state: Mutex<LgcState>,
    valid: Arc<AtomicBool>,
    raw_fd: Mutex<Option<std::os::raw::c_int>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    transfer: Mutex<Option<JoinHandle<()>>>,
    send_request: Mutex<Option<SendRequest>>,
    logger: DebugLogger,
}

impl HttpLgc {
    pub fn new(direction: Direction, url: Url, tls_config: Arc<rustls::ClientConfig>, logger: DebugLogger) -> Self {
        Self {
            direction,
            url,
            tls_config,
            bytes: Arc::new(AtomicU64::new(0)),
            state: Mutex::new(LgcState::Pending),
            valid: Arc::new(AtomicBool::new(true)),
            raw_fd: Mutex::new(None),
            driver: Mutex::new(None),
            transfer: Mutex::new(None),
            send_request: Mutex::new(None),
            logger,
        }
    }

    fn set_state(&self, s: LgcState) {
        *self.state.lock().unwrap() = s;
    }

    /// Dials and performs the HTTP/2 handshake. `https` URLs go through the
    /// shared `tokio_rustls` stack; `http` URLs skip TLS and speak h2c
    /// (prior-knowledge HTTP/2) directly over the raw socket — used only by
    /// loopback tests against a plaintext server, never by the discovery
    /// endpoint or a real target.
    async fn dial_and_handshake(&self) -> Result<SendRequest> {
        let host = self
            .url
            .host_str()
            .ok_or_else(|| RpmError::Http("missing host".into()))?;
        let port = self.url.port_or_known_default().unwrap_or(443);

        let tcp = TcpStream::connect((host, port)).await.map_err(RpmError::Dial)?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            *self.raw_fd.lock().unwrap() = Some(tcp.as_raw_fd());
        }

        let send_request = if self.url.scheme() == "http" {
            let io = TokioIo::new(tcp);
            let (send_request, connection_driver) = http2::handshake(TokioExecutor::new(), io)
                .await
                .map_err(|e| RpmError::Http(e.to_string()))?;
            let handle = tokio::spawn(async move {
                let _ = connection_driver.await;
            });
            *self.driver.lock().unwrap() = Some(handle);
            send_request
        } else {
            let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
                .map_err(|e| RpmError::Tls(e.to_string()))?
                .to_owned();
            let connector = tokio_rustls::TlsConnector::from(self.tls_config.clone());
            let tls = connector
                .connect(server_name, tcp)
                .await
                .map_err(|e| RpmError::Tls(e.to_string()))?;

            let io = TokioIo::new(tls);
            let (send_request, connection_driver) = http2::handshake(TokioExecutor::new(), io)
                .await
                .map_err(|e| RpmError::Http(e.to_string()))?;
            let handle = tokio::spawn(async move {
                let _ = connection_driver.await;
            });
            *self.driver.lock().unwrap() = Some(handle);
            send_request
        };

        *self.send_request.lock().unwrap() = Some(send_request.clone());

        Ok(send_request)
    }

    fn path_and_query(&self) -> String {
        let mut p = self.url.path().to_string();
        if let Some(q) = self.url.query() {
            p.push('?');
            p.push_str(q);
        }
        p
    }

    fn host(&self) -> String {
        self.url.host_str().unwrap_or_default().to_string()
    }
}

#[async_trait]
impl LoadGeneratingConnection for HttpLgc {
    async fn start(&self) -> Result<()> {
        self.set_state(LgcState::Started);
        let mut send_request = match self.dial_and_handshake().await {
            Ok(sr) => sr,
            Err(e) => {
                self.set_state(LgcState::Error);
                self.valid.store(false, Ordering::SeqCst);
                self.logger.flow_error(self.direction.as_str(), &e.to_string());
                return Err(e);
            }
        };

        let host = self.host();
        let path = self.path_and_query();

        match self.direction {
            Direction::Download => {
                let req = Request::builder()
                    .method("GET")
                    .uri(path)
                    .header("Host", host)
                    .body(BoxBody::new(
                        Empty::<HyperBytes>::new().map_err(|never: std::convert::Infallible| match never {}),
                    ))
                    .map_err(|e| RpmError::Http(e.to_string()))?;

                let response = match send_request.send_request(req).await {
                    Ok(r) => r,
                    Err(e) => {
                        self.set_state(LgcState::Error);
                        self.valid.store(false, Ordering::SeqCst);
                        self.logger.flow_error(self.direction.as_str(), &e.to_string());
                        return Err(RpmError::Http(e.to_string()));
                    }
                };

                self.set_state(LgcState::TransferringBytes);
                let bytes = self.bytes.clone();
                let valid = self.valid.clone();
                let mut body = response.into_body();
                let logger = self.logger.clone();
                let direction = self.direction;

                let handle = tokio::spawn(async move {
                    loop {
                        match body.frame().await {
                            Some(Ok(frame)) => {
                                if let Some(data) = frame.data_ref() {
                                    bytes.fetch_add(data.len() as u64, Ordering::Relaxed);
                                }
                            }
                            Some(Err(e)) => {
                                valid.store(false, Ordering::SeqCst);
                                logger.flow_error(direction.as_str(), &e.to_string());
                                break;
                            }
                            None => break,
                        }
                    }
                });
                *self.transfer.lock().unwrap() = Some(handle);
            }
            Direction::Upload => {
                let bytes = self.bytes.clone();
                let valid = self.valid.clone();
                let body = counting_upload_body(bytes);
                let req = Request::builder()
                    .method("PUT")
                    .uri(path)
                    .header("Host", host)
                    .body(BoxBody::new(body))
                    .map_err(|e| RpmError::Http(e.to_string()))?;

                self.set_state(LgcState::TransferringBytes);
                let logger = self.logger.clone();
                let direction = self.direction;
                let handle = tokio::spawn(async move {
                    if let Err(e) = send_request.send_request(req).await {
                        valid.store(false, Ordering::SeqCst);
                        logger.flow_error(direction.as_str(), &e.to_string());
                    }
                });
                *self.transfer.lock().unwrap() = Some(handle);
            }
        }

        Ok(())
    }

    fn transferred(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    fn stats(&self) -> FlowStats {
        let extended = (*self.raw_fd.lock().unwrap()).and_then(extended_stats::harvest);
        FlowStats {
            bytes_transferred: self.transferred(),
            extended,
        }
    }

    async fn close(&self) {
        if let Some(h) = self.transfer.lock().unwrap().take() {
            h.abort();
        }
        if let Some(h) = self.driver.lock().unwrap().take() {
            h.abort();
        }
        *self.send_request.lock().unwrap() = None;
        self.set_state(LgcState::Stopped);
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    async fn probe(&self, path: &str) -> Option<Duration> {
        let mut handle = self.send_request.lock().unwrap().clone()?;
        let host = self.host();
        let req = Request::builder()
            .method("GET")
            .uri(path)
            .header("Host", host)
            .body(BoxBody::new(
                Empty::<HyperBytes>::new().map_err(|never: std::convert::Infallible| match never {}),
            ))
            .ok()?;

        let started = Instant::now();
        let response = handle.send_request(req).await.ok()?;
        let _ = response.into_body().collect().await.ok()?;
        Some(started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_pending_and_valid() {
        let tls = crate::tls::client_config(None);
        let url = Url::parse("https://example.invalid/large").unwrap();
        let lgc = HttpLgc::new(Direction::Download, url, tls, DebugLogger::disabled());
        assert!(lgc.is_valid());
        assert_eq!(lgc.transferred(), 0);
    }

    #[tokio::test]
    async fn dial_failure_marks_connection_invalid() {
        // Port 1 is reserved and should refuse the connection immediately.
        let tls = crate::tls::client_config(None);
        let url = Url::parse("https://127.0.0.1:1/large").unwrap();
        let lgc = HttpLgc::new(Direction::Download, url, tls, DebugLogger::disabled());

        let result = lgc.start().await;
        assert!(result.is_err());
        assert!(!lgc.is_valid());
    }

    #[tokio::test]
    async fn probe_before_start_returns_none() {
        let tls = crate::tls::client_config(None);
        let url = Url::parse("https://example.invalid/large").unwrap();
        let lgc = HttpLgc::new(Direction::Download, url, tls, DebugLogger::disabled());
        assert!(lgc.probe("/small").await.is_none());
    }
}
