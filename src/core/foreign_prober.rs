//! ForeignProber: at each tick, dials a brand-new connection, completes one
//! small request, tears it down, and records the whole wall-clock duration
//! as one foreign-probe sample (TCP + TLS + HTTP collapsed to equal thirds,
//! see `DESIGN.md`'s Open Question 1).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes as HyperBytes;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::core::constants::PROBE_INTERVAL;
use crate::core::types::{ProbeDataPoint, ProbeKind};

pub struct ForeignProber {
    small_url: Url,
    tls_config: Arc<rustls::ClientConfig>,
    in_flight: Arc<AtomicBool>,
}

impl ForeignProber {
    pub fn new(small_url: Url, tls_config: Arc<rustls::ClientConfig>) -> Self {
        Self {
            small_url,
            tls_config,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn run(&self, scope: CancellationToken, out: mpsc::UnboundedSender<ProbeDataPoint>) {
        let mut ticker = time::interval(PROBE_INTERVAL);
        loop {
            tokio::select! {
                _ = scope.cancelled() => return,
                _ = ticker.tick() => {
                    if self.in_flight.swap(true, Ordering::SeqCst) {
                        // Previous probe still running; skip this tick.
                        continue;
                    }
                    let url = self.small_url.clone();
                    let tls_config = self.tls_config.clone();
                    let in_flight = self.in_flight.clone();
                    let out = out.clone();
                    let scope = scope.clone();

                    tokio::spawn(async move {
                        let start = SystemTime::now();
                        let duration = one_shot_probe(&url, tls_config).await;
                        in_flight.store(false, Ordering::SeqCst);

                        if let Some(duration) = duration {
                            if !scope.is_cancelled() {
                                let _ = out.send(ProbeDataPoint {
                                    start,
                                    duration,
                                    round_trips: 3,
                                    kind: ProbeKind::Foreign,
                                });
                            }
                        }
                    });
                }
            }
        }
    }
}

async fn one_shot_probe(url: &Url, tls_config: Arc<rustls::ClientConfig>) -> Option<std::time::Duration> {
    let host = url.host_str()?;
    let port = url.port_or_known_default().unwrap_or(443);
    let path = {
        let mut p = url.path().to_string();
        if let Some(q) = url.query() {
            p.push('?');
            p.push_str(q);
        }
        p
    };

    let started = Instant::now();

    let tcp = TcpStream::connect((host, port)).await.ok()?;

    let (mut send_request, driver) = if url.scheme() == "http" {
        let io = TokioIo::new(tcp);
        let (send_request, connection) = hyper::client::conn::http1::handshake(io).await.ok()?;
        let driver = tokio::spawn(async move {
            let _ = connection.await;
        });
        (send_request, driver)
    } else {
        let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
            .ok()?
            .to_owned();
        let connector = tokio_rustls::TlsConnector::from(tls_config);
        let tls = connector.connect(server_name, tcp).await.ok()?;
        let io = TokioIo::new(tls);
        let (send_request, connection) = hyper::client::conn::http1::handshake(io).await.ok()?;
        let driver = tokio::spawn(async move {
            let _ = connection.await;
        });
        (send_request, driver)
    };

    let req = hyper::Request::builder()
        .method("GET")
        .uri(path)
        .header("Host", host)
        .body(http_body_util::combinators::BoxBody::new(
            Empty::<HyperBytes>::new().map_err(|never: std::convert::Infallible| match never {}),
        ))
        .ok()?;

    let response = send_request.send_request(req).await.ok()?;
    let _ = response.into_body().collect().await.ok()?;
    let elapsed = started.elapsed();

    driver.abort();
    Some(elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_prober_is_not_in_flight() {
        let tls = crate::tls::client_config(None);
        let prober = ForeignProber::new(Url::parse("https://example.invalid/small").unwrap(), tls);
        assert!(!prober.in_flight.load(Ordering::SeqCst));
    }
}
