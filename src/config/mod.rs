//! Discovery-endpoint configuration: fetched over HTTPS, validated once,
//! then shared immutably for the lifetime of the run.

use std::sync::Arc;

use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes as HyperBytes;
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use tokio::net::TcpStream;
use url::Url;

use crate::error::{Result, RpmError};

#[derive(Debug, Deserialize)]
struct RawConfig {
    urls: RawUrls,
    #[allow(dead_code)]
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawUrls {
    small_https_download_url: String,
    large_https_download_url: String,
    upload_url: String,
}

/// Validated, immutable configuration shared across the run.
#[derive(Debug, Clone)]
pub struct Config {
    small_https_download_url: Url,
    large_https_download_url: Url,
    upload_url: Url,
    pub source: Option<String>,
}

impl Config {
    /// Builds a `Config` directly from already-validated URLs, bypassing
    /// discovery-endpoint fetch. Used by tests that stand up a loopback
    /// server and need a `Config` pointing at it.
    pub fn new(small_https_download_url: Url, large_https_download_url: Url, upload_url: Url) -> Self {
        Self {
            small_https_download_url,
            large_https_download_url,
            upload_url,
            source: None,
        }
    }

    pub fn small_https_download_url(&self) -> Result<Url> {
        Ok(self.small_https_download_url.clone())
    }

    pub fn large_https_download_url(&self) -> Result<Url> {
        Ok(self.large_https_download_url.clone())
    }

    pub fn upload_url(&self) -> Result<Url> {
        Ok(self.upload_url.clone())
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        let parse = |field: &str, raw: &str| -> Result<Url> {
            let url = Url::parse(raw).map_err(|e| RpmError::ConfigInvalid(format!("{field}: {e}")))?;
            if raw.trim().is_empty() || !url.has_host() {
                return Err(RpmError::ConfigInvalid(format!("{field} must be a non-empty absolute URL")));
            }
            Ok(url)
        };

        Ok(Self {
            small_https_download_url: parse("urls.small_https_download_url", &raw.urls.small_https_download_url)?,
            large_https_download_url: parse("urls.large_https_download_url", &raw.urls.large_https_download_url)?,
            upload_url: parse("urls.upload_url", &raw.urls.upload_url)?,
            source: raw.source,
        })
    }
}

/// Fetches `https://<host>:<port>/<path>` and validates the resulting JSON.
pub async fn fetch(host: &str, port: u16, path: &str, tls_config: Arc<rustls::ClientConfig>) -> Result<Config> {
    let tcp = TcpStream::connect((host, port)).await.map_err(|e| {
        RpmError::ConfigFetch(format!("connecting to {host}:{port}: {e}"))
    })?;

    let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
        .map_err(|e| RpmError::ConfigFetch(format!("invalid host name {host}: {e}")))?
        .to_owned();
    let connector = tokio_rustls::TlsConnector::from(tls_config);
    let tls = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| RpmError::ConfigFetch(format!("TLS handshake: {e}")))?;

    let io = TokioIo::new(tls);
    let (mut send_request, connection) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| RpmError::ConfigFetch(format!("HTTP handshake: {e}")))?;
    let driver = tokio::spawn(async move {
        let _ = connection.await;
    });

    let req = hyper::Request::builder()
        .method("GET")
        .uri(path)
        .header("Host", host)
        .header("Accept", "application/json")
        .body(Empty::<HyperBytes>::new())
        .map_err(|e| RpmError::ConfigFetch(e.to_string()))?;

    let response = send_request
        .send_request(req)
        .await
        .map_err(|e| RpmError::ConfigFetch(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        driver.abort();
        return Err(RpmError::ConfigFetch(format!("endpoint returned {status}")));
    }

    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| RpmError::ConfigFetch(e.to_string()))?
        .to_bytes();
    driver.abort();

    let raw: RawConfig = serde_json::from_slice(&body).map_err(|e| RpmError::ConfigInvalid(e.to_string()))?;
    Config::from_raw(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_upload_url() {
        let raw = RawConfig {
            urls: RawUrls {
                small_https_download_url: "https://example.test/small".to_string(),
                large_https_download_url: "https://example.test/large".to_string(),
                upload_url: "".to_string(),
            },
            source: None,
        };
        assert!(Config::from_raw(raw).is_err());
    }

    #[test]
    fn accepts_well_formed_urls() {
        let raw = RawConfig {
            urls: RawUrls {
                small_https_download_url: "https://example.test/small".to_string(),
                large_https_download_url: "https://example.test/large".to_string(),
                upload_url: "https://example.test/upload".to_string(),
            },
            source: Some("test-origin".to_string()),
        };
        let config = Config::from_raw(raw).unwrap();
        assert_eq!(config.small_https_download_url().unwrap().host_str(), Some("example.test"));
    }
}
