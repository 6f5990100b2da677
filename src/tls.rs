//! TLS client configuration shared by the config fetcher, every LGC, and
//! every prober. Crypto-provider installation is grounded in the
//! `ensure_crypto_provider()` pattern used by other `rustls`-based speed
//! tooling in the retrieval pack.

use std::sync::{Arc, Once};

use rustls::ClientConfig;

use crate::keylog::KeyLogWriter;

static INSTALL_CRYPTO_PROVIDER: Once = Once::new();

fn ensure_crypto_provider() {
    INSTALL_CRYPTO_PROVIDER.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

fn root_store() -> rustls::RootCertStore {
    let mut store = rustls::RootCertStore::empty();
    store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    store
}

/// Build a `ClientConfig` with the process-wide webpki root store and,
/// optionally, key logging wired in.
pub fn client_config(key_log: Option<Arc<KeyLogWriter>>) -> Arc<ClientConfig> {
    ensure_crypto_provider();

    let mut config = ClientConfig::builder()
        .with_root_certificates(root_store())
        .with_no_client_auth();

    if let Some(key_log) = key_log {
        config.key_log = key_log;
    }

    Arc::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_calls_do_not_reinstall_provider() {
        let _ = client_config(None);
        let _ = client_config(None);
    }
}
