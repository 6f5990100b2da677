//! S3-adjacent: a discovery endpoint that cannot be reached at all fails
//! fast with a `ConfigFetch` error rather than hanging or panicking.

use rpmprobe::config;
use rpmprobe::error::RpmError;

#[tokio::test]
async fn unreachable_discovery_host_is_a_config_fetch_error() {
    let tls = rpmprobe::tls::client_config(None);
    // Port 1 is reserved and refuses connections immediately on loopback.
    let result = config::fetch("127.0.0.1", 1, "/config", tls).await;

    match result {
        Err(RpmError::ConfigFetch(_)) => {}
        other => panic!("expected ConfigFetch error, got {other:?}"),
    }
}
