pub mod influx;

use std::time::Duration;

use influx_batcher::config::{Compression, Config, Credentials};
use url::Url;

pub fn config(endpoint: &str) -> Config {
    let _ = rustls::crypto::ring::default_provider().install_default();
    Config {
        endpoint: Url::parse(endpoint).unwrap(),
        credentials: Some(Credentials {
            username: "writer".into(),
            password: "secret".into(),
        }),
        hostname: "web-01".into(),
        listener_port: 0,
        write_timeout: Duration::from_secs(2),
        compression: Compression::Gzip,
        streams: Vec::new(),
    }
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
