use std::sync::Arc;

use influx_batcher::config::Config;
use influx_batcher::{InfluxTransmitter, Reporter, TracingErrorSink, listener};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Exceptional init failure: log and exit.
fn fatal(msg: &str, error: &dyn std::fmt::Display) -> ! {
    error!(%error, "{msg}");
    std::process::exit(1);
}

fn setup_logging() {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::prelude::*;

    let level = std::env::var("INFLUX_BATCHER_LOG_LEVEL")
        .ok()
        .and_then(|val| {
            val.parse::<LevelFilter>().ok().or_else(|| {
                eprintln!("invalid INFLUX_BATCHER_LOG_LEVEL: {val:?}, defaulting to WARN");
                None
            })
        })
        .unwrap_or(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(level)
        .with(tracing_microjson::JsonLayer::new(std::io::stderr).with_target(true))
        .init();
}

fn setup_rustls() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls ring provider");
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() {
    setup_logging();
    setup_rustls();

    let config = Config::from_env().unwrap_or_else(|e| fatal("config error", &e));

    let transmitter = InfluxTransmitter::new(&config)
        .unwrap_or_else(|e| fatal("failed to build influxdb client", &e));
    if let Err(e) = transmitter.ping().await {
        fatal("influxdb is unreachable", &e);
    }

    let reporter = Arc::new(
        Reporter::new(transmitter, config.hostname.clone())
            .with_error_sink(Arc::new(TracingErrorSink)),
    );
    for settings in config.streams {
        if let Err(e) = reporter.register_stream(settings) {
            fatal("failed to register stream", &e);
        }
    }
    reporter.start();

    let tcp = TcpListener::bind(("127.0.0.1", config.listener_port))
        .await
        .unwrap_or_else(|e| fatal("failed to bind write listener", &e));
    info!(port = config.listener_port, "accepting writes");

    let cancel = CancellationToken::new();
    let server = tokio::spawn(listener::serve(tcp, Arc::clone(&reporter), cancel.clone()));

    shutdown_signal().await;

    cancel.cancel();
    if let Err(e) = server.await {
        error!(error = %e, "write listener task failed");
    }

    // Blocks until every stream has performed its final flush.
    reporter.shutdown().await;
    info!("influx-batcher stopped");
}
