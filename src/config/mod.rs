use std::collections::HashMap;
use std::env;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::registry::StreamSettings;

pub mod streams;

pub use streams::StreamSpecError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Compression {
    Gzip,
    None,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("INFLUX_BATCHER_ENDPOINT is required but not set")]
    EndpointMissing,

    #[error("INFLUX_BATCHER_ENDPOINT is not a valid URL: {0}")]
    EndpointInvalidUrl(String),

    #[error("{0} has invalid value: {1}")]
    InvalidNumeric(String, String),

    #[error("INFLUX_BATCHER_COMPRESSION has invalid value: {0} (expected \"gzip\" or \"none\")")]
    InvalidCompression(String),

    #[error("INFLUX_BATCHER_STREAMS is invalid: {0}")]
    Streams(#[from] StreamSpecError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug)]
pub struct Config {
    pub endpoint: Url,
    pub credentials: Option<Credentials>,
    /// Value of the `host` tag added to every sample.
    pub hostname: String,
    pub listener_port: u16,
    pub write_timeout: Duration,
    pub compression: Compression,
    pub streams: Vec<StreamSettings>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with("INFLUX_BATCHER_"))
            .collect();
        Self::parse(&vars)
    }

    fn parse(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let endpoint = parse_endpoint(vars)?;
        let credentials = parse_credentials(vars);
        let hostname = vars
            .get("INFLUX_BATCHER_HOSTNAME")
            .filter(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| "localhost".to_owned());
        let listener_port = parse_port(vars, "INFLUX_BATCHER_LISTENER_PORT", 8189)?;
        let write_timeout = parse_duration_ms(vars, "INFLUX_BATCHER_WRITE_TIMEOUT_MS", 5000)?;
        let compression = parse_compression(vars)?;
        let streams = match vars.get("INFLUX_BATCHER_STREAMS") {
            Some(raw) => streams::parse(raw)?,
            None => Vec::new(),
        };

        Ok(Self {
            endpoint,
            credentials,
            hostname,
            listener_port,
            write_timeout,
            compression,
            streams,
        })
    }
}

fn parse_endpoint(vars: &HashMap<String, String>) -> Result<Url, ConfigError> {
    let raw = vars
        .get("INFLUX_BATCHER_ENDPOINT")
        .filter(|s| !s.is_empty())
        .ok_or(ConfigError::EndpointMissing)?;

    Url::parse(raw).map_err(|_| ConfigError::EndpointInvalidUrl(raw.clone()))
}

fn parse_credentials(vars: &HashMap<String, String>) -> Option<Credentials> {
    let username = vars
        .get("INFLUX_BATCHER_USERNAME")
        .filter(|s| !s.is_empty())?;
    Some(Credentials {
        username: username.clone(),
        password: vars
            .get("INFLUX_BATCHER_PASSWORD")
            .cloned()
            .unwrap_or_default(),
    })
}

fn parse_port(
    vars: &HashMap<String, String>,
    name: &str,
    default: u16,
) -> Result<u16, ConfigError> {
    match vars.get(name) {
        Some(val) => val
            .parse()
            .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone())),
        None => Ok(default),
    }
}

fn parse_duration_ms(
    vars: &HashMap<String, String>,
    name: &str,
    default_ms: u64,
) -> Result<Duration, ConfigError> {
    match vars.get(name) {
        Some(val) => {
            let ms: u64 = val
                .parse()
                .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone()))?;
            Ok(Duration::from_millis(ms))
        }
        None => Ok(Duration::from_millis(default_ms)),
    }
}

fn parse_compression(vars: &HashMap<String, String>) -> Result<Compression, ConfigError> {
    match vars.get("INFLUX_BATCHER_COMPRESSION").map(|s| s.as_str()) {
        Some("gzip") | None => Ok(Compression::Gzip),
        Some("none") => Ok(Compression::None),
        Some(other) => Err(ConfigError::InvalidCompression(other.to_owned())),
    }
}
