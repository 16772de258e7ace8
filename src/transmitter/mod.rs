use std::future::Future;
use std::io::Write;

use flate2::write::GzEncoder;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::{Compression, Config, Credentials};
use crate::registry::StreamDescriptor;
use crate::sample::Sample;

pub mod line_protocol;

#[derive(Debug, Error)]
pub enum TransmitError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("influxdb rejected write: {status} {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("gzip compression failed: {0}")]
    Compression(#[from] std::io::Error),

    #[error("endpoint {0} cannot be used as a base URL")]
    InvalidEndpoint(String),
}

/// Ships a batch of samples for one stream to the remote store.
///
/// Any error means the store accepted nothing from the batch.
pub trait Transmitter: Send + Sync + 'static {
    fn transmit(
        &self,
        stream: &StreamDescriptor,
        samples: &[Sample],
    ) -> impl Future<Output = Result<(), TransmitError>> + Send;
}

/// Writes batches to the InfluxDB 1.x HTTP API as line protocol.
pub struct InfluxTransmitter {
    client: Client,
    endpoint: Url,
    compression: Compression,
    credentials: Option<Credentials>,
}

impl InfluxTransmitter {
    pub fn new(config: &Config) -> Result<Self, TransmitError> {
        let client = Client::builder().timeout(config.write_timeout).build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            compression: config.compression,
            credentials: config.credentials.clone(),
        })
    }

    /// Liveness check against `/ping`.
    pub async fn ping(&self) -> Result<(), TransmitError> {
        let url = self.url("ping")?;
        let resp = self.authorize(self.client.get(url)).send().await?;
        check_status(resp).await?;
        debug!(endpoint = %self.endpoint, "influxdb ping succeeded");
        Ok(())
    }

    fn write_url(&self, stream: &StreamDescriptor) -> Result<Url, TransmitError> {
        let mut url = self.url("write")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("db", &stream.database);
            if let Some(rp) = &stream.retention_policy {
                query.append_pair("rp", rp);
            }
            query.append_pair("precision", stream.precision.as_str());
        }
        Ok(url)
    }

    fn url(&self, path: &str) -> Result<Url, TransmitError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| TransmitError::InvalidEndpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .push(path);
        Ok(url)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some(creds) => req.basic_auth(&creds.username, Some(&creds.password)),
            None => req,
        }
    }
}

impl Transmitter for InfluxTransmitter {
    async fn transmit(
        &self,
        stream: &StreamDescriptor,
        samples: &[Sample],
    ) -> Result<(), TransmitError> {
        if samples.is_empty() {
            return Ok(());
        }

        let url = self.write_url(stream)?;
        let body = line_protocol::encode(samples, stream.precision);

        let body = if self.compression == Compression::Gzip {
            compress_gzip(body.as_bytes())?
        } else {
            body.into_bytes()
        };

        let mut req = self
            .client
            .post(url)
            .header("content-type", "text/plain; charset=utf-8");

        if self.compression == Compression::Gzip {
            req = req.header("content-encoding", "gzip");
        }

        let resp = self.authorize(req).body(body).send().await?;
        check_status(resp).await
    }
}

async fn check_status(resp: reqwest::Response) -> Result<(), TransmitError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let body = resp.text().await.unwrap_or_default();
    Err(TransmitError::Rejected { status, body })
}

fn compress_gzip(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder.write_all(data)?;
    encoder.finish()
}
