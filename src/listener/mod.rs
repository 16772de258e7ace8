use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::reporter::{Reporter, SubmitError};
use crate::sample::{FieldValue, Fields, Tags};
use crate::transmitter::Transmitter;

const WRITE_PREFIX: &str = "/write/";

/// Body of `POST /write/{stream}`.
#[derive(Debug, Default, Deserialize)]
struct Submission {
    #[serde(default)]
    tags: Tags,
    #[serde(default)]
    fields: BTreeMap<String, JsonField>,
}

// Variant order matters: integers must be tried before floats.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonField {
    Boolean(bool),
    Integer(i64),
    UInteger(u64),
    Float(f64),
    String(String),
}

impl From<JsonField> for FieldValue {
    fn from(v: JsonField) -> Self {
        match v {
            JsonField::Boolean(v) => FieldValue::Boolean(v),
            JsonField::Integer(v) => FieldValue::Integer(v),
            JsonField::UInteger(v) => FieldValue::UInteger(v),
            JsonField::Float(v) => FieldValue::Float(v),
            JsonField::String(v) => FieldValue::String(v),
        }
    }
}

fn response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::default());
    *resp.status_mut() = status;
    resp
}

/// Validate the incoming request: route, method, and body.
async fn validate<B>(req: Request<B>) -> Result<(String, Submission), (StatusCode, String)>
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
{
    let path = req.uri().path().to_owned();
    let method = req.method().clone();

    let stream = path
        .strip_prefix(WRITE_PREFIX)
        .filter(|s| !s.is_empty() && !s.contains('/'))
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("unknown path: {path}")))?
        .to_owned();

    if method != Method::POST {
        return Err((StatusCode::METHOD_NOT_ALLOWED, format!("{method} {path}")));
    }

    let body = req.collect().await.map(|c| c.to_bytes()).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            format!("POST {path}: failed to read body"),
        )
    })?;

    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok((stream, Submission::default()));
    }

    let submission = serde_json::from_slice(&body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("POST {path}: invalid JSON body: {e}"),
        )
    })?;

    Ok((stream, submission))
}

async fn handle<B, T>(
    req: Request<B>,
    reporter: Arc<Reporter<T>>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    T: Transmitter,
{
    let (stream, submission) = match validate(req).await {
        Ok(pair) => pair,
        Err((status, reason)) => {
            warn!(reason, "write request rejected");
            return Ok(response(status));
        }
    };

    let fields: Fields = submission
        .fields
        .into_iter()
        .map(|(k, v)| (k, v.into()))
        .collect();

    match reporter.submit(&stream, submission.tags, fields) {
        Ok(()) => Ok(response(StatusCode::NO_CONTENT)),
        Err(SubmitError::UnknownStream(_)) => Ok(response(StatusCode::NOT_FOUND)),
        Err(SubmitError::Overflow(_)) => {
            let mut resp = response(StatusCode::TOO_MANY_REQUESTS);
            resp.headers_mut()
                .insert("Retry-After", hyper::header::HeaderValue::from_static("1"));
            Ok(resp)
        }
        Err(SubmitError::InvalidSample(e)) => {
            warn!(stream, error = %e, "write request rejected");
            Ok(response(StatusCode::BAD_REQUEST))
        }
        Err(SubmitError::Closed) => Ok(response(StatusCode::SERVICE_UNAVAILABLE)),
    }
}

/// Accept write requests until `cancel` fires.
pub async fn serve<T: Transmitter>(
    listener: TcpListener,
    reporter: Arc<Reporter<T>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                let stream = match result {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };
                let reporter = Arc::clone(&reporter);
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let reporter = Arc::clone(&reporter);
                        handle(req, reporter)
                    });
                    let _ = Builder::new(hyper_util::rt::TokioExecutor::new())
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
            _ = cancel.cancelled() => {
                break;
            }
        }
    }
}
