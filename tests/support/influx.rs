//! Minimal InfluxDB 1.x stand-in: answers `/ping` and records `/write` bodies.

use std::collections::HashMap;
use std::convert::Infallible;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use flate2::read::GzDecoder;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub query: HashMap<String, String>,
    pub content_encoding: Option<String>,
    pub authorization: Option<String>,
    /// Decompressed line protocol.
    pub body: String,
    /// Status the fake answered with.
    pub status: u16,
}

impl WriteRequest {
    pub fn lines(&self) -> Vec<&str> {
        self.body.lines().collect()
    }

    pub fn accepted(&self) -> bool {
        self.status < 300
    }
}

#[derive(Clone)]
pub struct FakeInflux {
    pub addr: SocketAddr,
    writes: Arc<Mutex<Vec<WriteRequest>>>,
    write_status: Arc<AtomicU16>,
}

impl FakeInflux {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind fake influx");
        let fake = Self {
            addr: listener.local_addr().unwrap(),
            writes: Arc::default(),
            write_status: Arc::new(AtomicU16::new(204)),
        };

        let state = fake.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener
                    .accept()
                    .await
                    .expect("failed to accept connection");
                let state = state.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let state = state.clone();
                        async move { state.handle(req).await }
                    });
                    let _ = Builder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        fake
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Status returned by subsequent writes.
    pub fn set_write_status(&self, status: u16) {
        self.write_status.store(status, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<WriteRequest> {
        self.writes.lock().unwrap().clone()
    }

    /// Lines of every write that was answered with success.
    pub fn accepted_lines(&self) -> Vec<String> {
        self.writes()
            .iter()
            .filter(|w| w.accepted())
            .flat_map(|w| w.lines().into_iter().map(str::to_owned).collect::<Vec<_>>())
            .collect()
    }

    async fn handle<B>(&self, req: Request<B>) -> Result<Response<Full<Bytes>>, Infallible>
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        let status = if method == Method::GET && path == "/ping" {
            StatusCode::NO_CONTENT
        } else if method == Method::POST && path == "/write" {
            self.record(req).await
        } else {
            StatusCode::NOT_FOUND
        };

        Ok(Response::builder()
            .status(status)
            .body(Full::default())
            .unwrap())
    }

    async fn record<B>(&self, req: Request<B>) -> StatusCode
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
    {
        let query = url::form_urlencoded::parse(req.uri().query().unwrap_or("").as_bytes())
            .into_owned()
            .collect();
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        let content_encoding = header("content-encoding");
        let authorization = header("authorization");

        let raw = req
            .collect()
            .await
            .map(|c| c.to_bytes())
            .unwrap_or_default();
        let body = if content_encoding.as_deref() == Some("gzip") {
            let mut out = String::new();
            GzDecoder::new(&raw[..])
                .read_to_string(&mut out)
                .expect("invalid gzip body");
            out
        } else {
            String::from_utf8(raw.to_vec()).expect("body is not utf-8")
        };

        let status = self.write_status.load(Ordering::SeqCst);
        self.writes.lock().unwrap().push(WriteRequest {
            query,
            content_encoding,
            authorization,
            body,
            status,
        });
        StatusCode::from_u16(status).unwrap()
    }
}
