//! Backend forwarding.
//!
//! Opens one HTTP/1.1 connection per request and relays the backend's
//! response unchanged. Redirects are returned to the client, never followed.

use std::time::Duration;

use axum::body::Body;
use axum::http::uri::Authority;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, Response, Uri};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::debug;

/// Time allowed for the backend to produce a response head.
pub const FORWARD_TIMEOUT: Duration = Duration::from_secs(60);

/// Headers that only apply to a single connection.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "upgrade",
];

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid backend address {0:?}")]
    InvalidBackend(String),

    #[error("connect to {backend} failed: {source}")]
    Connect {
        backend: String,
        #[source]
        source: std::io::Error,
    },

    #[error("request to {backend} failed: {source}")]
    Http {
        backend: String,
        #[source]
        source: hyper::Error,
    },

    #[error("{backend} did not respond within {timeout:?}")]
    Timeout { backend: String, timeout: Duration },
}

#[derive(Debug, Clone)]
pub struct Forwarder {
    timeout: Duration,
}

impl Default for Forwarder {
    fn default() -> Self {
        Self::new(FORWARD_TIMEOUT)
    }
}

impl Forwarder {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Send `req` to `backend` (`host[:port]`, port 80 when omitted).
    pub async fn forward(
        &self,
        req: Request<Body>,
        backend: &str,
    ) -> Result<Response<Body>, ForwardError> {
        tokio::time::timeout(self.timeout, send(req, backend))
            .await
            .map_err(|_| ForwardError::Timeout {
                backend: backend.to_string(),
                timeout: self.timeout,
            })?
    }
}

async fn send(mut req: Request<Body>, backend: &str) -> Result<Response<Body>, ForwardError> {
    let authority: Authority = backend
        .parse()
        .map_err(|_| ForwardError::InvalidBackend(backend.to_string()))?;
    let address = format!("{}:{}", authority.host(), authority.port_u16().unwrap_or(80));

    let stream = TcpStream::connect(&address)
        .await
        .map_err(|source| ForwardError::Connect {
            backend: backend.to_string(),
            source,
        })?;

    let io = TokioIo::new(stream);
    let (mut sender, conn) =
        http1::handshake(io)
            .await
            .map_err(|source| ForwardError::Http {
                backend: backend.to_string(),
                source,
            })?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "backend connection closed with error");
        }
    });

    let origin_form: Uri = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .parse()
        .map_err(|_| ForwardError::InvalidBackend(backend.to_string()))?;
    *req.uri_mut() = origin_form;

    strip_hop_by_hop(req.headers_mut());
    if !req.headers().contains_key(header::HOST) {
        if let Ok(host) = HeaderValue::from_str(authority.as_str()) {
            req.headers_mut().insert(header::HOST, host);
        }
    }

    let mut resp = sender
        .send_request(req)
        .await
        .map_err(|source| ForwardError::Http {
            backend: backend.to_string(),
            source,
        })?;
    strip_hop_by_hop(resp.headers_mut());

    Ok(resp.map(Body::new))
}

/// Remove connection-scoped headers, including any named in `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}
