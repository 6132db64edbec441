//! StreamChat dispatch.
//!
//! One call is one linear pass: usage gate → frame → checksum → headers →
//! POST. The response stream is handed back untouched. There are no retries
//! here; callers own retry policy and cancellation.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use relay_core::checksum::client_key;
use relay_core::config::{BackendConfig, ConfigError, RelayConfig};
use relay_core::wire::{self, FrameError};
use relay_core::{ChatRequest, ChecksumError};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::resolver::ChecksumResolver;
use crate::usage::UsageMeter;

/// Path of the streaming chat RPC on the backend.
pub const STREAM_CHAT_PATH: &str = "/aiserver.v1.AiService/StreamChat";

const REQUEST_CONTENT_TYPE: &str = "application/connect+proto";
const USER_AGENT: &str = "connect-es/1.6.1";

/// Rejection bodies are kept for diagnostics up to this many characters.
const REJECTION_BODY_LIMIT: usize = 512;

/// Per-call inputs that do not belong to the chat request itself.
#[derive(Clone)]
pub struct CallContext {
    pub token: String,
    /// Checksum supplied by the caller; skips resolution when non-empty.
    pub checksum: Option<String>,
    /// Cancelling aborts the in-flight call with `DispatchError::Cancelled`.
    pub cancel: CancellationToken,
}

impl CallContext {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            checksum: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("token", &"<redacted>")
            .field("checksum", &self.checksum)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

pub struct RequestDispatcher {
    http: reqwest::Client,
    endpoint: Url,
    host: String,
    backend: BackendConfig,
    resolver: ChecksumResolver,
    usage: Arc<dyn UsageMeter>,
}

impl RequestDispatcher {
    /// Build a dispatcher for `config.backend`.
    ///
    /// When `backend.resolve` is set, the origin's host name is pinned to that
    /// address, so TLS still validates against the host name.
    pub fn new(
        config: &RelayConfig,
        resolver: ChecksumResolver,
        usage: Arc<dyn UsageMeter>,
    ) -> Result<Self, DispatchError> {
        let origin = Url::parse(&config.backend.origin)
            .map_err(|e| DispatchError::InvalidEndpoint(format!("{}: {e}", config.backend.origin)))?;
        let host_name = origin
            .host_str()
            .ok_or_else(|| DispatchError::InvalidEndpoint(format!("{origin}: no host")))?
            .to_owned();
        let host = match origin.port() {
            Some(port) => format!("{host_name}:{port}"),
            None => host_name.clone(),
        };
        let endpoint = origin
            .join(STREAM_CHAT_PATH)
            .map_err(|e| DispatchError::InvalidEndpoint(format!("{origin}: {e}")))?;

        let mut builder = crate::http::client_builder(&config.network)
            .map_err(DispatchError::ClientBuild)?
            .http1_only();
        if let Some(addr) = config.backend.resolve_addr()? {
            tracing::debug!(host = %host_name, %addr, "pinning backend address");
            builder = builder.resolve(&host_name, addr);
        }
        let http = builder.build().map_err(DispatchError::ClientBuild)?;

        Ok(Self {
            http,
            endpoint,
            host,
            backend: config.backend.clone(),
            resolver,
            usage,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Send `request` and return the raw streaming response.
    pub async fn dispatch(
        &self,
        request: &ChatRequest,
        ctx: &CallContext,
    ) -> Result<reqwest::Response, DispatchError> {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                tracing::debug!("dispatch cancelled");
                Err(DispatchError::Cancelled)
            }
            result = self.send(request, ctx) => result,
        }
    }

    async fn send(
        &self,
        request: &ChatRequest,
        ctx: &CallContext,
    ) -> Result<reqwest::Response, DispatchError> {
        let remaining = self.usage.remaining(&ctx.token);
        if remaining <= 0 {
            return Err(DispatchError::UsageExceeded { remaining });
        }

        let frame = wire::frame_request(request)?;
        let checksum = self
            .resolver
            .resolve(&ctx.token, ctx.checksum.as_deref())
            .await?;
        let headers = self.headers(&ctx.token, &checksum.value)?;

        let response = self
            .http
            .post(self.endpoint.clone())
            .headers(headers)
            .body(chunked_body(frame.encode()))
            .send()
            .await
            .map_err(DispatchError::Transport)?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, tier = ?checksum.tier, "backend rejected request");
            return Err(DispatchError::UpstreamRejected {
                status,
                body: body.chars().take(REJECTION_BODY_LIMIT).collect(),
            });
        }
        if let Some(found) = unexpected_content_type(response.headers()) {
            return Err(DispatchError::UnexpectedContentType(found));
        }

        tracing::debug!(
            tier = ?checksum.tier,
            payload = frame.length(),
            "stream chat opened"
        );
        Ok(response)
    }

    /// The full header set the official client sends.
    pub fn headers(&self, token: &str, checksum: &str) -> Result<HeaderMap, DispatchError> {
        let mut headers = HeaderMap::with_capacity(18);

        let mut authorization = HeaderValue::from_str(&format!("Bearer {token}"))?;
        authorization.set_sensitive(true);
        headers.insert(HeaderName::from_static("authorization"), authorization);

        put(&mut headers, "content-type", REQUEST_CONTENT_TYPE)?;
        put(&mut headers, "connect-accept-encoding", "gzip")?;
        put(&mut headers, "connect-content-encoding", "gzip")?;
        put(&mut headers, "connect-protocol-version", "1")?;
        put(&mut headers, "traceparent", &trace_parent())?;
        put(&mut headers, "user-agent", USER_AGENT)?;
        put(&mut headers, "x-amzn-trace-id", &format!("Root={}", Uuid::new_v4()))?;
        put(&mut headers, "x-client-key", &client_key(token))?;
        put(&mut headers, "x-cursor-checksum", checksum)?;
        put(&mut headers, "x-cursor-client-version", &self.backend.client_version)?;
        put(&mut headers, "x-cursor-timezone", &self.backend.timezone)?;
        put(&mut headers, "x-ghost-mode", if self.backend.ghost_mode { "true" } else { "false" })?;
        put(&mut headers, "x-request-id", &Uuid::new_v4().to_string())?;
        put(&mut headers, "x-session-id", &Uuid::new_v4().to_string())?;
        put(&mut headers, "host", &self.host)?;
        put(&mut headers, "connection", "close")?;
        put(&mut headers, "transfer-encoding", "chunked")?;
        Ok(headers)
    }
}

fn put(headers: &mut HeaderMap, name: &'static str, value: &str) -> Result<(), InvalidHeaderValue> {
    headers.insert(HeaderName::from_static(name), HeaderValue::from_str(value)?);
    Ok(())
}

/// W3C traceparent: version 00, random trace and span ids, flags 00.
fn trace_parent() -> String {
    format!("00-{}-{:016x}-00", Uuid::new_v4().simple(), rand::random::<u64>())
}

/// Body of unknown length, so it goes out with chunked transfer encoding.
fn chunked_body(frame: Bytes) -> reqwest::Body {
    reqwest::Body::wrap_stream(futures::stream::once(async move {
        Ok::<_, std::io::Error>(frame)
    }))
}

/// The response content type, if it is present and not a protobuf type.
fn unexpected_content_type(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(CONTENT_TYPE)?.to_str().unwrap_or_default();
    let mime = raw.split(';').next().unwrap_or_default().trim();
    let is_proto = mime.eq_ignore_ascii_case("application/proto")
        || mime.eq_ignore_ascii_case(REQUEST_CONTENT_TYPE);
    (!is_proto).then(|| raw.to_owned())
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("usage exceeded: {remaining} calls remaining")]
    UsageExceeded { remaining: i64 },

    #[error(transparent)]
    Checksum(#[from] ChecksumError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),

    #[error("invalid backend endpoint {0}")]
    InvalidEndpoint(String),

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("transport failure: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("backend rejected request with {status}: {body}")]
    UpstreamRejected { status: StatusCode, body: String },

    #[error("backend replied with non-protobuf content type {0:?}")]
    UnexpectedContentType(String),

    #[error("request cancelled")]
    Cancelled,
}

impl DispatchError {
    /// HTTP status associated with the failure, when there is one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            DispatchError::UpstreamRejected { status, .. } => Some(*status),
            DispatchError::Transport(e) => e.status(),
            _ => None,
        }
    }
}
