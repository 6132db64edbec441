//! Checksum resolution.
//!
//! Tiers are tried in order and the first one that yields a value wins:
//!
//!   Explicit   — checksum supplied by the caller (e.g. an inbound header)
//!   Configured — a static checksum from config
//!   Remote     — fetched from the configured source URL, cached per token
//!   Local      — derived from the token and the current 30-minute window
//!
//! Explicit, Configured and Remote may decline. Local always answers or
//! fails with `MalformedToken`. A Remote failure does not fall through:
//! it resolves to an empty checksum and the backend rejects the call.

use std::sync::Arc;
use std::time::Duration;

use relay_core::checksum;
use relay_core::config::{ChecksumSource, RelayConfig};
use relay_core::window::bucket_timestamp;
use relay_core::{ChecksumError, Clock, Fingerprint};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;

use crate::cache::{ChecksumCache, CHECKSUM_TTL};

/// Which resolution tier produced a checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Explicit,
    Configured,
    Remote,
    Local,
}

/// Tiers that may decline, in evaluation order. Local comes after these.
const DECLINABLE_TIERS: [Tier; 3] = [Tier::Explicit, Tier::Configured, Tier::Remote];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChecksum {
    pub value: String,
    pub tier: Tier,
}

pub struct ChecksumResolver {
    source: ChecksumSource,
    cache: Arc<ChecksumCache>,
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl ChecksumResolver {
    pub fn new(
        source: ChecksumSource,
        cache: Arc<ChecksumCache>,
        http: reqwest::Client,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            cache,
            http,
            clock,
            ttl: CHECKSUM_TTL,
        }
    }

    /// Resolver for `config.checksum`, fetching through `config.network`.
    pub fn from_config(
        config: &RelayConfig,
        cache: Arc<ChecksumCache>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, reqwest::Error> {
        let http = crate::http::client(&config.network)?;
        let resolver = Self::new(config.checksum.source(), cache, http, clock);
        Ok(resolver.with_ttl(config.checksum.cache_ttl()))
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub async fn resolve(
        &self,
        token: &str,
        explicit: Option<&str>,
    ) -> Result<ResolvedChecksum, ChecksumError> {
        for tier in DECLINABLE_TIERS {
            if let Some(value) = self.attempt(tier, token, explicit).await {
                tracing::debug!(?tier, "checksum resolved");
                return Ok(ResolvedChecksum { value, tier });
            }
        }

        let value = self.derive_local(token)?;
        tracing::debug!(tier = ?Tier::Local, "checksum resolved");
        Ok(ResolvedChecksum {
            value,
            tier: Tier::Local,
        })
    }

    async fn attempt(&self, tier: Tier, token: &str, explicit: Option<&str>) -> Option<String> {
        match (tier, &self.source) {
            (Tier::Explicit, _) => explicit.filter(|v| !v.is_empty()).map(str::to_owned),
            (Tier::Configured, ChecksumSource::Static(value)) => Some(value.clone()),
            (Tier::Remote, ChecksumSource::Remote(url)) => Some(self.remote(url, token).await),
            _ => None,
        }
    }

    /// Cached remote checksum, fetching on a miss. Failures degrade to "".
    async fn remote(&self, url: &str, token: &str) -> String {
        let key = Fingerprint::of(token);
        if let Some(value) = self.cache.get(&key) {
            tracing::trace!(fingerprint = ?key, "checksum cache hit");
            return value;
        }
        tracing::trace!(fingerprint = ?key, "checksum cache miss");

        match self.fetch(url).await {
            Ok(value) => {
                if !value.is_empty() {
                    self.cache.put(key, value.clone(), self.ttl);
                }
                value
            }
            Err(e) => {
                tracing::warn!(error = %e, url, "checksum source unavailable");
                String::new()
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, SourceError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(SourceError::Status(status));
        }
        if let Some(found) = non_text_content_type(response.headers()) {
            return Err(SourceError::NotText(found));
        }
        Ok(response.text().await?.trim().to_owned())
    }

    fn derive_local(&self, token: &str) -> Result<String, ChecksumError> {
        checksum::derive(token, bucket_timestamp(&self.clock.now()))
    }
}

/// The reply's content type, if it is present and not `text/*`.
fn non_text_content_type(headers: &reqwest::header::HeaderMap) -> Option<String> {
    let raw = headers.get(CONTENT_TYPE)?.to_str().unwrap_or_default();
    let mime = raw.split(';').next().unwrap_or_default().trim();
    let is_text = mime
        .get(..5)
        .is_some_and(|major| major.eq_ignore_ascii_case("text/"));
    (!is_text).then(|| raw.to_owned())
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Why the remote checksum source could not be used.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("checksum source request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("checksum source returned {0}")]
    Status(StatusCode),

    #[error("checksum source replied with non-text content type {0:?}")]
    NotText(String),
}
