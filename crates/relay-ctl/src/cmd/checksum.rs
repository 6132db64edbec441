//! Checksum and client-key commands.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::DateTime;
use relay_core::checksum::client_key;
use relay_core::config::RelayConfig;
use relay_core::{Clock, ManualClock, SystemClock};
use relay_services::{ChecksumCache, ChecksumResolver};

/// Resolve the checksum the dispatcher would send for `token`.
///
/// `at` pins the clock to an RFC 3339 instant, which makes local derivation
/// reproducible.
pub async fn cmd_checksum(config: &RelayConfig, token: &str, at: Option<&str>) -> Result<()> {
    let clock: Arc<dyn Clock> = match at {
        Some(at) => {
            let instant = DateTime::parse_from_rfc3339(at)
                .with_context(|| format!("--at must be an RFC 3339 timestamp, got {at:?}"))?;
            Arc::new(ManualClock::new(instant))
        }
        None => Arc::new(SystemClock),
    };
    let cache = Arc::new(ChecksumCache::new(clock.clone()));
    let resolver = ChecksumResolver::from_config(config, cache, clock)
        .context("failed to build checksum resolver")?;

    let resolved = resolver.resolve(token, None).await?;
    println!("tier     : {:?}", resolved.tier);
    println!("checksum : {}", resolved.value);
    Ok(())
}

pub fn cmd_client_key(token: &str) {
    println!("{}", client_key(token));
}
