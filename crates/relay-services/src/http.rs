//! Shared reqwest client construction.

use relay_core::config::NetworkConfig;

/// Client builder with the configured proxy applied.
///
/// An empty proxy means a direct connection; system proxy variables are
/// ignored so the relay's egress only depends on its own config.
pub fn client_builder(network: &NetworkConfig) -> Result<reqwest::ClientBuilder, reqwest::Error> {
    let builder = reqwest::Client::builder();
    let proxy = network.proxy.trim();
    if proxy.is_empty() {
        Ok(builder.no_proxy())
    } else {
        Ok(builder.proxy(reqwest::Proxy::all(proxy)?))
    }
}

/// Plain client for auxiliary calls such as the checksum source.
pub fn client(network: &NetworkConfig) -> Result<reqwest::Client, reqwest::Error> {
    client_builder(network)?.build()
}
