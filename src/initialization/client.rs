//! HTTP client initialization.
//!
//! Probes follow redirects by hand so every hop can be recorded, so both
//! clients here have redirects disabled. Timeouts are applied per request.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::ClientBuilder;

use crate::config::{DetectorConfig, DEFAULT_ACCEPT, DEFAULT_ACCEPT_LANGUAGE};
use crate::error_handling::InitializationError;

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static(DEFAULT_ACCEPT_LANGUAGE),
    );
    headers
}

/// Builds a redirect-disabled client.
///
/// With `verify_tls = false` the client accepts any certificate, so a site
/// with a broken certificate is still classified by its HTTP response.
///
/// # Errors
///
/// Returns `InitializationError::HttpClientError` if the TLS backend cannot
/// be built.
pub fn init_probe_client(
    config: &DetectorConfig,
    verify_tls: bool,
) -> Result<reqwest::Client, InitializationError> {
    let client = ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(config.user_agent.clone())
        .default_headers(default_headers())
        .danger_accept_invalid_certs(!verify_tls)
        .pool_max_idle_per_host(config.per_host_limit)
        .build()?;
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clients_build_in_both_modes() {
        let config = DetectorConfig::default();
        assert!(init_probe_client(&config, true).is_ok());
        assert!(init_probe_client(&config, false).is_ok());
    }
}
