//! Single-attempt HTTP probing.
//!
//! A probe normalizes the URL, issues a GET, follows redirects by hand,
//! reads a bounded prefix of the body for the page title and, for HTTPS
//! endpoints, inspects the certificate on a separate connection. Retries are
//! layered on top by [`crate::retry`].

mod body;
mod normalize;
mod redirects;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::debug;
use reqwest::Url;

use crate::config::DetectorConfig;
use crate::error_handling::{categorize_reqwest_error, error_chain_text, FailureReason, InitializationError};
use crate::initialization::init_probe_client;
use crate::models::{ProbeError, ProbeOutcome};
use crate::tls::TlsInspector;

pub use body::extract_title;
pub use normalize::{normalize_url, parse_probe_url, website_domain};

/// Per-call probe settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeSettings {
    pub timeout: Duration,
    /// Fail the probe on certificate errors.
    pub verify_tls: bool,
}

/// Performs one probe attempt.
///
/// Implementations never return errors: failures are described by
/// [`ProbeOutcome::error`].
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, url: &str, settings: &ProbeSettings) -> ProbeOutcome;
}

/// Probes over HTTP with `reqwest`.
pub struct HttpProber {
    verifying: reqwest::Client,
    lenient: reqwest::Client,
    tls: TlsInspector,
    max_redirects: usize,
    max_body_bytes: usize,
    title_max_chars: usize,
}

struct Exchange {
    final_url: String,
    status: u16,
    chain: Vec<String>,
    title: Option<String>,
    content_length: u64,
    response_time: f64,
}

impl HttpProber {
    /// # Errors
    ///
    /// Returns an `InitializationError` if an HTTP client or the TLS
    /// inspection configuration cannot be built.
    pub fn new(config: &DetectorConfig) -> Result<Self, InitializationError> {
        Ok(Self {
            verifying: init_probe_client(config, true)?,
            lenient: init_probe_client(config, false)?,
            tls: TlsInspector::new(config)?,
            max_redirects: config.max_redirects,
            max_body_bytes: config.max_body_bytes,
            title_max_chars: config.title_max_chars,
        })
    }

    async fn exchange(
        &self,
        client: &reqwest::Client,
        target: Url,
        timeout: Duration,
    ) -> Result<Exchange, reqwest::Error> {
        let started = Instant::now();
        let (mut response, chain) =
            redirects::follow_redirects(client, target, self.max_redirects, timeout).await?;

        let final_url = response.url().to_string();
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = body::read_capped(&mut response, self.max_body_bytes).await;
        let response_time = started.elapsed().as_secs_f64();

        let title = if body::is_html(content_type.as_deref()) && !body.is_empty() {
            extract_title(&String::from_utf8_lossy(&body), self.title_max_chars)
        } else {
            None
        };

        Ok(Exchange {
            final_url,
            status,
            chain,
            title,
            content_length: body.len() as u64,
            response_time,
        })
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, url: &str, settings: &ProbeSettings) -> ProbeOutcome {
        let started = Instant::now();

        let target = match parse_probe_url(url) {
            Ok(target) => target,
            Err(reason) => {
                let mut outcome =
                    ProbeOutcome::failure(url, ProbeError::new(FailureReason::UnknownError, reason));
                outcome.detection_duration = started.elapsed().as_secs_f64();
                return outcome;
            }
        };

        let client = if settings.verify_tls {
            &self.verifying
        } else {
            &self.lenient
        };

        let exchange = tokio::time::timeout(
            settings.timeout,
            self.exchange(client, target, settings.timeout),
        )
        .await;

        let mut outcome = match exchange {
            Err(_) => ProbeOutcome::failure(
                url,
                ProbeError::new(
                    FailureReason::Timeout,
                    format!("request timed out after {:.1}s", settings.timeout.as_secs_f64()),
                ),
            ),
            Ok(Err(e)) => ProbeOutcome::failure(
                url,
                ProbeError::new(categorize_reqwest_error(&e), error_chain_text(&e)),
            ),
            Ok(Ok(exchange)) => {
                let error = (exchange.status >= 400).then(|| {
                    ProbeError::new(
                        FailureReason::ServerError,
                        format!("HTTP {}", exchange.status),
                    )
                });
                ProbeOutcome {
                    url: url.to_string(),
                    final_url: Some(exchange.final_url),
                    http_status: Some(exchange.status),
                    response_time: Some(exchange.response_time),
                    redirect_chain: exchange.chain,
                    page_title: exchange.title,
                    content_length: Some(exchange.content_length),
                    tls_info: None,
                    error,
                    retries_used: 0,
                    detection_duration: 0.0,
                }
            }
        };

        // Certificate inspection shares the probe's timeout
        if let Some(final_url) = outcome.final_url.as_deref().and_then(|u| Url::parse(u).ok()) {
            if final_url.scheme() == "https" {
                if let (Some(host), Some(port)) = (final_url.host_str(), final_url.port_or_known_default()) {
                    let host = host.trim_start_matches('[').trim_end_matches(']');
                    let remaining = settings.timeout.saturating_sub(started.elapsed());
                    outcome.tls_info = Some(self.tls.inspect_within(host, port, remaining).await);
                }
            }
        }

        outcome.detection_duration = started.elapsed().as_secs_f64();
        debug!(
            "Probe {} -> {:?} (status {:?}, error {:?}) in {:.3}s",
            url,
            outcome.final_url,
            outcome.http_status,
            outcome.failure_reason(),
            outcome.detection_duration
        );
        outcome
    }
}
