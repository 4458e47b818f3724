//! TLS certificate inspection.
//!
//! Opens a separate TLS connection to an HTTPS endpoint and reads the leaf
//! certificate without requesting the page again. The first handshake
//! verifies the chain against the bundled web roots; if verification fails a
//! second, non-verifying handshake still extracts the certificate and the
//! result is reported with `valid = false`.
//!
//! Inspection never fails a probe: every problem ends up in
//! [`TlsInfo::error`]. Probes call [`TlsInspector::inspect_within`] so that
//! both handshakes together stay inside the probe's remaining timeout.

mod verifier;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;
use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName};
use tokio::net::TcpStream;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::config::DetectorConfig;
use crate::error_handling::{error_chain_text, InitializationError};
use crate::models::TlsInfo;

use verifier::AcceptAnyCertificate;

enum HandshakeError {
    /// Could not reach the endpoint at all.
    Connect(String),
    /// Reached the endpoint but the TLS handshake failed.
    Handshake(String),
}

/// Holds the two client configurations used for inspection.
pub struct TlsInspector {
    verifying: TlsConnector,
    lenient: TlsConnector,
    connect_timeout: Duration,
    handshake_timeout: Duration,
}

impl TlsInspector {
    /// Builds both configurations with the `ring` provider. Connection
    /// limits come from `config`.
    ///
    /// # Errors
    ///
    /// Returns `InitializationError::TlsConfigError` if the provider does not
    /// support the default protocol versions.
    pub fn new(config: &DetectorConfig) -> Result<Self, InitializationError> {
        let provider: Arc<CryptoProvider> = Arc::new(ring::default_provider());

        let mut root_store = RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let verifying = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()?
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let lenient = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate::new(provider)))
            .with_no_client_auth();

        Ok(Self {
            verifying: TlsConnector::from(Arc::new(verifying)),
            lenient: TlsConnector::from(Arc::new(lenient)),
            connect_timeout: config.tls_connect_timeout,
            handshake_timeout: config.tls_handshake_timeout,
        })
    }

    /// Like [`inspect`](Self::inspect) but gives up once `budget` has
    /// elapsed, reporting the expiry in [`TlsInfo::error`].
    pub async fn inspect_within(&self, host: &str, port: u16, budget: Duration) -> TlsInfo {
        match tokio::time::timeout(budget, self.inspect(host, port)).await {
            Ok(info) => info,
            Err(_) => {
                debug!("TLS inspection for {host}:{port} ran out of time");
                TlsInfo {
                    error: Some(format!(
                        "TLS inspection timed out after {:.1}s",
                        budget.as_secs_f64()
                    )),
                    ..Default::default()
                }
            }
        }
    }

    /// Inspects the certificate served for `host` on `port`.
    pub async fn inspect(&self, host: &str, port: u16) -> TlsInfo {
        debug!("Inspecting TLS certificate for {host}:{port}");

        match self.handshake(&self.verifying, host, port).await {
            Ok(certs) => certificate_info(&certs, true, None),
            Err(HandshakeError::Connect(msg)) => TlsInfo {
                error: Some(msg),
                ..Default::default()
            },
            Err(HandshakeError::Handshake(verify_error)) => {
                debug!("Verified handshake failed for {host}: {verify_error}");
                match self.handshake(&self.lenient, host, port).await {
                    Ok(certs) => certificate_info(&certs, false, Some(verify_error)),
                    Err(HandshakeError::Connect(msg)) | Err(HandshakeError::Handshake(msg)) => {
                        TlsInfo {
                            error: Some(format!("{verify_error}; retry without verification: {msg}")),
                            ..Default::default()
                        }
                    }
                }
            }
        }
    }

    async fn handshake(
        &self,
        connector: &TlsConnector,
        host: &str,
        port: u16,
    ) -> Result<Vec<CertificateDer<'static>>, HandshakeError> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| HandshakeError::Connect(format!("invalid server name {host}: {e}")))?;

        let sock = match tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port)))
            .await
        {
            Ok(Ok(sock)) => sock,
            Ok(Err(e)) => {
                return Err(HandshakeError::Connect(format!(
                    "failed to connect to {host}:{port}: {e}"
                )))
            }
            Err(_) => {
                return Err(HandshakeError::Connect(format!(
                    "TCP connection timeout for {host}:{port}"
                )))
            }
        };

        let stream =
            match tokio::time::timeout(self.handshake_timeout, connector.connect(server_name, sock))
                .await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => return Err(HandshakeError::Handshake(error_chain_text(&e))),
                Err(_) => {
                    return Err(HandshakeError::Connect(format!(
                        "TLS handshake timeout for {host}"
                    )))
                }
            };

        let certs = stream
            .get_ref()
            .1
            .peer_certificates()
            .map(|certs| certs.iter().map(|c| c.clone().into_owned()).collect())
            .unwrap_or_default();
        Ok(certs)
    }
}

fn certificate_info(
    certs: &[CertificateDer<'static>],
    verified: bool,
    verify_error: Option<String>,
) -> TlsInfo {
    let Some(leaf) = certs.first() else {
        return TlsInfo {
            error: Some("server presented no certificate".to_string()),
            ..Default::default()
        };
    };

    let cert = match x509_parser::parse_x509_certificate(leaf.as_ref()) {
        Ok((_, cert)) => cert,
        Err(e) => {
            return TlsInfo {
                error: Some(format!("certificate parse error: {e}")),
                ..Default::default()
            }
        }
    };

    let not_before = DateTime::<Utc>::from_timestamp(cert.validity().not_before.timestamp(), 0);
    let not_after = DateTime::<Utc>::from_timestamp(cert.validity().not_after.timestamp(), 0);
    let now = Utc::now();
    let expired = not_after.map(|t| t < now).unwrap_or(false);

    TlsInfo {
        subject: Some(cert.subject().to_string()),
        issuer: Some(cert.issuer().to_string()),
        not_before,
        not_after,
        expires_in_days: not_after.map(|t| (t - now).num_days()),
        expired,
        valid: verified && !expired,
        error: verify_error,
    }
}
