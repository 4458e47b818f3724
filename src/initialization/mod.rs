//! Application initialization and resource setup.
//!
//! Logger, HTTP clients and the process-wide TLS crypto provider.

mod client;
mod logger;

use rustls::crypto::{ring::default_provider, CryptoProvider};

pub use client::init_probe_client;
pub use logger::init_logger_with;

/// Installs the `ring` crypto provider for `rustls`.
///
/// Must run before any TLS inspection handshake. Reinstalling is harmless.
pub fn init_crypto_provider() {
    let _ = CryptoProvider::install_default(default_provider());
}
