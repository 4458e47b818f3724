//! Redirect classification.
//!
//! Decides whether a probe that ended on `final_url` reached the same site it
//! started on. Pure string work, no I/O.
//!
//! The hop is *not* a real redirect (`standard`) when the final host:
//! - equals the original host,
//! - equals it once a leading `www.` is dropped on either side,
//! - is the IDNA/Punycode form of the original (or the reverse),
//! - shares the original's registrable domain (`shop.example.com` and
//!   `example.com`).
//!
//! Schemes and ports are ignored, so `http` to `https` on the same host is
//! standard.

use std::net::IpAddr;

use crate::models::DetectionStatus;

/// Classifies a probe by its requested and final URLs.
///
/// An empty `final_url` means the probe never completed and is `failed`.
pub fn classify(original_url: &str, final_url: &str) -> DetectionStatus {
    let final_url = final_url.trim();
    if final_url.is_empty() {
        return DetectionStatus::Failed;
    }

    let original = extract_host(original_url);
    let target = extract_host(final_url);
    if target.is_empty() {
        return DetectionStatus::Failed;
    }

    if same_site(&original, &target) {
        DetectionStatus::Standard
    } else {
        DetectionStatus::Redirected
    }
}

fn same_site(original: &str, target: &str) -> bool {
    if original == target {
        return true;
    }

    let original_bare = strip_www(original);
    let target_bare = strip_www(target);
    if original_bare == target_bare {
        return true;
    }

    // IDNA transcoding is not a redirect; compare in ASCII form
    let original_ascii = to_ascii(original_bare);
    let target_ascii = to_ascii(target_bare);
    if let (Some(o), Some(t)) = (&original_ascii, &target_ascii) {
        if o == t {
            return true;
        }
    }

    if is_ip_literal(original_bare) || is_ip_literal(target_bare) {
        return false;
    }

    let o = original_ascii.as_deref().unwrap_or(original_bare);
    let t = target_ascii.as_deref().unwrap_or(target_bare);
    match (registrable_domain(o), registrable_domain(t)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Lowercased host of a URL-ish string: scheme, userinfo, port, path, query
/// and fragment removed. Tolerates missing schemes.
pub fn extract_host(url: &str) -> String {
    let trimmed = url.trim();
    let without_scheme = match trimmed.find("://") {
        Some(idx) => &trimmed[idx + 3..],
        None => trimmed.strip_prefix("//").unwrap_or(trimmed),
    };
    let authority = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host_port = match authority.rfind('@') {
        Some(idx) => &authority[idx + 1..],
        None => authority,
    };

    let host = if let Some(rest) = host_port.strip_prefix('[') {
        // [v6]:port
        rest.split(']').next().unwrap_or_default()
    } else {
        match host_port.rfind(':') {
            Some(idx) if host_port[idx + 1..].chars().all(|c| c.is_ascii_digit()) => {
                &host_port[..idx]
            }
            _ => host_port,
        }
    };

    host.trim_end_matches('.').to_lowercase()
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

fn to_ascii(host: &str) -> Option<String> {
    if host.is_ascii() {
        return Some(host.to_string());
    }
    idna::domain_to_ascii(host).ok()
}

fn is_ip_literal(host: &str) -> bool {
    host.parse::<IpAddr>().is_ok()
}

/// Registrable domain per the Public Suffix List, falling back to the last
/// two labels for names the list does not know.
fn registrable_domain(host: &str) -> Option<String> {
    if !host.contains('.') {
        return None;
    }
    if let Some(domain) = psl::domain_str(host) {
        return Some(domain.to_string());
    }
    let labels: Vec<&str> = host.rsplitn(3, '.').collect();
    if labels.len() < 2 {
        return None;
    }
    Some(format!("{}.{}", labels[1], labels[0]))
}
