//! URL normalization.

use url::Url;

use crate::classifier::extract_host;

/// Maximum URL length accepted for probing.
const MAX_URL_LENGTH: usize = 2048;

/// Prefixes `http://` when the input has no scheme and trims whitespace.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

/// Normalizes and parses a URL for probing.
///
/// # Errors
///
/// Returns a human-readable reason when the URL is empty, too long, not
/// parseable, uses a scheme other than http/https, or has no host.
pub fn parse_probe_url(raw: &str) -> Result<Url, String> {
    if raw.trim().is_empty() {
        return Err("empty URL".to_string());
    }
    let normalized = normalize_url(raw);
    if normalized.len() > MAX_URL_LENGTH {
        return Err(format!(
            "URL exceeds maximum length ({} > {})",
            normalized.len(),
            MAX_URL_LENGTH
        ));
    }
    let parsed = Url::parse(&normalized).map_err(|e| format!("invalid URL {normalized}: {e}"))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(format!("unsupported scheme: {other}")),
    }
    if parsed.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(format!("URL has no host: {normalized}"));
    }
    Ok(parsed)
}

/// Host of a website URL with any leading `www.` removed, for display and
/// grouping.
pub fn website_domain(raw: &str) -> String {
    let host = extract_host(&normalize_url(raw));
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_adds_http() {
        assert_eq!(normalize_url("example.com"), "http://example.com");
        assert_eq!(normalize_url("  example.com/a "), "http://example.com/a");
    }

    #[test]
    fn test_normalize_preserves_scheme() {
        assert_eq!(normalize_url("https://example.com"), "https://example.com");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_probe_url("").is_err());
        assert!(parse_probe_url("ftp://example.com").is_err());
        assert!(parse_probe_url("http://").is_err());
        let long = format!("example.com/{}", "a".repeat(MAX_URL_LENGTH));
        assert!(parse_probe_url(&long).is_err());
    }

    #[test]
    fn test_parse_accepts_schemeless() {
        let url = parse_probe_url("example.com/path").unwrap();
        assert_eq!(url.scheme(), "http");
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_website_domain() {
        assert_eq!(website_domain("https://www.Example.com/x"), "example.com");
        assert_eq!(website_domain("shop.example.com:8080"), "shop.example.com");
    }
}
