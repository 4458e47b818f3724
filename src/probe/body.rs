//! Bounded body reads and page title extraction.

use log::debug;
use scraper::{Html, Selector};

use crate::models::truncate_chars;

/// Reads at most `cap` bytes of the response body.
///
/// The body is consumed chunk by chunk and reading stops once the cap is
/// reached, so oversized pages never sit in memory in full. A transport
/// error mid-body keeps what was read so far.
pub(crate) async fn read_capped(response: &mut reqwest::Response, cap: usize) -> Vec<u8> {
    let mut body = Vec::new();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let room = cap.saturating_sub(body.len());
                if chunk.len() >= room {
                    body.extend_from_slice(&chunk[..room]);
                    debug!("Body truncated at {cap} bytes for {}", response.url());
                    break;
                }
                body.extend_from_slice(&chunk);
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Body read stopped for {}: {e}", response.url());
                break;
            }
        }
    }
    body
}

/// Whether a `Content-Type` header value denotes HTML.
///
/// A missing header is treated as HTML since many servers omit it.
pub(crate) fn is_html(content_type: Option<&str>) -> bool {
    match content_type {
        Some(ct) => {
            let ct = ct.to_ascii_lowercase();
            ct.starts_with("text/html") || ct.starts_with("application/xhtml")
        }
        None => true,
    }
}

/// Text of the first `<title>`, whitespace collapsed and truncated to
/// `max_chars` characters.
pub fn extract_title(html: &str, max_chars: usize) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    let document = Html::parse_document(html);
    let raw: String = document.select(&selector).next()?.text().collect();
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(truncate_chars(&collapsed, max_chars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_title_collapses_whitespace() {
        let html = "<html><head><title>\n  Hello \t World  </title></head></html>";
        assert_eq!(extract_title(html, 200), Some("Hello World".to_string()));
    }

    #[test]
    fn test_extract_title_truncates() {
        let long = "网".repeat(300);
        let html = format!("<title>{long}</title>");
        let title = extract_title(&html, 200).unwrap();
        assert_eq!(title.chars().count(), 200);
    }

    #[test]
    fn test_extract_title_missing_or_empty() {
        assert_eq!(extract_title("<html><body>no title</body></html>", 200), None);
        assert_eq!(extract_title("<title>   </title>", 200), None);
    }

    #[test]
    fn test_is_html() {
        assert!(is_html(Some("text/html; charset=utf-8")));
        assert!(is_html(None));
        assert!(!is_html(Some("application/json")));
    }
}
