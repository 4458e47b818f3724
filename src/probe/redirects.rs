//! Manual redirect following.

use std::time::Duration;

use log::{debug, warn};
use reqwest::{StatusCode, Url};

/// Follows redirects hop by hop with a redirect-disabled client.
///
/// Every requested URL is pushed onto the returned chain. At most
/// `max_redirects` redirects are followed; when the cap is reached the last
/// response is returned as final, redirect status and all. A redirect without
/// a usable `Location` header also ends the chain.
///
/// # Errors
///
/// Returns the transport error of the first request that fails.
pub(crate) async fn follow_redirects(
    client: &reqwest::Client,
    start: Url,
    max_redirects: usize,
    timeout: Duration,
) -> Result<(reqwest::Response, Vec<String>), reqwest::Error> {
    let mut chain: Vec<String> = Vec::new();
    let mut current = start;

    loop {
        chain.push(current.to_string());
        let response = client.get(current.clone()).timeout(timeout).send().await?;

        if !is_redirect(response.status()) {
            return Ok((response, chain));
        }
        if chain.len() > max_redirects {
            debug!(
                "Redirect cap ({max_redirects}) reached at {current}, treating response as final"
            );
            return Ok((response, chain));
        }

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let next = match location {
            Some(loc) => current.join(&loc).ok(),
            None => None,
        };
        match next {
            Some(next) => current = next,
            None => {
                warn!(
                    "Redirect status {} for {} without a usable Location header",
                    response.status(),
                    current
                );
                return Ok((response, chain));
            }
        }
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_redirect() {
        assert!(is_redirect(StatusCode::MOVED_PERMANENTLY));
        assert!(is_redirect(StatusCode::PERMANENT_REDIRECT));
        assert!(!is_redirect(StatusCode::OK));
        assert!(!is_redirect(StatusCode::NOT_MODIFIED));
    }
}
