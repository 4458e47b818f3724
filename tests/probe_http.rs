//! HTTP probing against a local mock server.

mod helpers;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use httptest::{matchers::*, responders::*, Expectation, Server};

use site_sentinel::initialization::init_crypto_provider;
use site_sentinel::{
    probe_with_retry, DetectionStatus, DetectorConfig, FailureReason, HttpProber, ProbeOutcome,
    ProbeSettings, Prober,
};

fn prober() -> HttpProber {
    init_crypto_provider();
    HttpProber::new(&DetectorConfig::default()).expect("Failed to build prober")
}

fn settings(timeout: Duration) -> ProbeSettings {
    ProbeSettings {
        timeout,
        verify_tls: false,
    }
}

#[tokio::test]
async fn test_plain_page_is_standard_with_title() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/")).respond_with(
            status_code(200)
                .append_header("Content-Type", "text/html; charset=utf-8")
                .body("<html><head><title>  Mock   Home </title></head><body>hi</body></html>"),
        ),
    );

    let url = format!("http://{}/", server.addr());
    let outcome = prober().probe(&url, &settings(Duration::from_secs(5))).await;

    assert_eq!(outcome.status(), DetectionStatus::Standard);
    assert_eq!(outcome.http_status, Some(200));
    assert_eq!(outcome.final_url.as_deref(), Some(url.as_str()));
    assert_eq!(outcome.page_title.as_deref(), Some("Mock Home"));
    assert_eq!(outcome.redirect_chain, vec![url.clone()]);
    assert!(outcome.response_time.is_some());
    assert!(outcome.tls_info.is_none());
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn test_relative_redirect_is_followed() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/old"))
            .respond_with(status_code(301).append_header("Location", "/new")),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", "/new"))
            .respond_with(status_code(200).body("<title>New</title>")),
    );

    let start = format!("http://{}/old", server.addr());
    let target = format!("http://{}/new", server.addr());
    let outcome = prober().probe(&start, &settings(Duration::from_secs(5))).await;

    assert_eq!(outcome.http_status, Some(200));
    assert_eq!(outcome.final_url.as_deref(), Some(target.as_str()));
    assert_eq!(outcome.redirect_chain, vec![start, target]);
    // Same host on both ends
    assert_eq!(outcome.status(), DetectionStatus::Standard);
}

#[tokio::test]
async fn test_redirect_cap_returns_last_response() {
    let server = Server::run();
    for (path, next) in [("/r0", "/r1"), ("/r1", "/r2"), ("/r2", "/r3"), ("/r3", "/r4")] {
        server.expect(
            Expectation::matching(request::method_path("GET", path))
                .respond_with(status_code(301).append_header("Location", next)),
        );
    }

    let start = format!("http://{}/r0", server.addr());
    let last = format!("http://{}/r3", server.addr());
    let outcome = prober().probe(&start, &settings(Duration::from_secs(5))).await;

    // Three redirects followed; /r4 is never requested
    assert_eq!(outcome.redirect_chain.len(), 4);
    assert_eq!(outcome.http_status, Some(301));
    assert_eq!(outcome.final_url.as_deref(), Some(last.as_str()));
    assert!(outcome.error.is_none());
    assert_eq!(outcome.status(), DetectionStatus::Standard);
}

#[tokio::test]
async fn test_http_error_is_server_error() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/missing"))
            .respond_with(status_code(404).body("Not Found")),
    );

    let url = format!("http://{}/missing", server.addr());
    let outcome = prober().probe(&url, &settings(Duration::from_secs(5))).await;

    assert_eq!(outcome.status(), DetectionStatus::Failed);
    assert_eq!(outcome.failure_reason(), Some(FailureReason::ServerError));
    assert_eq!(outcome.http_status, Some(404));
    assert!(outcome.error.unwrap().message.contains("404"));
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/slow")).respond_with(delay_and_then(
            Duration::from_secs(2),
            status_code(200),
        )),
    );

    let url = format!("http://{}/slow", server.addr());
    let outcome = prober().probe(&url, &settings(Duration::from_millis(200))).await;

    assert_eq!(outcome.failure_reason(), Some(FailureReason::Timeout));
    assert!(outcome.http_status.is_none());
    assert!(outcome.detection_duration < 2.0);
}

#[tokio::test]
async fn test_refused_connection_is_connection_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
        listener.local_addr().expect("No local addr").port()
    };

    let url = format!("http://127.0.0.1:{port}/");
    let outcome = prober().probe(&url, &settings(Duration::from_secs(5))).await;

    assert_eq!(outcome.failure_reason(), Some(FailureReason::ConnectionError));
    assert_eq!(outcome.status(), DetectionStatus::Failed);
}

#[tokio::test]
async fn test_stalled_tls_endpoint_stays_within_timeout() {
    // Accepted by the kernel backlog, never answered
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    let port = listener.local_addr().expect("No local addr").port();

    let timeout = Duration::from_millis(300);
    let url = format!("https://127.0.0.1:{port}/");
    let outcome = prober().probe(&url, &settings(timeout)).await;

    assert_eq!(outcome.failure_reason(), Some(FailureReason::Timeout));
    assert!(
        outcome.detection_duration <= timeout.as_secs_f64() + 1.0,
        "took {:.3}s",
        outcome.detection_duration
    );
    drop(listener);
}

#[tokio::test]
async fn test_unsupported_scheme_fails_without_request() {
    let outcome = prober()
        .probe("ftp://files.example.com/", &settings(Duration::from_secs(5)))
        .await;

    assert_eq!(outcome.failure_reason(), Some(FailureReason::UnknownError));
    assert!(outcome.error.unwrap().message.contains("unsupported scheme"));
}

/// Counts calls to the wrapped prober.
struct Counting<P> {
    inner: P,
    calls: AtomicUsize,
}

#[async_trait]
impl<P: Prober> Prober for Counting<P> {
    async fn probe(&self, url: &str, settings: &ProbeSettings) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.probe(url, settings).await
    }
}

#[tokio::test]
async fn test_http_errors_are_not_retried() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/busy"))
            .times(1)
            .respond_with(status_code(503)),
    );

    let counting = Counting {
        inner: prober(),
        calls: AtomicUsize::new(0),
    };
    let url = format!("http://{}/busy", server.addr());
    let outcome = probe_with_retry(
        &counting,
        &url,
        &settings(Duration::from_secs(5)),
        3,
        Duration::from_millis(10),
    )
    .await;

    assert_eq!(outcome.failure_reason(), Some(FailureReason::ServerError));
    assert_eq!(outcome.retries_used, 0);
    assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
}
