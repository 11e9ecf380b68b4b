//! HTTP fetch client with bounded retry.
//!
//! Only transport failures are retried: refused connections, timeouts,
//! DNS errors and interrupted bodies. Any HTTP status, including 402 and
//! 5xx, is a successful transport result and is returned to the caller.
//!
//! After failed attempt `i` (1-based) the client sleeps `2^i` backoff units
//! before doing anything else, so a budget of two attempts with a one second
//! unit fails at t=6s after attempts at t=0s and t=2s.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use tachi::config::TachiConfig;
use tachi::error::{ConfigError, NetworkError};
#[cfg(feature = "telemetry")]
use tracing::{instrument, trace, warn};

/// A request that can be sent, and re-sent, through [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Target URL.
    pub url: String,
    /// HTTP method.
    pub method: Method,
    /// Headers sent with every attempt.
    pub headers: HeaderMap,
    /// Optional request body.
    pub body: Option<Vec<u8>>,
}

impl FetchRequest {
    /// Creates a request with the given method.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Creates a `GET` request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Sets the HTTP method.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Appends a header.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A fully read HTTP response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Attempt budget and backoff unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    unit: Duration,
}

impl RetryPolicy {
    /// Creates a policy allowing `max_attempts` attempts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidMaxRetries`] if `max_attempts` is zero.
    pub const fn new(max_attempts: u32, unit: Duration) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::InvalidMaxRetries);
        }
        Ok(Self { max_attempts, unit })
    }

    /// Maximum number of attempts.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after failed attempt `attempt` (1-based): `2^attempt` units.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.unit.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Classifies failures of a single attempt.
pub trait Transient: fmt::Display {
    /// Whether another attempt could succeed.
    fn is_transient(&self) -> bool;
}

impl Transient for reqwest::Error {
    fn is_transient(&self) -> bool {
        !self.is_builder()
    }
}

/// Runs `attempt` until it succeeds, fails permanently, or the budget is spent.
///
/// The closure receives the 1-based attempt number.
///
/// # Errors
///
/// Returns [`NetworkError`] carrying the number of attempts made and the last
/// failure.
pub async fn with_retry<T, E, F, Fut>(
    policy: RetryPolicy,
    url: &str,
    mut attempt: F,
) -> Result<T, NetworkError>
where
    E: Transient,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut last_error = String::new();
    for n in 1..=policy.max_attempts {
        match attempt(n).await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => {
                return Err(NetworkError {
                    url: url.to_owned(),
                    attempts: n,
                    last_error: e.to_string(),
                });
            }
            Err(e) => {
                let delay = policy.delay_after(n);
                #[cfg(feature = "telemetry")]
                warn!(
                    url,
                    attempt = n,
                    max_attempts = policy.max_attempts,
                    ?delay,
                    error = %e,
                    "Request attempt failed"
                );
                last_error = e.to_string();
                tokio::time::sleep(delay).await;
            }
        }
    }
    Err(NetworkError {
        url: url.to_owned(),
        attempts: policy.max_attempts,
        last_error,
    })
}

/// HTTP client owning one connection pool and a retry policy.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl HttpFetcher {
    /// Creates a fetcher from an existing client.
    #[must_use]
    pub const fn new(client: reqwest::Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Builds a client with the user agent, timeout and retry settings of `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the retry budget is zero or the client
    /// cannot be built.
    pub fn from_config(config: &TachiConfig) -> Result<Self, ConfigError> {
        let policy = RetryPolicy::new(config.max_retries, config.backoff_unit())?;
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "http_client",
                reason: e.to_string(),
            })?;
        Ok(Self::new(client, policy))
    }

    /// Retry policy in use.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Sends `request`, retrying transport failures.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError`] once the retry budget is exhausted.
    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "tachi.http.send",
            skip_all,
            fields(method = %request.method, url = %request.url),
            err
        )
    )]
    pub async fn send(&self, request: &FetchRequest) -> Result<RawResponse, NetworkError> {
        with_retry(self.policy, &request.url, |_| self.attempt(request)).await
    }

    async fn attempt(&self, request: &FetchRequest) -> Result<RawResponse, reqwest::Error> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.as_str())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        #[cfg(feature = "telemetry")]
        trace!(%status, len = body.len(), "Response received");
        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::Instant;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug)]
    struct Refused;

    impl fmt::Display for Refused {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("connection refused")
        }
    }

    impl Transient for Refused {
        fn is_transient(&self) -> bool {
            true
        }
    }

    #[derive(Debug)]
    struct Malformed;

    impl fmt::Display for Malformed {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("malformed request")
        }
    }

    impl Transient for Malformed {
        fn is_transient(&self) -> bool {
            false
        }
    }

    fn policy(max_attempts: u32, unit_ms: u64) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(unit_ms)).unwrap()
    }

    #[test]
    fn test_zero_attempts_rejected() {
        assert!(matches!(
            RetryPolicy::new(0, Duration::from_secs(1)),
            Err(ConfigError::InvalidMaxRetries)
        ));
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = policy(5, 1_000);
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_attempts_back_off_two_then_four_units() {
        let start = Instant::now();
        let attempts = Mutex::new(Vec::new());

        let result: Result<(), _> = with_retry(policy(2, 1_000), "http://down", |n| {
            attempts.lock().unwrap().push((n, start.elapsed()));
            async { Err(Refused) }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 2);
        assert_eq!(err.url, "http://down");
        assert_eq!(err.last_error, "connection refused");
        assert_eq!(
            *attempts.lock().unwrap(),
            vec![(1, Duration::ZERO), (2, Duration::from_secs(2))]
        );
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_is_not_retried() {
        let start = Instant::now();
        let mut calls = 0;

        let result: Result<(), _> = with_retry(policy(3, 1_000), "not a url", |_| {
            calls += 1;
            async { Err(Malformed) }
        })
        .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls, 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_on_later_attempt() {
        let value = with_retry(policy(3, 1_000), "http://flaky", |n| async move {
            if n < 3 { Err(Refused) } else { Ok(n) }
        })
        .await
        .unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn test_status_codes_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(reqwest::Client::new(), policy(3, 1));
        let response = fetcher
            .send(&FetchRequest::get(format!("{}/gone", server.uri())))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.text(), "boom");
    }

    #[tokio::test]
    async fn test_request_headers_and_body_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submit"))
            .and(header("x-crawler", "tachi"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(reqwest::Client::new(), policy(1, 1));
        let request = FetchRequest::get(format!("{}/submit", server.uri()))
            .method(Method::POST)
            .header(
                HeaderName::from_static("x-crawler"),
                HeaderValue::from_static("tachi"),
            )
            .body("payload");
        let response = fetcher.send(&request).await.unwrap();

        assert_eq!(response.status, StatusCode::CREATED);
        let received = server.received_requests().await.unwrap();
        assert_eq!(received[0].body, b"payload");
    }

    #[tokio::test]
    async fn test_unreachable_host_exhausts_budget() {
        let fetcher = HttpFetcher::new(reqwest::Client::new(), policy(2, 1));
        let err = fetcher
            .send(&FetchRequest::get("http://127.0.0.1:1/"))
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 2);
        assert_eq!(err.url, "http://127.0.0.1:1/");
    }

    #[tokio::test]
    async fn test_from_config_uses_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("user-agent", "crawler/1.0"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = TachiConfig::base_sepolia("http://localhost:8545".parse().unwrap())
            .with_user_agent("crawler/1.0");
        let fetcher = HttpFetcher::from_config(&config).unwrap();
        let response = fetcher.send(&FetchRequest::get(server.uri())).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
    }
}
