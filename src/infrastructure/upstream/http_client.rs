//! # Resilient HTTP Client
//!
//! One instance per upstream service. Each instance owns its own connection
//! pool and concurrency limit, and wraps every call with:
//! - a per-attempt timeout clipped to the remaining call budget
//! - bounded retries with exponential backoff and jitter
//! - the caller's correlation id as a request header
//! - classification into [`UpstreamError::Timeout`] or [`UpstreamError::Failure`]
//!
//! # Examples
//!
//! ```ignore
//! use member_offer_orchestrator::infrastructure::upstream::http_client::{
//!     ResilientHttpClient, UpstreamClientConfig,
//! };
//!
//! let config = UpstreamClientConfig::new("http://localhost:8002");
//! let client = ResilientHttpClient::new(UpstreamService::Prediction, config)?;
//! let response = client.post_json("/ml/ats/predict", &body, &correlation_id).await?;
//! ```

use crate::domain::value_objects::CorrelationId;
use crate::infrastructure::upstream::error::{UpstreamError, UpstreamResult, UpstreamService};
use crate::infrastructure::upstream::retry::RetryPolicy;
use backon::Retryable;
use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderName};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Default header carrying the correlation id.
pub const DEFAULT_CORRELATION_HEADER: &str = "x-request-id";

/// Longest slice of an error body kept in error messages.
const MAX_BODY_EXCERPT: usize = 200;

/// Connection and retry settings for one upstream.
#[derive(Debug, Clone)]
pub struct UpstreamClientConfig {
    /// Base URL without trailing slash.
    pub base_url: String,
    /// Timeout of a single attempt.
    pub attempt_timeout: Duration,
    /// Wall-clock budget for the whole call including retries.
    pub call_budget: Duration,
    /// Retry behaviour.
    pub retry: RetryPolicy,
    /// Maximum in-flight requests to this upstream.
    pub max_concurrency: usize,
    /// Header used to forward the correlation id.
    pub correlation_header: HeaderName,
}

impl UpstreamClientConfig {
    /// Creates a config with default timeouts and retry policy.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            attempt_timeout: Duration::from_millis(5000),
            call_budget: Duration::from_millis(15000),
            retry: RetryPolicy::default(),
            max_concurrency: 50,
            correlation_header: HeaderName::from_static(DEFAULT_CORRELATION_HEADER),
        }
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Sets the per-call budget.
    #[must_use]
    pub fn with_call_budget(mut self, budget: Duration) -> Self {
        self.call_budget = budget;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the concurrency limit.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Sets the correlation header.
    #[must_use]
    pub fn with_correlation_header(mut self, header: HeaderName) -> Self {
        self.correlation_header = header;
        self
    }
}

/// A successful upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    status: StatusCode,
    body: Bytes,
    attempts: u32,
}

impl UpstreamResponse {
    /// Returns the HTTP status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns true if the upstream answered 404.
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND
    }

    /// Returns true if the body is empty or whitespace.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.iter().all(u8::is_ascii_whitespace)
    }

    /// Returns the raw body.
    #[inline]
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns how many attempts the call took.
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Deserializes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the deserializer error if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Why a single attempt did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AttemptFailure {
    /// Timeout, refused connection or dropped request.
    Network(String),
    /// The upstream answered with a non-success status.
    Status { status: u16, body: String },
    /// The request could not be built or sent for a non-transient reason.
    Fatal(String),
}

impl AttemptFailure {
    fn is_retryable(&self, policy: &RetryPolicy) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status { status, .. } => policy.is_retryable_status(*status),
            Self::Fatal(_) => false,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Network(message) | Self::Fatal(message) => message.clone(),
            Self::Status { status, body } if body.is_empty() => format!("HTTP {}", status),
            Self::Status { status, body } => format!("HTTP {}: {}", status, body),
        }
    }
}

/// HTTP client for a single upstream service.
#[derive(Debug, Clone)]
pub struct ResilientHttpClient {
    service: UpstreamService,
    client: Client,
    config: UpstreamClientConfig,
    limiter: Arc<Semaphore>,
}

impl ResilientHttpClient {
    /// Creates a client for `service`.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::Failure` if the underlying client cannot be
    /// built.
    pub fn new(service: UpstreamService, config: UpstreamClientConfig) -> UpstreamResult<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(config.max_concurrency)
            .build()
            .map_err(|e| {
                UpstreamError::failure(
                    service,
                    config.base_url.clone(),
                    &CorrelationId::generate(),
                    0,
                    None,
                    format!("Failed to create HTTP client: {}", e),
                )
            })?;
        let limiter = Arc::new(Semaphore::new(config.max_concurrency.max(1)));

        Ok(Self {
            service,
            client,
            config,
            limiter,
        })
    }

    /// Returns the service this client talks to.
    #[inline]
    #[must_use]
    pub fn service(&self) -> UpstreamService {
        self.service
    }

    /// Returns the client configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &UpstreamClientConfig {
        &self.config
    }

    /// Builds the error for a 2xx response whose payload is unusable.
    #[must_use]
    pub fn malformed_payload(
        &self,
        path: &str,
        correlation_id: &CorrelationId,
        response: &UpstreamResponse,
        message: impl Into<String>,
    ) -> UpstreamError {
        UpstreamError::failure(
            self.service,
            path,
            correlation_id,
            response.attempts(),
            Some(response.status().as_u16()),
            format!("malformed payload: {}", message.into()),
        )
    }

    /// Sends a GET request.
    ///
    /// With `allow_not_found` a 404 is returned as a successful response
    /// instead of a failure.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError` once retries are exhausted or on a
    /// non-retryable response.
    pub async fn get(
        &self,
        path: &str,
        correlation_id: &CorrelationId,
        allow_not_found: bool,
    ) -> UpstreamResult<UpstreamResponse> {
        self.execute(Method::GET, path, None, correlation_id, allow_not_found).await
    }

    /// Sends a POST request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError` once retries are exhausted, on a
    /// non-retryable response, or if the body cannot be serialized.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        correlation_id: &CorrelationId,
    ) -> UpstreamResult<UpstreamResponse> {
        let payload = serde_json::to_vec(body).map(Bytes::from).map_err(|e| {
            UpstreamError::failure(
                self.service,
                path,
                correlation_id,
                0,
                None,
                format!("Failed to serialize request body: {}", e),
            )
        })?;
        self.execute(Method::POST, path, Some(payload), correlation_id, false).await
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        correlation_id: &CorrelationId,
        allow_not_found: bool,
    ) -> UpstreamResult<UpstreamResponse> {
        let url = format!("{}{}", self.config.base_url, path);
        let deadline = Instant::now() + self.config.call_budget;
        let policy = &self.config.retry;
        let attempts = AtomicU32::new(0);

        let (method, body, url, attempts) = (&method, &body, url.as_str(), &attempts);
        let outcome = (move || async move {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(AttemptFailure::Network("call budget exhausted".into()));
            }
            let attempt_timeout = self.config.attempt_timeout.min(remaining);
            let started = Instant::now();

            let result = self
                .attempt(
                    method.clone(),
                    url,
                    body.clone(),
                    correlation_id,
                    attempt_timeout,
                    allow_not_found,
                )
                .await;
            let latency_ms = started.elapsed().as_millis() as u64;

            match &result {
                Ok((status, _)) => debug!(
                    service = %self.service,
                    endpoint = %path,
                    attempt,
                    latency_ms,
                    outcome = "success",
                    status = status.as_u16(),
                    correlation_id = %correlation_id,
                    "Upstream call succeeded"
                ),
                Err(failure) => warn!(
                    service = %self.service,
                    endpoint = %path,
                    attempt,
                    latency_ms,
                    outcome = "failure",
                    error = %failure.describe(),
                    correlation_id = %correlation_id,
                    "Upstream call attempt failed"
                ),
            }
            result
        })
        .retry(policy.within_budget(deadline))
        .when(|failure: &AttemptFailure| failure.is_retryable(policy))
        .notify(|failure: &AttemptFailure, delay: Duration| {
            debug!(
                service = %self.service,
                endpoint = %path,
                delay_ms = delay.as_millis() as u64,
                error = %failure.describe(),
                correlation_id = %correlation_id,
                "Retrying upstream call"
            );
        })
        .await;

        let attempts = attempts.load(Ordering::Relaxed);
        match outcome {
            Ok((status, body)) => Ok(UpstreamResponse {
                status,
                body,
                attempts,
            }),
            Err(failure) => Err(self.classify_failure(failure, path, correlation_id, attempts)),
        }
    }

    async fn attempt(
        &self,
        method: Method,
        url: &str,
        body: Option<Bytes>,
        correlation_id: &CorrelationId,
        timeout: Duration,
        allow_not_found: bool,
    ) -> Result<(StatusCode, Bytes), AttemptFailure> {
        let started = Instant::now();
        let _permit = match tokio::time::timeout(timeout, self.limiter.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(AttemptFailure::Fatal("concurrency limiter closed".into())),
            Err(_) => {
                return Err(AttemptFailure::Network(
                    "timed out waiting for a connection slot".into(),
                ));
            }
        };
        let timeout = timeout.saturating_sub(started.elapsed());

        let mut request = self
            .client
            .request(method, url)
            .timeout(timeout)
            .header(&self.config.correlation_header, correlation_id.as_str());
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;

        if status.is_success() || (allow_not_found && status == StatusCode::NOT_FOUND) {
            Ok((status, bytes))
        } else {
            let excerpt: String = String::from_utf8_lossy(&bytes)
                .chars()
                .take(MAX_BODY_EXCERPT)
                .collect();
            Err(AttemptFailure::Status {
                status: status.as_u16(),
                body: excerpt,
            })
        }
    }

    fn classify_failure(
        &self,
        failure: AttemptFailure,
        path: &str,
        correlation_id: &CorrelationId,
        attempts: u32,
    ) -> UpstreamError {
        let message = failure.describe();
        match failure {
            AttemptFailure::Network(_) => {
                UpstreamError::timeout(self.service, path, correlation_id, attempts, message)
            }
            AttemptFailure::Status { status, .. } => UpstreamError::failure(
                self.service,
                path,
                correlation_id,
                attempts,
                Some(status),
                message,
            ),
            AttemptFailure::Fatal(_) => {
                UpstreamError::failure(self.service, path, correlation_id, attempts, None, message)
            }
        }
    }
}

/// Maps a reqwest error to an attempt failure.
fn map_reqwest_error(error: reqwest::Error) -> AttemptFailure {
    if error.is_timeout() {
        AttemptFailure::Network(format!("Request timed out: {}", error))
    } else if error.is_connect() || error.is_request() {
        AttemptFailure::Network(format!("Connection failed: {}", error))
    } else {
        AttemptFailure::Fatal(format!("HTTP request failed: {}", error))
    }
}
