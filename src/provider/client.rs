//! Signed HTTP client for the resource provider.
//!
//! Every call is signed, throttled responses are retried with the provider's
//! hint plus jitter, and non-2xx responses are classified into typed errors.

use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::{Client, Method, Url, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::Credentials;
use crate::error::{ProviderError, Result, SyncError};

use super::signer::{RequestSigner, SignableRequest, canonical_query_string};
use super::types::Page;

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Region the identity service is always signed for.
const IAM_REGION: &str = "us-east-1";

/// JSON content type.
pub const JSON: &str = "application/json";

/// JSON content type of target-dispatched APIs.
pub const AMZ_JSON: &str = "application/x-amz-json-1.1";

/// Form content type.
pub const FORM: &str = "application/x-www-form-urlencoded";

/// Bounds of every retry loop in the client.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum retries of a throttled request.
    pub max_throttle_retries: u32,
    /// Throttle delay when the provider gives no hint.
    pub default_throttle_delay: Duration,
    /// Upper bound of the random delay added to every throttle delay.
    pub throttle_jitter: Duration,
    /// Wall-clock budget for retrying conflicts.
    pub conflict_deadline: Duration,
    /// Mean delay between conflict retries.
    pub conflict_delay: Duration,
    /// Pause between retries on a request-specific status.
    pub status_retry_delay: Duration,
}

/// One provider request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method.
    method: Method,
    /// Service name (`lambda`, `apigateway`, `iam`, ...).
    service: &'static str,
    /// Unencoded path.
    path: String,
    /// Query parameters.
    query: Vec<(String, String)>,
    /// Body bytes.
    body: Vec<u8>,
    /// Body content type.
    content_type: &'static str,
    /// `X-Amz-Target` header value.
    target: Option<&'static str>,
    /// Status retried by this request, with its retry limit.
    retry_status: Option<(u16, u32)>,
}

/// A completed response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status.
    pub status: u16,
    /// Body text.
    pub body: String,
    /// Delay the provider asked for, if it throttled.
    pub retry_after_ms: u64,
}

/// Signed client for the resource provider.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    /// HTTP client.
    http: Client,
    /// Signing credentials.
    credentials: Credentials,
    /// Base URL replacing every service endpoint.
    endpoint: Option<String>,
    /// Retry bounds.
    retry: RetryPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_throttle_retries: 5,
            default_throttle_delay: Duration::from_millis(1000),
            throttle_jitter: Duration::from_millis(1000),
            conflict_deadline: Duration::from_secs(30),
            conflict_delay: Duration::from_millis(250),
            status_retry_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// A policy that retries as often as the default one but never waits.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            default_throttle_delay: Duration::ZERO,
            throttle_jitter: Duration::ZERO,
            conflict_delay: Duration::ZERO,
            status_retry_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Delay before retrying a throttled request.
    fn throttle_delay(&self, retry_after: Option<&str>, now: DateTime<Utc>) -> Duration {
        let hinted = retry_after.and_then(|value| {
            if let Ok(seconds) = value.trim().parse::<f64>() {
                return (seconds.is_finite() && seconds >= 0.0)
                    .then(|| Duration::from_secs_f64(seconds));
            }
            DateTime::parse_from_rfc2822(value.trim())
                .ok()
                .map(|at| (at.with_timezone(&Utc) - now).to_std().unwrap_or_default())
        });
        hinted.unwrap_or(self.default_throttle_delay) + jitter(self.throttle_jitter)
    }
}

/// Uniform random duration in `[0, max]`.
fn jitter(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

impl ApiRequest {
    /// Creates a request without body.
    #[must_use]
    pub fn new(method: Method, service: &'static str, path: impl Into<String>) -> Self {
        Self {
            method,
            service,
            path: path.into(),
            query: Vec::new(),
            body: Vec::new(),
            content_type: JSON,
            target: None,
            retry_status: None,
        }
    }

    /// GET request.
    #[must_use]
    pub fn get(service: &'static str, path: impl Into<String>) -> Self {
        Self::new(Method::GET, service, path)
    }

    /// POST request.
    #[must_use]
    pub fn post(service: &'static str, path: impl Into<String>) -> Self {
        Self::new(Method::POST, service, path)
    }

    /// PUT request.
    #[must_use]
    pub fn put(service: &'static str, path: impl Into<String>) -> Self {
        Self::new(Method::PUT, service, path)
    }

    /// PATCH request.
    #[must_use]
    pub fn patch(service: &'static str, path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, service, path)
    }

    /// DELETE request.
    #[must_use]
    pub fn delete(service: &'static str, path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, service, path)
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Sets a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        self.body = serde_json::to_vec(body)
            .map_err(|e| SyncError::internal(format!("Failed to serialize request: {e}")))?;
        Ok(self)
    }

    /// Sets a form body.
    #[must_use]
    pub fn form(mut self, params: &[(&str, &str)]) -> Self {
        let pairs: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        // Form bodies keep parameter order.
        self.body = pairs
            .iter()
            .map(|(k, v)| {
                format!(
                    "{}={}",
                    super::signer::uri_encode_value(k),
                    super::signer::uri_encode_value(v)
                )
            })
            .collect::<Vec<_>>()
            .join("&")
            .into_bytes();
        self.content_type = FORM;
        self
    }

    /// Dispatches to a target-based JSON API.
    #[must_use]
    pub const fn target(mut self, target: &'static str) -> Self {
        self.target = Some(target);
        self.content_type = AMZ_JSON;
        self
    }

    /// Retries the request up to `max` times while it answers `status`.
    #[must_use]
    pub const fn retry_on_status(mut self, status: u16, max: u32) -> Self {
        self.retry_status = Some((status, max));
        self
    }

    /// Human-readable `METHOD path` for logs.
    fn describe(&self) -> String {
        format!("{} {}{}", self.method, self.service, self.path)
    }
}

impl ProviderClient {
    /// Creates a client for `credentials`, optionally sending every request
    /// to `endpoint` instead of the provider's service endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(credentials: Credentials, endpoint: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ProviderError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            credentials,
            endpoint: endpoint.map(|e| e.trim_end_matches('/').to_string()),
            retry: RetryPolicy::default(),
        })
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Region of regional services.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.credentials.region
    }

    /// Base URL and signing region of `service`.
    fn service_endpoint(&self, service: &str) -> (String, &str) {
        let region = if service == "iam" {
            IAM_REGION
        } else {
            self.credentials.region.as_str()
        };
        let base = self.endpoint.clone().unwrap_or_else(|| {
            if service == "iam" {
                String::from("https://iam.amazonaws.com")
            } else {
                format!("https://{service}.{region}.amazonaws.com")
            }
        });
        (base, region)
    }

    /// Sends `request`, retrying throttling and the request's retry status.
    ///
    /// # Errors
    ///
    /// Returns an error only if the request could not be sent.
    pub async fn send(&self, request: &ApiRequest) -> Result<RawResponse> {
        let (base, region) = self.service_endpoint(request.service);
        let path = if request.path.is_empty() {
            "/"
        } else {
            request.path.as_str()
        };
        let query = canonical_query_string(&request.query);
        let url_text = if query.is_empty() {
            format!("{base}{path}")
        } else {
            format!("{base}{path}?{query}")
        };
        let url = Url::parse(&url_text)
            .map_err(|e| ProviderError::network(format!("Invalid URL {url_text}: {e}")))?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(ProviderError::network(format!("No host in {url_text}")).into()),
        };

        let mut signed_headers: Vec<(&str, &str)> = vec![("content-type", request.content_type)];
        if let Some(target) = request.target {
            signed_headers.push(("x-amz-target", target));
        }

        let mut throttled = 0;
        let mut status_retries = 0;
        loop {
            let signer = RequestSigner::new(&self.credentials, region, request.service);
            let headers = signer.sign(
                &SignableRequest {
                    method: request.method.as_str(),
                    host: &host,
                    path,
                    query: &request.query,
                    headers: &signed_headers,
                    body: &request.body,
                },
                Utc::now(),
            );

            let mut builder = self
                .http
                .request(request.method.clone(), url.clone())
                .header(header::ACCEPT, JSON);
            for (name, value) in &headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if !request.body.is_empty() {
                builder = builder.body(request.body.clone());
            }

            trace!("{}", request.describe());
            let response = builder
                .send()
                .await
                .map_err(|e| ProviderError::network(format!("Request failed: {e}")))?;
            let status = response.status().as_u16();
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            let body = response
                .text()
                .await
                .map_err(|e| ProviderError::network(format!("Failed to read response: {e}")))?;

            if status == 429 && throttled < self.retry.max_throttle_retries {
                throttled += 1;
                let delay = self.retry.throttle_delay(retry_after.as_deref(), Utc::now());
                debug!(
                    "  retrying #{throttled}{}...",
                    retry_after
                        .as_deref()
                        .map(|a| format!(" (after {a})"))
                        .unwrap_or_default()
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            if let Some((retry_status, max)) = request.retry_status
                && status == retry_status
                && status_retries < max
            {
                status_retries += 1;
                debug!(
                    "  retrying #{status_retries}... ({} -> {body})",
                    request.describe()
                );
                tokio::time::sleep(self.retry.status_retry_delay).await;
                continue;
            }

            let retry_after_ms = if status == 429 {
                let delay = self.retry.throttle_delay(retry_after.as_deref(), Utc::now());
                u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
            } else {
                0
            };
            return Ok(RawResponse {
                status,
                body,
                retry_after_ms,
            });
        }
    }

    /// Sends `request` and decodes a JSON success body.
    ///
    /// # Errors
    ///
    /// Returns a classified error for any non-2xx response.
    pub async fn call<T: DeserializeOwned>(&self, request: &ApiRequest, operation: &str) -> Result<T> {
        let response = self.send(request).await?;
        let body = response.ok(operation)?;
        serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("{operation}: {e}")).into()
        })
    }

    /// Sends `request`, ignoring the success body.
    ///
    /// # Errors
    ///
    /// Returns a classified error for any non-2xx response.
    pub async fn call_ok(&self, request: &ApiRequest, operation: &str) -> Result<()> {
        self.send(request).await?.ok(operation).map(|_| ())
    }

    /// Like [`Self::call`], mapping 404 to `None`.
    ///
    /// # Errors
    ///
    /// Returns a classified error for any other non-2xx response.
    pub async fn call_optional<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
        operation: &str,
    ) -> Result<Option<T>> {
        match self.call(request, operation).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Collects every item of a `nextToken`-paginated listing.
    ///
    /// # Errors
    ///
    /// Returns an error if any page fails.
    pub async fn pages<T: DeserializeOwned>(
        &self,
        service: &'static str,
        path: &str,
        operation: &str,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next: Option<String> = None;
        loop {
            let mut request = ApiRequest::get(service, path);
            if let Some(token) = next.take() {
                request = request.query("nextToken", token);
            }
            let page: Page<T> = self.call(&request, operation).await?;
            items.extend(page.items);
            match page.next_token {
                Some(token) if !token.is_empty() => next = Some(token),
                _ => return Ok(items),
            }
        }
    }
}

impl RawResponse {
    /// Returns the body of a 2xx response, or the classified error.
    ///
    /// # Errors
    ///
    /// Returns the error matching the status.
    pub fn ok(self, operation: &str) -> Result<String> {
        let operation = operation.to_string();
        match self.status {
            200..=299 => Ok(self.body),
            404 => Err(ProviderError::NotFound { operation }.into()),
            409 => Err(ProviderError::Conflict { operation }.into()),
            429 => Err(ProviderError::Throttled {
                retry_after_ms: self.retry_after_ms,
            }
            .into()),
            status if self.body.trim().is_empty() => {
                Err(ProviderError::api_error(status, operation).into())
            }
            status => {
                Err(ProviderError::api_error(status, format!("{operation}: {}", self.body.trim())).into())
            }
        }
    }
}

/// Runs `op`, retrying conflicts with a short random delay until the
/// policy's deadline passes.
///
/// # Errors
///
/// Returns the first non-conflict error, or the conflict once the deadline
/// has passed.
pub async fn retry_conflict<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let deadline = tokio::time::Instant::now() + policy.conflict_deadline;
    let mut attempt = 0u32;
    loop {
        match op().await {
            Err(e) if e.is_conflict() && tokio::time::Instant::now() < deadline => {
                attempt += 1;
                debug!("  conflict, retrying #{attempt}...");
                let factor = rand::thread_rng().gen_range(0.5..1.5);
                tokio::time::sleep(policy.conflict_delay.mul_f64(factor)).await;
            }
            result => return result,
        }
    }
}
