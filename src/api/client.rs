//! Signed HTTP client for the remote wallet API
//!
//! Every attempt is signed afresh. GET requests are retried with exponential
//! backoff when the failure is transient (rate limit, transport, unparseable
//! response). POST requests are never retried automatically.

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::future::{Retry, Sleeper};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::signer::{Credentials, Method, Params, RequestSigner};
use crate::clock::Clock;
use crate::config::ApiConfig;
use crate::error::{Error, Result};

/// Response code for success
pub const CODE_OK: &str = "0";
/// Response code the API uses for "Too Many Requests"
pub const CODE_RATE_LIMITED: &str = "50011";

/// Response envelope shared by every endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiResponse {
    #[serde(default, with = "code_string")]
    pub code: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub msg: String,
}

impl ApiResponse {
    /// `data` as a slice; anything but an array reads as empty
    pub fn data_items(&self) -> &[Value] {
        self.data.as_array().map(Vec::as_slice).unwrap_or(&[])
    }
}

/// The API sends `code` as a string, but tolerate numbers
mod code_string {
    use serde::{de, Deserialize, Deserializer};
    use serde_json::Value;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            Value::Null => Ok(String::new()),
            other => Err(de::Error::custom(format!("unexpected code: {}", other))),
        }
    }
}

/// A fully signed request ready for the wire
#[derive(Debug, Clone, PartialEq)]
pub struct SignedRequest {
    pub method: Method,
    /// Request path including the encoded query string
    pub path: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<String>,
}

/// Capability to deliver a signed request and decode the JSON envelope
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &SignedRequest) -> Result<ApiResponse>;
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_millis(config.timeout_ms));

        if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.is_empty()) {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| Error::Config(format!("Invalid proxy {}: {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &SignedRequest) -> Result<ApiResponse> {
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited(format!("HTTP {}", status)));
        }

        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Parse(format!("HTTP {} from {}: {}", status, request.path, e)))
    }
}

/// Attempt bound and base delay for idempotent requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &ApiConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.retry_base_delay_ms),
        )
    }

    /// Same base delay with a different attempt bound
    pub fn with_attempts(self, max_attempts: u32) -> Self {
        Self::new(max_attempts, self.base_delay)
    }

    /// `base_delay * 2^attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(500))
    }
}

/// Doubling delays that stop after `max_attempts - 1` waits
#[derive(Debug, Clone)]
pub struct AttemptBackoff {
    policy: RetryPolicy,
    waits: u32,
}

impl AttemptBackoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, waits: 0 }
    }
}

impl Backoff for AttemptBackoff {
    fn reset(&mut self) {
        self.waits = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.waits + 1 >= self.policy.max_attempts {
            return None;
        }
        let delay = self.policy.delay_for(self.waits);
        self.waits += 1;
        Some(delay)
    }
}

/// Backoff waits go through the injected clock
struct ClockSleeper {
    clock: Arc<dyn Clock>,
}

impl Sleeper for ClockSleeper {
    type Sleep = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

    fn sleep(&self, dur: Duration) -> Self::Sleep {
        let clock = self.clock.clone();
        Box::pin(async move { clock.sleep(dur).await })
    }
}

/// Signs, sends and (for GET) retries requests against the wallet API
pub struct RetryingClient {
    transport: Arc<dyn Transport>,
    signer: RequestSigner,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl RetryingClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        signer: RequestSigner,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            signer,
            clock,
            policy,
        }
    }

    /// Client over HTTP with the configured identity and retry policy
    pub fn from_config(config: &ApiConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(config)?);
        Ok(Self::new(
            transport,
            RequestSigner::new(Credentials::from_config(config)),
            clock,
            RetryPolicy::from_config(config),
        ))
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// GET with the client's default retry policy
    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<ApiResponse> {
        self.get_with_policy(path, query, self.policy).await
    }

    /// GET retried under `policy`.
    ///
    /// Non-rate-limit error codes fail immediately with `RemoteApi`. When every
    /// attempt fails transiently the result is `RetriesExhausted`.
    pub async fn get_with_policy(
        &self,
        path: &str,
        query: &[(&str, &str)],
        policy: RetryPolicy,
    ) -> Result<ApiResponse> {
        self.get_decoded(path, query, policy, Ok).await
    }

    /// GET whose envelope is decoded inside the retry loop, so a `Parse`
    /// failure from `decode` is retried like one from the transport.
    pub async fn get_decoded<T, F>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        policy: RetryPolicy,
        decode: F,
    ) -> Result<T>
    where
        F: Fn(ApiResponse) -> Result<T>,
    {
        let params = if query.is_empty() {
            Params::None
        } else {
            Params::query(query.iter().copied())
        };
        let attempts = AtomicU32::new(0);

        let result = Retry::new(
            ClockSleeper {
                clock: self.clock.clone(),
            },
            AttemptBackoff::new(policy),
            |e: Error, delay: Duration| {
                warn!(
                    "GET {} attempt {} failed: {}, retrying in {}ms",
                    path,
                    attempts.load(Ordering::Relaxed),
                    e,
                    delay.as_millis()
                );
            },
            || {
                attempts.fetch_add(1, Ordering::Relaxed);
                let params = &params;
                let decode = &decode;
                async move {
                    self.send_once(Method::Get, path, params)
                        .await
                        .and_then(decode)
                        .map_err(|e| {
                            if e.is_retryable() {
                                backoff::Error::transient(e)
                            } else {
                                backoff::Error::permanent(e)
                            }
                        })
                }
            },
        )
        .await;

        match result {
            Ok(value) => Ok(value),
            Err(e) if e.is_retryable() => {
                let attempts = attempts.load(Ordering::Relaxed);
                error!("GET {} gave up after {} attempts: {}", path, attempts, e);
                Err(Error::RetriesExhausted {
                    attempts,
                    last: e.to_string(),
                })
            }
            Err(e) => {
                error!("GET {} failed: {}", path, e);
                Err(e)
            }
        }
    }

    /// Single-attempt POST with an optional JSON body
    pub async fn post(&self, path: &str, body: Option<&Value>) -> Result<ApiResponse> {
        let params = body.cloned().map(Params::Body).unwrap_or_default();
        self.send_once(Method::Post, path, &params)
            .await
            .inspect_err(|e| error!("POST {} failed: {}", path, e))
    }

    /// Sign at the current time and send one attempt
    async fn send_once(&self, method: Method, path: &str, params: &Params) -> Result<ApiResponse> {
        let request = self.build_request(method, path, params)?;
        debug!("{} {}", method.as_str(), request.path);

        let response = self.transport.send(&request).await?;
        match response.code.as_str() {
            CODE_OK => Ok(response),
            CODE_RATE_LIMITED => Err(Error::RateLimited(response.msg)),
            _ => Err(Error::RemoteApi {
                code: response.code,
                msg: response.msg,
            }),
        }
    }

    pub(crate) fn build_request(
        &self,
        method: Method,
        path: &str,
        params: &Params,
    ) -> Result<SignedRequest> {
        let signature = self.signer.sign(method, path, params, self.clock.now())?;
        let (full_path, body) = match method {
            Method::Get => (format!("{}{}", path, params.query_string()), None),
            Method::Post => (path.to_string(), params.body()?),
        };

        Ok(SignedRequest {
            method,
            path: full_path,
            headers: self.signer.headers(&signature),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::signer::{HEADER_SIGN, HEADER_TIMESTAMP};
    use crate::api::testing::{ok, ScriptedTransport};
    use crate::clock::testing::RecordingClock;
    use serde_json::json;
    use tokio_test::assert_ok;

    fn client(transport: Arc<ScriptedTransport>, attempts: u32) -> RetryingClient {
        client_with_clock(transport, attempts, Arc::new(RecordingClock::new()))
    }

    fn client_with_clock(
        transport: Arc<ScriptedTransport>,
        attempts: u32,
        clock: Arc<RecordingClock>,
    ) -> RetryingClient {
        RetryingClient::new(
            transport,
            RequestSigner::new(Credentials {
                api_key: "key".into(),
                secret_key: "secret".into(),
                passphrase: "pass".into(),
                project_id: "proj".into(),
            }),
            clock,
            RetryPolicy::new(attempts, Duration::from_millis(500)),
        )
    }

    fn rate_limited() -> ApiResponse {
        ApiResponse {
            code: CODE_RATE_LIMITED.into(),
            data: Value::Null,
            msg: "Too Many Requests".into(),
        }
    }

    #[test]
    fn test_backoff_sequence_doubles_from_base() {
        let mut backoff = AttemptBackoff::new(RetryPolicy::new(5, Duration::from_millis(500)));
        let delays: Vec<u128> = std::iter::from_fn(|| backoff.next_backoff())
            .map(|d| d.as_millis())
            .collect();
        assert_eq!(delays, vec![500, 1000, 2000, 4000]);

        backoff.reset();
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_single_attempt_policy_never_waits() {
        let mut backoff = AttemptBackoff::new(RetryPolicy::new(1, Duration::from_millis(500)));
        assert_eq!(backoff.next_backoff(), None);
        // zero is clamped to one attempt
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[test]
    fn test_response_code_accepts_numbers() {
        let parsed: ApiResponse =
            serde_json::from_str(r#"{"code":0,"data":[{"a":1}],"msg":""}"#).unwrap();
        assert_eq!(parsed.code, "0");
        assert_eq!(parsed.data_items().len(), 1);

        let parsed: ApiResponse = serde_json::from_str(r#"{"code":"50011"}"#).unwrap();
        assert_eq!(parsed.code, "50011");
        assert!(parsed.data_items().is_empty());
    }

    #[tokio::test]
    async fn test_get_signs_path_with_query() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("/api/v5/x?accountId=abc", ok(json!([])));
        let client = client(transport.clone(), 2);

        client.get("/api/v5/x", &[("accountId", "abc")]).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.path, "/api/v5/x?accountId=abc");
        assert!(request.body.is_none());

        let expected = client
            .signer
            .sign(
                Method::Get,
                "/api/v5/x",
                &Params::query([("accountId", "abc")]),
                RecordingClock::new().now(),
            )
            .unwrap();
        assert!(request
            .headers
            .contains(&(HEADER_SIGN, expected.signature.clone())));
        assert!(request
            .headers
            .contains(&(HEADER_TIMESTAMP, "2025-01-01T12:34:56Z".to_string())));
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried_then_succeeds() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push("/p", Ok(rate_limited()));
        transport.push("/p", Ok(rate_limited()));
        transport.push("/p", Ok(ok(json!(["done"]))));
        let clock = Arc::new(RecordingClock::new());
        let client = client_with_clock(transport.clone(), 4, clock.clone());

        let response = client.get("/p", &[]).await.unwrap();

        assert_eq!(response.data, json!(["done"]));
        assert_eq!(transport.requests().len(), 3);
        // backoff waits go through the injected clock
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(500), Duration::from_millis(1000)]
        );
    }

    #[tokio::test]
    async fn test_retries_exhausted_after_attempt_bound() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("/p", rate_limited());
        let clock = Arc::new(RecordingClock::new());
        let client = client_with_clock(transport.clone(), 2, clock.clone());

        let err = client.get("/p", &[]).await.unwrap_err();
        match err {
            Error::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
        assert_eq!(transport.requests().len(), 2);
        // no wait after the final attempt
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(500)]);
    }

    #[tokio::test]
    async fn test_transport_errors_are_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push("/p", Err(Error::Transport("connection reset".into())));
        transport.push("/p", Err(Error::Parse("truncated body".into())));
        transport.push("/p", Ok(ok(json!([]))));
        let client = client(transport.clone(), 3);

        assert_ok!(client.get("/p", &[]).await);
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_remote_error_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            "/p",
            ApiResponse {
                code: "50014".into(),
                data: Value::Null,
                msg: "Parameter accountId cannot be empty".into(),
            },
        );
        let client = client(transport.clone(), 6);

        let err = client.get("/p", &[]).await.unwrap_err();
        assert!(matches!(err, Error::RemoteApi { ref code, .. } if code == "50014"));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_post_is_single_attempt_with_body() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("/create", rate_limited());
        let client = client(transport.clone(), 6);

        let body = json!({"accountId": "abc"});
        let err = client.post("/create", Some(&body)).await.unwrap_err();
        assert!(matches!(err, Error::RateLimited(_)));

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[0].path, "/create");
        assert_eq!(requests[0].body.as_deref(), Some(r#"{"accountId":"abc"}"#));
    }

    #[tokio::test]
    async fn test_decode_failure_is_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push("/p", Ok(ok(json!("garbage"))));
        transport.respond("/p", ok(json!(["good"])));
        let clock = Arc::new(RecordingClock::new());
        let client = client_with_clock(transport.clone(), 3, clock.clone());

        let first = client
            .get_decoded("/p", &[], client.policy(), |response| {
                response
                    .data_items()
                    .first()
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| Error::Parse("no items".into()))
            })
            .await
            .unwrap();

        assert_eq!(first, "good");
        assert_eq!(transport.requests().len(), 2);
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(500)]);
    }

    #[test]
    fn test_delay_for_saturates() {
        let policy = RetryPolicy::new(3, Duration::from_millis(500));
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
        assert!(policy.delay_for(64) >= policy.delay_for(31));
    }
}
