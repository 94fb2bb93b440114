//! Shared HTTP transport: auth header, deadline, retries, telemetry and
//! error mapping.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Request, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::auth::TokenSource;
use crate::deadline::Deadline;
use crate::error::{ClientError, ClientResult};
use crate::ratelimit::RateLimitRecorder;

pub const USER_AGENT: &str = concat!("azmon/", env!("CARGO_PKG_VERSION"));

/// Longest error body echoed into [`ClientError::Api`] when the body is not
/// a structured Azure error.
const MAX_ERROR_BODY: usize = 512;

/// Attempts per call, the first one included.
pub const MAX_ATTEMPTS: u32 = 3;

const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// HTTP client plus the concerns every outbound call shares.
///
/// Cheap to clone; clones share the connection pool and the recorder.
#[derive(Clone)]
pub struct Transport {
    client: Client,
    token: Arc<dyn TokenSource>,
    recorder: Option<Arc<RateLimitRecorder>>,
}

impl Transport {
    pub fn new(client: Client, token: Arc<dyn TokenSource>) -> Self {
        Self {
            client,
            token,
            recorder: None,
        }
    }

    /// Record quota headers and request timings of every response.
    pub fn with_recorder(mut self, recorder: Arc<RateLimitRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Build the default rustls-backed HTTP client.
    pub fn default_http_client() -> ClientResult<Client> {
        Ok(Client::builder()
            .use_rustls_tls()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .build()?)
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    /// Send `builder` under `deadline` and decode a JSON body.
    ///
    /// Throttled (429), 5xx and connect/timeout failures are retried up to
    /// [`MAX_ATTEMPTS`] times, waiting for `Retry-After` when the server
    /// sends one and backing off exponentially otherwise. A wait that would
    /// outlast `deadline` is not started; the last failure is returned
    /// instead. Non-2xx responses become [`ClientError::Api`].
    pub(crate) async fn send_json<T>(&self, builder: RequestBuilder, deadline: Deadline) -> ClientResult<T>
    where
        T: DeserializeOwned,
    {
        let builder = match self.token.bearer_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };
        let mut request = builder.build()?;

        deadline
            .run(async move {
                let mut attempt = 1;
                loop {
                    let retry = if attempt < MAX_ATTEMPTS {
                        request.try_clone()
                    } else {
                        None
                    };
                    let method = request.method().clone();
                    let path = request.url().path().to_string();

                    let outcome = self.execute(request).await;
                    let delay = match &outcome {
                        Ok(reply) if is_retryable_status(reply.status) => {
                            Some(reply.retry_after.unwrap_or_else(|| backoff(attempt)))
                        }
                        Err(ClientError::Transport(e)) if e.is_connect() || e.is_timeout() => {
                            Some(backoff(attempt))
                        }
                        _ => None,
                    };

                    if let (Some(delay), Some(next)) = (delay, retry)
                        && delay < deadline.remaining()
                    {
                        match &outcome {
                            Ok(reply) => warn!(
                                %method,
                                url = %path,
                                attempt,
                                status = reply.status.as_u16(),
                                delay_ms = delay.as_millis() as u64,
                                "retrying API call"
                            ),
                            Err(e) => warn!(
                                %method,
                                url = %path,
                                attempt,
                                err = %e,
                                delay_ms = delay.as_millis() as u64,
                                "retrying API call"
                            ),
                        }
                        tokio::time::sleep(delay).await;
                        request = next;
                        attempt += 1;
                        continue;
                    }

                    let reply = outcome?;
                    if !reply.status.is_success() {
                        return Err(api_error(reply.status.as_u16(), &reply.body));
                    }
                    return Ok(serde_json::from_slice(&reply.body)?);
                }
            })
            .await
    }

    /// One round trip: execute, record, read the body.
    async fn execute(&self, request: Request) -> ClientResult<Reply> {
        let method = request.method().clone();
        let url = request.url().clone();
        let started = Instant::now();

        let response = match self.client.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                if let Some(recorder) = &self.recorder {
                    recorder.observe_failure(method.as_str(), started.elapsed());
                }
                return Err(e.into());
            }
        };

        let status = response.status();
        if let Some(recorder) = &self.recorder {
            recorder.observe(
                method.as_str(),
                &url,
                status.as_u16(),
                response.headers(),
                started.elapsed(),
            );
        }
        debug!(
            %method,
            url = %url.path(),
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "API call"
        );

        let retry_after = retry_after(response.headers());
        let body = response.bytes().await?.to_vec();
        Ok(Reply {
            status,
            retry_after,
            body,
        })
    }
}

struct Reply {
    status: StatusCode,
    retry_after: Option<Duration>,
    body: Vec<u8>,
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Wait before retry number `attempt` (1-based) when the server gave no hint.
fn backoff(attempt: u32) -> Duration {
    RETRY_BASE_DELAY * 2u32.pow(attempt.saturating_sub(1))
}

/// `Retry-After` in delta-seconds, or ARM's `x-ms-retry-after-ms`.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    if let Some(ms) = header("x-ms-retry-after-ms").and_then(|v| v.trim().parse::<u64>().ok()) {
        return Some(Duration::from_millis(ms));
    }
    header(RETRY_AFTER.as_str())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Map a non-2xx body to [`ClientError::Api`], preferring the Azure
/// `{"error": {"code", "message"}}` envelope.
fn api_error(status: u16, body: &[u8]) -> ClientError {
    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(envelope) => ClientError::Api {
            status,
            code: envelope.error.code,
            message: envelope.error.message,
        },
        Err(_) => {
            let text = String::from_utf8_lossy(body);
            let message: String = text.chars().take(MAX_ERROR_BODY).collect();
            ClientError::Api {
                status,
                code: "Unknown".to_string(),
                message,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_structured() {
        let body = br#"{"error":{"code":"BadRequest","message":"Query is invalid"}}"#;
        match api_error(400, body) {
            ClientError::Api { status, code, message } => {
                assert_eq!(status, 400);
                assert_eq!(code, "BadRequest");
                assert_eq!(message, "Query is invalid");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
    }

    #[test]
    fn backoff_doubles() {
        assert_eq!(backoff(1), Duration::from_millis(500));
        assert_eq!(backoff(2), Duration::from_secs(1));
        assert_eq!(backoff(3), Duration::from_secs(2));
    }

    #[test]
    fn retry_after_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);

        headers.insert(RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));

        headers.insert("x-ms-retry-after-ms", "250".parse().unwrap());
        assert_eq!(retry_after(&headers), Some(Duration::from_millis(250)));

        let mut dated = HeaderMap::new();
        dated.insert(RETRY_AFTER, "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
        assert_eq!(retry_after(&dated), None);
    }

    #[test]
    fn api_error_plain_body_truncated() {
        let body = "x".repeat(2000);
        match api_error(502, body.as_bytes()) {
            ClientError::Api { code, message, .. } => {
                assert_eq!(code, "Unknown");
                assert_eq!(message.len(), MAX_ERROR_BODY);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
