//! Site-rebuild webhook trigger.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};

use crate::RemoteError;

/// Attempts per trigger, including the first.
const MAX_ATTEMPTS: u32 = 3;

/// Backoff before the second attempt; doubles for each later attempt.
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Anything that can ask the public site to rebuild.
///
/// Never fails outward: the result is just whether the rebuild was accepted.
#[async_trait]
pub trait Deployer: Send + Sync {
    async fn trigger(&self) -> bool;
}

/// Raw webhook answer.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployResponse {
    pub status: u16,
    pub body: Option<Value>,
}

impl DeployResponse {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Job identifier, if the hook reported one.
    ///
    /// Accepts `{"job": {"id": ..}}`, `{"jobId": ..}` and `{"id": ..}`.
    pub fn job_id(&self) -> Option<String> {
        let body = self.body.as_ref()?;
        body.pointer("/job/id")
            .or_else(|| body.get("jobId"))
            .or_else(|| body.get("id"))
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }
}

/// One webhook POST, without retries.
#[async_trait]
pub trait DeployTransport: Send + Sync {
    async fn post(&self, url: &str) -> Result<DeployResponse, RemoteError>;
}

/// `reqwest`-backed webhook transport.
pub struct HttpDeployTransport {
    http: Client,
}

impl Default for HttpDeployTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpDeployTransport {
    pub fn new() -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");
        Self { http }
    }
}

#[async_trait]
impl DeployTransport for HttpDeployTransport {
    async fn post(&self, url: &str) -> Result<DeployResponse, RemoteError> {
        let response = self.http.post(url).send().await?;
        let status = response.status().as_u16();
        // The body is optional and only used for logging
        let body = response.json::<Value>().await.ok();
        Ok(DeployResponse { status, body })
    }
}

/// Deploy webhook with its own bounded retry.
pub struct DeployTrigger {
    transport: Arc<dyn DeployTransport>,
    url: Option<String>,
    base_delay: Duration,
}

impl DeployTrigger {
    /// Create a trigger. With no URL every trigger reports `false`.
    pub fn new(transport: Arc<dyn DeployTransport>, url: Option<String>) -> Self {
        Self {
            transport,
            url,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }

    /// Override the base backoff delay.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }
}

#[async_trait]
impl Deployer for DeployTrigger {
    #[tracing::instrument(skip(self))]
    async fn trigger(&self) -> bool {
        let Some(url) = self.url.as_deref() else {
            warn!("deploy hook URL not configured, skipping deploy");
            return false;
        };

        for attempt in 1..=MAX_ATTEMPTS {
            match self.transport.post(url).await {
                Ok(response) if response.is_success() => {
                    match response.job_id() {
                        Some(job_id) => info!(attempt, job_id = %job_id, "deploy triggered"),
                        None => info!(attempt, "deploy triggered"),
                    }
                    return true;
                }
                Ok(response) => {
                    warn!(
                        attempt,
                        max_attempts = MAX_ATTEMPTS,
                        status = response.status,
                        "deploy hook rejected request"
                    );
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts = MAX_ATTEMPTS,
                        error = %e,
                        "deploy hook request failed"
                    );
                }
            }

            if attempt < MAX_ATTEMPTS {
                let backoff = self.base_delay * (1 << (attempt - 1));
                tokio::time::sleep(backoff).await;
            }
        }

        warn!(attempts = MAX_ATTEMPTS, "deploy failed after all attempts");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde_json::json;
    use tokio::time::Instant;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<DeployResponse, RemoteError>>>,
        calls: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<DeployResponse, RemoteError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl DeployTransport for ScriptedTransport {
        async fn post(&self, _url: &str) -> Result<DeployResponse, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(RemoteError::Disabled("script")))
        }
    }

    fn status(code: u16) -> Result<DeployResponse, RemoteError> {
        Ok(DeployResponse {
            status: code,
            body: None,
        })
    }

    fn trigger(transport: Arc<ScriptedTransport>) -> DeployTrigger {
        DeployTrigger::new(transport, Some("https://hooks.example/deploy".to_string()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_two_rejections() {
        let transport = ScriptedTransport::new(vec![status(500), status(502), status(201)]);

        let started = Instant::now();
        assert!(trigger(transport.clone()).trigger().await);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_returns_false() {
        let transport = ScriptedTransport::new(vec![
            Err(RemoteError::Disabled("network")),
            Err(RemoteError::Disabled("network")),
            Err(RemoteError::Disabled("network")),
        ]);

        assert!(!trigger(transport.clone()).trigger().await);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_missing_url_skips_transport() {
        let transport = ScriptedTransport::new(vec![status(200)]);
        let trigger = DeployTrigger::new(transport.clone(), None);

        assert!(!trigger.trigger().await);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_job_id_shapes() {
        let nested = DeployResponse {
            status: 201,
            body: Some(json!({"job": {"id": "job_abc", "state": "PENDING"}})),
        };
        assert_eq!(nested.job_id().as_deref(), Some("job_abc"));

        let flat = DeployResponse {
            status: 200,
            body: Some(json!({"jobId": 42})),
        };
        assert_eq!(flat.job_id().as_deref(), Some("42"));

        let none = DeployResponse {
            status: 200,
            body: None,
        };
        assert_eq!(none.job_id(), None);
    }

    #[tokio::test]
    async fn test_http_transport_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"job": {"id": "job_1"}})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let trigger = DeployTrigger::new(
            Arc::new(HttpDeployTransport::new()),
            Some(format!("{}/hook", mock_server.uri())),
        );
        assert!(trigger.trigger().await);
    }

    #[tokio::test]
    async fn test_http_transport_exhausts_on_server_errors() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&mock_server)
            .await;

        let trigger = DeployTrigger::new(
            Arc::new(HttpDeployTransport::new()),
            Some(format!("{}/hook", mock_server.uri())),
        )
        .with_base_delay(Duration::from_millis(5));
        assert!(!trigger.trigger().await);
    }

    #[tokio::test]
    async fn test_http_transport_without_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;

        let trigger = DeployTrigger::new(
            Arc::new(HttpDeployTransport::new()),
            Some(format!("{}/hook", mock_server.uri())),
        );
        assert!(trigger.trigger().await);
    }
}
