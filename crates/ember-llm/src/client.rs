//! Retrying completion client.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::{
    CompletionError, CompletionRequest, CompletionResponse, CompletionTransport, TransportError,
};

/// Attempts per call, including the first.
pub const MAX_ATTEMPTS: u32 = 3;

/// Backoff before the second attempt; doubles for each later attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Completion client with bounded retry.
///
/// Backoff after failed attempt `n` (1-based) is `base_delay * 2^(n-1)`,
/// with no jitter. No sleep follows the final attempt.
#[derive(Clone)]
pub struct CompletionClient {
    transport: Arc<dyn CompletionTransport>,
    base_delay: Duration,
}

impl CompletionClient {
    /// Create a client over the given transport.
    pub fn new(transport: Arc<dyn CompletionTransport>) -> Self {
        Self {
            transport,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }

    /// Override the base backoff delay.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Generate content for a system/user prompt pair.
    ///
    /// An empty `content` in the response is a valid result, not an error.
    #[tracing::instrument(skip_all, fields(system_len = system_prompt.len(), user_len = user_prompt.len()))]
    pub async fn generate_content(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<CompletionResponse, CompletionError> {
        let request = CompletionRequest {
            system_prompt: system_prompt.to_string(),
            user_prompt: user_prompt.to_string(),
        };

        let mut last_error: Option<TransportError> = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.transport.complete(&request).await {
                Ok(response) => {
                    debug!(
                        attempt,
                        input_tokens = response.usage.input_tokens,
                        output_tokens = response.usage.output_tokens,
                        "completion succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    let rate_limited = e.is_rate_limit();
                    if attempt < MAX_ATTEMPTS {
                        let backoff = self.backoff(attempt);
                        warn!(
                            attempt,
                            max_attempts = MAX_ATTEMPTS,
                            rate_limited,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "completion attempt failed, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                    } else {
                        error!(
                            attempt,
                            max_attempts = MAX_ATTEMPTS,
                            rate_limited,
                            error = %e,
                            "completion attempt failed, giving up"
                        );
                    }
                    last_error = Some(e);
                }
            }
        }

        let source = last_error
            .unwrap_or_else(|| TransportError::InvalidResponse("retry exhausted".into()));
        Err(CompletionError::Exhausted {
            attempts: MAX_ATTEMPTS,
            rate_limited: source.is_rate_limit(),
            source,
        })
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * (1 << (attempt - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use tokio::time::Instant;

    use crate::Usage;

    /// Transport that replays a fixed script of outcomes.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<CompletionResponse, TransportError>>>,
        calls: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<CompletionResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionTransport for ScriptedTransport {
        async fn complete(
            &self,
            _request: &CompletionRequest,
        ) -> Result<CompletionResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::InvalidResponse("script empty".into())))
        }
    }

    fn ok(content: &str) -> Result<CompletionResponse, TransportError> {
        Ok(CompletionResponse {
            content: content.to_string(),
            usage: Usage {
                input_tokens: 10,
                output_tokens: 2,
            },
        })
    }

    fn server_error() -> Result<CompletionResponse, TransportError> {
        Err(TransportError::Api {
            status: 500,
            kind: "api_error".to_string(),
            message: "internal".to_string(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt_after_backoff() {
        let transport = ScriptedTransport::new(vec![server_error(), server_error(), ok("hi")]);
        let client = CompletionClient::new(transport.clone());

        let started = Instant::now();
        let response = client.generate_content("sys", "user").await.unwrap();

        assert_eq!(response.content, "hi");
        assert_eq!(transport.calls(), 3);
        assert!(started.elapsed() >= Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success_does_not_sleep() {
        let transport = ScriptedTransport::new(vec![ok("first")]);
        let client = CompletionClient::new(transport.clone());

        let started = Instant::now();
        client.generate_content("sys", "user").await.unwrap();

        assert_eq!(transport.calls(), 1);
        assert!(started.elapsed() < Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_exhausts_three_attempts() {
        let transport = ScriptedTransport::new(vec![
            server_error(),
            server_error(),
            Err(TransportError::InvalidResponse("last cause".into())),
        ]);
        let client = CompletionClient::new(transport.clone());

        let started = Instant::now();
        let err = client.generate_content("sys", "user").await.unwrap_err();

        assert_eq!(transport.calls(), 3);
        // 1000 + 2000; no sleep after the last attempt
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(3000));
        assert!(elapsed < Duration::from_millis(7000));

        let CompletionError::Exhausted {
            attempts,
            rate_limited,
            source,
        } = err;
        assert_eq!(attempts, 3);
        assert!(!rate_limited);
        assert!(source.to_string().contains("last cause"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_flag_carried_on_exhaustion() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::RateLimited {
                retry_after_secs: None,
            }),
            Err(TransportError::RateLimited {
                retry_after_secs: None,
            }),
            Err(TransportError::RateLimited {
                retry_after_secs: Some(60),
            }),
        ]);
        let client = CompletionClient::new(transport.clone());

        let err = client.generate_content("sys", "user").await.unwrap_err();

        assert_eq!(transport.calls(), 3);
        assert!(err.is_rate_limited());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_content_is_not_an_error() {
        let transport = ScriptedTransport::new(vec![ok("")]);
        let client = CompletionClient::new(transport.clone());

        let response = client.generate_content("sys", "user").await.unwrap();

        assert_eq!(response.content, "");
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn test_backoff_doubles() {
        let transport = ScriptedTransport::new(vec![]);
        let client = CompletionClient::new(transport).with_base_delay(Duration::from_millis(250));

        assert_eq!(client.backoff(1), Duration::from_millis(250));
        assert_eq!(client.backoff(2), Duration::from_millis(500));
        assert_eq!(client.backoff(3), Duration::from_millis(1000));
    }
}
