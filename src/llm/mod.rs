pub mod tensorzero;

pub use tensorzero::{ChatMessage, GatewayConfig, GatewayError, TensorZeroClient};

use crate::retry::{BackoffPolicy, RetryError, Retryable};
use serde::de::DeserializeOwned;
use std::{future::Future, time::Duration};
use thiserror::Error;
use tracing::warn;

/// Domain-level failures of the generative AI provider.
#[derive(Debug, Error)]
pub enum AiServiceError {
    #[error("ai provider rate limit exceeded after {attempts} attempts")]
    RateLimited {
        attempts: u32,
        retry_after: Option<Duration>,
    },
    #[error("ai provider unavailable after {attempts} attempts: {message}")]
    Unavailable { attempts: u32, message: String },
    #[error("ai service error: {0}")]
    Service(String),
    #[error("ai response could not be parsed: {0}")]
    InvalidResponse(String),
}

impl AiServiceError {
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AiServiceError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<RetryError<GatewayError>> for AiServiceError {
    fn from(value: RetryError<GatewayError>) -> Self {
        let attempts = match &value {
            RetryError::Rejected(_) => 1,
            RetryError::Exhausted { attempts, .. } => *attempts,
        };
        match value.into_inner() {
            GatewayError::RateLimited { retry_after } => AiServiceError::RateLimited {
                attempts,
                retry_after,
            },
            GatewayError::Unavailable(message) => AiServiceError::Unavailable { attempts, message },
            GatewayError::InvalidResponse(message) => AiServiceError::InvalidResponse(message),
            other => AiServiceError::Service(other.to_string()),
        }
    }
}

/// Generative AI adapter: every call is wrapped in the shared [`BackoffPolicy`].
pub struct AiClient {
    gateway: TensorZeroClient,
    policy: BackoffPolicy,
}

impl AiClient {
    pub fn new(config: GatewayConfig, policy: BackoffPolicy) -> Self {
        Self {
            gateway: TensorZeroClient::new(config),
            policy,
        }
    }

    pub fn provider_label(&self) -> String {
        format!("tensorzero:{}", self.gateway.model_label())
    }

    /// Invokes `operation` under this client's policy and maps the terminal
    /// gateway error into an [`AiServiceError`].
    pub async fn call_with_retry<T, F, Fut>(&self, operation: F) -> Result<T, AiServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        self.policy.run(operation).await.map_err(|err| {
            if let RetryError::Exhausted { attempts, .. } = &err {
                warn!(target = "hermes.ai", attempts, retryable = err.error().is_retryable(), "ai_call_exhausted");
            }
            AiServiceError::from(err)
        })
    }

    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AiServiceError> {
        self.call_with_retry(|| self.gateway.chat(messages))
            .await
            .map(|completion| completion.text)
    }

    /// Completes and decodes a JSON answer, tolerating a markdown code fence.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        messages: &[ChatMessage],
    ) -> Result<T, AiServiceError> {
        let text = self.complete(messages).await?;
        let cleaned = strip_markdown_fence(&text);
        serde_json::from_str(&cleaned).map_err(|err| AiServiceError::InvalidResponse(err.to_string()))
    }
}

pub fn strip_markdown_fence(input: &str) -> String {
    let trimmed = input.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut body = Vec::new();
    for line in trimmed.lines().skip(1) {
        if line.trim_start().starts_with("```") {
            break;
        }
        body.push(line);
    }
    body.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn client(attempts: u32) -> AiClient {
        AiClient::new(
            GatewayConfig {
                gateway_url: String::new(),
                api_key: None,
                function_name: None,
                model: None,
            },
            BackoffPolicy::new(attempts, Duration::from_millis(1)).with_jitter(0.0),
        )
    }

    #[tokio::test]
    async fn exhausted_rate_limit_keeps_hint() {
        let calls = AtomicU32::new(0);
        let err = client(3)
            .call_with_retry(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(GatewayError::RateLimited {
                        retry_after: Some(Duration::from_millis(2)),
                    })
                }
            })
            .await
            .expect_err("rate limited");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            AiServiceError::RateLimited {
                attempts,
                retry_after,
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(retry_after, Some(Duration::from_millis(2)));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhausted_outage_maps_to_unavailable() {
        let err = client(2)
            .call_with_retry(|| async {
                Err::<(), _>(GatewayError::Unavailable("HTTP 503".into()))
            })
            .await
            .expect_err("unavailable");
        assert!(matches!(err, AiServiceError::Unavailable { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn rejected_request_is_generic_service_error() {
        let calls = AtomicU32::new(0);
        let err = client(4)
            .call_with_retry(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(GatewayError::Rejected { status: 400 }) }
            })
            .await
            .expect_err("rejected");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, AiServiceError::Service(_)));
    }

    #[tokio::test]
    async fn missing_gateway_fails_without_network() {
        let err = client(3)
            .complete(&[ChatMessage::user("hola")])
            .await
            .expect_err("no gateway");
        assert!(matches!(err, AiServiceError::Service(_)));
    }

    #[test]
    fn strips_json_fence() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_markdown_fence(raw), "{\"a\": 1}");
        assert_eq!(strip_markdown_fence("  plain "), "plain");
    }
}
