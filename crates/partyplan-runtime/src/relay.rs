//! The resilient relay.
//!
//! One logical call moves through
//! `Idle -> Attempting -> {Succeeded | RetryScheduled -> Attempting | FailedFatal}`.
//! Only transient failures schedule a retry, and only while attempts remain.
//! The reply is parsed and shape-checked after the last attempt; a reply
//! that fails either check is an upstream error, never a partial success.

use backon::Retryable;
use partyplan_core::{
    build_payload, OutboundPayload, PlanningKind, PlanningRequest, ShapeError, ValidationError,
};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::RelayConfig;
use crate::providers::{CompletionProvider, ProviderError};

/// Why the upstream side of a call failed for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamFault {
    /// The service rejected the request as malformed (HTTP 400)
    RejectedRequest,
    /// The reply was not JSON or did not match the requested shape
    MalformedResponse,
}

impl fmt::Display for UpstreamFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamFault::RejectedRequest => write!(f, "rejected the request"),
            UpstreamFault::MalformedResponse => write!(f, "returned a malformed response"),
        }
    }
}

/// Errors surfaced to relay callers.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Bad caller input; no upstream call was made
    #[error(transparent)]
    Client(#[from] ValidationError),

    /// Not retried: retrying cannot change the outcome
    #[error("Upstream service {fault}: {message}")]
    Upstream { fault: UpstreamFault, message: String },

    /// Retry budget or deadline exhausted
    #[error("Upstream service unavailable after {attempts} attempt(s): {cause}")]
    Transient {
        attempts: u32,
        #[source]
        cause: ProviderError,
    },

    #[error("Relay not configured: {0}")]
    Configuration(String),
}

impl RelayError {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Client(_) => "client",
            RelayError::Upstream { .. } => "upstream",
            RelayError::Transient { .. } => "transient",
            RelayError::Configuration(_) => "configuration",
        }
    }

    fn from_provider(error: ProviderError, attempts: u32) -> Self {
        match error {
            ProviderError::NotConfigured(message) => RelayError::Configuration(message),
            ProviderError::Api {
                status: 400,
                message,
            } => RelayError::Upstream {
                fault: UpstreamFault::RejectedRequest,
                message,
            },
            ProviderError::MalformedBody(message) => RelayError::Upstream {
                fault: UpstreamFault::MalformedResponse,
                message,
            },
            cause => RelayError::Transient { attempts, cause },
        }
    }
}

impl From<ShapeError> for RelayError {
    fn from(error: ShapeError) -> Self {
        match error {
            // The embedded schema failed to compile; the reply was never judged.
            schema @ ShapeError::SchemaLoad(_) => RelayError::Configuration(schema.to_string()),
            other => RelayError::Upstream {
                fault: UpstreamFault::MalformedResponse,
                message: other.to_string(),
            },
        }
    }
}

/// Per-call lifecycle, reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Attempting,
    RetryScheduled,
    Succeeded,
    FailedFatal,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallState::Idle => "idle",
            CallState::Attempting => "attempting",
            CallState::RetryScheduled => "retry_scheduled",
            CallState::Succeeded => "succeeded",
            CallState::FailedFatal => "failed_fatal",
        };
        f.write_str(name)
    }
}

/// Forwards validated requests to a completion provider with bounded retry.
///
/// Holds no per-call state, so one relay serves concurrent requests.
/// Dropping a call's future abandons any remaining attempts.
pub struct Relay {
    provider: Arc<dyn CompletionProvider>,
    config: RelayConfig,
}

impl fmt::Debug for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .finish()
    }
}

impl Relay {
    pub fn new(provider: Arc<dyn CompletionProvider>, config: RelayConfig) -> Self {
        Self { provider, config }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn health_check(&self) -> bool {
        self.provider.health_check().await
    }

    /// Validate `body` for `kind`, build its payload and relay it.
    ///
    /// Invalid input returns [`RelayError::Client`] before any upstream call.
    pub async fn plan(&self, kind: PlanningKind, body: &Value) -> Result<Value, RelayError> {
        let request = PlanningRequest::validate(kind, body).map_err(|e| {
            tracing::info!(kind = %kind, field = e.field(), "Request rejected");
            e
        })?;

        let mut payload = build_payload(&request);
        if let Some(temperature) = self.config.temperature {
            payload.temperature = temperature;
        }

        self.relay(&payload).await
    }

    /// Perform one logical upstream call and return the validated reply.
    pub async fn relay(&self, payload: &OutboundPayload) -> Result<Value, RelayError> {
        let started = Instant::now();
        let attempts = AtomicU32::new(0);
        tracing::debug!(
            state = %CallState::Idle,
            provider = self.provider.name(),
            shape = %payload.shape,
            "Starting upstream call"
        );

        let outcome =
            tokio::time::timeout(self.config.deadline, self.call_with_retry(payload, &attempts))
                .await;
        let attempts = attempts.load(Ordering::SeqCst);

        let result = match outcome {
            Ok(Ok(text)) => payload.shape.parse(&text).map_err(RelayError::from),
            Ok(Err(error)) => Err(RelayError::from_provider(error, attempts)),
            Err(_) => Err(RelayError::Transient {
                attempts,
                cause: ProviderError::Timeout(self.config.deadline),
            }),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => tracing::info!(
                state = %CallState::Succeeded,
                attempts,
                elapsed_ms,
                "Upstream call succeeded"
            ),
            Err(error) => tracing::error!(
                state = %CallState::FailedFatal,
                attempts,
                elapsed_ms,
                kind = error.kind(),
                error = %error,
                "Upstream call failed"
            ),
        }
        result
    }

    async fn call_with_retry(
        &self,
        payload: &OutboundPayload,
        attempts: &AtomicU32,
    ) -> Result<String, ProviderError> {
        let provider = self.provider.as_ref();
        let max_attempts = self.config.retry.max_attempts;

        (move || async move {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::debug!(state = %CallState::Attempting, attempt, max_attempts, "Calling upstream");

            let result = provider.generate(payload).await;
            if let Err(error) = &result {
                tracing::warn!(
                    attempt,
                    max_attempts,
                    status = error.status(),
                    transient = error.is_transient(),
                    error = %error,
                    "Upstream attempt failed"
                );
            }
            result
        })
        .retry(self.config.retry.backoff())
        .sleep(tokio::time::sleep)
        .when(ProviderError::is_transient)
        .notify(|error: &ProviderError, delay: Duration| {
            tracing::warn!(
                state = %CallState::RetryScheduled,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying upstream call"
            );
        })
        .await
    }
}
