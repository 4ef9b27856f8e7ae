//! Scripted provider for tests.
//!
//! Replays a queue of canned outcomes in order and records every payload it
//! receives, so callers can assert on attempt counts without a network.

use async_trait::async_trait;
use parking_lot::Mutex;
use partyplan_core::OutboundPayload;
use std::collections::VecDeque;
use std::time::Duration;

use super::{CompletionProvider, ProviderError};

/// A stub [`CompletionProvider`] driven by a script.
///
/// Once the script runs out, every further call fails with a transport error.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    received: Mutex<Vec<OutboundPayload>>,
    latency: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply with the given completion text.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.script.lock().push_back(Ok(text.into()));
        self
    }

    /// Queue a failure.
    pub fn fail(self, error: ProviderError) -> Self {
        self.script.lock().push_back(Err(error));
        self
    }

    /// Queue an upstream HTTP error status.
    pub fn fail_status(self, status: u16) -> Self {
        self.fail(ProviderError::Api {
            status,
            message: format!("scripted status {}", status),
        })
    }

    /// Delay every call by `latency` (honours a paused tokio clock).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of calls made so far.
    pub fn calls(&self) -> usize {
        self.received.lock().len()
    }

    /// Payloads received, in call order.
    pub fn payloads(&self) -> Vec<OutboundPayload> {
        self.received.lock().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn generate(&self, payload: &OutboundPayload) -> Result<String, ProviderError> {
        self.received.lock().push(payload.clone());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| {
            Err(ProviderError::Transport(
                "scripted provider has no replies left".to_string(),
            ))
        })
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
