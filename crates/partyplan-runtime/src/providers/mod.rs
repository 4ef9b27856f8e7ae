//! Structured-completion providers.
//!
//! The relay only sees the [`CompletionProvider`] trait, so the HTTP-backed
//! provider can be swapped for a stub in tests.
//!
//! ## Security
//!
//! Providers hold their key as an [`ApiCredential`]; see [`secrets`].

use async_trait::async_trait;
use partyplan_core::OutboundPayload;
use std::time::Duration;
use thiserror::Error;

pub mod secrets;

#[cfg(feature = "gemini")]
mod gemini;

#[cfg(any(test, feature = "test-util"))]
mod scripted;

pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "gemini")]
pub use gemini::{GeminiProvider, GEMINI_API_KEY_ENV};

#[cfg(any(test, feature = "test-util"))]
pub use scripted::ScriptedProvider;

/// Errors from a single provider call.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Malformed response body: {0}")]
    MalformedBody(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Whether retrying the same call could succeed.
    ///
    /// A 400 means the request itself is bad, so it is never retried. A
    /// malformed body or missing configuration would fail the same way again.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            ProviderError::Api { status: 400, .. }
                | ProviderError::MalformedBody(_)
                | ProviderError::NotConfigured(_)
        )
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Api { status, .. } => Some(*status),
            ProviderError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

/// An external service that answers a prompt with JSON text of a requested shape.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Make one call and return the raw completion text.
    ///
    /// Implementations never retry; that is the relay's job.
    async fn generate(&self, payload: &OutboundPayload) -> Result<String, ProviderError>;

    /// Check if the provider is usable.
    async fn health_check(&self) -> bool;

    /// Provider name for logs.
    fn name(&self) -> &str;
}
