//! # Partyplan Runtime
//!
//! Relays validated planning requests to a structured-completion API.
//!
//! This crate provides:
//! - Relay configuration loaded from YAML
//! - The [`CompletionProvider`] trait and a Gemini implementation (feature `gemini`)
//! - [`Relay`]: bounded retry with exponential backoff, an overall deadline,
//!   and shape validation of every reply
//!
//! ## Example
//!
//! ```rust,ignore
//! use partyplan_runtime::{GeminiProvider, Relay, RelayConfig};
//! use partyplan_core::PlanningKind;
//! use std::sync::Arc;
//!
//! let config = RelayConfig::default();
//! let provider = Arc::new(GeminiProvider::from_config(&config)?);
//! let relay = Relay::new(provider, config);
//!
//! let plan = relay
//!     .plan(PlanningKind::Menu, &serde_json::json!({ "guests": 10, "mainCourses": "pasta" }))
//!     .await?;
//! ```

pub mod config;
pub mod providers;
pub mod relay;

pub use config::{ConfigError, RelayConfig, RetryPolicy};
pub use providers::{ApiCredential, CompletionProvider, CredentialSource, ProviderError};
pub use relay::{CallState, Relay, RelayError, UpstreamFault};

#[cfg(feature = "gemini")]
pub use providers::{GeminiProvider, GEMINI_API_KEY_ENV};

#[cfg(any(test, feature = "test-util"))]
pub use providers::ScriptedProvider;
