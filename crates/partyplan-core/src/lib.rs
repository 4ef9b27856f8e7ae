//! # partyplan-core
//!
//! Deterministic building blocks for the party planner relay.
//!
//! This crate answers three questions without touching the network:
//! - Is this inbound request acceptable?
//! - What exactly should be sent upstream for it?
//! - Does the upstream reply have the shape we asked for?
//!
//! ## Example
//!
//! ```rust
//! use partyplan_core::{build_payload, PlanningKind, PlanningRequest, ResponseShape};
//!
//! let body = serde_json::json!({ "guests": 10, "mainCourses": "pasta" });
//! let request = PlanningRequest::validate(PlanningKind::Menu, &body).unwrap();
//! let payload = build_payload(&request);
//!
//! assert_eq!(payload.shape, ResponseShape::PlanWithSummary);
//! assert!(payload.user_prompt.contains("Main Courses: pasta"));
//! ```

pub mod prompt;
pub mod request;
pub mod response;

pub use prompt::{build_payload, OutboundPayload};
pub use request::{
    DrinkRequest, MenuRequest, PlanningKind, PlanningRequest, ValidationError,
};
pub use response::{ResponseShape, ShapeError};
