//! Response shapes expected from the upstream service.
//!
//! The upstream model is asked for JSON matching a descriptor, but its reply
//! is untrusted until it parses and passes schema validation here. Only the
//! shape is checked, never the content.

mod schema;

use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

/// Errors from parsing or validating an upstream reply.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
    #[error("Response is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Response does not match the {shape} shape: {}", .violations.join("; "))]
    Mismatch {
        shape: ResponseShape,
        violations: Vec<String>,
    },

    #[error("Failed to load response schema: {0}")]
    SchemaLoad(String),
}

/// The structured replies the relay accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseShape {
    /// `{ "plan": [record...], "summary": string }`
    PlanWithSummary,

    /// `[record...]`
    ItemList,
}

impl ResponseShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseShape::PlanWithSummary => "plan-with-summary",
            ResponseShape::ItemList => "item-list",
        }
    }

    /// Schema descriptor sent upstream with the request.
    ///
    /// Uses the OpenAPI-subset dialect (upper-case type names) accepted by
    /// the generative-language API, not JSON Schema.
    pub fn descriptor(&self) -> Value {
        match self {
            ResponseShape::PlanWithSummary => json!({
                "type": "OBJECT",
                "properties": {
                    "plan": {
                        "type": "ARRAY",
                        "description": "The detailed list of menu items with optimized quantities.",
                        "items": plan_item_descriptor()
                    },
                    "summary": {
                        "type": "STRING",
                        "description": "A single, plain text paragraph summarizing the assumptions and key notes based on the party details."
                    }
                },
                "required": ["plan", "summary"]
            }),
            ResponseShape::ItemList => json!({
                "type": "ARRAY",
                "description": "The list of beverages with estimated quantities.",
                "items": plan_item_descriptor()
            }),
        }
    }

    /// Check a parsed value against this shape.
    pub fn validate(&self, value: &Value) -> Result<(), ShapeError> {
        let violations = schema::violations(*self, value)?;
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ShapeError::Mismatch {
                shape: *self,
                violations,
            })
        }
    }

    /// Parse raw reply text and validate it. Never coerces a partial reply.
    pub fn parse(&self, text: &str) -> Result<Value, ShapeError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ShapeError::InvalidJson(e.to_string()))?;
        self.validate(&value)?;
        Ok(value)
    }
}

impl fmt::Display for ResponseShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn plan_item_descriptor() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "item": {
                "type": "STRING",
                "description": "The specific food, drink or supply item."
            },
            "quantity": {
                "type": "STRING",
                "description": "The precise amount with units (e.g., 5 lbs, 2 dozen, 80 units)."
            },
            "category": {
                "type": "STRING",
                "description": "The category of the item (e.g., Appetizer, Main Course, Wine)."
            }
        },
        "required": ["item", "quantity", "category"]
    })
}
