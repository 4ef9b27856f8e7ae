//! Request validation for the planning operations.
//!
//! Every inbound body passes through here before anything touches the
//! network. Validation is pure: it either returns a normalised request or
//! names the first field that failed.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

use crate::response::ResponseShape;

lazy_static! {
    /// Runs of whitespace (including newlines from textarea input).
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
}

const GUESTS_MESSAGE: &str =
    "Invalid number of guests provided: 'guests' must be a positive whole number.";

/// A rejected request, naming the first missing or invalid field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    field: &'static str,
    message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }

    fn missing(field: &'static str) -> Self {
        Self::new(field, format!("Missing required field '{}'.", field))
    }

    fn invalid_guests() -> Self {
        Self::new("guests", GUESTS_MESSAGE)
    }

    /// Name of the offending field (`body` when the payload is not an object).
    pub fn field(&self) -> &'static str {
        self.field
    }

    /// Human-readable explanation, safe to return to callers.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The planning operations exposed by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanningKind {
    /// Food quantities for a menu, returned with a summary.
    Menu,
    /// Beverage quantities, returned as a bare item list.
    Drinks,
}

impl PlanningKind {
    /// Stable identifier used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanningKind::Menu => "menu",
            PlanningKind::Drinks => "drinks",
        }
    }

    /// Shape the upstream reply must have for this operation.
    pub fn response_shape(&self) -> ResponseShape {
        match self {
            PlanningKind::Menu => ResponseShape::PlanWithSummary,
            PlanningKind::Drinks => ResponseShape::ItemList,
        }
    }
}

impl fmt::Display for PlanningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated input for menu optimisation.
///
/// Only `guests` is mandatory; every dish field is optional free text.
#[derive(Debug, Clone, PartialEq)]
pub struct MenuRequest {
    pub guests: u32,
    pub appetizers: Option<String>,
    pub main_courses: Option<String>,
    pub side_dishes: Option<String>,
    pub desserts: Option<String>,
    pub other_items: Option<String>,
    pub party_details: Option<String>,
}

impl MenuRequest {
    /// Validate and normalise a JSON body.
    pub fn from_json(body: &Value) -> Result<Self, ValidationError> {
        let fields = object(body)?;

        Ok(Self {
            guests: guest_count(fields)?,
            appetizers: optional_text(fields, "appetizers")?,
            main_courses: optional_text(fields, "mainCourses")?,
            side_dishes: optional_text(fields, "sideDishes")?,
            desserts: optional_text(fields, "desserts")?,
            other_items: optional_text(fields, "otherItems")?,
            party_details: optional_text(fields, "partyDetails")?,
        })
    }
}

/// Validated input for drink estimation. All fields are mandatory.
#[derive(Debug, Clone, PartialEq)]
pub struct DrinkRequest {
    pub guests: u32,
    pub event_type: String,
    pub duration_hours: f64,
    pub drinks_list: String,
}

impl DrinkRequest {
    /// Validate and normalise a JSON body.
    pub fn from_json(body: &Value) -> Result<Self, ValidationError> {
        let fields = object(body)?;

        let guests = guest_count(fields)?;
        let event_type = required_text(fields, "eventType")?;
        let duration_hours = match fields.get("durationHours") {
            None | Some(Value::Null) => return Err(ValidationError::missing("durationHours")),
            Some(raw) => positive_number(raw).ok_or_else(|| {
                ValidationError::new(
                    "durationHours",
                    "Invalid party duration: 'durationHours' must be a positive number.",
                )
            })?,
        };
        let drinks_list = required_text(fields, "drinksList")?;

        Ok(Self {
            guests,
            event_type,
            duration_hours,
            drinks_list,
        })
    }
}

/// A validated request for either planning operation.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanningRequest {
    Menu(MenuRequest),
    Drinks(DrinkRequest),
}

impl PlanningRequest {
    /// Validate `body` against the field rules of `kind`.
    pub fn validate(kind: PlanningKind, body: &Value) -> Result<Self, ValidationError> {
        let request = match kind {
            PlanningKind::Menu => PlanningRequest::Menu(MenuRequest::from_json(body)?),
            PlanningKind::Drinks => PlanningRequest::Drinks(DrinkRequest::from_json(body)?),
        };
        tracing::debug!(kind = %kind, guests = request.guests(), "Request accepted");
        Ok(request)
    }

    pub fn kind(&self) -> PlanningKind {
        match self {
            PlanningRequest::Menu(_) => PlanningKind::Menu,
            PlanningRequest::Drinks(_) => PlanningKind::Drinks,
        }
    }

    pub fn guests(&self) -> u32 {
        match self {
            PlanningRequest::Menu(r) => r.guests,
            PlanningRequest::Drinks(r) => r.guests,
        }
    }
}

/// Trim and collapse internal whitespace to single spaces.
pub fn normalize_text(raw: &str) -> String {
    WHITESPACE_RUN.replace_all(raw.trim(), " ").into_owned()
}

fn object(body: &Value) -> Result<&Map<String, Value>, ValidationError> {
    body.as_object()
        .ok_or_else(|| ValidationError::new("body", "Request body must be a JSON object."))
}

fn guest_count(fields: &Map<String, Value>) -> Result<u32, ValidationError> {
    let count = fields
        .get("guests")
        .and_then(positive_number)
        .ok_or_else(ValidationError::invalid_guests)?;

    if count.fract() != 0.0 || count > f64::from(u32::MAX) {
        return Err(ValidationError::invalid_guests());
    }
    Ok(count as u32)
}

/// Accepts JSON numbers and numeric strings; form inputs often send the latter.
fn positive_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (number.is_finite() && number > 0.0).then_some(number)
}

fn optional_text(
    fields: &Map<String, Value>,
    name: &'static str,
) -> Result<Option<String>, ValidationError> {
    let text = match fields.get(name) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => normalize_text(s),
        Some(Value::Number(n)) => n.to_string(),
        Some(_) => {
            return Err(ValidationError::new(
                name,
                format!("Field '{}' must be text.", name),
            ))
        }
    };
    Ok((!text.is_empty()).then_some(text))
}

fn required_text(fields: &Map<String, Value>, name: &'static str) -> Result<String, ValidationError> {
    optional_text(fields, name)?.ok_or_else(|| ValidationError::missing(name))
}
