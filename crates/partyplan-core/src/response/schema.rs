//! Embedded JSON Schemas for upstream replies.
//!
//! Schemas live in `schemas/*.schema.json` and are compiled once per process.

use std::sync::OnceLock;

use super::{ResponseShape, ShapeError};

const MENU_PLAN_SCHEMA_JSON: &str = include_str!("../../schemas/menu_plan.schema.json");
const ITEM_LIST_SCHEMA_JSON: &str = include_str!("../../schemas/item_list.schema.json");

static MENU_PLAN_VALIDATOR: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
static ITEM_LIST_VALIDATOR: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

fn compile(source: &str) -> Result<jsonschema::Validator, String> {
    let schema_value: serde_json::Value =
        serde_json::from_str(source).map_err(|e| format!("Invalid schema JSON: {}", e))?;

    jsonschema::options()
        .build(&schema_value)
        .map_err(|e| format!("Failed to compile schema: {}", e))
}

fn validator(shape: ResponseShape) -> Result<&'static jsonschema::Validator, ShapeError> {
    let compiled = match shape {
        ResponseShape::PlanWithSummary => {
            MENU_PLAN_VALIDATOR.get_or_init(|| compile(MENU_PLAN_SCHEMA_JSON))
        }
        ResponseShape::ItemList => ITEM_LIST_VALIDATOR.get_or_init(|| compile(ITEM_LIST_SCHEMA_JSON)),
    };

    compiled
        .as_ref()
        .map_err(|e| ShapeError::SchemaLoad(e.clone()))
}

/// All schema violations for `value`, empty when it conforms.
pub(super) fn violations(
    shape: ResponseShape,
    value: &serde_json::Value,
) -> Result<Vec<String>, ShapeError> {
    let validator = validator(shape)?;

    Ok(validator
        .iter_errors(value)
        .map(|e| format!("{} at '{}'", e, e.instance_path))
        .collect())
}
