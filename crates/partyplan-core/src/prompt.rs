//! Outbound payload construction.
//!
//! Maps a validated [`PlanningRequest`] to the text and schema sent upstream.
//! Nothing here performs I/O, so prompts can be checked without a network.

use crate::request::{DrinkRequest, MenuRequest, PlanningRequest};
use crate::response::ResponseShape;

/// Sampling temperature for planning replies. Low, so quantities stay stable.
pub const PLANNING_TEMPERATURE: f32 = 0.2;

const NO_DISHES_PROVIDED: &str =
    "No specific dishes were provided; generate a balanced, suggested menu.";

/// Base instruction for beverage estimation.
pub const DRINKS_SYSTEM_PROMPT: &str = "Act as an expert sommelier and bartender who \
specializes in large-scale event planning. Your only goal is to accurately calculate the \
required quantity of beverages and return the results in the requested JSON structure. \
DO NOT use markdown formatting outside of the JSON structure itself.";

/// Everything the relay needs for one outbound call.
///
/// Owned by a single relay call and never shared between calls.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundPayload {
    /// Role and rules for the model
    pub system_instruction: String,

    /// The request-specific question
    pub user_prompt: String,

    /// Shape the reply must conform to
    pub shape: ResponseShape,

    /// Sampling temperature
    pub temperature: f32,
}

/// Build the outbound payload for any planning request.
pub fn build_payload(request: &PlanningRequest) -> OutboundPayload {
    match request {
        PlanningRequest::Menu(menu) => menu_payload(menu),
        PlanningRequest::Drinks(drinks) => drinks_payload(drinks),
    }
}

/// Payload for menu optimisation.
pub fn menu_payload(request: &MenuRequest) -> OutboundPayload {
    let guests = request.guests;

    let system_instruction = format!(
        "You are a world-class party planner and menu optimizer. Your task is to calculate \
         the precise quantities for a party of {guests} people based on the provided menu \
         items and party details. You must account for common human consumption patterns \
         (e.g., less of each item when there are many choices). Your response MUST be a \
         single, valid JSON object following the required schema, containing both the \
         detailed 'plan' and a 'summary'."
    );

    let user_prompt = format!(
        "Optimize the following menu for {guests} guests.\n\
         Menu details: {details}.\n\n\
         For the 'plan' array: For each item, provide the estimated quantity needed and a \
         clear unit (e.g., 'lbs', 'cups', 'units'). For example: '2.5 lbs of cheese', \
         '50 mini quiches', '2 gallons of iced tea'. If the user provided no specific items, \
         suggest a balanced, optimized menu.\n\n\
         For the 'summary' field: Provide a concise, plain text paragraph (no markdown or \
         special characters) that lists the main assumptions made (e.g., duration of the \
         party, average appetite, context from the party details) and any key preparation \
         notes.",
        details = menu_details(request),
    );

    OutboundPayload {
        system_instruction,
        user_prompt,
        shape: ResponseShape::PlanWithSummary,
        temperature: PLANNING_TEMPERATURE,
    }
}

/// Payload for drink estimation.
pub fn drinks_payload(request: &DrinkRequest) -> OutboundPayload {
    let user_prompt = format!(
        "I have {} guests attending a {} event lasting {} hours. The available drinks are: \
         {}. Please estimate the total volume and quantity of each item needed to \
         comfortably cover all guests, and return the response as a JSON array of items.",
        request.guests, request.event_type, request.duration_hours, request.drinks_list,
    );

    OutboundPayload {
        system_instruction: DRINKS_SYSTEM_PROMPT.to_string(),
        user_prompt,
        shape: ResponseShape::ItemList,
        temperature: PLANNING_TEMPERATURE,
    }
}

/// Join the supplied dish categories, or ask for a suggested menu when empty.
fn menu_details(request: &MenuRequest) -> String {
    let sections = [
        ("Appetizers", &request.appetizers),
        ("Main Courses", &request.main_courses),
        ("Side Dishes", &request.side_dishes),
        ("Desserts", &request.desserts),
        ("Other Items/Notes", &request.other_items),
    ];

    let mut parts: Vec<String> = sections
        .iter()
        .filter_map(|(label, value)| value.as_ref().map(|v| format!("{}: {}", label, v)))
        .collect();

    if let Some(details) = &request.party_details {
        parts.push(format!("***Party Details for context: {}***", details));
    }

    if parts.is_empty() {
        NO_DISHES_PROVIDED.to_string()
    } else {
        parts.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn menu(guests: u32) -> MenuRequest {
        MenuRequest {
            guests,
            appetizers: None,
            main_courses: None,
            side_dishes: None,
            desserts: None,
            other_items: None,
            party_details: None,
        }
    }

    #[test]
    fn test_menu_payload_interpolates_fields() {
        let request = MenuRequest {
            main_courses: Some("pasta".to_string()),
            desserts: Some("tiramisu".to_string()),
            party_details: Some("outdoor lunch".to_string()),
            ..menu(10)
        };

        let payload = menu_payload(&request);

        assert!(payload.system_instruction.contains("party of 10 people"));
        assert!(payload.user_prompt.contains("for 10 guests"));
        assert!(payload.user_prompt.contains(
            "Main Courses: pasta; Desserts: tiramisu; ***Party Details for context: outdoor lunch***"
        ));
        assert_eq!(payload.shape, ResponseShape::PlanWithSummary);
        assert_eq!(payload.temperature, PLANNING_TEMPERATURE);
    }

    #[test]
    fn test_menu_payload_without_dishes_asks_for_suggestions() {
        let payload = menu_payload(&menu(6));
        assert!(payload.user_prompt.contains(NO_DISHES_PROVIDED));
    }

    #[test]
    fn test_drinks_payload() {
        let request = DrinkRequest {
            guests: 30,
            event_type: "birthday".to_string(),
            duration_hours: 2.5,
            drinks_list: "soda, juice".to_string(),
        };

        let payload = build_payload(&PlanningRequest::Drinks(request));

        assert_eq!(payload.system_instruction, DRINKS_SYSTEM_PROMPT);
        assert!(payload
            .user_prompt
            .starts_with("I have 30 guests attending a birthday event lasting 2.5 hours."));
        assert!(payload.user_prompt.contains("soda, juice"));
        assert_eq!(payload.shape, ResponseShape::ItemList);
    }

    #[test]
    fn test_payload_is_deterministic() {
        let request = PlanningRequest::Menu(MenuRequest {
            appetizers: Some("bruschetta".to_string()),
            ..menu(12)
        });
        assert_eq!(build_payload(&request), build_payload(&request));
    }
}
