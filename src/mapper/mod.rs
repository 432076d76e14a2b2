// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Response field protocol: instruction rendering and attribute extraction.
//!
//! Free-text model output carries machine-readable control fields. This module
//! owns both directions of that protocol:
//! - Rendering: an ordered list of [`AttributeDescriptor`]s becomes a textual
//!   instruction block the model must follow, terminated by the fixed
//!   user-message marker.
//! - Extraction: raw response text is split into a variable-name -> value map
//!   plus the user-visible trailing text. Missing fields resolve to absent,
//!   never an error.
//!
//! The parser is deliberately narrow so it can be swapped for a stricter
//! structured-output mechanism without touching the state machine.

mod stream;

pub use stream::MarkerGate;

use crate::error::Result;
use crate::types::AttributeDescriptor;
use regex::Regex;
use std::collections::HashMap;

/// Marker separating control fields from the user-visible message.
pub const USER_MESSAGE_MARKER: &str = "MESSAGE TO SEND:";

const USER_MESSAGE_HEADER: &str = "\nMESSAGE TO SEND: //The message you want to send to the user.\nThe message to the user...\n";

const USER_MESSAGE_EXAMPLE: &str =
    "\nMESSAGE TO SEND:\nHi, I am a helpful assistant, how can I help you?\n\n\n-----END OF EXAMPLE RESPONSE---------\n";

fn response_header(any_fields: bool) -> String {
    format!(
        "RESPONSE FORMAT INSTRUCTIONS\n----------------------------\n\nWhen responding to me please, ALWAYS respond in the following format:\n{}\n--------------------",
        if any_fields {
            "//A set of parameters to include in your response when applicable."
        } else {
            ""
        }
    )
}

/// Renders field instructions and extracts field values from response text.
///
/// Field values are bounded by the next recognized field header, a newline,
/// or the terminal marker at end of text. A header with no such boundary
/// after it yields no value.
pub struct ResponseFieldMapper {
    descriptors: Vec<AttributeDescriptor>,
    /// One pattern per descriptor locating the start of its value.
    header_res: Vec<Regex>,
    /// Single pattern locating the earliest value boundary.
    boundary_re: Option<Regex>,
}

impl ResponseFieldMapper {
    pub fn new(descriptors: Vec<AttributeDescriptor>) -> Result<Self> {
        let header_res = descriptors
            .iter()
            .map(|d| Regex::new(&format!(r"- {}:\s", regex::escape(&d.name))))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let boundary_re = if descriptors.is_empty() {
            None
        } else {
            let headers = descriptors
                .iter()
                .map(|d| format!("- {}", regex::escape(&d.name)))
                .collect::<Vec<_>>()
                .join("|");
            Some(Regex::new(&format!(
                r"\s{}|\n|{}$",
                headers,
                regex::escape(USER_MESSAGE_MARKER)
            ))?)
        };

        Ok(Self {
            descriptors,
            header_res,
            boundary_re,
        })
    }

    /// The descriptors this mapper was built from.
    pub fn descriptors(&self) -> &[AttributeDescriptor] {
        &self.descriptors
    }

    /// Render the instruction block the model must follow.
    pub fn render_instructions(&self) -> String {
        self.render_instructions_with("")
    }

    /// Render the instruction block with extra example material appended
    /// between the field examples and the example user message.
    pub fn render_instructions_with(&self, additional_examples: &str) -> String {
        let fields = self
            .descriptors
            .iter()
            .map(|d| format!("- {}: (Type: {} ) \\ {}", d.name, d.attribute_type, d.description))
            .collect::<Vec<_>>()
            .join("\n");

        let examples = self
            .descriptors
            .iter()
            .filter_map(|d| {
                d.example
                    .as_ref()
                    .map(|example| format!("- {}: {}", d.name, example))
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "{}\n{}\n\n{}\n\nExample Response:\n--------------------\n{}\n{}\n{}",
            response_header(!self.descriptors.is_empty()),
            fields,
            USER_MESSAGE_HEADER,
            examples,
            additional_examples,
            USER_MESSAGE_EXAMPLE
        )
    }

    /// Extract declared field values from response text.
    ///
    /// Returns a map keyed by variable name; fields whose header is missing
    /// or unterminated are simply absent.
    pub fn parse(&self, text: &str) -> HashMap<String, String> {
        let mut values = HashMap::new();
        let Some(boundary_re) = &self.boundary_re else {
            return values;
        };

        for (descriptor, header_re) in self.descriptors.iter().zip(&self.header_res) {
            let Some(header) = header_re.find(text) else {
                continue;
            };
            let value_start = header.end();
            let Some(boundary) = boundary_re.find_at(text, value_start) else {
                continue;
            };
            let value = text[value_start..boundary.start()].trim();
            values.insert(descriptor.variable_name.clone(), value.to_string());
        }

        values
    }
}

/// The user-visible part of a response: everything after the marker, trimmed.
/// If the marker never appears the entire text is user-visible.
pub fn user_visible_text(text: &str) -> String {
    match text.find(USER_MESSAGE_MARKER) {
        None => text.to_string(),
        Some(idx) => text[idx + USER_MESSAGE_MARKER.len()..].trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<AttributeDescriptor> {
        vec![
            AttributeDescriptor::new("Current Plan", "string", "plan", "Your current plan.")
                .with_example("1. Gather sources."),
            AttributeDescriptor::new("Helper Name", "string", "helper", "The helper to contact."),
        ]
    }

    #[test]
    fn test_render_instructions() {
        let mapper = ResponseFieldMapper::new(catalog()).unwrap();
        let instructions = mapper.render_instructions();
        insta::assert_snapshot!(instructions, @r###"
RESPONSE FORMAT INSTRUCTIONS
----------------------------

When responding to me please, ALWAYS respond in the following format:
//A set of parameters to include in your response when applicable.
--------------------
- Current Plan: (Type: string ) \ Your current plan.
- Helper Name: (Type: string ) \ The helper to contact.


MESSAGE TO SEND: //The message you want to send to the user.
The message to the user...


Example Response:
--------------------
- Current Plan: 1. Gather sources.


MESSAGE TO SEND:
Hi, I am a helpful assistant, how can I help you?


-----END OF EXAMPLE RESPONSE---------
"###);
    }

    #[test]
    fn test_render_without_fields_omits_parameter_note() {
        let mapper = ResponseFieldMapper::new(Vec::new()).unwrap();
        let instructions = mapper.render_instructions();
        assert!(!instructions.contains("//A set of parameters"));
        assert!(instructions.contains(USER_MESSAGE_MARKER));
    }

    #[test]
    fn test_render_includes_only_fields_with_examples() {
        let mapper = ResponseFieldMapper::new(catalog()).unwrap();
        let instructions = mapper.render_instructions();
        assert!(instructions.contains("- Current Plan: 1. Gather sources."));
        // "Helper Name" has no example; its only "- Helper Name:" line is the
        // field declaration.
        assert_eq!(instructions.matches("- Helper Name:").count(), 1);
    }

    #[test]
    fn test_parse_extracts_declared_fields() {
        let mapper = ResponseFieldMapper::new(catalog()).unwrap();
        let text = "- Current Plan: Research the topic\n- Helper Name: Researcher1\nMESSAGE TO SEND:\nOn it.";
        let values = mapper.parse(text);
        assert_eq!(values.get("plan").map(String::as_str), Some("Research the topic"));
        assert_eq!(values.get("helper").map(String::as_str), Some("Researcher1"));
    }

    #[test]
    fn test_parse_round_trip() {
        let descriptors = catalog();
        let mapper = ResponseFieldMapper::new(descriptors.clone()).unwrap();
        let wanted = vec![("plan", "Check the weather first"), ("helper", "Researcher1")];

        let mut text = String::new();
        for (descriptor, (_, value)) in descriptors.iter().zip(&wanted) {
            text.push_str(&format!("- {}: {}\n", descriptor.name, value));
        }
        text.push_str("MESSAGE TO SEND:\nDone.");

        let values = mapper.parse(&text);
        for (variable, value) in wanted {
            assert_eq!(values.get(variable).map(String::as_str), Some(value));
        }
    }

    #[test]
    fn test_parse_missing_fields_are_absent() {
        let mapper = ResponseFieldMapper::new(catalog()).unwrap();
        let values = mapper.parse("- Current Plan: Just this one\nMESSAGE TO SEND:\nHi");
        assert!(values.contains_key("plan"));
        assert!(!values.contains_key("helper"));
    }

    #[test]
    fn test_parse_no_marker_never_errors() {
        let mapper = ResponseFieldMapper::new(catalog()).unwrap();
        let values = mapper.parse("Just some plain text with no fields at all.");
        assert!(values.is_empty());
    }

    #[test]
    fn test_parse_unterminated_value_is_absent() {
        // A header at the very end of the text, with no newline or marker
        // after it, has no boundary and yields no value.
        let mapper = ResponseFieldMapper::new(catalog()).unwrap();
        let values = mapper.parse("- Current Plan: unterminated");
        assert!(!values.contains_key("plan"));
    }

    #[test]
    fn test_parse_value_stops_at_newline() {
        let mapper = ResponseFieldMapper::new(catalog()).unwrap();
        let values = mapper.parse("- Current Plan: first line\nsecond line\nMESSAGE TO SEND:\nx");
        assert_eq!(values.get("plan").map(String::as_str), Some("first line"));
    }

    #[test]
    fn test_parse_empty_value_is_present() {
        let mapper = ResponseFieldMapper::new(catalog()).unwrap();
        let values = mapper.parse("- Current Plan: \nMESSAGE TO SEND:\nx");
        assert_eq!(values.get("plan").map(String::as_str), Some(""));
    }

    #[test]
    fn test_user_visible_text_after_marker() {
        let text = "- Current Plan: x\nMESSAGE TO SEND:\n  Hello there!  ";
        assert_eq!(user_visible_text(text), "Hello there!");
    }

    #[test]
    fn test_user_visible_text_without_marker_is_whole_text() {
        let text = "no marker in here";
        assert_eq!(user_visible_text(text), text);
    }

    #[test]
    fn test_descriptor_names_with_regex_metacharacters() {
        let descriptors = vec![AttributeDescriptor::new(
            "Confidence (0-1)",
            "number",
            "confidence",
            "How sure you are.",
        )];
        let mapper = ResponseFieldMapper::new(descriptors).unwrap();
        let values = mapper.parse("- Confidence (0-1): 0.9\nMESSAGE TO SEND:\nhi");
        assert_eq!(values.get("confidence").map(String::as_str), Some("0.9"));
    }
}
