//! Browser action types.
//!
//! One variant per automation primitive. The session executes these through
//! a single flat dispatch, so a tool name always maps to exactly one
//! underlying invocation.

use serde::{Deserialize, Serialize};

/// Actions supported by the browser session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BrowserAction {
    /// Navigate to a URL.
    Navigate { url: String },
    /// Capture a named screenshot of the page or of a single element.
    Screenshot {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
    },
    /// Click an element matching a CSS selector.
    Click { selector: String },
    /// Fill an input element with a value.
    Fill { selector: String, value: String },
    /// Choose an option of a `<select>` element by value.
    Select { selector: String, value: String },
    /// Hover the mouse over an element.
    Hover { selector: String },
    /// Evaluate a JavaScript expression in the page.
    Evaluate { script: String },
}

impl BrowserAction {
    /// The tool name this action answers to.
    pub fn name(&self) -> &'static str {
        match self {
            BrowserAction::Navigate { .. } => "navigate",
            BrowserAction::Screenshot { .. } => "screenshot",
            BrowserAction::Click { .. } => "click",
            BrowserAction::Fill { .. } => "fill",
            BrowserAction::Select { .. } => "select",
            BrowserAction::Hover { .. } => "hover",
            BrowserAction::Evaluate { .. } => "evaluate",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigate_serde_round_trip() {
        let action = BrowserAction::Navigate {
            url: "https://example.com".to_string(),
        };
        let json = serde_json::to_string(&action).unwrap();
        assert!(json.contains("\"action\":\"navigate\""));
        assert!(json.contains("\"url\":\"https://example.com\""));

        match serde_json::from_str::<BrowserAction>(&json).unwrap() {
            BrowserAction::Navigate { url } => assert_eq!(url, "https://example.com"),
            other => panic!("expected Navigate, got {other:?}"),
        }
    }

    #[test]
    fn screenshot_optionals_default_to_none() {
        let parsed: BrowserAction =
            serde_json::from_str(r#"{"action":"screenshot","name":"landing"}"#).unwrap();
        match parsed {
            BrowserAction::Screenshot {
                name,
                selector,
                width,
                height,
            } => {
                assert_eq!(name, "landing");
                assert!(selector.is_none());
                assert!(width.is_none());
                assert!(height.is_none());
            }
            other => panic!("expected Screenshot, got {other:?}"),
        }
    }

    #[test]
    fn each_tool_name_maps_to_one_variant() {
        let actions = [
            BrowserAction::Navigate {
                url: "https://example.com".into(),
            },
            BrowserAction::Screenshot {
                name: "s".into(),
                selector: None,
                width: None,
                height: None,
            },
            BrowserAction::Click {
                selector: "#go".into(),
            },
            BrowserAction::Fill {
                selector: "#q".into(),
                value: "rust".into(),
            },
            BrowserAction::Select {
                selector: "#lang".into(),
                value: "en".into(),
            },
            BrowserAction::Hover {
                selector: ".menu".into(),
            },
            BrowserAction::Evaluate {
                script: "1 + 1".into(),
            },
        ];

        let names: Vec<&str> = actions.iter().map(BrowserAction::name).collect();
        assert_eq!(
            names,
            [
                "navigate",
                "screenshot",
                "click",
                "fill",
                "select",
                "hover",
                "evaluate"
            ]
        );
        // The tag in the wire form always equals the tool name.
        for action in &actions {
            let json = serde_json::to_value(action).unwrap();
            assert_eq!(json["action"], action.name());
        }
    }

    #[test]
    fn unknown_action_tag_fails_to_parse() {
        let result = serde_json::from_str::<BrowserAction>(r#"{"action":"fly_to_moon"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn missing_required_field_fails_to_parse() {
        let result = serde_json::from_str::<BrowserAction>(r#"{"action":"click"}"#);
        assert!(result.is_err());
    }
}
