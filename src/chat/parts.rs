//! User-supplied message parts.

use serde::{Deserialize, Serialize};

/// One part of a user message: plain text or opaque structured content
/// (image or document references, binary payloads, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserContent {
    /// Plain text.
    Text(String),
    /// Any JSON object, passed through untouched.
    Structured(serde_json::Map<String, serde_json::Value>),
}

impl UserContent {
    /// Text form used when building a prompt. Structured parts are rendered as compact JSON.
    #[must_use]
    pub fn as_prompt_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(object) => serde_json::Value::Object(object.clone()).to_string(),
        }
    }
}

impl From<&str> for UserContent {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Join parts into a single prompt, one part per line.
#[must_use]
pub fn render_prompt(parts: &[UserContent]) -> String {
    parts
        .iter()
        .map(UserContent::as_prompt_text)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parts_accept_strings_and_objects() {
        let parts: Vec<UserContent> =
            serde_json::from_value(json!(["hello", {"kind": "image-url", "url": "http://x/y.png"}]))
                .unwrap();

        assert_eq!(parts[0], UserContent::Text("hello".to_string()));
        assert!(matches!(parts[1], UserContent::Structured(_)));
    }

    #[test]
    fn test_parts_reject_other_json() {
        assert!(serde_json::from_value::<UserContent>(json!(42)).is_err());
        assert!(serde_json::from_value::<UserContent>(json!([1, 2])).is_err());
    }

    #[test]
    fn test_render_prompt() {
        let parts: Vec<UserContent> =
            serde_json::from_value(json!(["Décris", {"url": "a"}])).unwrap();
        assert_eq!(render_prompt(&parts), "Décris\n{\"url\":\"a\"}");
    }
}
