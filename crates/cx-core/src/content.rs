use serde::{Deserialize, Serialize};

/// Content represents a message with multiple parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn new_system_text(text: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            parts: vec![Part::Text { text: text.into() }],
        }
    }

    pub fn new_user_text(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part::Text { text: text.into() }],
        }
    }

    pub fn new_model_text(text: impl Into<String>) -> Self {
        Self {
            role: "model".to_string(),
            parts: vec![Part::Text { text: text.into() }],
        }
    }

    /// Concatenated text of all text parts, `None` when there is none.
    pub fn text(&self) -> Option<String> {
        let text: String = self
            .parts
            .iter()
            .map(|part| match part {
                Part::Text { text } => text.as_str(),
            })
            .collect();
        if text.is_empty() { None } else { Some(text) }
    }
}

/// Part represents a single part of content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text { text: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_concatenation() {
        let content = Content {
            role: "model".to_string(),
            parts: vec![
                Part::Text {
                    text: "VALID".to_string(),
                },
                Part::Text {
                    text: " plan".to_string(),
                },
            ],
        };
        assert_eq!(content.text().as_deref(), Some("VALID plan"));
        assert_eq!(Content::new_model_text("").text(), None);
        assert_eq!(Content::new_system_text("x").role, "system");
    }
}
