//! Result normalization.
//!
//! OpenAI-compatible servers and clients disagree on where the generated text
//! lives in a chat-completion choice. Each choice is classified into one of a
//! small, closed set of shapes, checked in precedence order; anything else is
//! stringified rather than rejected.

use serde_json::Value;

use super::ProviderError;

/// Known shapes of one hosted chat-completion choice.
#[derive(Debug, Clone, PartialEq)]
pub enum ChoiceShape {
    /// `{"message": {"content": "..."}}`
    MessageContent(String),
    /// `{"message": {"content": [{"type": "text", "text": "..."}, ...]}}`
    MessageParts(Vec<String>),
    /// `{"text": "..."}`: legacy completions.
    LegacyText(String),
    Unrecognized(Value),
}

impl ChoiceShape {
    pub fn classify(choice: Value) -> Self {
        if let Some(content) = choice.get("message").and_then(|m| m.get("content")) {
            match content {
                Value::String(s) if !s.is_empty() => return Self::MessageContent(s.clone()),
                Value::Array(parts) => {
                    let texts: Vec<String> = parts
                        .iter()
                        .filter_map(|p| p.get("text").and_then(Value::as_str))
                        .map(str::to_owned)
                        .collect();
                    if texts.iter().any(|t| !t.is_empty()) {
                        return Self::MessageParts(texts);
                    }
                }
                _ => {}
            }
        }

        if let Some(Value::String(s)) = choice.get("text") {
            if !s.is_empty() {
                return Self::LegacyText(s.clone());
            }
        }
        Self::Unrecognized(choice)
    }

    pub fn into_text(self) -> String {
        match self {
            Self::MessageContent(s) | Self::LegacyText(s) => s,
            Self::MessageParts(parts) => parts.concat(),
            Self::Unrecognized(v) => v.to_string(),
        }
    }
}

/// Extract text from a full hosted chat-completion body.
///
/// Only the first choice is used. A body without choices is an error: there
/// is nothing to fall back on.
pub fn hosted_text(body: Value) -> Result<String, ProviderError> {
    let first = match body {
        Value::Object(mut map) => match map.remove("choices") {
            Some(Value::Array(choices)) => choices.into_iter().next(),
            _ => None,
        },
        _ => None,
    };

    first
        .map(|choice| ChoiceShape::classify(choice).into_text())
        .ok_or_else(|| ProviderError::Request("response contained no choices".into()))
}

/// Known shapes of a local text-generation pipeline result.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineShape {
    /// `[{"generated_text": ...}, ...]`: value of the first entry.
    Generated(Value),
    Unrecognized(Value),
}

impl PipelineShape {
    pub fn classify(raw: Value) -> Self {
        let generated = raw
            .as_array()
            .and_then(|items| items.first())
            .and_then(|first| first.get("generated_text"))
            .cloned();
        match generated {
            Some(v) => Self::Generated(v),
            None => Self::Unrecognized(raw),
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Generated(Value::String(s)) => s,
            Self::Generated(v) | Self::Unrecognized(v) => v.to_string(),
        }
    }
}

/// Extract text from a local pipeline result. Never fails.
pub fn local_text(raw: Value) -> String {
    PipelineShape::classify(raw).into_text()
}
