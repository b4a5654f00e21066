//! Strict parsing of a provider's free-text reply into an [`Analysis`].
//!
//! Nothing is defaulted: a reply that lacks a required field, or carries a
//! value outside its closed set, is rejected so it cannot skew consensus.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::types::{Analysis, Category, Priority, Sentiment};
use crate::error::ValidationError;

/// A reply wrapped in a markdown fence: ```` ```json ... ``` ```` or ```` ``` ... ``` ````.
static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*\s*(.*?)\s*```$").unwrap());

/// Parse and validate one raw reply.
pub fn validate(raw: &str) -> Result<Analysis, ValidationError> {
    let text = strip_code_fence(raw);
    let value: Value =
        serde_json::from_str(text).map_err(|e| ValidationError::Json(e.to_string()))?;
    let Value::Object(fields) = value else {
        return Err(ValidationError::NotAnObject);
    };

    let category = required_str(&fields, "category")?;
    let category = Category::from_label(category).ok_or_else(|| invalid("category", category))?;

    let priority = required_str(&fields, "priority")?;
    let priority = Priority::from_label(priority).ok_or_else(|| invalid("priority", priority))?;

    let sentiment = required_str(&fields, "sentiment")?;
    let sentiment =
        Sentiment::from_label(sentiment).ok_or_else(|| invalid("sentiment", sentiment))?;

    let confidence = parse_confidence(present(&fields, "confidence")?)?;

    Ok(Analysis {
        category,
        priority,
        sentiment,
        confidence,
        summary: parse_summary(fields.get("summary"))?,
        action_required: parse_action_required(fields.get("action_required"))?,
        suggested_actions: parse_suggested_actions(fields.get("suggested_actions"))?,
    })
}

/// Remove one surrounding markdown code fence, if present.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    match CODE_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => trimmed,
    }
}

// ── Field helpers ───────────────────────────────────────────────────

fn invalid(field: &'static str, value: impl ToString) -> ValidationError {
    ValidationError::InvalidValue {
        field,
        value: value.to_string(),
    }
}

/// A field that must be present and non-null.
fn present<'a>(
    fields: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a Value, ValidationError> {
    match fields.get(field) {
        None | Some(Value::Null) => Err(ValidationError::MissingField(field)),
        Some(value) => Ok(value),
    }
}

fn required_str<'a>(
    fields: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, ValidationError> {
    let value = present(fields, field)?;
    value.as_str().ok_or_else(|| invalid(field, value))
}

/// Accepts a JSON number or a numeric string (the prompt quotes it).
fn parse_confidence(value: &Value) -> Result<f64, ValidationError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(c) if c.is_finite() && (0.0..=1.0).contains(&c) => Ok(c),
        _ => Err(invalid("confidence", value)),
    }
}

fn parse_summary(value: Option<&Value>) -> Result<Option<String>, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        Some(other) => Err(invalid("summary", other)),
    }
}

/// Accepts a boolean or the strings "true"/"false".
fn parse_action_required(value: Option<&Value>) -> Result<Option<bool>, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("true") => Ok(Some(true)),
        Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("false") => Ok(Some(false)),
        Some(other) => Err(invalid("action_required", other)),
    }
}

fn parse_suggested_actions(value: Option<&Value>) -> Result<Vec<String>, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(|s| s.trim().to_string())
                    .ok_or_else(|| invalid("suggested_actions", item))
            })
            .filter(|item| !matches!(item, Ok(s) if s.is_empty()))
            .collect(),
        Some(other) => Err(invalid("suggested_actions", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"{
        "category": "work",
        "priority": "high",
        "sentiment": "neutral",
        "confidence": 0.85,
        "summary": "Quarterly report due Friday.",
        "action_required": true,
        "suggested_actions": ["Reply to sender", "Add to calendar"]
    }"#;

    #[test]
    fn parses_complete_reply() {
        let analysis = validate(FULL).unwrap();
        assert_eq!(analysis.category, Category::Work);
        assert_eq!(analysis.priority, Priority::High);
        assert_eq!(analysis.sentiment, Sentiment::Neutral);
        assert!((analysis.confidence - 0.85).abs() < 1e-9);
        assert_eq!(analysis.summary.as_deref(), Some("Quarterly report due Friday."));
        assert_eq!(analysis.action_required, Some(true));
        assert_eq!(analysis.suggested_actions.len(), 2);
    }

    #[test]
    fn strips_json_fence() {
        let wrapped = format!("```json\n{FULL}\n```");
        assert_eq!(validate(&wrapped).unwrap().category, Category::Work);
        let bare = format!("```\n{FULL}\n```");
        assert_eq!(validate(&bare).unwrap().priority, Priority::High);
    }

    #[test]
    fn missing_confidence_is_rejected() {
        let raw = r#"{"category":"work","priority":"high","sentiment":"neutral"}"#;
        assert_eq!(
            validate(raw).unwrap_err(),
            ValidationError::MissingField("confidence")
        );
    }

    #[test]
    fn each_required_field_is_enforced() {
        for field in ["category", "priority", "sentiment", "confidence"] {
            let mut value: Value = serde_json::from_str(FULL).unwrap();
            value.as_object_mut().unwrap().remove(field);
            let err = validate(&value.to_string()).unwrap_err();
            assert_eq!(err, ValidationError::MissingField(field));
        }
    }

    #[test]
    fn null_required_field_counts_as_missing() {
        let raw = r#"{"category":null,"priority":"low","sentiment":"positive","confidence":0.5}"#;
        assert_eq!(validate(raw).unwrap_err(), ValidationError::MissingField("category"));
    }

    #[test]
    fn out_of_set_values_are_rejected() {
        let raw = r#"{"category":"urgent","priority":"low","sentiment":"positive","confidence":0.5}"#;
        assert!(matches!(
            validate(raw),
            Err(ValidationError::InvalidValue { field: "category", .. })
        ));
        let raw = r#"{"category":"work","priority":"critical","sentiment":"positive","confidence":0.5}"#;
        assert!(matches!(
            validate(raw),
            Err(ValidationError::InvalidValue { field: "priority", .. })
        ));
        let raw = r#"{"category":"work","priority":"low","sentiment":"angry","confidence":0.5}"#;
        assert!(matches!(
            validate(raw),
            Err(ValidationError::InvalidValue { field: "sentiment", .. })
        ));
    }

    #[test]
    fn confidence_range_and_string_form() {
        let raw = r#"{"category":"work","priority":"low","sentiment":"positive","confidence":1.2}"#;
        assert!(validate(raw).is_err());
        let raw = r#"{"category":"work","priority":"low","sentiment":"positive","confidence":-0.1}"#;
        assert!(validate(raw).is_err());
        let raw = r#"{"category":"work","priority":"low","sentiment":"positive","confidence":"0.7"}"#;
        assert!((validate(raw).unwrap().confidence - 0.7).abs() < 1e-9);
        let raw = r#"{"category":"work","priority":"low","sentiment":"positive","confidence":"high"}"#;
        assert!(validate(raw).is_err());
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let raw = r#"{"category":"spam","priority":"low","sentiment":"negative","confidence":0.99}"#;
        let analysis = validate(raw).unwrap();
        assert!(analysis.summary.is_none());
        assert!(analysis.action_required.is_none());
        assert!(analysis.suggested_actions.is_empty());
    }

    #[test]
    fn action_required_accepts_string_booleans() {
        let raw = r#"{"category":"work","priority":"low","sentiment":"neutral","confidence":0.5,"action_required":"false"}"#;
        assert_eq!(validate(raw).unwrap().action_required, Some(false));
        let raw = r#"{"category":"work","priority":"low","sentiment":"neutral","confidence":0.5,"action_required":"maybe"}"#;
        assert!(validate(raw).is_err());
    }

    #[test]
    fn suggested_actions_must_be_strings() {
        let raw = r#"{"category":"work","priority":"low","sentiment":"neutral","confidence":0.5,"suggested_actions":["ok", 3]}"#;
        assert!(validate(raw).is_err());
        let raw = r#"{"category":"work","priority":"low","sentiment":"neutral","confidence":0.5,"suggested_actions":["ok", "  "]}"#;
        assert_eq!(validate(raw).unwrap().suggested_actions, vec!["ok".to_string()]);
    }

    #[test]
    fn non_json_and_non_object_fail() {
        assert!(matches!(validate("I think this is work email"), Err(ValidationError::Json(_))));
        assert_eq!(validate("[1, 2]").unwrap_err(), ValidationError::NotAnObject);
        assert!(matches!(validate(""), Err(ValidationError::Json(_))));
    }
}
