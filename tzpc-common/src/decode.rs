//! Tolerant decoding of the stored comparison payload
//!
//! The comparison producer has written several shapes over time. They are
//! tried in a fixed order and the first one that yields a `details` mapping
//! wins:
//!
//! 1. [`PayloadShape::Direct`]: `{ "details": { ... }, ... }`
//! 2. [`PayloadShape::Envelope`]: `response.choices[0].message.content` (or a
//!    bare `choices[0].message.content`) holding JSON text
//! 3. [`PayloadShape::FencedEnvelope`]: the same content with the JSON inside
//!    a fenced code block, usually surrounded by prose
//!
//! Anything else is [`Error::MalformedPayload`]. An undecodable payload is
//! never treated as an empty result.

use crate::model::{AutoStatus, ComparisonField, ComparisonResult, ComparisonVerdict};
use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"```[ \t]*[A-Za-z0-9_+-]*[ \t]*\r?\n?([\s\S]*?)\s*```").expect("fenced block pattern")
});

/// Which payload layout the comparison was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    Direct,
    Envelope,
    FencedEnvelope,
}

/// Decoded comparison plus the layout it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedComparison {
    pub result: ComparisonResult,
    pub shape: PayloadShape,
}

/// Decode a stored `comparison_result`
///
/// The value may be the structured object itself or JSON text of it.
pub fn decode_comparison(raw: &Value) -> Result<DecodedComparison> {
    let parsed;
    let root = match raw {
        Value::String(text) => {
            parsed = serde_json::from_str::<Value>(text).map_err(|e| {
                Error::MalformedPayload(format!("comparison result is not valid JSON: {}", e))
            })?;
            &parsed
        }
        other => other,
    };

    let root = root.as_object().ok_or_else(|| {
        Error::MalformedPayload(format!(
            "comparison result must be an object, got {}",
            json_kind(root)
        ))
    })?;

    let mut attempts = Vec::new();

    // Direct
    if let Some(details) = root.get("details") {
        match build_result(root, details, root) {
            Ok(result) => return Ok(found(result, PayloadShape::Direct)),
            Err(reason) => attempts.push(format!("direct: {}", reason)),
        }
    } else {
        attempts.push("direct: no `details` mapping".to_string());
    }

    let Some(content) = message_content(root) else {
        attempts.push("envelope: no `choices[0].message.content` string".to_string());
        return Err(malformed(&attempts));
    };

    // Envelope
    match parse_structured(content.trim()) {
        Ok(data) => match data.get("details") {
            Some(details) => match build_result(&data, details, root) {
                Ok(result) => return Ok(found(result, PayloadShape::Envelope)),
                Err(reason) => attempts.push(format!("envelope: {}", reason)),
            },
            None => attempts.push("envelope: content has no `details` mapping".to_string()),
        },
        Err(reason) => attempts.push(format!("envelope: {}", reason)),
    }

    // Fenced code block inside the content
    let mut saw_block = false;
    for captures in FENCED_BLOCK.captures_iter(content) {
        saw_block = true;
        let block = captures.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        match parse_structured(block) {
            Ok(data) => {
                if let Some(details) = data.get("details") {
                    match build_result(&data, details, root) {
                        Ok(result) => return Ok(found(result, PayloadShape::FencedEnvelope)),
                        Err(reason) => attempts.push(format!("fenced block: {}", reason)),
                    }
                } else {
                    attempts.push("fenced block: no `details` mapping".to_string());
                }
            }
            Err(reason) => attempts.push(format!("fenced block: {}", reason)),
        }
    }
    if !saw_block {
        attempts.push("fenced block: none found in content".to_string());
    }

    Err(malformed(&attempts))
}

/// `response.choices[0].message.content`, or the same path without `response`
fn message_content(root: &Map<String, Value>) -> Option<&str> {
    let wrapped = root.get("response").and_then(|r| r.get("choices"));
    [wrapped, root.get("choices")]
        .into_iter()
        .flatten()
        .find_map(|choices| choices.get(0)?.get("message")?.get("content")?.as_str())
}

fn found(result: ComparisonResult, shape: PayloadShape) -> DecodedComparison {
    debug!(?shape, fields = result.fields.len(), "Decoded comparison payload");
    DecodedComparison { result, shape }
}

fn malformed(attempts: &[String]) -> Error {
    warn!(attempts = ?attempts, "Comparison payload matched no known shape");
    Error::MalformedPayload(attempts.join("; "))
}

fn parse_structured(text: &str) -> std::result::Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("content is {}, not an object", json_kind(&other))),
        Err(e) => Err(format!("content is not JSON ({})", e)),
    }
}

/// Build fields from `details`, falling back to the top-level
/// `tz_data` / `passport_data` maps for absent values
fn build_result(
    data: &Map<String, Value>,
    details: &Value,
    root: &Map<String, Value>,
) -> std::result::Result<ComparisonResult, String> {
    let details = details
        .as_object()
        .ok_or_else(|| format!("`details` is {}, not a mapping", json_kind(details)))?;

    let tz_data = lookup_map(data, root, "tz_data");
    let passport_data = lookup_map(data, root, "passport_data");

    let mut fields = Vec::with_capacity(details.len());
    for (key, entry) in details {
        let entry = entry
            .as_object()
            .ok_or_else(|| format!("detail '{}' is {}, not an object", key, json_kind(entry)))?;

        let expected_value = value_text(entry.get("expected"))
            .or_else(|| tz_data.and_then(|m| value_text(m.get(key))));
        let actual_value = value_text(entry.get("actual"))
            .or_else(|| passport_data.and_then(|m| value_text(m.get(key))));

        let supporting_quote = ["message", "quote", "comment"]
            .iter()
            .find_map(|k| value_text(entry.get(*k)))
            .unwrap_or_default();

        fields.push(ComparisonField {
            key: key.clone(),
            expected_value,
            actual_value,
            auto_status: auto_status(key, entry.get("status")),
            supporting_quote,
        });
    }

    Ok(ComparisonResult {
        fields,
        verdict: verdict(data),
    })
}

fn lookup_map<'a>(
    data: &'a Map<String, Value>,
    root: &'a Map<String, Value>,
    name: &str,
) -> Option<&'a Map<String, Value>> {
    data.get(name)
        .and_then(Value::as_object)
        .or_else(|| root.get(name).and_then(Value::as_object))
}

fn auto_status(key: &str, status: Option<&Value>) -> AutoStatus {
    match status.and_then(Value::as_str).map(str::trim) {
        Some("matched") | Some("complete") => AutoStatus::Matched,
        Some("mismatched") => AutoStatus::Mismatched,
        Some("missing") => AutoStatus::Missing,
        other => {
            warn!(field = %key, status = ?other, "Unrecognized comparison status, treating as mismatched");
            AutoStatus::Mismatched
        }
    }
}

fn verdict(data: &Map<String, Value>) -> Option<ComparisonVerdict> {
    let matched = data.get("matched").and_then(Value::as_bool);
    let success = string_list(data.get("criteria_success"));
    let error = string_list(data.get("criteria_error"));

    if matched.is_none() && success.is_none() && error.is_none() {
        return None;
    }

    Some(ComparisonVerdict {
        matched: matched.unwrap_or(false),
        criteria_success: success.unwrap_or_default(),
        criteria_error: error.unwrap_or_default(),
    })
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|v| value_text(Some(v))).collect())
}

/// Display text of a JSON value; blank strings and null are absent
fn value_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn comparison() -> Value {
        json!({
            "matched": false,
            "criteria_success": ["Масса"],
            "criteria_error": ["Напряжение", "Класс защиты"],
            "details": {
                "Напряжение": {
                    "status": "mismatched",
                    "expected": "220V",
                    "actual": "230V",
                    "message": "Напряжение отличается"
                },
                "Масса": {
                    "status": "matched",
                    "expected": 12,
                    "actual": "12 кг",
                    "message": "Совпадает"
                },
                "Класс защиты": {
                    "status": "missing",
                    "expected": "IP54",
                    "actual": null,
                    "message": "Нет в паспорте"
                }
            }
        })
    }

    fn envelope(content: String) -> Value {
        json!({
            "response": {
                "choices": [{ "message": { "role": "assistant", "content": content } }]
            },
            "tz_data": {},
            "passport_data": {}
        })
    }

    #[test]
    fn test_direct_shape() {
        let decoded = decode_comparison(&comparison()).unwrap();
        assert_eq!(decoded.shape, PayloadShape::Direct);

        let keys: Vec<_> = decoded.result.fields.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["Напряжение", "Масса", "Класс защиты"]);

        let mass = decoded.result.field("Масса").unwrap();
        assert_eq!(mass.expected_value.as_deref(), Some("12"));
        assert_eq!(mass.auto_status, AutoStatus::Matched);

        let class = decoded.result.field("Класс защиты").unwrap();
        assert_eq!(class.actual_value, None);
        assert_eq!(class.auto_status, AutoStatus::Missing);

        let verdict = decoded.result.verdict.unwrap();
        assert!(!verdict.matched);
        assert_eq!(verdict.criteria_error.len(), 2);
    }

    #[test]
    fn test_all_shapes_decode_to_same_fields() {
        let direct = decode_comparison(&comparison()).unwrap();

        let plain = envelope(comparison().to_string());
        let via_envelope = decode_comparison(&plain).unwrap();
        assert_eq!(via_envelope.shape, PayloadShape::Envelope);

        let fenced = envelope(format!(
            "Результат сравнения:\n```json\n{}\n```\nГотово.",
            serde_json::to_string_pretty(&comparison()).unwrap()
        ));
        let via_fence = decode_comparison(&fenced).unwrap();
        assert_eq!(via_fence.shape, PayloadShape::FencedEnvelope);

        assert_eq!(direct.result, via_envelope.result);
        assert_eq!(direct.result, via_fence.result);
    }

    #[test]
    fn test_fence_language_tag_is_ignored() {
        for tag in ["Json", "javascript", "json5"] {
            let fenced = envelope(format!("```{}\n{}\n```", tag, comparison()));
            let decoded = decode_comparison(&fenced).unwrap();
            assert_eq!(decoded.shape, PayloadShape::FencedEnvelope, "tag {tag}");
            assert_eq!(decoded.result.fields.len(), 3);
        }
    }

    #[test]
    fn test_stored_as_json_text() {
        let text = Value::String(envelope(comparison().to_string()).to_string());
        let decoded = decode_comparison(&text).unwrap();
        assert_eq!(decoded.shape, PayloadShape::Envelope);
        assert_eq!(decoded.result.fields.len(), 3);
    }

    #[test]
    fn test_bare_choices_envelope() {
        let raw = json!({
            "choices": [{ "message": { "content": format!("```\n{}\n```", comparison()) } }]
        });
        let decoded = decode_comparison(&raw).unwrap();
        assert_eq!(decoded.shape, PayloadShape::FencedEnvelope);
    }

    #[test]
    fn test_fallback_to_extracted_document_data() {
        let raw = json!({
            "details": {
                "Мощность": { "status": "complete", "expected": "", "message": "" }
            },
            "tz_data": { "Мощность": "1.5 кВт" },
            "passport_data": { "Мощность": "1,5 кВт" }
        });
        let decoded = decode_comparison(&raw).unwrap();
        let field = decoded.result.field("Мощность").unwrap();
        assert_eq!(field.expected_value.as_deref(), Some("1.5 кВт"));
        assert_eq!(field.actual_value.as_deref(), Some("1,5 кВт"));
        assert_eq!(field.auto_status, AutoStatus::Matched);
        assert_eq!(field.supporting_quote, "");
        assert_eq!(decoded.result.verdict, None);
    }

    #[test]
    fn test_unknown_status_is_mismatched() {
        let raw = json!({ "details": { "Цвет": { "status": "partial", "expected": "RAL 7035" } } });
        let decoded = decode_comparison(&raw).unwrap();
        assert_eq!(decoded.result.fields[0].auto_status, AutoStatus::Mismatched);
    }

    #[test]
    fn test_no_known_shape_is_malformed() {
        let cases = vec![
            json!({ "result": "ok" }),
            envelope("Извините, я не могу сравнить эти документы.".to_string()),
            envelope("```json\n{ not json }\n```".to_string()),
            envelope("{\"matched\": true}".to_string()),
            json!({ "details": ["Напряжение"] }),
            json!([1, 2, 3]),
            Value::String("{ truncated".to_string()),
        ];

        for raw in cases {
            let err = decode_comparison(&raw).unwrap_err();
            assert!(matches!(err, Error::MalformedPayload(_)), "{raw} gave {err:?}");
        }
    }

    #[test]
    fn test_empty_details_is_not_malformed() {
        let decoded = decode_comparison(&json!({ "details": {} })).unwrap();
        assert!(decoded.result.fields.is_empty());
    }
}
