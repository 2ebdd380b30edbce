//! JSON parsing helpers for model replies
//!
//! Models often wrap the JSON payload in prose or code fences, so the array
//! is recovered by slicing from the first `[` to the last `]`. A reply with
//! no decodable array fails the whole batch; problems with single entries
//! only degrade those entries.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result, TransportError};
use crate::models::{Category, Classification, ClassificationSource, Record};
use crate::text::truncate;

/// Reason given to items the model skipped
pub const NO_RESPONSE: &str = "no response";

/// Longest slice of a bad reply quoted in an error
const MAX_RAW_EXCERPT: usize = 200;

/// Decode a batch reply into one classification per known item id
///
/// Entries for ids outside `batch_ids` are ignored and the first entry for
/// a repeated id wins. Ids the model skipped are simply absent from the map.
pub fn parse_batch_response(
    reply: &str,
    batch_ids: &[&str],
) -> std::result::Result<HashMap<String, Classification>, TransportError> {
    let entries = extract_array(reply)?;
    let mut parsed = HashMap::with_capacity(batch_ids.len());

    for entry in entries {
        let Some(object) = entry.as_object() else {
            warn!("Skipping non-object entry in model reply");
            continue;
        };
        let Some(id) = object.get("id").and_then(value_as_id) else {
            warn!("Skipping model reply entry without an id");
            continue;
        };
        if !batch_ids.contains(&id.as_str()) {
            debug!(id = %id, "Ignoring reply entry for an id outside the batch");
            continue;
        }
        if parsed.contains_key(&id) {
            debug!(id = %id, "Ignoring repeated reply entry");
            continue;
        }

        let classification = validate_entry(&id, object);
        parsed.insert(id, classification);
    }

    Ok(parsed)
}

/// Classifications for every batch item, in batch order
///
/// Items missing from the reply get a fallback.
pub fn resolve_batch(
    batch: &[Record],
    mut parsed: HashMap<String, Classification>,
) -> Vec<Classification> {
    batch
        .iter()
        .map(|record| match parsed.remove(&record.id) {
            Some(classification) => classification,
            None => {
                warn!(id = %record.id, "Model reply has no entry for item");
                Classification::fallback(&record.id, NO_RESPONSE)
            }
        })
        .collect()
}

/// Fallback classifications for a whole batch
pub fn fallback_batch(batch: &[Record], reason: &str) -> Vec<Classification> {
    batch
        .iter()
        .map(|record| Classification::fallback(&record.id, reason))
        .collect()
}

fn extract_array(reply: &str) -> std::result::Result<Vec<Value>, TransportError> {
    let reply = reply.trim();
    let start = reply.find('[');
    let end = reply.rfind(']');

    match (start, end) {
        (Some(s), Some(e)) if s < e => {
            let json_str = &reply[s..=e];
            serde_json::from_str(json_str).map_err(|e| {
                TransportError::Envelope(format!(
                    "invalid JSON array: {} | raw: {}",
                    e,
                    truncate(json_str, MAX_RAW_EXCERPT)
                ))
            })
        }
        _ => Err(TransportError::Envelope(format!(
            "no JSON array in reply | raw: {}",
            truncate(reply, MAX_RAW_EXCERPT)
        ))),
    }
}

fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Build a classification from one reply entry, flagging bad fields
fn validate_entry(id: &str, entry: &serde_json::Map<String, Value>) -> Classification {
    let mut problems = Vec::new();

    let category = match coerce_category(entry.get("category")) {
        Ok(category) => Some(category),
        Err(e) => {
            problems.push(validation_message(e));
            None
        }
    };

    let confidence = match coerce_confidence(entry.get("confidence")) {
        Ok(confidence) => confidence,
        Err(e) => {
            problems.push(validation_message(e));
            0
        }
    };

    let given_reason = entry
        .get("reason")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();

    let reason = match (given_reason.is_empty(), problems.is_empty()) {
        (_, true) => given_reason.to_string(),
        (true, false) => problems.join("; "),
        (false, false) => format!("{} ({})", given_reason, problems.join("; ")),
    };

    if !problems.is_empty() {
        warn!(id = %id, problems = %problems.join("; "), "Degraded model reply entry");
    }

    Classification {
        item_id: id.to_string(),
        // An unusable category cannot carry the model's confidence
        confidence: if category.is_some() { confidence } else { 0 },
        category: category.unwrap_or(Category::Uncategorized),
        reason,
        source: ClassificationSource::Model,
    }
}

fn validation_message(err: Error) -> String {
    match err {
        Error::Validation(msg) => msg,
        other => other.to_string(),
    }
}

/// Resolve a category label against the fixed set
pub fn coerce_category(value: Option<&Value>) -> Result<Category> {
    match value {
        Some(Value::String(label)) => Category::from_label(label)
            .ok_or_else(|| Error::Validation(format!("rejected category \"{}\"", label.trim()))),
        Some(Value::Null) | None => Err(Error::Validation("missing category".into())),
        Some(other) => Err(Error::Validation(format!("rejected category {}", other))),
    }
}

/// Coerce a confidence to an integer in 0..=100
///
/// Numbers are rounded and numeric strings are accepted.
pub fn coerce_confidence(value: Option<&Value>) -> Result<u8> {
    let number = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };

    match number.map(f64::round) {
        Some(n) if (0.0..=100.0).contains(&n) => Ok(n as u8),
        Some(n) => Err(Error::Validation(format!("confidence {} out of range", n))),
        None => Err(Error::Validation(format!(
            "unparsable confidence {}",
            value.map(Value::to_string).unwrap_or_else(|| "(missing)".into())
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str) -> Record {
        Record {
            id: id.to_string(),
            name: id.to_string(),
            item_type: crate::models::ItemType::Login,
            folder_name: String::new(),
            username: String::new(),
            domain: String::new(),
            notes: String::new(),
            fields: Vec::new(),
            favorite: false,
            reprompt: 0,
            login_uris: Vec::new(),
            password: String::new(),
            totp: String::new(),
        }
    }

    #[test]
    fn test_parse_wrapped_reply() {
        let reply = r#"Here you go:
```json
[{"id": "a", "category": "Tools/Development", "confidence": 95, "reason": "Code hosting"}]
```"#;
        let parsed = parse_batch_response(reply, &["a"]).unwrap();
        let c = &parsed["a"];
        assert_eq!(c.category, Category::ToolsDevelopment);
        assert_eq!(c.confidence, 95);
        assert_eq!(c.reason, "Code hosting");
        assert_eq!(c.source, ClassificationSource::Model);
    }

    #[test]
    fn test_unknown_category_remapped() {
        let reply = r#"[{"id": "a", "category": "Social/Facebook", "confidence": 80, "reason": "Social"}]"#;
        let c = &parse_batch_response(reply, &["a"]).unwrap()["a"];
        assert_eq!(c.category, Category::Uncategorized);
        assert_eq!(c.confidence, 0);
        assert!(c.reason.contains("Social/Facebook"));
    }

    #[test]
    fn test_model_cannot_produce_folder_labels() {
        let reply = r#"[{"id": "a", "category": "Google", "confidence": 99}]"#;
        let c = &parse_batch_response(reply, &["a"]).unwrap()["a"];
        assert_eq!(c.category, Category::Uncategorized);
    }

    #[test]
    fn test_confidence_coercion() {
        assert_eq!(coerce_confidence(Some(&json!(87.6))).unwrap(), 88);
        assert_eq!(coerce_confidence(Some(&json!("42"))).unwrap(), 42);
        assert_eq!(coerce_confidence(Some(&json!(" 90% "))).unwrap(), 90);
        assert_eq!(coerce_confidence(Some(&json!(100))).unwrap(), 100);
        assert!(coerce_confidence(Some(&json!(150))).is_err());
        assert!(coerce_confidence(Some(&json!(-1))).is_err());
        assert!(coerce_confidence(Some(&json!("high"))).is_err());
        assert!(coerce_confidence(None).is_err());
    }

    #[test]
    fn test_bad_confidence_is_flagged() {
        let reply = r#"[{"id": "a", "category": "Gaming", "confidence": 150, "reason": "Game store"}]"#;
        let c = &parse_batch_response(reply, &["a"]).unwrap()["a"];
        assert_eq!(c.category, Category::Gaming);
        assert_eq!(c.confidence, 0);
        assert!(c.reason.starts_with("Game store ("));
        assert!(c.reason.contains("out of range"));
    }

    #[test]
    fn test_unknown_and_duplicate_ids() {
        let reply = r#"[
            {"id": "a", "category": "Email", "confidence": 90, "reason": "first"},
            {"id": "a", "category": "Gaming", "confidence": 90, "reason": "second"},
            {"id": "zzz", "category": "Email", "confidence": 90},
            {"category": "Email"},
            "junk"
        ]"#;
        let parsed = parse_batch_response(reply, &["a", "b"]).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed["a"].reason, "first");
    }

    #[test]
    fn test_no_array_is_envelope_error() {
        let err = parse_batch_response("I cannot help with that.", &["a"]).unwrap_err();
        assert!(matches!(err, TransportError::Envelope(_)));

        let err = parse_batch_response("[not json]", &["a"]).unwrap_err();
        assert!(matches!(err, TransportError::Envelope(_)));
    }

    #[test]
    fn test_envelope_error_quotes_short_excerpt() {
        let reply = "é".repeat(1000);
        let TransportError::Envelope(message) = parse_batch_response(&reply, &["a"]).unwrap_err()
        else {
            panic!("expected envelope error");
        };
        let raw = message.split("raw: ").nth(1).unwrap();
        assert_eq!(raw.chars().count(), MAX_RAW_EXCERPT);
        assert!(raw.ends_with("..."));
    }

    #[test]
    fn test_resolve_batch_fills_missing() {
        let batch = vec![record("a"), record("b"), record("c")];
        let reply = r#"[{"id": "c", "category": "Travel", "confidence": 70, "reason": "Airline"},
                        {"id": "a", "category": "Email", "confidence": 90, "reason": "Mail"}]"#;
        let parsed = parse_batch_response(reply, &["a", "b", "c"]).unwrap();
        let resolved = resolve_batch(&batch, parsed);

        let ids: Vec<_> = resolved.iter().map(|c| c.item_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(resolved[1].is_fallback());
        assert_eq!(resolved[1].reason, NO_RESPONSE);
        assert_eq!(resolved[2].category, Category::Travel);
    }

    #[test]
    fn test_parsed_categories_always_in_fixed_set() {
        let labels = ["Tools/Development", "tools / design", "Nope", "", "Dead", "AI"];
        for label in labels {
            let reply = json!([{ "id": "x", "category": label, "confidence": 50 }]).to_string();
            let c = &parse_batch_response(&reply, &["x"]).unwrap()["x"];
            assert!(
                c.category.is_uncategorized() || Category::fixed().contains(&c.category),
                "{} gave {:?}",
                label,
                c.category
            );
        }
    }
}
