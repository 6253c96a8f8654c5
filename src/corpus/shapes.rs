//! Adapters for the corpus document shapes seen across corpus versions.
//!
//! Each shape is a pure `detect` + `adapt` pair. Adapters emit raw records in
//! document order; deduplication and empty-text filtering happen once in
//! [`super::normalize`], so new shapes only need a new entry in [`SHAPES`].

use serde_json::{Map, Value};

use crate::models::PositionRecord;

/// A recognized corpus layout.
pub struct CorpusShape {
    pub name: &'static str,
    pub detect: fn(&Value) -> bool,
    pub adapt: fn(&Value) -> Vec<PositionRecord>,
}

/// Tried in order; the first shape whose `detect` accepts the document wins.
pub const SHAPES: &[CorpusShape] = &[
    CorpusShape {
        name: "flat",
        detect: detect_flat,
        adapt: adapt_flat,
    },
    CorpusShape {
        name: "nested",
        detect: detect_nested,
        adapt: adapt_nested,
    },
];

const FLAT_ID_FIELDS: &[&str] = &["id", "position_id"];
const FLAT_TEXT_FIELDS: &[&str] = &[
    "text_evidence",
    "description",
    "thesis",
    "position",
    "content",
    "text",
];
const NESTED_TEXT_FIELDS: &[&str] = &["position", "thesis"];
const DETAILED_TEXT_FIELDS: &[&str] = &["content", "thesis"];

const UNKNOWN: &str = "Unknown";

// ─── Flat: {"positions": [ {...}, ... ]} ─────────────────

fn detect_flat(doc: &Value) -> bool {
    doc.get("positions").is_some_and(Value::is_array)
}

fn adapt_flat(doc: &Value) -> Vec<PositionRecord> {
    let Some(entries) = doc.get("positions").and_then(Value::as_array) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let id = first_non_empty(entry, FLAT_ID_FIELDS)?;
            Some(PositionRecord {
                id,
                text: first_non_empty(entry, FLAT_TEXT_FIELDS).unwrap_or_default(),
                domain: field_string(entry, "domain").unwrap_or_else(|| UNKNOWN.to_string()),
                title: field_string(entry, "title").unwrap_or_default(),
                sources: sources_of(entry),
            })
        })
        .collect()
}

// ─── Nested: {"integrated_core_positions": {domain: {id: {...}}}} ──

fn detect_nested(doc: &Value) -> bool {
    doc.get("integrated_core_positions")
        .is_some_and(Value::is_object)
}

fn adapt_nested(doc: &Value) -> Vec<PositionRecord> {
    let mut records = Vec::new();

    for (domain, id, entry) in nested_entries(doc.get("integrated_core_positions")) {
        records.push(PositionRecord {
            id: id.clone(),
            text: first_non_empty(entry, NESTED_TEXT_FIELDS).unwrap_or_default(),
            domain: domain.clone(),
            title: field_string(entry, "title").unwrap_or_default(),
            sources: sources_of(entry),
        });
    }

    // Older versions carry extra detail in a second mapping of the same shape.
    for (domain, id, entry) in nested_entries(doc.get("positions_detailed")) {
        let mut text = first_non_empty(entry, DETAILED_TEXT_FIELDS).unwrap_or_default();
        if let Some(context) = field_string(entry, "context") {
            text.push(' ');
            text.push_str(&context);
        }
        records.push(PositionRecord {
            id: id.clone(),
            text,
            domain: domain.clone(),
            title: field_string(entry, "title").unwrap_or_default(),
            sources: vec![field_string(entry, "work_id").unwrap_or_else(|| UNKNOWN.to_string())],
        });
    }

    records
}

/// Walk `domain -> id -> entry`, skipping domains whose value is not a mapping.
fn nested_entries(section: Option<&Value>) -> Vec<(&String, &String, &Value)> {
    let Some(domains) = section.and_then(Value::as_object) else {
        return Vec::new();
    };

    domains
        .iter()
        .filter_map(|(domain, positions)| positions.as_object().map(|p| (domain, p)))
        .flat_map(|(domain, positions): (&String, &Map<String, Value>)| {
            positions.iter().map(move |(id, entry)| (domain, id, entry))
        })
        .collect()
}

// ─── Field helpers ───────────────────────────────────────

/// String value of `key`; numbers are accepted and rendered. Empty strings count as absent.
fn field_string(entry: &Value, key: &str) -> Option<String> {
    let s = match entry.get(key)? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

fn first_non_empty(entry: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| field_string(entry, key))
}

/// `source` may be a single string or a list; anything else means unknown.
fn sources_of(entry: &Value) -> Vec<String> {
    let sources: Vec<String> = match entry.get("source") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    };

    if sources.is_empty() {
        vec![UNKNOWN.to_string()]
    } else {
        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_detects_positions_array_only() {
        assert!(detect_flat(&json!({"positions": []})));
        assert!(!detect_flat(&json!({"positions": {}})));
        assert!(!detect_flat(&json!({})));
    }

    #[test]
    fn test_flat_text_field_priority() {
        let doc = json!({"positions": [
            {"id": "A", "thesis": "from thesis", "text": "from text"},
            {"id": "B", "text_evidence": "", "description": "from description"},
        ]});
        let records = adapt_flat(&doc);
        assert_eq!(records[0].text, "from thesis");
        assert_eq!(records[1].text, "from description");
    }

    #[test]
    fn test_flat_legacy_id_field() {
        let doc = json!({"positions": [{"position_id": "EPI-1", "text": "x"}]});
        let records = adapt_flat(&doc);
        assert_eq!(records[0].id, "EPI-1");
        assert_eq!(records[0].domain, "Unknown");
        assert_eq!(records[0].sources, vec!["Unknown"]);
    }

    #[test]
    fn test_flat_skips_entries_without_id() {
        let doc = json!({"positions": [{"text": "orphan"}, {"id": "", "text": "also orphan"}]});
        assert!(adapt_flat(&doc).is_empty());
    }

    #[test]
    fn test_sources_string_or_list() {
        assert_eq!(sources_of(&json!({"source": "WORK-1"})), vec!["WORK-1"]);
        assert_eq!(
            sources_of(&json!({"source": ["WORK-1", "WORK-2"]})),
            vec!["WORK-1", "WORK-2"]
        );
        assert_eq!(sources_of(&json!({"source": []})), vec!["Unknown"]);
    }

    #[test]
    fn test_nested_uses_domain_keys() {
        let doc = json!({"integrated_core_positions": {
            "Ethics": {"ETH-1": {"position": "p", "title": "T"}},
            "Logic": {"LOG-1": {"thesis": "q"}},
        }});
        let records = adapt_nested(&doc);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].domain, "Ethics");
        assert_eq!(records[0].title, "T");
        assert_eq!(records[1].id, "LOG-1");
        assert_eq!(records[1].text, "q");
    }

    #[test]
    fn test_detailed_concatenates_context() {
        let doc = json!({
            "integrated_core_positions": {},
            "positions_detailed": {
                "Mind": {
                    "MIND-1": {"content": "primary", "context": "and context", "work_id": "W9"},
                    "MIND-2": {"content": "no context", "context": ""},
                },
                "Broken": "not a mapping",
            },
        });
        let records = adapt_nested(&doc);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text, "primary and context");
        assert_eq!(records[0].sources, vec!["W9"]);
        assert_eq!(records[1].text, "no context");
        assert_eq!(records[1].sources, vec!["Unknown"]);
    }
}
