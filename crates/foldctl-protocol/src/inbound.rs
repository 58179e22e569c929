//! Inbound message classification.
//!
//! The protocol is not self-describing: the receiver decides what a message
//! means from its JSON shape alone. Objects carry a complete state snapshot;
//! arrays of the form `[category, ...path, value]` carry one incremental
//! patch; anything else is noise this client is free to ignore.

use serde_json::{Map, Value};

/// First element of the array messages that carry streamed log lines.
pub const LOG_CATEGORY: &str = "log";

/// Position of the line payload inside a `["log", ..]` array.
const LOG_LINE_INDEX: usize = 2;

/// One step of a patch path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Named field of an object.
    Key(String),
    /// Position inside an array.
    Index(usize),
}

/// An incremental mutation to the state snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    /// Top-level snapshot key the patch targets.
    pub category: String,
    /// Path below the category; may be empty.
    pub path: Vec<Segment>,
    /// New value, or `Null` to delete the final segment.
    pub value: Value,
}

/// A classified inbound text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Full replacement of the state snapshot.
    Snapshot(Map<String, Value>),
    /// One incremental patch.
    Patch(Patch),
    /// Valid JSON of a shape this client does not fold into state.
    Other(Value),
}

impl Inbound {
    /// Classifies a raw text frame.
    ///
    /// Returns `None` when the payload is not valid JSON; the caller is
    /// expected to drop such frames silently, as unparseable inbound text is
    /// steady-state behaviour for this protocol rather than an error.
    #[must_use]
    pub fn classify(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        Some(Self::from_value(value))
    }

    /// Classifies an already-parsed JSON value.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Snapshot(map),
            Value::Array(items) => classify_array(items),
            other => Self::Other(other),
        }
    }
}

fn classify_array(items: Vec<Value>) -> Inbound {
    if items.len() < 2 {
        return Inbound::Other(Value::Array(items));
    }
    let Some(category) = items.first().and_then(Value::as_str).map(str::to_owned) else {
        return Inbound::Other(Value::Array(items));
    };

    let mut path = Vec::with_capacity(items.len().saturating_sub(2));
    for position in 1..items.len() - 1 {
        match segment_from(&items[position]) {
            Some(segment) => path.push(segment),
            // Negative indices and other exotic segments are shapes this
            // client does not consume.
            None => return Inbound::Other(Value::Array(items)),
        }
    }

    let value = items.last().cloned().unwrap_or(Value::Null);
    Inbound::Patch(Patch {
        category,
        path,
        value,
    })
}

fn segment_from(value: &Value) -> Option<Segment> {
    match value {
        Value::String(key) => Some(Segment::Key(key.clone())),
        Value::Number(number) => number
            .as_u64()
            .and_then(|index| usize::try_from(index).ok())
            .map(Segment::Index),
        _ => None,
    }
}

/// Extracts the streamed line from a `["log", ..]` array, if present.
#[must_use]
pub fn log_line(value: &Value) -> Option<&str> {
    let items = value.as_array()?;
    if items.first().and_then(Value::as_str) != Some(LOG_CATEGORY) {
        return None;
    }
    items.get(LOG_LINE_INDEX).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[test]
    fn object_classifies_as_snapshot() {
        let inbound = Inbound::classify(r#"{"info":{"cpus":8}}"#).expect("valid json");
        let Inbound::Snapshot(map) = inbound else {
            panic!("expected snapshot, got {inbound:?}");
        };
        assert!(map.contains_key("info"));
    }

    #[test]
    fn patch_array_classifies_with_mixed_segments() {
        let inbound = Inbound::classify(r#"["units", 0, "state", "DONE"]"#).expect("valid json");
        let Inbound::Patch(patch) = inbound else {
            panic!("expected patch, got {inbound:?}");
        };
        assert_eq!(patch.category, "units");
        assert_eq!(
            patch.path,
            vec![Segment::Index(0), Segment::Key("state".to_owned())]
        );
        assert_eq!(patch.value, json!("DONE"));
    }

    #[test]
    fn two_element_array_is_a_bare_category_patch() {
        let inbound = Inbound::classify(r#"["info", {"cpus": 4}]"#).expect("valid json");
        let Inbound::Patch(patch) = inbound else {
            panic!("expected patch, got {inbound:?}");
        };
        assert_eq!(patch.category, "info");
        assert!(patch.path.is_empty());
        assert_eq!(patch.value, json!({"cpus": 4}));
    }

    #[rstest]
    #[case::scalar("42")]
    #[case::string(r#""hello""#)]
    #[case::short_array(r#"["units"]"#)]
    #[case::non_string_category("[0, 1, 2]")]
    #[case::negative_index(r#"["log", -1, "line"]"#)]
    fn unconsumed_shapes_classify_as_other(#[case] text: &str) {
        let inbound = Inbound::classify(text).expect("valid json");
        assert!(matches!(inbound, Inbound::Other(_)), "got {inbound:?}");
    }

    #[test]
    fn invalid_json_classifies_as_none() {
        assert!(Inbound::classify("not json").is_none());
    }

    #[test]
    fn log_line_reads_fixed_index() {
        let value = json!(["log", -1, "12:00:00 work unit started"]);
        assert_eq!(log_line(&value), Some("12:00:00 work unit started"));
    }

    #[rstest]
    #[case::wrong_category(json!(["units", 0, "text"]))]
    #[case::missing_payload(json!(["log", -1]))]
    #[case::not_an_array(json!({"log": true}))]
    fn log_line_absent_for_other_shapes(#[case] value: serde_json::Value) {
        assert_eq!(log_line(&value), None);
    }
}
