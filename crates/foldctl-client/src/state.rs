//! State synchronizer.
//!
//! Folds the inbound message stream into one authoritative snapshot of the
//! remote client's reported state. Object messages replace the snapshot
//! wholesale; patch arrays mutate it incrementally. The snapshot is owned
//! exclusively by this type and only ever touched from run-loop callbacks,
//! so readers never observe a partially-applied patch.

use foldctl_protocol::{Inbound, Patch, Segment};
use serde_json::{Map, Value};

/// Top-level snapshot keys patches may target. Patches naming any other
/// category are ignored; in particular, `log` arrays are a stream rather
/// than state and are consumed by the log flow instead.
const PATCH_CATEGORIES: &[&str] = &["units", "info", "config"];

/// The folded remote state.
#[derive(Debug, Default)]
pub struct ClientState {
    snapshot: Map<String, Value>,
}

impl ClientState {
    /// Creates an empty synchronizer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and folds one raw text frame.
    ///
    /// Frames that are not valid JSON, and JSON of shapes this component
    /// does not consume, are dropped silently: the protocol interleaves
    /// messages meant for other consumers.
    pub fn absorb_text(&mut self, text: &str) {
        if let Some(inbound) = Inbound::classify(text) {
            self.absorb(inbound);
        }
    }

    /// Folds one classified message.
    pub fn absorb(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Snapshot(map) => self.snapshot = map,
            Inbound::Patch(patch) => {
                if PATCH_CATEGORIES.contains(&patch.category.as_str()) {
                    self.apply_patch(patch);
                }
            }
            Inbound::Other(_) => {}
        }
    }

    /// Projects a value out of the snapshot by dotted key path.
    ///
    /// Integer-looking segments index arrays. Returns `None` rather than
    /// panicking when any intermediate step is missing or of the wrong kind.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.snapshot.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Whether the remote has reported its info block yet.
    #[must_use]
    pub fn has_info(&self) -> bool {
        self.get("info").is_some()
    }

    /// Maximum CPU count reported by the remote, when known.
    #[must_use]
    pub fn max_cpus(&self) -> Option<u64> {
        self.get("info.cpus").and_then(Value::as_u64)
    }

    /// Read access to the whole snapshot.
    #[must_use]
    pub const fn snapshot(&self) -> &Map<String, Value> {
        &self.snapshot
    }

    fn apply_patch(&mut self, patch: Patch) {
        let Patch {
            category,
            path,
            value,
        } = patch;

        let Some((last, intermediate)) = path.split_last() else {
            if value.is_null() {
                self.snapshot.remove(&category);
            } else {
                self.snapshot.insert(category, value);
            }
            return;
        };

        // Deleting below a category that was never reported is a no-op
        // rather than a reason to materialise empty containers.
        if value.is_null() && !self.snapshot.contains_key(&category) {
            return;
        }

        let mut cursor = self.snapshot.entry(category).or_insert(Value::Null);
        for segment in intermediate {
            cursor = child(cursor, segment);
        }
        if value.is_null() {
            remove_child(cursor, last);
        } else {
            set_child(cursor, last, value);
        }
    }
}

/// Descends one segment, creating or coercing the container as needed.
fn child<'a>(container: &'a mut Value, segment: &Segment) -> &'a mut Value {
    match segment {
        Segment::Key(key) => {
            if !container.is_object() {
                *container = Value::Object(Map::new());
            }
            match container {
                Value::Object(map) => map.entry(key.clone()).or_insert(Value::Null),
                _ => unreachable!("container was just coerced to an object"),
            }
        }
        Segment::Index(index) => {
            if !container.is_array() {
                *container = Value::Array(Vec::new());
            }
            match container {
                Value::Array(items) => {
                    if items.len() <= *index {
                        items.resize(index + 1, Value::Null);
                    }
                    &mut items[*index]
                }
                _ => unreachable!("container was just coerced to an array"),
            }
        }
    }
}

fn set_child(container: &mut Value, segment: &Segment, value: Value) {
    match segment {
        Segment::Key(key) => {
            if !container.is_object() {
                *container = Value::Object(Map::new());
            }
            if let Value::Object(map) = container {
                map.insert(key.clone(), value);
            }
        }
        Segment::Index(index) => {
            if !container.is_array() {
                *container = Value::Array(Vec::new());
            }
            if let Value::Array(items) = container {
                if items.len() <= *index {
                    items.resize(index + 1, Value::Null);
                }
                items[*index] = value;
            }
        }
    }
}

fn remove_child(container: &mut Value, segment: &Segment) {
    match (container, segment) {
        (Value::Object(map), Segment::Key(key)) => {
            map.remove(key);
        }
        (Value::Array(items), Segment::Index(index)) if *index < items.len() => {
            items.remove(*index);
        }
        _ => {}
    }
}
