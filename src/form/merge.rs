//! Partial-update merge engine.
//!
//! Independent producers (agent turns, wizard syncs, webhooks) only ever know
//! a subset of the form, so merging must be field-additive by default:
//! wholesale replacement would erase concurrently collected answers. Updates
//! arrive either as dotted paths (`"szczegoly.data"`) or as bare top-level
//! keys carrying nested objects/lists.
//!
//! The merge runs on `serde_json::Value` and re-enters the typed schema at
//! the end; a result that no longer deserializes rejects the whole update
//! atomically.

use serde_json::{Map, Value};

use crate::error::{FormsyncError, Result};
use crate::form::schema::{AccidentReportForm, Witness};

/// Apply a set of partial updates to a document, producing a new document.
///
/// Rules, in order:
/// 1. Dotted paths walk the existing structure; a list segment must parse as
///    an in-range index or the whole path update is silently dropped.
/// 2. A bare key whose existing and incoming values are both objects is
///    deep-merged field by field, preserving untouched siblings.
/// 3. The witness list (`swiadkowie`) merges positionally when both sides
///    are lists: gaps are back-filled with default witnesses.
/// 4. Anything else replaces the existing value wholesale.
///
/// The merged structure must still deserialize as [`AccidentReportForm`];
/// unknown fields are dropped by that gate rather than rejected.
pub fn apply_updates(
    current: &AccidentReportForm,
    updates: &Map<String, Value>,
) -> Result<AccidentReportForm> {
    let mut doc = serde_json::to_value(current)
        .map_err(|e| FormsyncError::Internal(format!("document serialization failed: {}", e)))?;

    for (path, value) in updates {
        if path.contains('.') {
            apply_dotted_path(&mut doc, path, value.clone());
            continue;
        }

        let root = doc
            .as_object_mut()
            .ok_or_else(|| FormsyncError::Internal("document root is not an object".into()))?;

        match (root.get(path.as_str()), value) {
            (Some(Value::Array(existing)), Value::Array(incoming)) if path == "swiadkowie" => {
                let merged = merge_witness_list(existing, incoming);
                root.insert(path.clone(), Value::Array(merged));
            }
            (Some(Value::Object(_)), Value::Object(incoming)) => {
                if let Some(Value::Object(existing)) = root.get_mut(path.as_str()) {
                    deep_merge(existing, incoming);
                }
            }
            _ => {
                root.insert(path.clone(), value.clone());
            }
        }
    }

    serde_json::from_value(doc).map_err(|e| FormsyncError::Validation {
        message: format!("merged document failed schema validation: {}", e),
        field_errors: Default::default(),
    })
}

/// Walk a dotted path and set the final segment. Any unresolvable segment
/// (unknown key, non-numeric or out-of-range list index) drops the update
/// silently without touching the document.
fn apply_dotted_path(doc: &mut Value, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = doc;

    for segment in &segments[..segments.len() - 1] {
        current = match current {
            Value::Array(items) => {
                let Some(idx) = parse_index(segment, items.len()) else {
                    return;
                };
                &mut items[idx]
            }
            Value::Object(map) => {
                let Some(next) = map.get_mut(*segment) else {
                    return;
                };
                next
            }
            _ => return,
        };
    }

    let last = segments[segments.len() - 1];
    match current {
        Value::Array(items) => {
            if let Some(idx) = parse_index(last, items.len()) {
                items[idx] = value;
            }
        }
        Value::Object(map) => {
            // Unknown final keys are set here and shed later by the schema gate.
            map.insert(last.to_string(), value);
        }
        _ => {}
    }
}

fn parse_index(segment: &str, len: usize) -> Option<usize> {
    let idx: usize = segment.parse().ok()?;
    (idx < len).then_some(idx)
}

/// Recursively merge `source` into `target`: shared object fields recurse,
/// everything else is replaced per leaf.
fn deep_merge(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, incoming) in source {
        match (target.get_mut(key), incoming) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), incoming.clone());
            }
        }
    }
}

/// Positionally merge a list of partial witness objects into the existing
/// list. Index i merges into existing index i; a new index is created from
/// full defaults plus the supplied fields, and any gap below it is
/// back-filled with default witnesses so no index is skipped.
fn merge_witness_list(existing: &[Value], incoming: &[Value]) -> Vec<Value> {
    let mut result = existing.to_vec();

    for (idx, partial) in incoming.iter().enumerate() {
        let Value::Object(partial) = partial else {
            continue;
        };

        if idx < result.len() && result[idx].is_object() {
            if let Value::Object(entry) = &mut result[idx] {
                deep_merge(entry, partial);
            }
        } else {
            let mut fresh = default_witness_value();
            deep_merge(&mut fresh, partial);
            while result.len() < idx {
                result.push(Value::Object(default_witness_value()));
            }
            if idx < result.len() {
                result[idx] = Value::Object(fresh);
            } else {
                result.push(Value::Object(fresh));
            }
        }
    }

    result
}

fn default_witness_value() -> Map<String, Value> {
    match serde_json::to_value(Witness::with_default_fields()) {
        Ok(Value::Object(map)) => map,
        // Witness serialization is infallible in practice.
        _ => Map::new(),
    }
}
