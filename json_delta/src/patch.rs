use itertools::Itertools;
use serde_json::{Map, Value};

use crate::{Delta, DeltaError};

/// Applies a delta to a document, producing the right-hand side of the diff.
pub fn apply(doc: &Value, delta: &Delta) -> Result<Value, DeltaError> {
    apply_node(doc, delta.as_value())
}

/// Walks a delta backwards, recovering the left-hand side of the diff.
pub fn unapply(doc: &Value, delta: &Delta) -> Result<Value, DeltaError> {
    unapply_node(doc, delta.as_value())
}

// Leaf nodes are discriminated by array length: [new] is an addition,
// [old, new] a change, [old, 0, 0] a removal. Object nodes descend into the
// document.
enum Leaf<'a> {
    Added(&'a Value),
    Changed(&'a Value, &'a Value),
    Removed(&'a Value),
}

fn leaf(node: &Value) -> Result<Option<Leaf<'_>>, DeltaError> {
    match node {
        Value::Array(parts) => match parts.len() {
            1 => Ok(Some(Leaf::Added(&parts[0]))),
            2 => Ok(Some(Leaf::Changed(&parts[0], &parts[1]))),
            3 if parts[1] == 0 && parts[2] == 0 => Ok(Some(Leaf::Removed(&parts[0]))),
            len => Err(DeltaError::Malformed(format!(
                "array node of length {} is not a recognized leaf",
                len
            ))),
        },
        Value::Object(_) => Ok(None),
        other => Err(DeltaError::Malformed(format!(
            "{} is not a valid delta node",
            kind(other)
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn apply_node(doc: &Value, node: &Value) -> Result<Value, DeltaError> {
    match leaf(node)? {
        Some(Leaf::Changed(_, new)) => Ok(new.clone()),
        Some(_) => Err(DeltaError::Malformed(
            "additions and removals are only valid inside a container delta".to_string(),
        )),
        None => {
            let entries = node.as_object().expect("non-leaf nodes are objects");
            match doc {
                Value::Array(items) => apply_array(items, entries),
                Value::Object(fields) => apply_object(fields, entries),
                other => Err(DeltaError::ShapeMismatch {
                    expected: "an object or an array",
                    found: kind(other),
                }),
            }
        }
    }
}

fn unapply_node(doc: &Value, node: &Value) -> Result<Value, DeltaError> {
    match leaf(node)? {
        Some(Leaf::Changed(old, _)) => Ok(old.clone()),
        Some(_) => Err(DeltaError::Malformed(
            "additions and removals are only valid inside a container delta".to_string(),
        )),
        None => {
            let entries = node.as_object().expect("non-leaf nodes are objects");
            match doc {
                Value::Array(items) => unapply_array(items, entries),
                Value::Object(fields) => unapply_object(fields, entries),
                other => Err(DeltaError::ShapeMismatch {
                    expected: "an object or an array",
                    found: kind(other),
                }),
            }
        }
    }
}

fn apply_object(
    fields: &Map<String, Value>,
    entries: &Map<String, Value>,
) -> Result<Value, DeltaError> {
    let mut out = fields.clone();
    for (key, child) in entries {
        match leaf(child)? {
            Some(Leaf::Added(new)) | Some(Leaf::Changed(_, new)) => {
                out.insert(key.clone(), new.clone());
            }
            Some(Leaf::Removed(_)) => {
                out.remove(key);
            }
            None => {
                let current = out
                    .get(key)
                    .ok_or_else(|| DeltaError::MissingKey { key: key.clone() })?;
                let patched = apply_node(current, child)?;
                out.insert(key.clone(), patched);
            }
        }
    }
    Ok(Value::Object(out))
}

fn unapply_object(
    fields: &Map<String, Value>,
    entries: &Map<String, Value>,
) -> Result<Value, DeltaError> {
    let mut out = fields.clone();
    for (key, child) in entries {
        match leaf(child)? {
            Some(Leaf::Added(_)) => {
                out.remove(key);
            }
            Some(Leaf::Changed(old, _)) | Some(Leaf::Removed(old)) => {
                out.insert(key.clone(), old.clone());
            }
            None => {
                let current = out
                    .get(key)
                    .ok_or_else(|| DeltaError::MissingKey { key: key.clone() })?;
                let unpatched = unapply_node(current, child)?;
                out.insert(key.clone(), unpatched);
            }
        }
    }
    Ok(Value::Object(out))
}

// An array delta sorted into its three kinds of operations. Removal indices
// refer to the pre-image, addition and change indices to the post-image.
struct ArrayOps<'a> {
    removals: Vec<(usize, &'a Value)>,
    additions: Vec<(usize, &'a Value)>,
    changes: Vec<(usize, &'a Value)>,
}

fn array_ops<'a>(entries: &'a Map<String, Value>) -> Result<ArrayOps<'a>, DeltaError> {
    if entries.get("_t").and_then(Value::as_str) != Some("a") {
        return Err(DeltaError::MissingArrayMarker);
    }

    let mut ops = ArrayOps {
        removals: Vec::new(),
        additions: Vec::new(),
        changes: Vec::new(),
    };
    for (key, child) in entries {
        if key == "_t" {
            continue;
        }
        if let Some(rest) = key.strip_prefix('_') {
            let index = parse_index(rest)?;
            match leaf(child)? {
                Some(Leaf::Removed(old)) => ops.removals.push((index, old)),
                _ => {
                    return Err(DeltaError::Malformed(format!(
                        "underscore key \"_{}\" must hold a removal",
                        rest
                    )))
                }
            }
        } else {
            let index = parse_index(key)?;
            match leaf(child)? {
                Some(Leaf::Added(new)) => ops.additions.push((index, new)),
                Some(Leaf::Changed(..)) | None => ops.changes.push((index, child)),
                Some(Leaf::Removed(_)) => {
                    return Err(DeltaError::Malformed(format!(
                        "removal at key \"{}\" is missing its underscore prefix",
                        key
                    )))
                }
            }
        }
    }
    Ok(ops)
}

fn parse_index(text: &str) -> Result<usize, DeltaError> {
    text.parse()
        .map_err(|_| DeltaError::Malformed(format!("\"{}\" is not an array index", text)))
}

fn apply_array(items: &[Value], entries: &Map<String, Value>) -> Result<Value, DeltaError> {
    let ops = array_ops(entries)?;
    let mut out = items.to_vec();

    // Removals run on pre-image indices, highest first, so that each removal
    // leaves the lower indices untouched.
    for (index, _) in ops.removals.iter().sorted_by_key(|(index, _)| *index).rev() {
        if *index >= out.len() {
            return Err(DeltaError::IndexOutOfRange {
                index: *index,
                len: out.len(),
            });
        }
        out.remove(*index);
    }
    for (index, new) in ops.additions.iter().sorted_by_key(|(index, _)| *index) {
        if *index > out.len() {
            return Err(DeltaError::IndexOutOfRange {
                index: *index,
                len: out.len(),
            });
        }
        out.insert(*index, (*new).clone());
    }
    for (index, node) in &ops.changes {
        if *index >= out.len() {
            return Err(DeltaError::IndexOutOfRange {
                index: *index,
                len: out.len(),
            });
        }
        out[*index] = apply_node(&out[*index], node)?;
    }
    Ok(Value::Array(out))
}

fn unapply_array(items: &[Value], entries: &Map<String, Value>) -> Result<Value, DeltaError> {
    let ops = array_ops(entries)?;
    let mut out = items.to_vec();

    // Exact inverse of apply_array, so the operations run in reverse order:
    // changes are undone in place, additions come back out (highest first),
    // removals are reinserted at their pre-image indices.
    for (index, node) in &ops.changes {
        if *index >= out.len() {
            return Err(DeltaError::IndexOutOfRange {
                index: *index,
                len: out.len(),
            });
        }
        out[*index] = unapply_node(&out[*index], node)?;
    }
    for (index, _) in ops.additions.iter().sorted_by_key(|(index, _)| *index).rev() {
        if *index >= out.len() {
            return Err(DeltaError::IndexOutOfRange {
                index: *index,
                len: out.len(),
            });
        }
        out.remove(*index);
    }
    for (index, old) in ops.removals.iter().sorted_by_key(|(index, _)| *index) {
        if *index > out.len() {
            return Err(DeltaError::IndexOutOfRange {
                index: *index,
                len: out.len(),
            });
        }
        out.insert(*index, (*old).clone());
    }
    Ok(Value::Array(out))
}
