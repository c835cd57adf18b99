use serde_json::{json, Map, Value};

use crate::Delta;

/// Computes the structural difference between two JSON values.
///
/// Returns `None` when the values are equal. The resulting delta satisfies
/// `apply(left, delta) == right` and `unapply(right, delta) == left`.
pub fn diff(left: &Value, right: &Value) -> Option<Delta> {
    diff_node(left, right).map(Delta::from)
}

fn diff_node(left: &Value, right: &Value) -> Option<Value> {
    if left == right {
        return None;
    }

    match (left, right) {
        (Value::Object(l), Value::Object(r)) => {
            let mut entries = Map::new();
            for (key, left_value) in l {
                match r.get(key) {
                    Some(right_value) => {
                        if let Some(child) = diff_node(left_value, right_value) {
                            entries.insert(key.clone(), child);
                        }
                    }
                    None => {
                        entries.insert(key.clone(), json!([left_value, 0, 0]));
                    }
                }
            }
            for (key, right_value) in r {
                if !l.contains_key(key) {
                    entries.insert(key.clone(), json!([right_value]));
                }
            }
            Some(Value::Object(entries))
        }
        (Value::Array(l), Value::Array(r)) => {
            // Positional comparison: shared indices are diffed in place, the
            // longer side's tail becomes additions or removals. Removal keys
            // refer to indices in the left array, addition keys to indices in
            // the right one.
            let mut entries = Map::new();
            entries.insert("_t".to_string(), Value::String("a".to_string()));
            let shared = l.len().min(r.len());
            for index in 0..shared {
                if let Some(child) = diff_node(&l[index], &r[index]) {
                    entries.insert(index.to_string(), child);
                }
            }
            for (index, added) in r.iter().enumerate().skip(shared) {
                entries.insert(index.to_string(), json!([added]));
            }
            for (index, removed) in l.iter().enumerate().skip(shared) {
                entries.insert(format!("_{}", index), json!([removed, 0, 0]));
            }
            Some(Value::Object(entries))
        }
        _ => Some(json!([left, right])),
    }
}
