use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An opaque delta document produced by [`diff`](crate::diff).
///
/// The wire shape follows the jsondiffpatch conventions: `[old, new]` for a
/// changed value, `[new]` for an addition, `[old, 0, 0]` for a removal,
/// nested objects for container deltas, and a `"_t": "a"` marker on array
/// deltas. Both sides of every change are recorded, which is what makes
/// [`unapply`](crate::unapply) possible.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Delta(Value);

impl Delta {
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for Delta {
    fn from(node: Value) -> Self {
        Delta(node)
    }
}
