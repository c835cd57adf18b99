use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeltaError {
    #[error("index {index} is out of range for an array of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("key \"{key}\" is not present in the document")]
    MissingKey { key: String },

    #[error("delta expects {expected} but the document holds {found}")]
    ShapeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("array delta is missing its \"_t\" marker")]
    MissingArrayMarker,

    #[error("malformed delta node: {0}")]
    Malformed(String),
}

impl DeltaError {
    pub fn is_index_out_of_range(&self) -> bool {
        matches!(self, DeltaError::IndexOutOfRange { .. })
    }
}
