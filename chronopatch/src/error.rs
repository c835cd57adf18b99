use chrono::{DateTime, Utc};
use json_delta::{Delta, DeltaError};
use serde_json::Value;
use thiserror::Error;

use crate::slice::Direction;

pub type ChainResult<T> = Result<T, ChainError>;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("an entry already starts at {moment}")]
    DuplicateKeyDate { moment: DateTime<Utc> },

    #[error(
        "inserting at {moment} lands before the entry starting at {next_start}; \
         pass KeepFuture or OverwriteFuture to say what happens to the later entries"
    )]
    MissingFuturePolicy {
        moment: DateTime<Utc>,
        next_start: DateTime<Utc>,
    },

    #[error("the slice from {from} to {to} runs {slice} but the chain runs {chain}")]
    InconsistentChain {
        chain: Direction,
        slice: Direction,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    #[error("slices have ambiguous boundaries: {detail}")]
    AmbiguousBoundaries { detail: String },

    #[error(transparent)]
    PatchingFailure(Box<PatchingFailure>),

    #[error("cannot add to a {direction} chain; reverse it first and add to the result")]
    UnsupportedOperation { direction: Direction },

    #[error("populate is not configured for this chain")]
    PopulateNotConfigured,

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Forensic record of a patch that could not be applied: enough state to
/// replay the failure by hand against the diff engine.
#[derive(Debug, Error)]
#[error("the patch of slice {index} could not be applied")]
pub struct PatchingFailure {
    /// The initial entity as the chain serialized it.
    pub initial: String,
    /// The document state the chain had built up before the failing slice.
    pub intermediate: Value,
    /// The delta that did not apply.
    pub patch: Delta,
    /// Index of the failing slice in ascending start order.
    pub index: usize,
    #[source]
    pub cause: DeltaError,
}

impl From<Box<PatchingFailure>> for ChainError {
    fn from(failure: Box<PatchingFailure>) -> Self {
        ChainError::PatchingFailure(failure)
    }
}
