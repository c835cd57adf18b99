//! Temporal history of JSON-serializable entities as gapless chains of
//! half-open time slices, each slice storing only the structural difference
//! to the state before it.

pub mod chain;
pub mod error;
pub mod product;
pub mod skip;
pub mod slice;

pub use chain::{
    Chain, DeserializeFn, FuturePolicy, PopulateFn, PopulateOutcome, Reconstruction, SerializeFn,
};
pub use error::{ChainError, ChainResult, PatchingFailure};
pub use product::{joint_timeline, ChainProduct, JointEntry, ProductEntry};
pub use skip::{skip_when_list_unmatched, SkipCondition, SkipProbe};
pub use slice::{default_grace, far_future, far_past, Direction, Slice};
