//! Invertible structural diffing for `serde_json` values.
//!
//! `diff` produces a delta document that records both sides of every change,
//! so a delta can be walked forward with `apply` or backward with `unapply`.

mod delta;
mod diff;
mod error;
mod patch;

pub use delta::Delta;
pub use diff::diff;
pub use error::DeltaError;
pub use patch::{apply, unapply};
