//! The edit primitive seam.
//!
//! The tracker and the sync client only ever talk to documents and steps
//! through these two traits. [`crate::text`] provides the plain-text
//! implementation used by the client binary and the tests.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use thiserror::Error;

use crate::mapping::{Mappable, StepMap};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StepError {
    #[error("invalid range: start {from} is after end {to}")]
    InvalidRange { from: usize, to: usize },

    #[error("range {from}..{to} is out of bounds for document size {size}")]
    OutOfBounds { from: usize, to: usize, size: usize },
}

pub type Result<T> = std::result::Result<T, StepError>;

/// A document the steps operate on. Immutable: steps produce new values.
pub trait Document:
    Clone + Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Size of the document in position units.
    fn size(&self) -> usize;
}

/// An atomic, invertible edit.
///
/// Applying a step never mutates the input document, so a failed
/// application leaves the caller's document untouched.
pub trait Step: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {
    type Doc: Document;

    fn apply(&self, doc: &Self::Doc) -> Result<Self::Doc>;

    /// The step that undoes this one. `doc` is the document this step was
    /// applied to.
    fn invert(&self, doc: &Self::Doc) -> Self;

    /// The position map this step produces.
    fn get_map(&self) -> StepMap;

    /// This step carried through `mapping`, or `None` when the content it
    /// targets no longer exists.
    fn map(&self, mapping: &dyn Mappable) -> Option<Self>;
}
