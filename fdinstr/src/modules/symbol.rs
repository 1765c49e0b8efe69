//! External symbols referenced but not defined by the module.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Typeref;

/// A function defined outside the current module.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExternalFunction {
    /// Used internally to reference the function within the module.
    pub uuid: Uuid,

    /// The name of the function as it appears in the linking context.
    pub name: String,

    pub param_types: Vec<Typeref>,

    /// `None` indicates a `void` return type.
    pub return_type: Option<Typeref>,
}
