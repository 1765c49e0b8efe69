//! Aggregate and function types.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::types::Typeref;

/// A fixed-length array type: element typeref plus element count.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ArrayType {
    pub elem: Typeref,
    pub len: u64,
}

/// A structure type: an ordered list of field typerefs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StructType {
    pub fields: Vec<Typeref>,
}

/// A function type, used when a call must be cast to a different signature
/// (e.g. the argument-doubled form of an indirect call target).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FuncType {
    pub params: Vec<Typeref>,
    /// `None` indicates a `void` return.
    pub ret: Option<Typeref>,
}
