//! Types module
//!
//! Canonical representation of the types used by the `fdinstr` crate, built
//! on three layers:
//!
//! - Primary types: integers, floats and opaque pointers (see `primary.rs`).
//! - Aggregate types: arrays, structures and function types (see
//!   `aggregate.rs`).
//! - A registry-backed [`AnyType`] wrapper and [`TypeRegistry`] which
//!   deduplicates types and provides stable [`Typeref`] identifiers.
use std::{
    collections::BTreeMap,
    hash::{DefaultHasher, Hash, Hasher},
};

use log::debug;
use parking_lot::RwLock;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use uuid::Uuid;

use crate::types::{
    aggregate::{ArrayType, FuncType, StructType},
    primary::{FpType, IType, PrimaryType},
};
pub mod aggregate;
pub mod primary;

/// A stable reference to a type stored inside a [`TypeRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Typeref(Uuid);

/// A sum-type representing any type that can be stored in the registry.
///
/// [`AnyType`] implements `Hash`/`Eq` so it can be deduplicated by the
/// [`TypeRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AnyType {
    /// Primary (non-composite) types.
    Primary(PrimaryType),

    /// An array type: element typeref + element count, known at compile time.
    Array(ArrayType),

    /// A structure type: an ordered list of field typerefs.
    Struct(StructType),

    /// A function signature type.
    Func(FuncType),
}

impl<S: Into<PrimaryType>> From<S> for AnyType {
    fn from(value: S) -> Self {
        AnyType::Primary(value.into())
    }
}

impl From<ArrayType> for AnyType {
    fn from(value: ArrayType) -> Self {
        AnyType::Array(value)
    }
}

impl From<StructType> for AnyType {
    fn from(value: StructType) -> Self {
        AnyType::Struct(value)
    }
}

impl From<FuncType> for AnyType {
    fn from(value: FuncType) -> Self {
        AnyType::Func(value)
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    types: BTreeMap<Uuid, AnyType>,
    /// Inverse lookup keyed by the type hash. Collisions are resolved by
    /// scanning the (normally singleton) bucket.
    inverse: BTreeMap<u64, SmallVec<Typeref, 2>>,
}

/// Interning registry mapping [`AnyType`] values to stable [`Typeref`]s.
///
/// Interning the same type twice yields the same reference, so typerefs can
/// be compared for equality without resolving them.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    inner: RwLock<RegistryInner>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    /// Intern a type, returning the existing reference when the type has
    /// been seen before.
    pub fn intern(&self, ty: impl Into<AnyType>) -> Typeref {
        let ty = ty.into();
        let mut hasher = DefaultHasher::new();
        ty.hash(&mut hasher);
        let h = hasher.finish();

        let mut inner = self.inner.write();
        if let Some(bucket) = inner.inverse.get(&h) {
            for candidate in bucket {
                if inner.types.get(&candidate.0) == Some(&ty) {
                    return *candidate;
                }
            }
        }

        let new_typeref = Typeref(Uuid::new_v4());
        debug!("registering type {:?} as {:?}", ty, new_typeref);
        inner.types.insert(new_typeref.0, ty);
        match inner.inverse.get_mut(&h) {
            Some(bucket) => bucket.push(new_typeref),
            None => {
                inner.inverse.insert(h, smallvec![new_typeref]);
            }
        }
        new_typeref
    }

    /// Resolve a typeref back to its type. `None` for references issued by a
    /// different registry.
    pub fn get(&self, ty: Typeref) -> Option<AnyType> {
        self.inner.read().types.get(&ty.0).cloned()
    }

    pub fn int(&self, bits: u16) -> Typeref {
        self.intern(IType { bits })
    }

    pub fn boolean(&self) -> Typeref {
        self.intern(IType::BOOL)
    }

    pub fn float(&self, fty: FpType) -> Typeref {
        self.intern(fty)
    }

    pub fn ptr(&self) -> Typeref {
        self.intern(PrimaryType::Ptr)
    }

    pub fn is_pointer(&self, ty: Typeref) -> bool {
        matches!(self.get(ty), Some(AnyType::Primary(PrimaryType::Ptr)))
    }

    pub fn is_float(&self, ty: Typeref) -> bool {
        matches!(self.get(ty), Some(AnyType::Primary(PrimaryType::Fp(_))))
    }

    pub fn is_aggregate(&self, ty: Typeref) -> bool {
        matches!(self.get(ty), Some(AnyType::Array(_) | AnyType::Struct(_)))
    }

    pub fn as_array(&self, ty: Typeref) -> Option<ArrayType> {
        match self.get(ty) {
            Some(AnyType::Array(array)) => Some(array),
            _ => None,
        }
    }
}
