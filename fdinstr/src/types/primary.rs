//! Primitive scalar types.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::EnumIs;

/// Integer type of an arbitrary bit width.
///
/// `i1` is the boolean type produced by comparison instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IType {
    pub bits: u16,
}

impl IType {
    pub const BOOL: IType = IType { bits: 1 };
    pub const I8: IType = IType { bits: 8 };
    pub const I16: IType = IType { bits: 16 };
    pub const I32: IType = IType { bits: 32 };
    pub const I64: IType = IType { bits: 64 };
}

impl std::fmt::Display for IType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "i{}", self.bits)
    }
}

/// Floating-point type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FpType {
    Fp32,
    Fp64,
}

impl std::fmt::Display for FpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FpType::Fp32 => write!(f, "f32"),
            FpType::Fp64 => write!(f, "f64"),
        }
    }
}

/// Non-composite types: integers, floats and opaque pointers.
///
/// Pointers are opaque; the pointed-to type is carried by the instruction
/// that dereferences the pointer (as in `MLoad::ty`), not by the pointer
/// type itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PrimaryType {
    Int(IType),
    Fp(FpType),
    Ptr,
}

impl From<IType> for PrimaryType {
    fn from(value: IType) -> Self {
        PrimaryType::Int(value)
    }
}

impl From<FpType> for PrimaryType {
    fn from(value: FpType) -> Self {
        PrimaryType::Fp(value)
    }
}

impl std::fmt::Display for PrimaryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrimaryType::Int(ity) => ity.fmt(f),
            PrimaryType::Fp(fty) => fty.fmt(f),
            PrimaryType::Ptr => write!(f, "ptr"),
        }
    }
}
