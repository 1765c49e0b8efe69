//! Floating-point arithmetic and comparison instructions.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    modules::{
        Instruction,
        instructions::InstructionFlags,
        operand::{Name, Operand},
    },
    types::Typeref,
};

/// Floating-point comparison predicate.
///
/// `O*` predicates are ordered (neither operand is NaN); `U*` predicates are
/// unordered (true if either operand is NaN). Consistency checks use `Ueq`
/// so that a NaN value compared against its own shadow does not trip the
/// fault handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FCmpOp {
    Oeq,
    Ogt,
    Oge,
    Olt,
    Ole,
    One,
    Ueq,
    Une,
    Ord,
}

macro_rules! define_fp_binary {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub struct $name {
            pub dest: Name,
            pub ty: Typeref,
            pub lhs: Operand,
            pub rhs: Operand,
        }

        impl Instruction for $name {
            fn flags(&self) -> InstructionFlags {
                InstructionFlags::SIMPLE | InstructionFlags::ARITHMETIC_FP
            }

            fn operands(&self) -> impl Iterator<Item = &Operand> {
                [&self.lhs, &self.rhs].into_iter()
            }

            fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
                [&mut self.lhs, &mut self.rhs].into_iter()
            }

            fn destination(&self) -> Option<Name> {
                Some(self.dest)
            }

            fn set_destination(&mut self, name: Name) {
                self.dest = name;
            }

            fn destination_type(&self) -> Option<Typeref> {
                Some(self.ty)
            }
        }
    };
}

define_fp_binary! {
    /// Floating-point addition.
    FAdd
}
define_fp_binary! {
    /// Floating-point subtraction.
    FSub
}
define_fp_binary! {
    /// Floating-point multiplication.
    FMul
}

/// Floating-point comparison. The result is always `i1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FCmp {
    pub dest: Name,
    /// Boolean result type (`i1`), pre-interned by the producer.
    pub dest_ty: Typeref,
    /// Type of the compared operands.
    pub ty: Typeref,
    pub op: FCmpOp,
    pub lhs: Operand,
    pub rhs: Operand,
}

impl Instruction for FCmp {
    fn flags(&self) -> InstructionFlags {
        InstructionFlags::SIMPLE | InstructionFlags::ARITHMETIC_FP
    }

    fn operands(&self) -> impl Iterator<Item = &Operand> {
        [&self.lhs, &self.rhs].into_iter()
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        [&mut self.lhs, &mut self.rhs].into_iter()
    }

    fn destination(&self) -> Option<Name> {
        Some(self.dest)
    }

    fn set_destination(&mut self, name: Name) {
        self.dest = name;
    }

    fn destination_type(&self) -> Option<Typeref> {
        Some(self.dest_ty)
    }
}
