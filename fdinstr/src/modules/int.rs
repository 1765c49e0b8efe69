//! Integer arithmetic, bitwise and comparison instructions.
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

/// Integer comparison predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ICmpOp {
    Eq,
    Ne,
    Ugt,
    Uge,
    Ult,
    Ule,
    Sgt,
    Sge,
    Slt,
    Sle,
}

macro_rules! define_int_binary {
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
                InstructionFlags::SIMPLE | InstructionFlags::ARITHMETIC_INT
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

define_int_binary! {
    /// Wrapping integer addition.
    IAdd
}
define_int_binary! {
    /// Wrapping integer subtraction.
    ISub
}
define_int_binary! {
    /// Wrapping integer multiplication.
    IMul
}
define_int_binary! {
    /// Bitwise and.
    IAnd
}
define_int_binary! {
    /// Bitwise or.
    IOr
}
define_int_binary! {
    /// Bitwise exclusive or.
    IXor
}

/// Integer comparison. `ty` is the operand type; the result is always `i1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ICmp {
    pub dest: Name,
    /// Boolean result type (`i1`), pre-interned by the producer.
    pub dest_ty: Typeref,
    /// Type of the compared operands.
    pub ty: Typeref,
    pub op: ICmpOp,
    pub lhs: Operand,
    pub rhs: Operand,
}

impl Instruction for ICmp {
    fn flags(&self) -> InstructionFlags {
        InstructionFlags::SIMPLE | InstructionFlags::ARITHMETIC_INT
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
