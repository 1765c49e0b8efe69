//! Shared operand types for instructions.
//!
//! An instruction operand can reference another SSA value (`Reg`), an
//! immediate constant (`Imm`), a code label (`Lbl`), a module-level global
//! variable (`Global`), a function symbol (`Func`), or an inline constant
//! field-address expression (`FieldAddr`).
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strum::EnumIs;
use uuid::Uuid;

use crate::modules::global::Const;

/// SSA value identifier naming an instruction destination or a parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Name(pub u32);

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// A code label used as a target for control-flow terminators.
///
/// Labels never cross function boundaries; they are only valid within the
/// function they are defined in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Label(pub u32);

impl Label {
    /// Reserved as the function-entry label; it must always be present.
    pub const NIL: Label = Label(0);

    pub fn is_nil(&self) -> bool {
        self == &Label::NIL
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%block_{}", self.0)
    }
}

/// Inline constant address computation embedded directly as an operand.
///
/// Unlike a standalone `MFieldAddr` instruction, this expression has no SSA
/// name of its own; it typically addresses a field of a global (e.g. the
/// function-pointer array inside a dispatch table). When the base object is
/// duplicated, the expression must be re-derived from the shadow base rather
/// than left pointing at the original.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConstFieldAddr {
    pub base: Box<Operand>,
    pub indices: SmallVec<u64, 4>,
}

/// Instruction operand.
#[derive(Clone, Debug, PartialEq, Eq, Hash, EnumIs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Operand {
    /// Reference to a previously defined SSA value.
    Reg(Name),
    /// Immediate constant.
    Imm(Const),
    /// Code label (used for control flow).
    Lbl(Label),
    /// Address of a module-level global variable.
    Global(Uuid),
    /// Address of a function symbol.
    Func(Uuid),
    /// Inline constant field-address expression.
    FieldAddr(ConstFieldAddr),
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Reg(name) => write!(f, "{}", name),
            Operand::Imm(constant) => write!(f, "{:?}", constant),
            Operand::Lbl(label) => write!(f, "{}", label),
            Operand::Global(uuid) => write!(f, "@g{}", uuid.simple()),
            Operand::Func(uuid) => write!(f, "@f{}", uuid.simple()),
            Operand::FieldAddr(fa) => write!(f, "fieldaddr({}, {:?})", fa.base, fa.indices),
        }
    }
}
