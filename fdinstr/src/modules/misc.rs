//! Calls, SSA value selectors and aggregate manipulation.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    modules::{
        Instruction, ParamAttrs,
        instructions::InstructionFlags,
        operand::{Label, Name, Operand},
    },
    types::Typeref,
};

/// Function call instruction.
///
/// `callee` is an operand so the same node covers direct calls
/// (`Operand::Func`) and indirect calls through a function pointer held in a
/// register. Per-argument attributes travel alongside the argument list so
/// that signature rewrites can preserve them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Call {
    pub dest: Option<Name>,
    /// The return type of the call. `None` for `void` calls.
    pub ty: Option<Typeref>,
    pub callee: Operand,
    pub args: Vec<Operand>,
    /// One entry per argument; empty attrs for unattributed arguments.
    pub arg_attrs: Vec<ParamAttrs>,
}

impl Call {
    /// The statically known callee, when the call is direct.
    pub fn static_callee(&self) -> Option<uuid::Uuid> {
        match self.callee {
            Operand::Func(uuid) => Some(uuid),
            _ => None,
        }
    }
}

impl Instruction for Call {
    fn flags(&self) -> InstructionFlags {
        InstructionFlags::MEMORY
    }

    fn operands(&self) -> impl Iterator<Item = &Operand> {
        std::iter::once(&self.callee).chain(self.args.iter())
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        std::iter::once(&mut self.callee).chain(self.args.iter_mut())
    }

    fn destination(&self) -> Option<Name> {
        self.dest
    }

    fn set_destination(&mut self, name: Name) {
        // Cannot change a void call into a value-producing one.
        if self.dest.is_some() {
            self.dest = Some(name);
        }
    }

    fn destination_type(&self) -> Option<Typeref> {
        self.ty
    }
}

/// Phi instruction: merges values coming from different predecessor blocks.
/// Must appear before any non-phi instruction of its block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Phi {
    pub dest: Name,
    pub ty: Typeref,
    /// The incoming values and their corresponding predecessor labels.
    pub values: Vec<(Label, Operand)>,
}

impl Instruction for Phi {
    fn flags(&self) -> InstructionFlags {
        InstructionFlags::SIMPLE
    }

    fn operands(&self) -> impl Iterator<Item = &Operand> {
        self.values.iter().map(|(_, op)| op)
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        self.values.iter_mut().map(|(_, op)| op)
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

/// Select instruction: picks one of two values based on a boolean condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Select {
    pub dest: Name,
    pub condition: Operand,
    pub true_value: Operand,
    pub false_value: Operand,
    pub ty: Typeref,
}

impl Instruction for Select {
    fn flags(&self) -> InstructionFlags {
        InstructionFlags::SIMPLE
    }

    fn operands(&self) -> impl Iterator<Item = &Operand> {
        [&self.condition, &self.true_value, &self.false_value].into_iter()
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        [
            &mut self.condition,
            &mut self.true_value,
            &mut self.false_value,
        ]
        .into_iter()
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

/// Kind of a type conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CastKind {
    Bitcast,
    Zext,
    Sext,
    Trunc,
    PtrToInt,
    IntToPtr,
}

/// Type conversion of a single value to `ty`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cast {
    pub dest: Name,
    pub ty: Typeref,
    pub kind: CastKind,
    pub value: Operand,
}

impl Instruction for Cast {
    fn flags(&self) -> InstructionFlags {
        InstructionFlags::SIMPLE
    }

    fn operands(&self) -> impl Iterator<Item = &Operand> {
        std::iter::once(&self.value)
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        std::iter::once(&mut self.value)
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

/// Inserts `value` into the aggregate `aggregate` at the position named by
/// `indices`, yielding the updated aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InsertValue {
    pub dest: Name,
    /// Type of the aggregate (and of the result).
    pub ty: Typeref,
    pub aggregate: Operand,
    pub value: Operand,
    pub indices: Vec<u32>,
}

impl Instruction for InsertValue {
    fn flags(&self) -> InstructionFlags {
        InstructionFlags::SIMPLE
    }

    fn operands(&self) -> impl Iterator<Item = &Operand> {
        [&self.aggregate, &self.value].into_iter()
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        [&mut self.aggregate, &mut self.value].into_iter()
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

/// Extracts the element named by `indices` out of the aggregate `aggregate`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExtractValue {
    pub dest: Name,
    /// Type of the extracted element.
    pub ty: Typeref,
    pub aggregate: Operand,
    pub indices: Vec<u32>,
}

impl Instruction for ExtractValue {
    fn flags(&self) -> InstructionFlags {
        InstructionFlags::SIMPLE
    }

    fn operands(&self) -> impl Iterator<Item = &Operand> {
        std::iter::once(&self.aggregate)
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        std::iter::once(&mut self.aggregate)
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
