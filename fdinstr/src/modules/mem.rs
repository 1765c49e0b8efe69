//! Memory operations
//!
//! Loads, stores, stack allocations, address computations and atomic
//! read-modify-write operations, with alignment, volatility and optional
//! atomic ordering semantics.
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

/// Ordering for atomic memory operations, following the C++ memory model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MemoryOrdering {
    Unordered,
    Monotonic,
    Acq,
    Rel,
    AcqRel,
    SeqCst,
}

/// Load from memory into a destination SSA name.
///
/// When `volatile` is true the operation may not be removed or merged by
/// optimizations. If an `ordering` is specified, the load is atomic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MLoad {
    pub dest: Name,
    /// Type of the loaded value (pointers are opaque).
    pub ty: Typeref,
    pub addr: Operand,
    pub alignment: Option<u32>,
    pub ordering: Option<MemoryOrdering>,
    pub volatile: bool,
}

impl Instruction for MLoad {
    fn flags(&self) -> InstructionFlags {
        InstructionFlags::MEMORY
    }

    fn operands(&self) -> impl Iterator<Item = &Operand> {
        std::iter::once(&self.addr)
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        std::iter::once(&mut self.addr)
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

/// Store a value to memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MStore {
    pub addr: Operand,
    pub value: Operand,
    pub alignment: Option<u32>,
    pub ordering: Option<MemoryOrdering>,
    pub volatile: bool,
}

impl Instruction for MStore {
    fn flags(&self) -> InstructionFlags {
        InstructionFlags::MEMORY | InstructionFlags::MUTATES_MEMORY
    }

    fn operands(&self) -> impl Iterator<Item = &Operand> {
        [&self.addr, &self.value].into_iter()
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        [&mut self.addr, &mut self.value].into_iter()
    }
}

/// Stack allocation producing a pointer to `count` elements of `ty`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MAlloca {
    pub dest: Name,
    /// Opaque-pointer result type.
    pub dest_ty: Typeref,
    /// Type of the allocated slot(s).
    pub ty: Typeref,
    pub count: Operand,
    pub alignment: Option<u32>,
}

impl Instruction for MAlloca {
    fn flags(&self) -> InstructionFlags {
        InstructionFlags::MEMORY
    }

    fn operands(&self) -> impl Iterator<Item = &Operand> {
        std::iter::once(&self.count)
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        std::iter::once(&mut self.count)
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

/// Address computation: offsets `base` (of value type `base_ty`) by the
/// given indices, producing a pointer to the addressed field or element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MFieldAddr {
    pub dest: Name,
    /// Opaque-pointer result type.
    pub dest_ty: Typeref,
    /// Value type of the object `base` points into.
    pub base_ty: Typeref,
    pub base: Operand,
    pub indices: Vec<Operand>,
}

impl Instruction for MFieldAddr {
    fn flags(&self) -> InstructionFlags {
        InstructionFlags::SIMPLE
    }

    fn operands(&self) -> impl Iterator<Item = &Operand> {
        std::iter::once(&self.base).chain(self.indices.iter())
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        std::iter::once(&mut self.base).chain(self.indices.iter_mut())
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

/// Atomic read-modify-write operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RmwOp {
    Xchg,
    Add,
    Sub,
    And,
    Or,
    Xor,
}

/// Atomic read-modify-write: loads the value at `addr`, applies `op` with
/// `value`, stores the result back and yields the original value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MAtomicRmw {
    pub dest: Name,
    pub ty: Typeref,
    pub op: RmwOp,
    pub addr: Operand,
    pub value: Operand,
    pub ordering: MemoryOrdering,
}

impl Instruction for MAtomicRmw {
    fn flags(&self) -> InstructionFlags {
        InstructionFlags::MEMORY | InstructionFlags::MUTATES_MEMORY
    }

    fn operands(&self) -> impl Iterator<Item = &Operand> {
        [&self.addr, &self.value].into_iter()
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        [&mut self.addr, &mut self.value].into_iter()
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

/// Atomic compare-exchange: stores `replacement` at `addr` iff the current
/// value equals `expected`; yields the value observed before the operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MCmpXchg {
    pub dest: Name,
    pub ty: Typeref,
    pub addr: Operand,
    pub expected: Operand,
    pub replacement: Operand,
    pub success_ordering: MemoryOrdering,
    pub failure_ordering: MemoryOrdering,
}

impl Instruction for MCmpXchg {
    fn flags(&self) -> InstructionFlags {
        InstructionFlags::MEMORY | InstructionFlags::MUTATES_MEMORY
    }

    fn operands(&self) -> impl Iterator<Item = &Operand> {
        [&self.addr, &self.expected, &self.replacement].into_iter()
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        [&mut self.addr, &mut self.expected, &mut self.replacement].into_iter()
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
