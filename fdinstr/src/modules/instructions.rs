//! The instruction set.
//!
//! Every concrete instruction lives in its own struct (see the sibling
//! modules) and implements [`Instruction`]. [`FdInstr`] is the tagged union
//! over all of them; it implements the trait by dispatching to the active
//! variant.
use auto_enums::auto_enum;
use bitflags::bitflags;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::{EnumDiscriminants, EnumIs, EnumIter, EnumTryAs};

use crate::{
    modules::operand::{Name, Operand},
    types::Typeref,
};

pub use crate::modules::{
    fp::{FAdd, FCmp, FCmpOp, FMul, FSub},
    int::{IAdd, IAnd, ICmp, ICmpOp, IMul, IOr, ISub, IXor},
    mem::{MAlloca, MAtomicRmw, MCmpXchg, MFieldAddr, MLoad, MStore, MemoryOrdering, RmwOp},
    misc::{Call, Cast, CastKind, ExtractValue, InsertValue, Phi, Select},
};

bitflags! {
    /// Coarse behavioral classification of an instruction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InstructionFlags: u8 {
        /// Pure value computation: no side effects beyond the destination.
        const SIMPLE = 1 << 0;
        /// Touches memory (loads, stores, calls, atomics, allocations).
        const MEMORY = 1 << 1;
        /// Writes to memory observable by other instructions.
        const MUTATES_MEMORY = 1 << 2;
        /// Integer arithmetic or comparison.
        const ARITHMETIC_INT = 1 << 3;
        /// Floating-point arithmetic or comparison.
        const ARITHMETIC_FP = 1 << 4;
    }
}

/// Common interface over all instruction structs.
pub trait Instruction {
    fn flags(&self) -> InstructionFlags;

    /// All value operands, in source order. Labels embedded in the
    /// instruction (phi predecessors) are not operands.
    fn operands(&self) -> impl Iterator<Item = &Operand>;

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand>;

    /// The SSA name defined by this instruction, if it produces a value.
    fn destination(&self) -> Option<Name> {
        None
    }

    /// Renames the destination. No-op on instructions without one.
    fn set_destination(&mut self, name: Name) {
        let _ = name;
    }

    /// Type of the produced value, if any.
    fn destination_type(&self) -> Option<Typeref> {
        None
    }

    /// SSA names this instruction reads, including names nested inside
    /// constant field-address expressions.
    fn dependencies(&self) -> impl Iterator<Item = Name> {
        self.operands().flat_map(|op| {
            let mut deps = Vec::new();
            collect_reg_deps(op, &mut deps);
            deps
        })
    }

    /// Applies `f` to every operand in place.
    fn remap_operands(&mut self, mut f: impl FnMut(&mut Operand)) {
        for op in self.operands_mut() {
            f(op);
        }
    }
}

fn collect_reg_deps(op: &Operand, out: &mut Vec<Name>) {
    match op {
        Operand::Reg(name) => out.push(*name),
        Operand::FieldAddr(fa) => collect_reg_deps(&fa.base, out),
        _ => {}
    }
}

/// How an instruction participates in computation duplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DupClass {
    /// Stack allocation: the shadow gets a fresh slot.
    Allocation,
    /// Pure value or load: the shadow recomputes over shadow operands.
    PureValue,
    /// Memory mutation: the shadow repeats the write at the shadow address.
    MemMutating,
    /// Function call: handled by signature-aware redirection.
    Call,
}

macro_rules! define_fd_instr {
    ($($variant:ident),+ $(,)?) => {
        /// Tagged union over every instruction struct.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, EnumIs, EnumTryAs, EnumDiscriminants)]
        #[strum_discriminants(name(FdInstrOp), derive(Hash, PartialOrd, Ord, EnumIter))]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub enum FdInstr {
            $($variant($variant),)+
        }

        $(
            impl From<$variant> for FdInstr {
                fn from(instr: $variant) -> Self {
                    FdInstr::$variant(instr)
                }
            }
        )+

        impl Instruction for FdInstr {
            fn flags(&self) -> InstructionFlags {
                match self {
                    $(FdInstr::$variant(instr) => instr.flags(),)+
                }
            }

            #[auto_enum(Iterator)]
            fn operands(&self) -> impl Iterator<Item = &Operand> {
                match self {
                    $(FdInstr::$variant(instr) => instr.operands(),)+
                }
            }

            #[auto_enum(Iterator)]
            fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
                match self {
                    $(FdInstr::$variant(instr) => instr.operands_mut(),)+
                }
            }

            fn destination(&self) -> Option<Name> {
                match self {
                    $(FdInstr::$variant(instr) => instr.destination(),)+
                }
            }

            fn set_destination(&mut self, name: Name) {
                match self {
                    $(FdInstr::$variant(instr) => instr.set_destination(name),)+
                }
            }

            fn destination_type(&self) -> Option<Typeref> {
                match self {
                    $(FdInstr::$variant(instr) => instr.destination_type(),)+
                }
            }
        }

        impl FdInstrOp {
            /// Mnemonic, for diagnostics and the export report.
            pub fn opname(&self) -> &'static str {
                match self {
                    $(FdInstrOp::$variant => stringify!($variant),)+
                }
            }
        }
    };
}

define_fd_instr!(
    IAdd,
    ISub,
    IMul,
    IAnd,
    IOr,
    IXor,
    ICmp,
    FAdd,
    FSub,
    FMul,
    FCmp,
    MLoad,
    MStore,
    MAlloca,
    MFieldAddr,
    MAtomicRmw,
    MCmpXchg,
    Call,
    Phi,
    Select,
    Cast,
    InsertValue,
    ExtractValue,
);

impl FdInstrOp {
    /// Duplication class used by the hardening engine. A closed mapping so
    /// that adding an instruction forces a decision here.
    pub fn dup_class(&self) -> DupClass {
        match self {
            FdInstrOp::MAlloca => DupClass::Allocation,
            FdInstrOp::MStore | FdInstrOp::MAtomicRmw | FdInstrOp::MCmpXchg => {
                DupClass::MemMutating
            }
            FdInstrOp::Call => DupClass::Call,
            FdInstrOp::IAdd
            | FdInstrOp::ISub
            | FdInstrOp::IMul
            | FdInstrOp::IAnd
            | FdInstrOp::IOr
            | FdInstrOp::IXor
            | FdInstrOp::ICmp
            | FdInstrOp::FAdd
            | FdInstrOp::FSub
            | FdInstrOp::FMul
            | FdInstrOp::FCmp
            | FdInstrOp::MLoad
            | FdInstrOp::MFieldAddr
            | FdInstrOp::Phi
            | FdInstrOp::Select
            | FdInstrOp::Cast
            | FdInstrOp::InsertValue
            | FdInstrOp::ExtractValue => DupClass::PureValue,
        }
    }
}

impl FdInstr {
    pub fn opcode(&self) -> FdInstrOp {
        FdInstrOp::from(self)
    }

    pub fn dup_class(&self) -> DupClass {
        self.opcode().dup_class()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeRegistry;

    #[test]
    fn store_has_no_destination() {
        let registry = TypeRegistry::new();
        let instr: FdInstr = MStore {
            addr: Operand::Reg(Name(0)),
            value: Operand::Imm(crate::modules::global::Const::Int {
                value: 1,
                ty: registry.int(32),
            }),
            alignment: None,
            ordering: None,
            volatile: false,
        }
        .into();
        assert!(instr.destination().is_none());
        assert_eq!(instr.dup_class(), DupClass::MemMutating);
    }

    #[test]
    fn dependencies_see_through_field_addr() {
        use crate::modules::operand::ConstFieldAddr;
        use smallvec::smallvec;

        let instr: FdInstr = MLoad {
            dest: Name(3),
            ty: TypeRegistry::new().int(64),
            addr: Operand::FieldAddr(ConstFieldAddr {
                base: Box::new(Operand::Reg(Name(7))),
                indices: smallvec![0, 2],
            }),
            alignment: None,
            ordering: None,
            volatile: false,
        }
        .into();
        assert_eq!(instr.dependencies().collect::<Vec<_>>(), vec![Name(7)]);
    }

    #[test]
    fn every_opcode_has_a_dup_class() {
        use strum::IntoEnumIterator;
        for op in FdInstrOp::iter() {
            // Exhaustiveness guard; the match inside dup_class must not panic.
            let _ = op.dup_class();
        }
    }
}
