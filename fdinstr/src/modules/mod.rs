//! Instruction IR modules
//!
//! This module groups all instruction kinds exposed by the Fd instruction
//! IR. Each instruction is represented as a small data structure with public
//! fields, making it easy to construct and inspect. Submodules contain
//! families of operations:
//!
//! - `int`: integer arithmetic, bitwise ops and comparisons
//! - `fp`: floating-point arithmetic and comparisons
//! - `mem`: memory loads, stores, allocations and atomics
//! - `misc`: calls, phis, selects, casts and aggregate ops
//! - `control_flow`: block terminators
//! - `operand`: shared operand and SSA name types
//! - `global`: module-level data and constants
//!
//! You typically manipulate instructions via the `FdInstr` enum which is a
//! tagged union of all concrete instruction forms, wrapped in an
//! [`InstrNode`] carrying a stable per-function identity.
use std::collections::{BTreeMap, BTreeSet};

use bitflags::bitflags;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    modules::{
        control_flow::Terminator,
        global::{Alias, CtorEntry, GlobalVariable},
        instructions::FdInstr,
        operand::{Label, Name, Operand},
        symbol::ExternalFunction,
    },
    types::Typeref,
    utils::Error,
};

pub mod control_flow;
pub mod fp;
pub mod global;
pub mod instructions;
pub mod int;
pub mod mem;
pub mod misc;
pub mod operand;
pub mod symbol;

pub use instructions::{DupClass, FdInstrOp, Instruction, InstructionFlags};

/// All global variables and functions have one of the following linkages.
#[derive(Debug, Default, Clone, Copy, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Linkage {
    /// Only directly accessible by objects in the current module. Does not
    /// show up in any symbol table in the object file.
    #[default]
    Private,

    /// Similar to `Private`, but the value shows as a local symbol
    /// (STB_LOCAL in the case of ELF) in the object file. This corresponds
    /// to the notion of the `static` keyword in C.
    Internal,

    /// May be referenced by other modules, and may also be defined in other
    /// modules.
    External,

    /// Merged with same-named globals at link time; unreferenced copies may
    /// be discarded.
    LinkOnce,

    /// Appends same-named arrays from all linked modules into one. Used by
    /// the static-initializer list, which therefore must be rebuilt as a
    /// fresh aggregate on rewrite.
    Appending,
}

bitflags! {
    /// Per-parameter attributes.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ParamAttrs: u8 {
        /// The parameter is the hidden pointer to the return slot. At most
        /// one parameter per function may carry it, so a copied shadow
        /// parameter must have it stripped.
        const SRET = 1 << 0;
        /// The parameter is a pointer to a caller-owned copy of an
        /// aggregate passed by value.
        const BYVAL = 1 << 1;
        /// The pointer parameter does not alias any other parameter.
        const NOALIAS = 1 << 2;
    }
}

/// A formal parameter of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Param {
    pub name: Name,
    pub ty: Typeref,
    pub attrs: ParamAttrs,
}

/// Source location attached to an instruction, carried through rewrites so
/// that fault reports point at the original source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SrcLoc {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

/// Stable identity of an instruction within its function.
///
/// Unlike the destination [`Name`], every instruction has one, including
/// stores and void calls. Identities survive block splits and reorderings,
/// which lets rewrites keep maps keyed by instruction across mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InstrId(pub u32);

impl std::fmt::Display for InstrId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An instruction together with its identity and optional source location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InstrNode {
    pub id: InstrId,
    pub instr: FdInstr,
    pub loc: Option<SrcLoc>,
}

impl InstrNode {
    pub fn new(id: InstrId, instr: impl Into<FdInstr>) -> Self {
        InstrNode {
            id,
            instr: instr.into(),
            loc: None,
        }
    }

    pub fn with_loc(mut self, loc: Option<SrcLoc>) -> Self {
        self.loc = loc;
        self
    }
}

/// A basic block: a straight-line run of instructions closed by exactly one
/// terminator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BasicBlock {
    pub instructions: Vec<InstrNode>,
    pub terminator: Terminator,
}

/// A function made of basic blocks and parameter metadata.
///
/// A `Function` owns its control-flow graph (`body`). By convention the
/// entrypoint is the basic block at [`Label::NIL`]. `name` is the
/// linker-level symbol; `demangled_name`, when present, is its human
/// readable form and is what name-based classification matches against.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Function {
    pub uuid: Uuid,
    pub name: String,
    pub demangled_name: Option<String>,
    pub params: Vec<Param>,
    /// `None` indicates a `void` return type.
    pub return_type: Option<Typeref>,
    pub body: BTreeMap<Label, BasicBlock>,
    pub linkage: Linkage,
}

impl Function {
    /// Name-based classification works on the demangled form when one is
    /// available, falling back to the raw symbol.
    pub fn display_name(&self) -> &str {
        self.demangled_name.as_deref().unwrap_or(&self.name)
    }

    pub fn entry(&self) -> Option<&BasicBlock> {
        self.body.get(&Label::NIL)
    }

    /// Find the next available [`Name`], past every parameter and every
    /// destination or register operand in the body.
    pub fn next_available_name(&self) -> Name {
        let mut max_index = 0;
        for param in &self.params {
            max_index = max_index.max(param.name.0);
        }

        for bb in self.body.values() {
            for node in &bb.instructions {
                if let Some(dest) = node.instr.destination() {
                    max_index = max_index.max(dest.0);
                }
                for op in node.instr.operands() {
                    if let Operand::Reg(name) = op {
                        max_index = max_index.max(name.0);
                    }
                }
            }
        }

        Name(max_index + 1)
    }

    /// Find the next available [`Label`].
    pub fn next_available_label(&self) -> Label {
        match self.body.last_key_value() {
            Some((label, _)) => Label(label.0 + 1),
            None => Label(Label::NIL.0 + 1),
        }
    }

    /// Find the next available [`InstrId`].
    pub fn next_available_instr_id(&self) -> InstrId {
        let mut max_index = 0;
        for bb in self.body.values() {
            for node in &bb.instructions {
                max_index = max_index.max(node.id.0);
            }
        }
        InstrId(max_index + 1)
    }

    /// Locate an instruction by identity: the label of its block and its
    /// index within that block.
    pub fn find_instr(&self, id: InstrId) -> Option<(Label, usize)> {
        for (label, bb) in &self.body {
            for (index, node) in bb.instructions.iter().enumerate() {
                if node.id == id {
                    return Some((*label, index));
                }
            }
        }
        None
    }

    /// Labels of the blocks that can branch into `label`.
    pub fn predecessors(&self, label: Label) -> Vec<Label> {
        self.body
            .iter()
            .filter(|(_, bb)| bb.terminator.successors().any(|s| s == label))
            .map(|(l, _)| *l)
            .collect()
    }

    /// Verify structural invariants:
    /// 1) The entry block exists.
    /// 2) Each SSA name is defined exactly once.
    /// 3) Each instruction identity is unique.
    /// 4) Each register operand refers to a defined name.
    /// 5) Each terminator target refers to an existing block.
    pub fn check_ssa(&self) -> Result<(), Error> {
        if !self.body.contains_key(&Label::NIL) {
            return Err(Error::MissingEntryBlock {
                function: self.name.clone(),
            });
        }

        let mut defined_names = BTreeSet::new();
        for param in &self.params {
            if !defined_names.insert(param.name) {
                return Err(Error::DuplicateSsaName {
                    duplicate: param.name,
                });
            }
        }

        let mut seen_ids = BTreeSet::new();
        for bb in self.body.values() {
            for node in &bb.instructions {
                if !seen_ids.insert(node.id) {
                    return Err(Error::DuplicateInstrId { duplicate: node.id });
                }
                if let Some(dest) = node.instr.destination() {
                    if !defined_names.insert(dest) {
                        return Err(Error::DuplicateSsaName { duplicate: dest });
                    }
                }
            }
        }

        for bb in self.body.values() {
            for node in &bb.instructions {
                for name in node.instr.dependencies() {
                    if !defined_names.contains(&name) {
                        return Err(Error::UndefinedSsaName { undefined: name });
                    }
                }
            }
            for target in bb.terminator.successors() {
                if !self.body.contains_key(&target) {
                    return Err(Error::UndefinedLabel { undefined: target });
                }
            }
        }

        Ok(())
    }
}

/// A module: the whole-program unit the hardening engine operates on.
///
/// Functions defined here appear in `functions`; references to symbols not
/// defined locally are listed in `external_functions`. `static_ctors` is the
/// module's static-initializer list, kept sorted by priority.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Module {
    pub name: String,
    pub functions: BTreeMap<Uuid, Function>,
    pub external_functions: BTreeMap<Uuid, ExternalFunction>,
    pub globals: BTreeMap<Uuid, GlobalVariable>,
    pub aliases: BTreeMap<Uuid, Alias>,
    pub static_ctors: Vec<CtorEntry>,
}

impl Module {
    /// Look up a defined function by linker-level symbol name.
    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.functions.values().find(|f| f.name == name)
    }

    /// Look up an external function by symbol name.
    pub fn external_by_name(&self, name: &str) -> Option<&ExternalFunction> {
        self.external_functions.values().find(|f| f.name == name)
    }

    /// The symbol name behind a function UUID, defined or external.
    pub fn symbol_name(&self, uuid: Uuid) -> Option<&str> {
        if let Some(f) = self.functions.get(&uuid) {
            return Some(&f.name);
        }
        self.external_functions.get(&uuid).map(|f| f.name.as_str())
    }

    /// Get or declare an external function with the given signature,
    /// returning its UUID.
    pub fn declare_external(
        &mut self,
        name: &str,
        param_types: Vec<Typeref>,
        return_type: Option<Typeref>,
    ) -> Uuid {
        if let Some(existing) = self.external_functions.values().find(|f| f.name == name) {
            return existing.uuid;
        }
        let uuid = Uuid::new_v4();
        self.external_functions.insert(
            uuid,
            ExternalFunction {
                uuid,
                name: name.to_owned(),
                param_types,
                return_type,
            },
        );
        uuid
    }

    /// Verify every defined function. Stops at the first failure.
    pub fn check_ssa(&self) -> Result<(), Error> {
        for function in self.functions.values() {
            function.check_ssa()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        modules::instructions::{IAdd, MStore},
        types::TypeRegistry,
    };

    fn add_fn(registry: &TypeRegistry) -> Function {
        let i32_ty = registry.int(32);
        let mut body = BTreeMap::new();
        body.insert(
            Label::NIL,
            BasicBlock {
                instructions: vec![InstrNode::new(
                    InstrId(0),
                    IAdd {
                        dest: Name(2),
                        ty: i32_ty,
                        lhs: Operand::Reg(Name(0)),
                        rhs: Operand::Reg(Name(1)),
                    },
                )],
                terminator: Terminator::Ret {
                    value: Some(Operand::Reg(Name(2))),
                },
            },
        );
        Function {
            uuid: Uuid::new_v4(),
            name: "add".to_owned(),
            demangled_name: None,
            params: vec![
                Param {
                    name: Name(0),
                    ty: i32_ty,
                    attrs: ParamAttrs::empty(),
                },
                Param {
                    name: Name(1),
                    ty: i32_ty,
                    attrs: ParamAttrs::empty(),
                },
            ],
            return_type: Some(i32_ty),
            body,
            linkage: Linkage::External,
        }
    }

    #[test]
    fn check_ssa_accepts_well_formed_function() {
        let registry = TypeRegistry::new();
        assert!(add_fn(&registry).check_ssa().is_ok());
    }

    #[test]
    fn check_ssa_rejects_duplicate_destination() {
        let registry = TypeRegistry::new();
        let mut function = add_fn(&registry);
        let block = function.body.get_mut(&Label::NIL).unwrap();
        let mut dup = block.instructions[0].clone();
        dup.id = InstrId(1);
        block.instructions.push(dup);
        assert!(matches!(
            function.check_ssa(),
            Err(Error::DuplicateSsaName { .. })
        ));
    }

    #[test]
    fn next_available_counters_skip_existing() {
        let registry = TypeRegistry::new();
        let function = add_fn(&registry);
        assert_eq!(function.next_available_name(), Name(3));
        assert_eq!(function.next_available_label(), Label(1));
        assert_eq!(function.next_available_instr_id(), InstrId(1));
    }

    #[test]
    fn find_instr_reports_block_and_index() {
        let registry = TypeRegistry::new();
        let mut function = add_fn(&registry);
        let store = InstrNode::new(
            InstrId(7),
            MStore {
                addr: Operand::Reg(Name(0)),
                value: Operand::Reg(Name(2)),
                alignment: None,
                ordering: None,
                volatile: false,
            },
        );
        function
            .body
            .get_mut(&Label::NIL)
            .unwrap()
            .instructions
            .push(store);
        assert_eq!(function.find_instr(InstrId(7)), Some((Label::NIL, 1)));
        assert_eq!(function.find_instr(InstrId(99)), None);
    }
}
