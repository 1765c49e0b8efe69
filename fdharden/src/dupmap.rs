//! Bidirectional original↔shadow map.
//!
//! Two keyspaces: SSA values (register names and globals) drive operand
//! substitution, and instruction identities make duplication idempotent for
//! instructions that produce no value (stores, void calls). Both keyspaces
//! are symmetric by construction.
use std::collections::HashMap;

use fdinstr::modules::{InstrId, operand::Name};
use uuid::Uuid;

/// A value that can have a shadow: an SSA register or a global variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueRef {
    Reg(Name),
    Global(Uuid),
}

/// Hash-keyed bidirectional map, scoped to one function's duplication pass
/// (seeded with the module-wide global pairs and the function's argument
/// pairs before the pass starts).
#[derive(Debug, Clone, Default)]
pub struct DuplicateMap {
    values: HashMap<ValueRef, ValueRef>,
    instrs: HashMap<InstrId, InstrId>,
}

impl DuplicateMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a value pair in both directions.
    pub fn insert_value(&mut self, original: ValueRef, shadow: ValueRef) {
        self.values.insert(original, shadow);
        self.values.insert(shadow, original);
    }

    /// Register an instruction pair in both directions. A self-pair marks an
    /// instruction the sweep must skip without it having a distinct shadow.
    pub fn insert_instr(&mut self, original: InstrId, shadow: InstrId) {
        self.instrs.insert(original, shadow);
        self.instrs.insert(shadow, original);
    }

    /// Counterpart of `value`, in either direction.
    pub fn value(&self, value: ValueRef) -> Option<ValueRef> {
        self.values.get(&value).copied()
    }

    pub fn reg(&self, name: Name) -> Option<Name> {
        match self.value(ValueRef::Reg(name)) {
            Some(ValueRef::Reg(shadow)) => Some(shadow),
            _ => None,
        }
    }

    pub fn global(&self, uuid: Uuid) -> Option<Uuid> {
        match self.value(ValueRef::Global(uuid)) {
            Some(ValueRef::Global(shadow)) => Some(shadow),
            _ => None,
        }
    }

    pub fn has_value(&self, value: ValueRef) -> bool {
        self.values.contains_key(&value)
    }

    /// Counterpart of `id`, in either direction.
    pub fn instr(&self, id: InstrId) -> Option<InstrId> {
        self.instrs.get(&id).copied()
    }

    /// Whether `id` participates in any pair, as original or as shadow.
    pub fn has_instr(&self, id: InstrId) -> bool {
        self.instrs.contains_key(&id)
    }

    /// Drop a value pair in both directions. Only used for dead
    /// store-duplicate pruning.
    pub fn remove_value(&mut self, value: ValueRef) {
        if let Some(other) = self.values.remove(&value) {
            self.values.remove(&other);
        }
    }

    /// Drop an instruction pair in both directions.
    pub fn remove_instr(&mut self, id: InstrId) {
        if let Some(other) = self.instrs.remove(&id) {
            if other != id {
                self.instrs.remove(&other);
            }
        }
    }

    /// Every stored value association, including both directions.
    pub fn value_pairs(&self) -> impl Iterator<Item = (ValueRef, ValueRef)> + '_ {
        self.values.iter().map(|(a, b)| (*a, *b))
    }
}
