//! Instruction duplication engine.
//!
//! Runs once per shadow function. For each original instruction the engine
//! ensures a shadow instruction exists with shadow operands substituted,
//! maintaining the bidirectional original↔shadow map. Dispatch is a closed
//! match over [`DupClass`]; operand chains are walked with an explicit
//! stack, with clone-registered-before-operands as the cycle guard for phi
//! loops.
use fdinstr::modules::{
    BasicBlock, DupClass, Function, InstrId, InstrNode, Instruction, Module,
    control_flow::Terminator,
    global::Const,
    instructions::{Call, Cast, CastKind, FdInstr, MLoad, MStore},
    operand::{Label, Name, Operand},
};
use fdinstr::types::{TypeRegistry, Typeref};
use log::debug;
use uuid::Uuid;

use crate::{
    Error, HardenConfig,
    dupmap::{DuplicateMap, ValueRef},
    globals,
    policy::{PolicyMap, PolicyTag},
};

/// Builtins whose calls are cloned wholesale, like `to_duplicate` functions.
fn is_duplicable_builtin(name: &str) -> bool {
    matches!(name, "memcpy" | "memmove" | "memset")
        || name.starts_with("llvm.memcpy")
        || name.starts_with("llvm.memmove")
        || name.starts_with("llvm.memset")
}

/// One function's duplication pass. Owns the function for the duration; the
/// rest of the module is read-only context.
pub struct FnPass<'m> {
    pub(crate) module: &'m Module,
    pub(crate) registry: &'m TypeRegistry,
    pub(crate) config: &'m HardenConfig,
    pub(crate) policy: &'m PolicyMap,
    pub(crate) map: DuplicateMap,
    pub(crate) function: Function,
    pub(crate) err_label: Label,
    /// Originals superseded by a doubled call, erased after the pass.
    pub(crate) removals: Vec<InstrId>,
    next_name: u32,
    next_label: u32,
    next_id: u32,
}

impl<'m> FnPass<'m> {
    pub fn new(
        module: &'m Module,
        registry: &'m TypeRegistry,
        config: &'m HardenConfig,
        policy: &'m PolicyMap,
        function: Function,
        err_label: Label,
        map: DuplicateMap,
    ) -> Self {
        let next_name = function.next_available_name().0;
        let next_label = function.next_available_label().0;
        let next_id = function.next_available_instr_id().0;
        FnPass {
            module,
            registry,
            config,
            policy,
            map,
            function,
            err_label,
            removals: Vec::new(),
            next_name,
            next_label,
            next_id,
        }
    }

    /// Tear down the pass, yielding the transformed function and the map.
    pub fn finish(self) -> (Function, DuplicateMap, Vec<InstrId>) {
        (self.function, self.map, self.removals)
    }

    pub(crate) fn fresh_name(&mut self) -> Name {
        let name = Name(self.next_name);
        self.next_name += 1;
        name
    }

    pub(crate) fn fresh_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    pub(crate) fn fresh_id(&mut self) -> InstrId {
        let id = InstrId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Defining instruction of an SSA name, if it is instruction-produced
    /// (parameters have no defining instruction).
    pub(crate) fn find_def(&self, name: Name) -> Option<InstrId> {
        for bb in self.function.body.values() {
            for node in &bb.instructions {
                if node.instr.destination() == Some(name) {
                    return Some(node.id);
                }
            }
        }
        None
    }

    pub(crate) fn value_type(&self, name: Name) -> Option<Typeref> {
        if let Some(param) = self.function.params.iter().find(|p| p.name == name) {
            return Some(param.ty);
        }
        for bb in self.function.body.values() {
            for node in &bb.instructions {
                if node.instr.destination() == Some(name) {
                    return node.instr.destination_type();
                }
            }
        }
        None
    }

    pub(crate) fn operand_type(&self, op: &Operand) -> Option<Typeref> {
        match op {
            Operand::Reg(name) => self.value_type(*name),
            Operand::Imm(constant) => match constant {
                Const::Int { ty, .. } | Const::Fp { ty, .. } => Some(*ty),
                Const::Zero(ty) => Some(*ty),
                Const::NullPtr | Const::Global(_) | Const::Func(_) => Some(self.registry.ptr()),
                Const::Array { .. } | Const::Struct { .. } => None,
            },
            Operand::Global(_) | Operand::Func(_) | Operand::FieldAddr(_) => {
                Some(self.registry.ptr())
            }
            Operand::Lbl(_) => None,
        }
    }

    /// Shadow counterpart of an operand, or the operand itself when none is
    /// registered. Inline field addresses are re-derived from the shadow
    /// base so the expression tracks the shadow object.
    pub(crate) fn shadow_operand(&self, op: &Operand) -> Operand {
        shadow_operand_with(&self.map, op)
    }

    fn check_due(&self, label: Label, enabled: bool) -> bool {
        if !enabled {
            return false;
        }
        if !self.config.selective_checking {
            return true;
        }
        self.function
            .body
            .get(&label)
            .map(|bb| bb.terminator.successors().count() > 1)
            .unwrap_or(false)
    }

    /// Run the pass over every instruction and terminator of the function.
    pub fn run(&mut self) -> Result<(), Error> {
        let ids: Vec<InstrId> = self
            .function
            .body
            .values()
            .flat_map(|bb| bb.instructions.iter().map(|n| n.id))
            .collect();
        for id in ids {
            if self.map.has_instr(id) {
                continue;
            }
            if self.duplicate_instruction(id)? {
                self.removals.push(id);
            }
        }

        // Control transfers: operands duplicated, checks optional.
        let labels: Vec<Label> = self.function.body.keys().copied().collect();
        for label in labels {
            if label == self.err_label {
                continue;
            }
            let Some(bb) = self.function.body.get(&label) else {
                continue;
            };
            let operands: Vec<Operand> = bb.terminator.operands().cloned().collect();
            for op in &operands {
                self.duplicate_operand_def(op)?;
            }
            if self.check_due(label, self.config.check_branches) {
                self.insert_check_before_terminator(label)?;
            }
        }
        Ok(())
    }

    fn duplicate_operand_def(&mut self, op: &Operand) -> Result<(), Error> {
        if let Operand::Reg(r) = op {
            if let Some(def) = self.find_def(*r) {
                if !self.map.has_instr(def) && self.duplicate_instruction(def)? {
                    self.removals.push(def);
                }
            }
        }
        Ok(())
    }

    /// Duplicate one instruction. Idempotent; returns whether the original
    /// must be erased after the pass (only calls superseded by a doubled
    /// call).
    pub(crate) fn duplicate_instruction(&mut self, id: InstrId) -> Result<bool, Error> {
        if self.map.has_instr(id) {
            return Ok(false);
        }
        let Some((label, index)) = self.function.find_instr(id) else {
            return Ok(false);
        };
        let class = self.function.body[&label].instructions[index].instr.dup_class();
        match class {
            DupClass::Allocation => {
                if !self.is_exception_alloca(id) {
                    self.clone_instr(label, index);
                }
                Ok(false)
            }
            DupClass::PureValue => {
                self.duplicate_pure_chain(id)?;
                Ok(false)
            }
            DupClass::MemMutating => {
                let clone_id = self.clone_instr(label, index);
                self.duplicate_operands_of(id)?;
                if self.check_due(label, self.config.check_stores) {
                    self.insert_check_before(id)?;
                }
                self.prune_if_identical(id, clone_id);
                Ok(false)
            }
            DupClass::Call => self.duplicate_call(id),
        }
    }

    /// Walk a pure-value operand chain with an explicit stack. Every node is
    /// cloned and registered before its operands are visited, which is what
    /// terminates phi cycles.
    fn duplicate_pure_chain(&mut self, root: InstrId) -> Result<(), Error> {
        let mut stack = vec![root];
        let mut done: Vec<InstrId> = Vec::new();
        while let Some(&top) = stack.last() {
            if done.contains(&top) {
                stack.pop();
                continue;
            }
            let Some((label, index)) = self.function.find_instr(top) else {
                stack.pop();
                continue;
            };
            if !self.map.has_instr(top) {
                self.clone_instr(label, index);
            }

            let operands: Vec<Operand> = {
                let Some((label, index)) = self.function.find_instr(top) else {
                    stack.pop();
                    continue;
                };
                self.function.body[&label].instructions[index]
                    .instr
                    .operands()
                    .cloned()
                    .collect()
            };

            let mut pending: Vec<InstrId> = Vec::new();
            for op in &operands {
                let Operand::Reg(r) = op else { continue };
                let Some(def) = self.find_def(*r) else { continue };
                if self.map.has_instr(def) || done.contains(&def) || stack.contains(&def) {
                    continue;
                }
                let Some((dl, di)) = self.function.find_instr(def) else {
                    continue;
                };
                match self.function.body[&dl].instructions[di].instr.dup_class() {
                    DupClass::PureValue => {
                        if !pending.contains(&def) {
                            pending.push(def);
                        }
                    }
                    _ => {
                        if self.duplicate_instruction(def)? {
                            self.removals.push(def);
                        }
                    }
                }
            }

            if pending.is_empty() {
                self.substitute_operands(top);
                done.push(top);
                stack.pop();
            } else {
                stack.extend(pending);
            }
        }
        Ok(())
    }

    /// Clone the instruction at `(label, index)`, allocate a fresh
    /// destination where one exists, place the clone and register both the
    /// instruction pair and the destination pair.
    pub(crate) fn clone_instr(&mut self, label: Label, index: usize) -> InstrId {
        let original = self.function.body[&label].instructions[index].clone();
        let clone_id = self.fresh_id();
        let mut instr = original.instr.clone();
        if let Some(dest) = instr.destination() {
            let shadow = self.fresh_name();
            instr.set_destination(shadow);
            self.map
                .insert_value(ValueRef::Reg(dest), ValueRef::Reg(shadow));
        }
        let node = InstrNode {
            id: clone_id,
            instr,
            loc: original.loc.clone(),
        };

        // Shadow allocations gather at the end of the leading allocation
        // run in the default layout; everything else sits right after its
        // original.
        let insert_at = if matches!(original.instr, FdInstr::MAlloca(_))
            && !self.config.alternate_layout
        {
            let bb = &self.function.body[&label];
            bb.instructions
                .iter()
                .position(|n| !matches!(n.instr, FdInstr::Phi(_) | FdInstr::MAlloca(_)))
                .unwrap_or(bb.instructions.len())
        } else {
            index + 1
        };
        if let Some(bb) = self.function.body.get_mut(&label) {
            bb.instructions.insert(insert_at, node);
        }
        self.map.insert_instr(original.id, clone_id);
        clone_id
    }

    /// Duplicate the defining instructions of `id`'s operands, then rewrite
    /// the clone's operands to their shadows.
    fn duplicate_operands_of(&mut self, id: InstrId) -> Result<(), Error> {
        self.duplicate_operand_defs(id)?;
        self.substitute_operands(id);
        Ok(())
    }

    fn duplicate_operand_defs(&mut self, id: InstrId) -> Result<(), Error> {
        let Some((label, index)) = self.function.find_instr(id) else {
            return Ok(());
        };
        let operands: Vec<Operand> = self.function.body[&label].instructions[index]
            .instr
            .operands()
            .cloned()
            .collect();
        for op in &operands {
            self.duplicate_operand_def(op)?;
        }
        Ok(())
    }

    /// Rewrite the clone of `id` so that every operand with a registered
    /// shadow points at the shadow.
    fn substitute_operands(&mut self, id: InstrId) {
        let Some(clone_id) = self.map.instr(id) else {
            return;
        };
        let Some((label, index)) = self.function.find_instr(clone_id) else {
            return;
        };
        let map = &self.map;
        if let Some(bb) = self.function.body.get_mut(&label) {
            bb.instructions[index].instr.remap_operands(|op| {
                *op = shadow_operand_with(map, op);
            });
        }
    }

    /// An allocation hosting an exception-landing value must not be
    /// duplicated: the value stored into it originates from the
    /// exception-catch-begin runtime call.
    fn is_exception_alloca(&self, id: InstrId) -> bool {
        let Some((label, index)) = self.function.find_instr(id) else {
            return false;
        };
        let FdInstr::MAlloca(alloca) = &self.function.body[&label].instructions[index].instr
        else {
            return false;
        };
        let slot = alloca.dest;
        for bb in self.function.body.values() {
            for node in &bb.instructions {
                let FdInstr::MStore(store) = &node.instr else {
                    continue;
                };
                if store.addr != Operand::Reg(slot) {
                    continue;
                }
                let Operand::Reg(value) = &store.value else {
                    continue;
                };
                let Some(def) = self.find_def(*value) else {
                    continue;
                };
                let Some((dl, di)) = self.function.find_instr(def) else {
                    continue;
                };
                let FdInstr::Call(call) = &self.function.body[&dl].instructions[di].instr else {
                    continue;
                };
                let catching = call
                    .static_callee()
                    .and_then(|c| self.module.symbol_name(c))
                    .is_some_and(|name| name == "__cxa_begin_catch");
                if catching {
                    return true;
                }
            }
        }
        false
    }

    /// Drop a duplicated store that came out operand-identical to its
    /// original: nothing actually diverged, so the shadow write is dead.
    fn prune_if_identical(&mut self, id: InstrId, clone_id: InstrId) {
        let Some((l1, i1)) = self.function.find_instr(id) else {
            return;
        };
        let Some((l2, i2)) = self.function.find_instr(clone_id) else {
            return;
        };
        let original = &self.function.body[&l1].instructions[i1].instr;
        let clone = &self.function.body[&l2].instructions[i2].instr;
        if clone.destination().is_none() && original == clone {
            debug!("pruning dead store duplicate in {}", self.function.name);
            if let Some(bb) = self.function.body.get_mut(&l2) {
                bb.instructions.remove(i2);
            }
            self.map.remove_instr(id);
        }
    }

    fn duplicate_call(&mut self, id: InstrId) -> Result<bool, Error> {
        let Some((label, index)) = self.function.find_instr(id) else {
            return Ok(false);
        };
        let node = self.function.body[&label].instructions[index].clone();
        let FdInstr::Call(call) = &node.instr else {
            return Ok(false);
        };
        let callee = call.static_callee();

        // Policy lookup is against the plain (non-shadow) callee.
        let logical = callee.map(|c| globals::function_from_duplicate(self.module, c).unwrap_or(c));
        let duplicable = logical.is_some_and(|c| self.policy.is(c, PolicyTag::ToDuplicate))
            || callee
                .and_then(|c| self.module.symbol_name(c))
                .is_some_and(is_duplicable_builtin);

        if duplicable {
            self.clone_instr(label, index);
            self.duplicate_operands_of(id)?;
            if self.check_due(label, self.config.check_calls) {
                self.insert_check_before(id)?;
            }
            return Ok(false);
        }

        // Operands are still duplicated so shadow chains stay consistent,
        // but the call itself is not cloned.
        self.duplicate_operand_defs(id)?;
        if self.check_due(label, self.config.check_calls) {
            self.insert_check_before(id)?;
        }

        let fn_dup = callee.and_then(|c| self.lookup_duplicate(c));
        if callee.is_none() {
            self.double_indirect_call(id)?;
            return Ok(true);
        }
        if let Some(dup) = fn_dup {
            if Some(dup) == callee {
                // Already targets the shadow signature. Self-pair so later
                // operand walks do not revisit it.
                self.map.insert_instr(id, id);
                return Ok(false);
            }
            self.redirect_call(id, dup)?;
            return Ok(true);
        }

        // Opaque callee: resynchronize shadow state of pointer arguments
        // against whatever side effects the call produced. The self-pair
        // keeps the resynchronization from running twice.
        self.resync_pointer_args(id)?;
        self.map.insert_instr(id, id);
        Ok(false)
    }

    /// Shadow-signature lookup that also covers the function currently
    /// being transformed (it is detached from the module for the pass).
    fn lookup_duplicate(&self, callee: Uuid) -> Option<Uuid> {
        if let Some(name) = self.module.symbol_name(callee) {
            if globals::shadow_name(name) == self.function.name
                || format!("{name}{}", globals::SHADOW_RET_SUFFIX) == self.function.name
            {
                return Some(self.function.uuid);
            }
        }
        globals::function_duplicate(self.module, callee)
    }

    /// Argument list and attributes doubled per the configured ordering.
    fn doubled_args(&self, call: &Call) -> (Vec<Operand>, Vec<fdinstr::modules::ParamAttrs>) {
        let mut args = Vec::with_capacity(call.args.len() * 2);
        let mut attrs = Vec::with_capacity(call.args.len() * 2);
        let attr_of = |i: usize| {
            let mut a = call
                .arg_attrs
                .get(i)
                .copied()
                .unwrap_or_else(fdinstr::modules::ParamAttrs::empty);
            a.remove(fdinstr::modules::ParamAttrs::SRET);
            a
        };
        if self.config.interleaved_args() {
            for (i, arg) in call.args.iter().enumerate() {
                args.push(arg.clone());
                args.push(self.shadow_operand(arg));
                attrs.push(attr_of(i));
                attrs.push(attr_of(i));
            }
        } else {
            for arg in &call.args {
                args.push(arg.clone());
            }
            for arg in &call.args {
                args.push(self.shadow_operand(arg));
            }
            for i in 0..call.args.len() {
                attrs.push(attr_of(i));
            }
            for i in 0..call.args.len() {
                attrs.push(attr_of(i));
            }
        }
        (args, attrs)
    }

    /// Redirect a call to the argument-doubled shadow callee. The doubled
    /// call is inserted before the original; uses of the original result
    /// are rewritten and the original is marked for removal.
    fn redirect_call(&mut self, id: InstrId, dup: Uuid) -> Result<(), Error> {
        let Some((label, index)) = self.function.find_instr(id) else {
            return Ok(());
        };
        let node = self.function.body[&label].instructions[index].clone();
        let FdInstr::Call(call) = &node.instr else {
            return Ok(());
        };
        let (args, arg_attrs) = self.doubled_args(call);
        let new_dest = call.dest.map(|_| self.fresh_name());
        let doubled_id = self.fresh_id();
        let doubled = InstrNode {
            id: doubled_id,
            instr: Call {
                dest: new_dest,
                ty: call.ty,
                callee: Operand::Func(dup),
                args,
                arg_attrs,
            }
            .into(),
            loc: node.loc.clone(),
        };
        debug!(
            "redirecting call in {} to {}",
            self.function.name,
            self.module.symbol_name(dup).unwrap_or("<self>")
        );
        if let Some(bb) = self.function.body.get_mut(&label) {
            bb.instructions.insert(index, doubled);
        }
        // Pairing the original with its doubled replacement keeps both the
        // sweep and operand recursion from redirecting the call again.
        self.map.insert_instr(id, doubled_id);
        if let (Some(old), Some(new)) = (call.dest, new_dest) {
            self.replace_uses(old, new, id);
        }
        Ok(())
    }

    /// Structurally double an indirect call: the target is cast to the
    /// doubled function-pointer type and called with both argument halves.
    fn double_indirect_call(&mut self, id: InstrId) -> Result<(), Error> {
        let Some((label, index)) = self.function.find_instr(id) else {
            return Ok(());
        };
        let node = self.function.body[&label].instructions[index].clone();
        let FdInstr::Call(call) = &node.instr else {
            return Ok(());
        };
        let (args, arg_attrs) = self.doubled_args(call);

        let cast_dest = self.fresh_name();
        let cast = InstrNode {
            id: self.fresh_id(),
            instr: Cast {
                dest: cast_dest,
                ty: self.registry.ptr(),
                kind: CastKind::Bitcast,
                value: call.callee.clone(),
            }
            .into(),
            loc: node.loc.clone(),
        };
        let new_dest = call.dest.map(|_| self.fresh_name());
        let doubled_id = self.fresh_id();
        let doubled = InstrNode {
            id: doubled_id,
            instr: Call {
                dest: new_dest,
                ty: call.ty,
                callee: Operand::Reg(cast_dest),
                args,
                arg_attrs,
            }
            .into(),
            loc: node.loc.clone(),
        };
        debug!("doubling indirect call in {}", self.function.name);
        if let Some(bb) = self.function.body.get_mut(&label) {
            bb.instructions.insert(index, doubled);
            bb.instructions.insert(index, cast);
        }
        // Same pairing discipline as direct redirection.
        self.map.insert_instr(id, doubled_id);
        if let (Some(old), Some(new)) = (call.dest, new_dest) {
            self.replace_uses(old, new, id);
        }
        Ok(())
    }

    /// Rewrite every use of `old` to `new`, except inside the superseded
    /// instruction itself.
    fn replace_uses(&mut self, old: Name, new: Name, skip: InstrId) {
        for bb in self.function.body.values_mut() {
            for node in bb.instructions.iter_mut() {
                if node.id == skip {
                    continue;
                }
                node.instr.remap_operands(|op| remap_reg(op, old, new));
            }
            for op in bb.terminator.operands_mut() {
                remap_reg(op, old, new);
            }
        }
    }

    /// After a call to an opaque callee, reload each original pointer
    /// argument and store the value into its shadow, so shadow memory
    /// catches up with side effects the callee may have produced.
    fn resync_pointer_args(&mut self, id: InstrId) -> Result<(), Error> {
        let Some((label, index)) = self.function.find_instr(id) else {
            return Ok(());
        };
        let node = self.function.body[&label].instructions[index].clone();
        let operands: Vec<Operand> = node.instr.operands().cloned().collect();

        let mut inserts: Vec<InstrNode> = Vec::new();
        for op in &operands {
            let Operand::Reg(r) = op else { continue };
            let Some(def) = self.find_def(*r) else { continue };
            let Some(ty) = self.value_type(*r) else { continue };
            if !self.registry.is_pointer(ty) {
                continue;
            }
            let Some(shadow) = self.map.reg(*r) else {
                continue;
            };
            // Best effort on the loaded width: allocations expose their
            // slot type, anything else degrades to a pointer-sized copy.
            let loaded_ty = match self
                .function
                .find_instr(def)
                .map(|(l, i)| self.function.body[&l].instructions[i].instr.clone())
            {
                Some(FdInstr::MAlloca(a)) => a.ty,
                _ => self.registry.ptr(),
            };
            let load_dest = self.fresh_name();
            let load_id = self.fresh_id();
            let store_id = self.fresh_id();
            inserts.push(InstrNode {
                id: load_id,
                instr: MLoad {
                    dest: load_dest,
                    ty: loaded_ty,
                    addr: Operand::Reg(*r),
                    alignment: None,
                    ordering: None,
                    volatile: false,
                }
                .into(),
                loc: node.loc.clone(),
            });
            inserts.push(InstrNode {
                id: store_id,
                instr: MStore {
                    addr: Operand::Reg(shadow),
                    value: Operand::Reg(load_dest),
                    alignment: None,
                    ordering: None,
                    volatile: false,
                }
                .into(),
                loc: node.loc.clone(),
            });
            // Self-pairs, so the sweep does not try to duplicate the
            // resynchronization itself.
            self.map.insert_instr(load_id, load_id);
            self.map.insert_instr(store_id, store_id);
        }
        if inserts.is_empty() {
            return Ok(());
        }
        debug!(
            "resynchronizing {} pointer argument(s) after opaque call in {}",
            inserts.len() / 2,
            self.function.name
        );
        if let Some(bb) = self.function.body.get_mut(&label) {
            let mut at = index + 1;
            for insert in inserts {
                bb.instructions.insert(at, insert);
                at += 1;
            }
        }
        Ok(())
    }

    /// Split `label` before position `index`, wiring a fresh block on the
    /// edge. The head keeps the original label (incoming edges stay valid);
    /// the tail gets a fresh label and successor phis are retargeted to it.
    pub(crate) fn split_before(&mut self, label: Label, index: usize) -> (Label, Label) {
        let check_label = self.fresh_label();
        let tail_label = self.fresh_label();

        let (tail_instrs, tail_term) = {
            let Some(bb) = self.function.body.get_mut(&label) else {
                return (check_label, tail_label);
            };
            let tail_instrs = bb.instructions.split_off(index);
            let tail_term = std::mem::replace(
                &mut bb.terminator,
                Terminator::Jump {
                    target: check_label,
                },
            );
            (tail_instrs, tail_term)
        };
        let successors: Vec<Label> = tail_term.successors().collect();
        self.function.body.insert(
            tail_label,
            BasicBlock {
                instructions: tail_instrs,
                terminator: tail_term,
            },
        );
        for succ in successors {
            let Some(sb) = self.function.body.get_mut(&succ) else {
                continue;
            };
            for node in sb.instructions.iter_mut() {
                if let FdInstr::Phi(phi) = &mut node.instr {
                    for (incoming, _) in phi.values.iter_mut() {
                        if *incoming == label {
                            *incoming = tail_label;
                        }
                    }
                }
            }
        }
        (check_label, tail_label)
    }
}

fn remap_reg(op: &mut Operand, old: Name, new: Name) {
    match op {
        Operand::Reg(r) if *r == old => *r = new,
        Operand::FieldAddr(fa) => remap_reg(fa.base.as_mut(), old, new),
        _ => {}
    }
}

pub(crate) fn shadow_operand_with(map: &DuplicateMap, op: &Operand) -> Operand {
    match op {
        Operand::Reg(r) => match map.reg(*r) {
            Some(s) => Operand::Reg(s),
            None => op.clone(),
        },
        Operand::Global(g) => match map.global(*g) {
            Some(s) => Operand::Global(s),
            None => op.clone(),
        },
        Operand::FieldAddr(fa) => {
            let base = shadow_operand_with(map, &fa.base);
            if base != *fa.base {
                let mut fa = fa.clone();
                fa.base = Box::new(base);
                Operand::FieldAddr(fa)
            } else {
                op.clone()
            }
        }
        _ => op.clone(),
    }
}
